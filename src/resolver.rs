use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::{pointer, Error};

/// Where a `$ref` points: a registered file and an (escaped) JSON pointer inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefTarget {
    /// Index of the file, in registration order.
    pub file: usize,
    /// Pointer into the file, `""` for its root.
    pub pointer: String,
}

/// Resolves `$ref`s between a fixed set of files.
///
/// Files are identified by index and never own each other, so cyclic references are plain
/// lookups.
pub struct Resolver {
    ref_lookup: BTreeMap<PathBuf, usize>,
    files: Vec<PathBuf>,
}

impl Resolver {
    pub fn for_files<P: AsRef<Path>>(files: &[P]) -> Self {
        let files: Vec<PathBuf> = files.iter().map(|p| normalize(p.as_ref())).collect();
        let ref_lookup = files
            .iter()
            .enumerate()
            .map(|(index, path)| (path.clone(), index))
            .collect();
        Self { ref_lookup, files }
    }

    /// The target of `reference`, as written in the file with index `from`.
    pub fn target(&self, from: usize, reference: &str) -> Result<RefTarget, Error> {
        let (file, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let file = if file.is_empty() {
            from
        } else {
            let source = self
                .files
                .get(from)
                .ok_or_else(|| Error::UnresolvedRef(reference.to_owned()))?;
            let path = external_file(source, reference)
                .ok_or_else(|| Error::UnresolvedRef(reference.to_owned()))?;
            *self
                .ref_lookup
                .get(&path)
                .ok_or_else(|| Error::UnresolvedRef(reference.to_owned()))?
        };

        let segments = pointer::decode_fragment(fragment)
            .ok_or_else(|| Error::UnresolvedRef(reference.to_owned()))?;
        Ok(RefTarget {
            file,
            pointer: pointer::compile(&segments),
        })
    }

    /// Look up `target` in `documents`, which must be indexed like the resolver's files.
    pub fn resolve<'a>(&self, documents: &'a [Value], target: &RefTarget) -> Option<&'a Value> {
        let document = documents.get(target.file)?;
        match target.pointer.as_str() {
            "" => Some(document),
            pointer => document.pointer(pointer),
        }
    }

    pub fn path(&self, file: usize) -> Option<&Path> {
        self.files.get(file).map(PathBuf::as_path)
    }
}

/// The file an external `reference` found in `source` points to, or `None` for local and
/// remote references.
pub fn external_file(source: &Path, reference: &str) -> Option<PathBuf> {
    let file = reference.split('#').next().unwrap_or_default();
    if file.is_empty() || file.contains("://") {
        return None;
    }
    let file = percent_decode_str(file).decode_utf8_lossy();
    let base = source.parent().unwrap_or_else(|| Path::new(""));
    Some(normalize(&base.join(file.as_ref())))
}

/// Every external file referenced from `document`, which was read from `source`.
pub fn external_files(source: &Path, document: &Value) -> Vec<PathBuf> {
    let mut found = vec![];
    collect_external_files(source, document, &mut found);
    found
}

fn collect_external_files(source: &Path, value: &Value, found: &mut Vec<PathBuf>) {
    match value {
        Value::Object(fields) => {
            if let Some(Value::String(reference)) = fields.get("$ref") {
                if reference.contains("://") {
                    tracing::warn!(%reference, "remote references are not followed");
                } else if let Some(path) = external_file(source, reference) {
                    if !found.contains(&path) {
                        found.push(path);
                    }
                }
            }
            for value in fields.values() {
                collect_external_files(source, value, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_external_files(source, item, found);
            }
        }
        _ => (),
    }
}

/// Lexically resolve `.` and `..`, so one file always gets the same path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
