//! Maps pointers into a dereferenced, merged document back to byte ranges in the files it was
//! read from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{pointer, Error};

mod ast;

pub use ast::{resolve_json_pointer_in_yaml_ast, AstMatch, Span, YamlAst, YamlNode};

/// A source file registered with a [`JsonSchemaSourcemap`].
pub struct SourcemapFile {
    path: PathBuf,
    index: usize,
    contents: String,
    ast: YamlAst,
}

impl SourcemapFile {
    /// The path the file was registered under.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file's index, used by [`SourcemapEntry::file_index`].
    pub fn index(&self) -> usize {
        self.index
    }

    /// The text of the file.
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// Where a pointer of the merged document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcemapEntry {
    /// The pointer into the merged document.
    pub json_pointer: String,
    /// Index of the file the node was read from.
    pub file_index: usize,
    /// The key's range, when the node is an object field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Span>,
    /// The value's range, when the node is an object field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Span>,
    /// The range of the whole node.
    pub node: Span,
}

/// A registered file, as listed in [`SourcemapOutput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcemapOutputFile {
    /// The path the file was registered under.
    pub path: String,
    /// The file's index.
    pub index: usize,
}

/// A self-contained, serializable form of a [`JsonSchemaSourcemap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcemapOutput {
    /// Every registered file.
    pub files: Vec<SourcemapOutputFile>,
    /// Every logged pointer that could be mapped, in pointer order.
    pub map: Vec<(String, SourcemapEntry)>,
}

/// Records, for every pointer of a merged document, the file and pointer it was read from.
#[derive(Default)]
pub struct JsonSchemaSourcemap {
    files: Vec<SourcemapFile>,
    refs: BTreeMap<String, String>,
}

impl JsonSchemaSourcemap {
    /// An empty sourcemap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and register the file at `path`, returning its index.
    ///
    /// A file that is already registered is neither read nor parsed again.
    pub fn add_file_if_missing(&mut self, path: &Path) -> Result<usize, Error> {
        if let Some(index) = self.file_index(path) {
            return Ok(index);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        self.add_source_if_missing(path, contents)
    }

    /// Register `contents` as the text of the file at `path`, returning its index.
    pub fn add_source_if_missing(&mut self, path: &Path, contents: String) -> Result<usize, Error> {
        if let Some(index) = self.file_index(path) {
            return Ok(index);
        }
        let ast = YamlAst::parse(path, &contents)?;
        let index = self.files.len();
        tracing::debug!(path = %path.display(), index, "registered source file");
        self.files.push(SourcemapFile {
            path: path.to_owned(),
            index,
            contents,
            ast,
        });
        Ok(index)
    }

    /// The index of the file registered under `path`.
    pub fn file_index(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|file| file.path == path)
    }

    /// The registered files, by index.
    pub fn files(&self) -> &[SourcemapFile] {
        &self.files
    }

    /// Record that `path_from_root` in the merged document was read from `physical`, which is
    /// a file path and a pointer fragment: `/specs/pets.yaml#/components/schemas/Pet`.
    ///
    /// A later record for the same pointer wins.
    pub fn log(&mut self, physical: impl Into<String>, path_from_root: impl Into<String>) {
        self.refs.insert(path_from_root.into(), physical.into());
    }

    /// Find the source of `pointer`, a pointer into the merged document.
    ///
    /// Unlogged pointers inherit the location of their closest logged ancestor. Returns `None`
    /// for content that has no source, e.g. a pointer into a file the AST does not contain.
    pub fn resolve(&self, pointer: &str) -> Option<SourcemapEntry> {
        let pointer = if pointer == "/" { "" } else { pointer };
        let (physical, remainder) = self.physical(pointer)?;
        let (file, fragment) = self.split_physical(physical)?;
        let origin = pointer::decode_fragment(fragment)?;
        let target = pointer::append(&pointer::compile(&origin), &remainder);

        let Some(found) = resolve_json_pointer_in_yaml_ast(&file.ast, &target) else {
            tracing::warn!(pointer, physical, "pointer has no source mapping");
            return None;
        };
        Some(SourcemapEntry {
            json_pointer: pointer.to_owned(),
            file_index: file.index,
            key: found.key,
            value: found.value,
            node: found.node,
        })
    }

    /// Convert a byte offset in a registered file to a 1-based `(line, column)`.
    pub fn position(&self, file_index: usize, offset: usize) -> Option<(usize, usize)> {
        let contents = &self.files.get(file_index)?.contents;
        if offset > contents.len() || !contents.is_char_boundary(offset) {
            return None;
        }
        let before = &contents[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Some((line, before[line_start..].chars().count() + 1))
    }

    /// Resolve every logged pointer into a self-contained output.
    pub fn serialize(&self) -> SourcemapOutput {
        SourcemapOutput {
            files: self
                .files
                .iter()
                .map(|file| SourcemapOutputFile {
                    path: file.path.display().to_string(),
                    index: file.index,
                })
                .collect(),
            map: self
                .refs
                .keys()
                .filter_map(|pointer| Some((pointer.clone(), self.resolve(pointer)?)))
                .collect(),
        }
    }

    /// The physical location logged for `pointer` or its closest ancestor, plus the tokens
    /// between the two.
    fn physical(&self, pointer: &str) -> Option<(&str, Vec<String>)> {
        let mut segments = pointer::decode(pointer)?;
        let mut remainder = vec![];
        loop {
            if let Some(physical) = self.refs.get(&pointer::compile(&segments)) {
                remainder.reverse();
                return Some((physical.as_str(), remainder));
            }
            remainder.push(segments.pop()?);
        }
    }

    /// Split `physical` into the registered file that is the longest prefix of it, and the
    /// pointer fragment after the `#`.
    fn split_physical<'p>(&self, physical: &'p str) -> Option<(&SourcemapFile, &'p str)> {
        self.files
            .iter()
            .filter_map(|file| {
                let path = file.path.to_str()?;
                let fragment = physical.strip_prefix(path)?;
                match fragment {
                    "" => Some((file, "")),
                    _ => Some((file, fragment.strip_prefix('#')?)),
                }
            })
            .max_by_key(|(file, _)| file.path.as_os_str().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETS: &str = "openapi: 3.1.0\ninfo:\n  title: Pets\n  version: '1'\npaths: {}\n";
    const SCHEMAS: &str = "Pet:\n  type: object\n  properties:\n    name:\n      type: string\n";

    fn sourcemap() -> JsonSchemaSourcemap {
        let mut sourcemap = JsonSchemaSourcemap::new();
        sourcemap
            .add_source_if_missing(Path::new("/specs/openapi.yaml"), PETS.to_owned())
            .unwrap();
        sourcemap
            .add_source_if_missing(Path::new("/specs/schemas.yaml"), SCHEMAS.to_owned())
            .unwrap();
        sourcemap
    }

    #[test]
    fn files_are_registered_once() {
        let mut sourcemap = sourcemap();
        let again = sourcemap
            .add_source_if_missing(Path::new("/specs/schemas.yaml"), String::new())
            .unwrap();
        assert_eq!(again, 1);
        assert_eq!(sourcemap.files().len(), 2);
        assert_eq!(sourcemap.files()[1].contents(), SCHEMAS);
    }

    #[test]
    fn resolves_across_files() {
        let mut sourcemap = sourcemap();
        sourcemap.log("/specs/openapi.yaml#", "");
        sourcemap.log("/specs/schemas.yaml#/Pet", "/components/schemas/Pet");

        let title = sourcemap.resolve("/info/title").unwrap();
        assert_eq!(title.file_index, 0);
        let (start, end) = title.value.unwrap();
        assert_eq!(&PETS[start..end], "Pets");

        let name = sourcemap
            .resolve("/components/schemas/Pet/properties/name/type")
            .unwrap();
        assert_eq!(name.file_index, 1);
        let (start, end) = name.value.unwrap();
        assert_eq!(&SCHEMAS[start..end], "string");
        assert_eq!(sourcemap.position(1, start), Some((5, 13)));

        assert!(sourcemap.resolve("/components/schemas/Pet/enum").is_none());
    }

    #[test]
    fn root_and_spans_stay_within_the_file() {
        let mut sourcemap = sourcemap();
        for pointer in ["", "/openapi", "/info", "/info/title", "/info/version", "/paths"] {
            sourcemap.log(format!("/specs/openapi.yaml#{pointer}"), pointer);
        }

        let root = sourcemap.resolve("/").unwrap();
        assert_eq!(root.node, (0, PETS.len()));

        let output = sourcemap.serialize();
        assert_eq!(output.map.len(), 6);
        for (_, entry) in &output.map {
            assert!(entry.node.0 <= entry.node.1 && entry.node.1 <= PETS.len());
        }
        assert_eq!(
            output.files[1],
            SourcemapOutputFile {
                path: "/specs/schemas.yaml".into(),
                index: 1
            }
        );
    }

    #[test]
    fn positions_are_one_based() {
        let sourcemap = sourcemap();
        assert_eq!(sourcemap.position(0, 0), Some((1, 1)));
        assert_eq!(sourcemap.position(0, PETS.find("title").unwrap()), Some((3, 3)));
        assert_eq!(sourcemap.position(0, PETS.len() + 1), None);
        assert_eq!(sourcemap.position(5, 0), None);
    }
}
