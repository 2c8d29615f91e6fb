use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pathfinding::directed::bfs::bfs_reach;
use serde_json::{Map, Value};

use crate::resolver::{external_files, normalize, RefTarget, Resolver};
use crate::sourcemap::JsonSchemaSourcemap;
use crate::{pointer, Error};

/// A document with every `$ref` inlined, and where each of its parts came from.
pub struct ParseOutput {
    /// The merged document. Circular references are kept as `{"$ref": ...}`.
    pub json_like: Value,
    /// Maps pointers into `json_like` back to the source files.
    pub sourcemap: JsonSchemaSourcemap,
}

/// Read the OpenAPI document at `path` together with every file it references, and inline all
/// references into one document.
pub fn parse_openapi_with_sourcemap(path: &Path) -> Result<ParseOutput, Error> {
    let root = std::fs::canonicalize(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let root = normalize(&root);

    let mut sourcemap = JsonSchemaSourcemap::new();
    let mut documents: HashMap<PathBuf, Value> = HashMap::new();
    let mut failure = None;

    let files: Vec<PathBuf> = bfs_reach(root, |file: &PathBuf| {
        match load(file, &mut sourcemap) {
            Ok(document) => {
                let referenced = external_files(file, &document);
                documents.insert(file.clone(), document);
                referenced
            }
            Err(e) => {
                failure.get_or_insert(e);
                vec![]
            }
        }
    })
    .collect();
    if let Some(e) = failure {
        return Err(e);
    }

    // Files were registered in discovery order, so sourcemap indexes and resolver indexes agree.
    let documents = files
        .iter()
        .map(|file| documents.remove(file).unwrap_or(Value::Null))
        .collect::<Vec<_>>();
    let resolver = Resolver::for_files(&files);
    tracing::debug!(files = files.len(), "loaded document graph");

    let mut dereferencer = Dereferencer {
        resolver: &resolver,
        documents: &documents,
        sourcemap: &mut sourcemap,
        stack: vec![],
    };
    let json_like = dereferencer.visit(
        &RefTarget {
            file: 0,
            pointer: String::new(),
        },
        &documents[0],
        String::new(),
    )?;

    Ok(ParseOutput {
        json_like,
        sourcemap,
    })
}

fn load(file: &Path, sourcemap: &mut JsonSchemaSourcemap) -> Result<Value, Error> {
    let index = sourcemap.add_file_if_missing(file)?;
    let contents = sourcemap.files()[index].contents();
    serde_yaml::from_str(contents).map_err(|source| Error::Yaml {
        path: file.to_owned(),
        source,
    })
}

struct Dereferencer<'a> {
    resolver: &'a Resolver,
    documents: &'a [Value],
    sourcemap: &'a mut JsonSchemaSourcemap,
    /// The references currently being inlined, innermost last.
    stack: Vec<RefTarget>,
}

impl Dereferencer<'_> {
    /// Inline every reference inside `value`, which lives at `location` in the sources and
    /// at `merged` in the result.
    fn visit(
        &mut self,
        location: &RefTarget,
        value: &Value,
        merged: String,
    ) -> Result<Value, Error> {
        let physical = match self.resolver.path(location.file) {
            Some(path) => format!("{}#{}", path.display(), location.pointer),
            None => return Err(Error::UnresolvedRef(location.pointer.clone())),
        };
        self.sourcemap.log(physical, merged.clone());

        match value {
            Value::Object(fields) => {
                if let Some(Value::String(reference)) = fields.get("$ref") {
                    return self.follow(location.file, reference, value, merged);
                }
                let mut inlined = Map::new();
                for (key, child) in fields {
                    let child_location = RefTarget {
                        file: location.file,
                        pointer: pointer::append(&location.pointer, &[key]),
                    };
                    let child_merged = pointer::append(&merged, &[key]);
                    inlined.insert(key.clone(), self.visit(&child_location, child, child_merged)?);
                }
                Ok(Value::Object(inlined))
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let index = index.to_string();
                    let child_location = RefTarget {
                        file: location.file,
                        pointer: pointer::append(&location.pointer, &[&index]),
                    };
                    self.visit(&child_location, item, pointer::append(&merged, &[&index]))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn follow(
        &mut self,
        file: usize,
        reference: &str,
        value: &Value,
        merged: String,
    ) -> Result<Value, Error> {
        if reference.contains("://") {
            return Ok(value.clone());
        }
        let target = self.resolver.target(file, reference)?;
        if self.stack.contains(&target) {
            tracing::warn!(%reference, %merged, "circular reference kept as $ref");
            return Ok(value.clone());
        }
        let resolved = self
            .resolver
            .resolve(self.documents, &target)
            .ok_or_else(|| Error::UnresolvedRef(reference.to_owned()))?;

        self.stack.push(target.clone());
        let inlined = self.visit(&target, resolved, merged);
        self.stack.pop();
        inlined
    }
}
