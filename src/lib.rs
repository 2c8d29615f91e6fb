#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use serde_json::Value;

mod changelog;
mod dereference;
mod facts;
mod patcher;
mod plugins;
pub mod pointer;
mod resolver;
mod schema_builder;
mod shape_diff;
pub mod sourcemap;
mod traverser;
mod types;
mod update;

pub use changelog::{facts_to_changelog, Change, ChangeKind};
pub use dereference::{parse_openapi_with_sourcemap, ParseOutput};
pub use facts::{
    conceptual_path_identifier, ConceptualLocation, Fact, FactKind, Location, ParameterIn,
    ParameterLocation,
};
pub use patcher::{apply_operations, apply_to_copy, JsonPatcher, OperationGroup, PatchOp};
pub use plugins::{
    generate_shape_patches, JsonSchemaDiffPlugin, PluginRegistry, SchemaPatch, ShapePatchFn,
};
pub use schema_builder::infer_schema;
pub use shape_diff::{JsonSchemaKeyword, SchemaDiffer, ShapeDiff, ShapeDiffKind, TypeMismatch};
pub use sourcemap::{JsonSchemaSourcemap, SourcemapEntry, SourcemapOutput};
pub use traverser::{normalize_path_pattern, OpenApiTraverser};
pub use types::*;
pub use update::{
    documented_bodies, update_by_example, update_by_example_with, DocumentedBody, SpecPatch,
    UpdateOptions, UpdateResult, UpdateStats,
};

/// Take two OpenAPI documents, and compare them.
///
/// `lhs` (left-hand side) is the old document, `rhs` (right-hand side) is the new document. Both
/// must already be dereferenced.
pub fn diff(lhs: &Value, rhs: &Value) -> Result<Vec<Change>, Error> {
    let past = OpenApiTraverser::traverse(lhs)?;
    let current = OpenApiTraverser::traverse(rhs)?;
    Ok(facts_to_changelog(&past, &current))
}

/// List every mismatch between `example` and `schema`.
///
/// Use [`SchemaDiffer`] directly to stop at the first mismatch, or to attach a location.
pub fn diff_by_example(
    example: &Value,
    schema: &Value,
    version: OasVersion,
) -> Result<Vec<ShapeDiff>, Error> {
    let differ = SchemaDiffer::new(schema, version)?;
    let diffs = differ.diff_by_example(example).collect();
    Ok(diffs)
}
