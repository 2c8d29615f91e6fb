//! Per-keyword strategies that turn a [`ShapeDiff`] into schema patches.
//!
//! Every plugin works on its own fork of the schema node the diff points at, and returns
//! operations addressed from the root of the schema that was diffed.

use serde::Serialize;
use serde_json::Value;

use crate::patcher::{JsonPatcher, PatchOp};
use crate::shape_diff::{JsonSchemaKeyword, SchemaDiffer, ShapeDiff, ShapeDiffKind};
use crate::{pointer, Error, PatchImpact};

mod object;
mod polymorphic;
mod type_keyword;

/// A classified set of operations that makes a schema accept an example it rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaPatch {
    /// What the patch does, for humans.
    pub description: String,
    /// How the patch affects consumers.
    pub impact: PatchImpact,
    /// The operations, addressed from the root of the diffed schema.
    pub patch: Vec<PatchOp>,
    /// The resulting change in what the schema accepts.
    pub effect: String,
    /// Whether everything accepted before is still accepted afterwards.
    pub extends: bool,
}

/// Generates patches for one kind of [`ShapeDiff`].
pub type ShapePatchFn =
    fn(&ShapeDiff, &SchemaDiffer, &JsonPatcher) -> Result<Vec<SchemaPatch>, Error>;

/// A strategy registered for a keyword.
#[derive(Clone)]
pub struct JsonSchemaDiffPlugin {
    /// The keyword whose diffs this plugin handles.
    pub keyword: JsonSchemaKeyword,
    /// The strategy itself.
    pub shape_patches: ShapePatchFn,
}

/// Maps keywords to plugins, with a fallback for keywords nobody registered for.
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: Vec<JsonSchemaDiffPlugin>,
    fallback: ShapePatchFn,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let builtins: [(JsonSchemaKeyword, ShapePatchFn); 7] = [
            (JsonSchemaKeyword::Type, type_keyword::shape_patches),
            (JsonSchemaKeyword::OneOf, polymorphic::one_of),
            (JsonSchemaKeyword::AnyOf, polymorphic::any_of),
            (JsonSchemaKeyword::AllOf, polymorphic::all_of),
            (JsonSchemaKeyword::Required, object::required),
            (JsonSchemaKeyword::AdditionalProperties, object::additional_properties),
            (JsonSchemaKeyword::Enum, object::enumeration),
        ];
        Self {
            plugins: builtins
                .into_iter()
                .map(|(keyword, shape_patches)| JsonSchemaDiffPlugin {
                    keyword,
                    shape_patches,
                })
                .collect(),
            fallback: unmatched_keyword,
        }
    }
}

impl PluginRegistry {
    /// Register `plugin`, replacing any plugin for the same keyword.
    pub fn register(&mut self, plugin: JsonSchemaDiffPlugin) {
        self.plugins.retain(|p| p.keyword != plugin.keyword);
        self.plugins.push(plugin);
    }

    /// The strategy used for diffs reported by `keyword`.
    pub fn plugin_for(&self, keyword: &JsonSchemaKeyword) -> ShapePatchFn {
        self.plugins
            .iter()
            .find(|p| &p.keyword == keyword)
            .map_or(self.fallback, |p| p.shape_patches)
    }

    /// Generate the patches for `diff`, with `differ` being the differ that produced it.
    pub fn shape_patches(
        &self,
        diff: &ShapeDiff,
        differ: &SchemaDiffer,
    ) -> Result<Vec<SchemaPatch>, Error> {
        let patcher = JsonPatcher::new(differ.schema().clone());
        let patches = (self.plugin_for(&diff.keyword))(diff, differ, &patcher)?;
        tracing::debug!(
            keyword = diff.keyword.as_str(),
            schema_path = %diff.schema_path,
            patches = patches.len(),
            "generated shape patches"
        );
        Ok(patches)
    }
}

/// Generate patches for `diff` with the built-in plugins.
pub fn generate_shape_patches(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
) -> Result<Vec<SchemaPatch>, Error> {
    PluginRegistry::default().shape_patches(diff, differ)
}

/// Keywords that may stay next to a `oneOf`/`anyOf` after a node becomes polymorphic.
const ANNOTATION_KEYWORDS: [&str; 11] = [
    "title",
    "description",
    "example",
    "examples",
    "default",
    "nullable",
    "deprecated",
    "readOnly",
    "writeOnly",
    "discriminator",
    "externalDocs",
];

fn allowed_keys_for(keyword: &'static str) -> Vec<&'static str> {
    let mut allowed = ANNOTATION_KEYWORDS.to_vec();
    allowed.push(keyword);
    allowed
}

/// A patcher over a copy of the schema node at `path`.
fn node_patcher(patcher: &JsonPatcher, path: &str) -> Result<JsonPatcher, Error> {
    patcher
        .get(path)
        .cloned()
        .map(JsonPatcher::new)
        .ok_or_else(|| Error::MissingPointer(path.to_owned()))
}

fn in_request(diff: &ShapeDiff) -> bool {
    diff.location.as_ref().map_or(false, |l| l.in_request())
}

fn subject(diff: &ShapeDiff) -> String {
    if diff.key.is_empty() {
        "schema".to_owned()
    } else {
        format!("'{}'", diff.key)
    }
}

/// Everything of a schema node that is not an annotation, i.e. what constrains values.
fn constraints_of(node: &Value) -> Value {
    match node {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(k, _)| !ANNOTATION_KEYWORDS.contains(&k.as_str()) && !k.starts_with("x-"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replace the constraints of the node `schema` is rooted at with `replacement`, keeping
/// annotations.
fn replace_constraints(
    schema: &mut JsonPatcher,
    replacement: &Value,
    intent: &str,
) -> Result<(), Error> {
    match (schema.document().is_object(), replacement.as_object()) {
        (true, Some(fields)) => {
            schema.remove_keys_not_allowed_at(
                "",
                &ANNOTATION_KEYWORDS,
                "before replacing the schema",
            )?;
            let operations = fields
                .iter()
                .map(|(k, v)| PatchOp::Add {
                    path: pointer::compile(&[k]),
                    value: v.clone(),
                })
                .collect();
            schema.apply(intent, operations)
        }
        _ => schema.apply(
            intent,
            vec![PatchOp::Replace {
                path: String::new(),
                value: replacement.clone(),
            }],
        ),
    }
}

/// Used for every keyword without a registered plugin: drop the rejecting keyword, or replace a
/// `false` schema with the shape of the example.
fn unmatched_keyword(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let schema = node_patcher(patcher, &diff.schema_path)?;
    let mut patch = schema.fork();
    let keyword = diff.keyword.as_str();

    let keyword_present = patch.get(&pointer::compile(&[keyword])).is_some();
    let effect = if diff.kind == ShapeDiffKind::UnmatchedKeyword && keyword_present {
        patch.apply(
            format!("remove unmatched {keyword}"),
            vec![PatchOp::Remove {
                path: pointer::compile(&[keyword]),
            }],
        )?;
        format!("stop checking {keyword} for {}", subject(diff))
    } else {
        let inferred = crate::infer_schema(&diff.example, differ.version())?;
        let intent = format!("replace unmatched type of {}", subject(diff));
        replace_constraints(&mut patch, &inferred, &intent)?;
        format!("replace the type of {}", subject(diff))
    };

    tracing::warn!(
        keyword,
        schema_path = %diff.schema_path,
        "no plugin for keyword, using fallback"
    );
    Ok(vec![SchemaPatch {
        description: format!("unmatched {keyword} for {}", subject(diff)),
        impact: PatchImpact::Unknown,
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect,
        extends: true,
    }])
}
