use serde::Serialize;
use serde_json::Value;

use crate::facts::{ConceptualLocation, Fact, FactKind};
use crate::patcher::{apply_to_copy, PatchOp};
use crate::plugins::{PluginRegistry, SchemaPatch};
use crate::shape_diff::SchemaDiffer;
use crate::traverser::OpenApiTraverser;
use crate::{infer_schema, pointer, Error, OasVersion, PatchImpact};

/// A patch addressed from the root of an OpenAPI document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecPatch {
    /// What the patch does, prefixed with the part of the document it changes.
    pub description: String,
    /// How the patch affects consumers.
    pub impact: PatchImpact,
    /// The operations, addressed from the root of the document.
    pub patch: Vec<PatchOp>,
}

impl SpecPatch {
    /// Place a patch generated for the schema at `schema_pointer` into the whole document.
    pub fn from_shape_patch(
        shape_patch: &SchemaPatch,
        schema_pointer: &str,
        location: &ConceptualLocation,
    ) -> Self {
        Self {
            description: format!("{}: {}", describe(location), shape_patch.description),
            impact: shape_patch.impact,
            patch: shape_patch
                .patch
                .iter()
                .map(|op| op.rebased(schema_pointer))
                .collect(),
        }
    }

    /// Apply the patch to a copy of `document`.
    pub fn apply(&self, document: &Value) -> Result<Value, Error> {
        apply_to_copy(document, &self.patch)
    }
}

fn describe(location: &ConceptualLocation) -> &'static str {
    match location {
        ConceptualLocation::InRequest { .. } => "update request body",
        ConceptualLocation::InResponse { .. } => "update response body",
        ConceptualLocation::InComponentSchema { .. } => "update component schema",
        _ => "update schema",
    }
}

/// An example in a document, and the schema it is supposed to match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentedBody {
    /// The example value.
    pub example: Value,
    /// Pointer to the example.
    pub example_pointer: String,
    /// The schema, or `None` when the body has no schema yet.
    pub schema: Option<Value>,
    /// Pointer to where the schema is, or would be.
    pub schema_pointer: String,
    /// Where in the API the body is.
    pub location: ConceptualLocation,
}

/// Pair every body example and component schema example in `facts` with its schema in `spec`.
pub fn documented_bodies(facts: &[Fact], spec: &Value) -> Vec<DocumentedBody> {
    facts
        .iter()
        .filter_map(|fact| {
            let json_path = &fact.location.json_path;
            let schema_pointer = match fact.kind {
                // `.../example` or `.../examples/<name>/value`
                FactKind::BodyExample if pointer::last(json_path).as_deref() == Some("value") => {
                    pointer::append(&pointer::parent(json_path, 3), &["schema"])
                }
                FactKind::BodyExample => {
                    pointer::append(&pointer::parent(json_path, 1), &["schema"])
                }
                FactKind::ComponentSchemaExample => pointer::parent(json_path, 1),
                _ => return None,
            };
            Some(DocumentedBody {
                example: fact.value.get("value").cloned().unwrap_or(Value::Null),
                example_pointer: json_path.clone(),
                schema: spec.pointer(&schema_pointer).cloned(),
                schema_pointer,
                location: fact.location.conceptual_location.clone(),
            })
        })
        .collect()
}

/// Knobs for [`update_by_example`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Give up on an example after this many patches.
    pub max_patches_per_example: usize,
    /// Only apply patches that are [`PatchImpact::is_safe`].
    pub safe_only: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            max_patches_per_example: 50,
            safe_only: false,
        }
    }
}

impl UpdateOptions {
    fn admits(&self, impact: PatchImpact) -> bool {
        !self.safe_only || impact.is_safe()
    }
}

/// Counters for one [`update_by_example`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStats {
    /// Examples that were checked.
    pub examples: usize,
    /// Examples whose schema was patched at least once.
    pub patched_examples: usize,
    /// Examples that still do not match their schema.
    pub unmatched_examples: usize,
    /// Patches applied in total.
    pub patches: usize,
}

/// The outcome of [`update_by_example`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateResult {
    /// The patched document.
    pub spec: Value,
    /// Every applied patch, in order.
    pub patches: Vec<SpecPatch>,
    /// What happened.
    pub stats: UpdateStats,
}

/// Patch every schema of `spec` until it accepts its examples.
///
/// `spec` must be dereferenced, e.g. by [`crate::parse_openapi_with_sourcemap`]. The input is not
/// modified.
pub fn update_by_example(spec: &Value, options: &UpdateOptions) -> Result<UpdateResult, Error> {
    update_by_example_with(spec, options, &PluginRegistry::default())
}

/// [`update_by_example`] with custom plugins.
pub fn update_by_example_with(
    spec: &Value,
    options: &UpdateOptions,
    registry: &PluginRegistry,
) -> Result<UpdateResult, Error> {
    let version = OasVersion::of_document(spec)?;
    let facts = OpenApiTraverser::traverse(spec)?;

    let mut document = spec.clone();
    let mut patches = vec![];
    let mut stats = UpdateStats::default();

    for body in documented_bodies(&facts, spec) {
        stats.examples += 1;
        let before = patches.len();

        let matched = if document.pointer(&body.schema_pointer).is_none() {
            let patch = document_new_body(&body, version)?;
            document = patch.apply(&document)?;
            patches.push(patch);
            true
        } else {
            patch_until_matched(&mut document, &body, version, options, registry, &mut patches)?
        };

        if patches.len() > before {
            stats.patched_examples += 1;
        }
        if !matched {
            stats.unmatched_examples += 1;
        }
    }
    stats.patches = patches.len();
    tracing::debug!(?stats, "updated schemas by example");

    Ok(UpdateResult {
        spec: document,
        patches,
        stats,
    })
}

fn document_new_body(body: &DocumentedBody, version: OasVersion) -> Result<SpecPatch, Error> {
    Ok(SpecPatch {
        description: format!("{}: add schema for example", describe(&body.location)),
        impact: PatchImpact::Addition,
        patch: vec![PatchOp::Add {
            path: body.schema_pointer.clone(),
            value: infer_schema(&body.example, version)?,
        }],
    })
}

/// Returns whether the schema accepts the example in the end.
fn patch_until_matched(
    document: &mut Value,
    body: &DocumentedBody,
    version: OasVersion,
    options: &UpdateOptions,
    registry: &PluginRegistry,
    patches: &mut Vec<SpecPatch>,
) -> Result<bool, Error> {
    for _ in 0..options.max_patches_per_example {
        let Some(schema) = document.pointer(&body.schema_pointer) else {
            return Ok(false);
        };
        let differ = match SchemaDiffer::closed(schema, version) {
            Ok(differ) => differ.at(body.location.clone()),
            Err(e) => {
                tracing::warn!(schema = %body.schema_pointer, error = %e, "skipping schema");
                return Ok(false);
            }
        };
        let Some(diff) = differ.diff_by_example(&body.example).next() else {
            return Ok(true);
        };

        let Some(chosen) = registry
            .shape_patches(&diff, &differ)?
            .into_iter()
            .find(|patch| options.admits(patch.impact))
        else {
            tracing::debug!(example = %body.example_pointer, "no admissible patch");
            return Ok(false);
        };
        let patch = SpecPatch::from_shape_patch(&chosen, &body.schema_pointer, &body.location);
        *document = patch.apply(document)?;
        patches.push(patch);
    }

    tracing::warn!(
        example = %body.example_pointer,
        limit = options.max_patches_per_example,
        "gave up patching schema"
    );
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> Value {
        let body = |example: Value| {
            json!({
                "content": {
                    "application/json": {
                        "schema": {"type": "object", "properties": {"name": {"type": "string"}}},
                        "example": example
                    }
                }
            })
        };
        json!({
            "openapi": "3.1.0",
            "info": {"title": "users", "version": "1"},
            "paths": {
                "/users": {
                    "post": {
                        "requestBody": body(json!({"name": 3})),
                        "responses": {
                            "201": body(json!({"name": false})),
                            "204": {
                                "description": "nothing",
                                "content": {"text/plain": {"example": "done"}}
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn bodies_are_paired_with_schemas() {
        let spec = spec();
        let facts = OpenApiTraverser::traverse(&spec).unwrap();
        let bodies = documented_bodies(&facts, &spec);
        assert_eq!(bodies.len(), 3);
        assert_eq!(
            bodies[0].schema_pointer,
            "/paths/~1users/post/requestBody/content/application~1json/schema"
        );
        assert_eq!(bodies[0].example, json!({"name": 3}));
        assert!(bodies[0].location.in_request());
        assert!(bodies[2].schema.is_none());
    }

    #[test]
    fn shape_patches_are_placed_in_the_document() {
        let shape_patch = SchemaPatch {
            description: "make 'name' a oneOf".into(),
            impact: PatchImpact::Compatible,
            patch: vec![PatchOp::Remove {
                path: "/properties/name/type".into(),
            }],
            effect: String::new(),
            extends: true,
        };
        let location = ConceptualLocation::InComponentSchema {
            schema_name: "User".into(),
        };
        let patch =
            SpecPatch::from_shape_patch(&shape_patch, "/components/schemas/User", &location);
        assert_eq!(patch.description, "update component schema: make 'name' a oneOf");
        assert_eq!(patch.patch[0].path(), "/components/schemas/User/properties/name/type");
    }

    #[test]
    fn every_example_ends_up_documented() {
        let spec = spec();
        let result = update_by_example(&spec, &UpdateOptions::default()).unwrap();
        assert_eq!(
            result.stats,
            UpdateStats {
                examples: 3,
                patched_examples: 3,
                unmatched_examples: 0,
                patches: 3
            }
        );
        assert_eq!(
            result.patches.iter().map(|p| p.impact).collect::<Vec<_>>(),
            vec![
                PatchImpact::Compatible,
                PatchImpact::Incompatible,
                PatchImpact::Addition
            ]
        );
        assert!(result.patches[0].description.starts_with("update request body"));
        let no_content = &result.spec["paths"]["/users"]["post"]["responses"]["204"];
        assert_eq!(
            no_content["content"]["text/plain"]["schema"],
            json!({"type": "string"})
        );
        assert_ne!(result.spec, spec);

        let again = update_by_example(&result.spec, &UpdateOptions::default()).unwrap();
        assert!(again.patches.is_empty());
    }

    #[test]
    fn undocumented_properties_are_added() {
        let spec = json!({
            "openapi": "3.0.1",
            "info": {"title": "users", "version": "1"},
            "paths": {
                "/user": {
                    "get": {
                        "responses": {
                            "200": {
                                "description": "the user",
                                "content": {
                                    "application/json": {
                                        "schema": {"type": "object", "properties": {}},
                                        "example": {"name": "me"}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
        let result = update_by_example(&spec, &UpdateOptions::default()).unwrap();
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].impact, PatchImpact::Incompatible);
        let schema_path = "/paths/~1user/get/responses/200/content/application~1json/schema";
        assert_eq!(
            result.patches[0].patch,
            vec![PatchOp::Add {
                path: format!("{schema_path}/properties/name"),
                value: json!({"type": "string"}),
            }]
        );
        assert_eq!(
            result.spec.pointer(schema_path),
            Some(&json!({"type": "object", "properties": {"name": {"type": "string"}}}))
        );
    }

    #[test]
    fn safe_only_leaves_responses_alone() {
        let options = UpdateOptions {
            safe_only: true,
            ..Default::default()
        };
        let result = update_by_example(&spec(), &options).unwrap();
        assert_eq!(result.stats.unmatched_examples, 1);
        assert!(result.patches.iter().all(|p| p.impact.is_safe()));
        assert_eq!(
            result.spec["paths"]["/users"]["post"]["responses"]["201"],
            spec()["paths"]["/users"]["post"]["responses"]["201"]
        );
    }
}
