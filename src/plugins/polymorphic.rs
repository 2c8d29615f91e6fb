use serde_json::Value;

use super::{allowed_keys_for, constraints_of, in_request, node_patcher, subject, SchemaPatch};
use crate::patcher::{JsonPatcher, PatchOp};
use crate::shape_diff::{SchemaDiffer, ShapeDiff, ShapeDiffKind};
use crate::{infer_schema, pointer, Error, PatchImpact};

pub(super) fn one_of(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    match diff.kind {
        ShapeDiffKind::UnmatchedPolymorphic => {
            Ok(vec![add_alternative("oneOf", diff, differ, patcher)?])
        }
        ShapeDiffKind::AmbiguousPolymorphic => Ok(vec![relax_to_any_of(diff, patcher)?]),
        _ => Ok(vec![]),
    }
}

pub(super) fn any_of(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    match diff.kind {
        ShapeDiffKind::UnmatchedPolymorphic => {
            Ok(vec![add_alternative("anyOf", diff, differ, patcher)?])
        }
        _ => Ok(vec![]),
    }
}

/// The value fails one of the `allOf` members on type, so no member can be widened on its own.
/// The whole intersection becomes one alternative of a new `oneOf`.
pub(super) fn all_of(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let schema = node_patcher(patcher, &diff.schema_path)?;
    let mut patch = schema.fork();
    let intersection = constraints_of(patch.document());
    let alternative = infer_schema(&diff.example, differ.version())?;

    patch.apply(
        format!("wrap allOf of {} in a oneOf", subject(diff)),
        vec![PatchOp::Add {
            path: "/oneOf".into(),
            value: Value::Array(vec![intersection, alternative]),
        }],
    )?;
    patch.remove_keys_not_allowed_at("", &allowed_keys_for("oneOf"), "after changing to a oneOf")?;

    Ok(vec![SchemaPatch {
        description: format!("make {} a oneOf of its allOf and a new type", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("expand one of for {}", subject(diff)),
        extends: true,
    }])
}

/// Append a schema for the example to the existing alternatives, keeping every one of them.
fn add_alternative(
    keyword: &'static str,
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<SchemaPatch, Error> {
    let schema = node_patcher(patcher, &diff.schema_path)?;
    let mut patch = schema.fork();

    patch.apply(
        format!("add new {keyword} type to {}", subject(diff)),
        vec![PatchOp::Add {
            path: pointer::compile(&[keyword, "-"]),
            value: infer_schema(&diff.example, differ.version())?,
        }],
    )?;
    let reason = format!("after changing to a {keyword}");
    patch.remove_keys_not_allowed_at("", &allowed_keys_for(keyword), &reason)?;

    Ok(SchemaPatch {
        description: format!("add new {keyword} alternative to {}", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("expand {keyword} for {}", subject(diff)),
        extends: true,
    })
}

fn relax_to_any_of(diff: &ShapeDiff, patcher: &JsonPatcher) -> Result<SchemaPatch, Error> {
    let schema = node_patcher(patcher, &diff.schema_path)?;
    let mut patch = schema.fork();
    let alternatives = patch
        .get("/oneOf")
        .cloned()
        .ok_or_else(|| Error::MissingPointer(pointer::append(&diff.schema_path, &["oneOf"])))?;

    patch.apply(
        format!("relax oneOf of {} to anyOf", subject(diff)),
        vec![
            PatchOp::Add {
                path: "/anyOf".into(),
                value: alternatives,
            },
            PatchOp::Remove {
                path: "/oneOf".into(),
            },
        ],
    )?;

    Ok(SchemaPatch {
        description: format!("change oneOf of {} to anyOf", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("{} may match several alternatives", subject(diff)),
        extends: true,
    })
}

#[cfg(test)]
mod tests {
    use crate::facts::ConceptualLocation;
    use crate::plugins::generate_shape_patches;
    use crate::{apply_to_copy, OasVersion, PatchImpact, SchemaDiffer};
    use serde_json::{json, Value};

    fn response() -> ConceptualLocation {
        ConceptualLocation::InResponse {
            method: "get".into(),
            path: "/pets".into(),
            status_code: "200".into(),
            content_type: Some("application/json".into()),
            header: None,
        }
    }

    fn request() -> ConceptualLocation {
        ConceptualLocation::InRequest {
            method: "post".into(),
            path: "/pets".into(),
            content_type: Some("application/json".into()),
            parameter: None,
        }
    }

    fn patches(
        schema: &Value,
        example: &Value,
        location: ConceptualLocation,
    ) -> Vec<crate::SchemaPatch> {
        let differ = SchemaDiffer::new(schema, OasVersion::V3_1).unwrap().at(location);
        let diff = differ.diff_by_example(example).next().unwrap();
        generate_shape_patches(&diff, &differ).unwrap()
    }

    #[test]
    fn one_of_keeps_existing_alternatives() {
        let schema = json!({"oneOf": [{"type": "string"}]});
        let generated = patches(&schema, &json!(42), response());
        assert_eq!(generated.len(), 1);
        let result = apply_to_copy(&schema, &generated[0].patch).unwrap();
        assert_eq!(
            result,
            json!({"oneOf": [{"type": "string"}, {"type": "number"}]})
        );
    }

    #[test]
    fn impact_depends_on_direction() {
        let schema = json!({"oneOf": [{"type": "string"}]});
        let in_response = patches(&schema, &json!(42), response());
        let in_request = patches(&schema, &json!(42), request());
        assert_eq!(in_response[0].patch, in_request[0].patch);
        assert_eq!(in_response[0].impact, PatchImpact::Incompatible);
        assert_eq!(in_request[0].impact, PatchImpact::Compatible);
    }

    #[test]
    fn nested_one_of_is_rebased() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"oneOf": [{"type": "string"}], "minLength": 1, "description": "id"}
            }
        });
        let generated = patches(&schema, &json!({"id": true}), request());
        assert_eq!(
            generated[0].patch,
            vec![
                crate::PatchOp::Add {
                    path: "/properties/id/oneOf/-".into(),
                    value: json!({"type": "boolean"})
                },
                crate::PatchOp::Remove {
                    path: "/properties/id/minLength".into()
                },
            ]
        );
    }

    #[test]
    fn any_of_gets_new_alternative() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "boolean"}]});
        let generated = patches(&schema, &json!([1]), request());
        let result = apply_to_copy(&schema, &generated[0].patch).unwrap();
        assert_eq!(result["anyOf"].as_array().unwrap().len(), 3);
        assert_eq!(result["anyOf"][2], json!({"type": "array", "items": {"type": "number"}}));
    }

    #[test]
    fn ambiguous_one_of_becomes_any_of() {
        let schema = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        let generated = patches(&schema, &json!(1), request());
        let result = apply_to_copy(&schema, &generated[0].patch).unwrap();
        assert_eq!(result, json!({"anyOf": [{"type": "number"}, {"type": "integer"}]}));
    }

    #[test]
    fn all_of_is_wrapped() {
        let schema = json!({"description": "pet", "allOf": [{"type": "object"}]});
        let generated = patches(&schema, &json!("rex"), response());
        let result = apply_to_copy(&schema, &generated[0].patch).unwrap();
        assert_eq!(
            result,
            json!({
                "description": "pet",
                "oneOf": [{"allOf": [{"type": "object"}]}, {"type": "string"}]
            })
        );
        assert_eq!(generated[0].impact, PatchImpact::Incompatible);
    }
}
