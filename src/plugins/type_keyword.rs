use serde_json::Value;

use super::{
    allowed_keys_for, constraints_of, in_request, node_patcher, replace_constraints, subject,
    SchemaPatch,
};
use crate::patcher::{JsonPatcher, PatchOp};
use crate::shape_diff::{SchemaDiffer, ShapeDiff, ShapeDiffKind, TypeMismatch};
use crate::{infer_schema, Error, JsonSchemaType, OasVersion, PatchImpact};

pub(super) fn shape_patches(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let ShapeDiffKind::UnmatchedType { mismatch, .. } = &diff.kind else {
        return Ok(vec![]);
    };
    let schema = node_patcher(patcher, &diff.schema_path)?;

    match mismatch {
        TypeMismatch::Null => Ok(vec![make_nullable(diff, differ, &schema)?]),
        TypeMismatch::NumberForInteger => Ok(vec![widen_to_number(diff, &schema)?]),
        _ => Ok(vec![
            expand_to_one_of(diff, differ, &schema)?,
            replace_type(diff, differ, &schema)?,
        ]),
    }
}

fn make_nullable(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    schema: &JsonPatcher,
) -> Result<SchemaPatch, Error> {
    let mut patch = schema.fork();
    let mut operations = match (differ.version(), patch.get("/type")) {
        (OasVersion::V3_0, _) => vec![PatchOp::Add {
            path: "/nullable".into(),
            value: Value::Bool(true),
        }],
        (OasVersion::V3_1, Some(Value::String(ty))) => vec![PatchOp::Replace {
            path: "/type".into(),
            value: serde_json::json!([ty, "null"]),
        }],
        (OasVersion::V3_1, _) => vec![PatchOp::Add {
            path: "/type/-".into(),
            value: Value::from("null"),
        }],
    };
    if let Some(Value::Array(options)) = patch.get("/enum") {
        if !options.contains(&Value::Null) {
            operations.push(PatchOp::Add {
                path: "/enum/-".into(),
                value: Value::Null,
            });
        }
    }
    patch.apply(format!("make {} nullable", subject(diff)), operations)?;

    Ok(SchemaPatch {
        description: format!("make {} nullable", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("{} can be null", subject(diff)),
        extends: true,
    })
}

fn widen_to_number(diff: &ShapeDiff, schema: &JsonPatcher) -> Result<SchemaPatch, Error> {
    let integer = JsonSchemaType::Integer.as_keyword();
    let number = JsonSchemaType::Number.as_keyword();
    let mut patch = schema.fork();
    let path = match patch.get("/type") {
        Some(Value::Array(types)) => types
            .iter()
            .position(|t| t == integer)
            .map_or_else(|| "/type/-".to_owned(), |i| format!("/type/{i}")),
        _ => "/type".to_owned(),
    };
    let op = if path.ends_with('-') {
        PatchOp::Add {
            path,
            value: Value::from(number),
        }
    } else {
        PatchOp::Replace {
            path,
            value: Value::from(number),
        }
    };
    patch.apply(format!("change type of {} to {number}", subject(diff)), vec![op])?;

    Ok(SchemaPatch {
        description: format!("change type of {} from {integer} to {number}", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("{} can have a fraction", subject(diff)),
        extends: true,
    })
}

fn expand_to_one_of(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    schema: &JsonPatcher,
) -> Result<SchemaPatch, Error> {
    let mut patch = schema.fork();
    let existing = constraints_of(patch.document());
    let alternative = infer_schema(&diff.example, differ.version())?;

    patch.apply(
        format!("replace type of {} with a oneOf", subject(diff)),
        vec![PatchOp::Add {
            path: "/oneOf".into(),
            value: Value::Array(vec![existing, alternative]),
        }],
    )?;
    patch.remove_keys_not_allowed_at("", &allowed_keys_for("oneOf"), "after changing to a oneOf")?;

    Ok(SchemaPatch {
        description: format!("make {} a oneOf", subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("expand one of for {}", subject(diff)),
        extends: true,
    })
}

fn replace_type(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    schema: &JsonPatcher,
) -> Result<SchemaPatch, Error> {
    let mut patch = schema.fork();
    let inferred = infer_schema(&diff.example, differ.version())?;
    replace_constraints(&mut patch, &inferred, &format!("change type of {}", subject(diff)))?;

    Ok(SchemaPatch {
        description: format!("change type of {}", subject(diff)),
        impact: PatchImpact::Incompatible,
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("{} only accepts the new type", subject(diff)),
        extends: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply_to_copy;
    use crate::plugins::generate_shape_patches;
    use serde_json::json;

    fn patched(schema: Value, example: Value, version: OasVersion) -> Value {
        let differ = SchemaDiffer::new(&schema, version).unwrap();
        let diff = differ
            .diff_by_example(&example)
            .find(|d| d.keyword == crate::JsonSchemaKeyword::Type)
            .unwrap();
        let patches = generate_shape_patches(&diff, &differ).unwrap();
        apply_to_copy(&schema, &patches[0].patch).unwrap()
    }

    #[test]
    fn null_in_3_0_adds_nullable() {
        let schema = json!({"type": "string"});
        assert_eq!(
            patched(schema, json!(null), OasVersion::V3_0),
            json!({"type": "string", "nullable": true})
        );
    }

    #[test]
    fn null_in_3_1_widens_type() {
        let schema = json!({"type": "string", "enum": ["a"]});
        assert_eq!(
            patched(schema, json!(null), OasVersion::V3_1),
            json!({"type": ["string", "null"], "enum": ["a", null]})
        );
    }

    #[test]
    fn fraction_widens_integer() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        assert_eq!(
            patched(schema, json!({"n": 1.5}), OasVersion::V3_1),
            json!({"type": "object", "properties": {"n": {"type": "number"}}})
        );
    }

    #[test]
    fn expanded_schema_accepts_both_shapes() {
        let schema = json!({"type": "string"});
        let result = patched(schema, json!({"a": true}), OasVersion::V3_1);
        let differ = SchemaDiffer::new(&result, OasVersion::V3_1).unwrap();
        assert_eq!(differ.diff_by_example(&json!("s")).count(), 0);
        assert_eq!(differ.diff_by_example(&json!({"a": false})).count(), 0);
    }
}
