use serde_json::{Map, Value};

use super::{in_request, node_patcher, subject, SchemaPatch};
use crate::patcher::{JsonPatcher, PatchOp};
use crate::shape_diff::{SchemaDiffer, ShapeDiff, ShapeDiffKind};
use crate::{infer_schema, pointer, Error, PatchImpact};

pub(super) fn required(
    diff: &ShapeDiff,
    _: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let ShapeDiffKind::MissingRequired { property } = &diff.kind else {
        return Ok(vec![]);
    };
    let mut patch = node_patcher(patcher, &diff.schema_path)?;
    let required = match patch.get("/required") {
        Some(Value::Array(required)) => required.clone(),
        _ => return Ok(vec![]),
    };
    let Some(index) = required.iter().position(|name| name == property.as_str()) else {
        return Ok(vec![]);
    };

    let path = if required.len() == 1 {
        "/required".to_owned()
    } else {
        format!("/required/{index}")
    };
    patch.apply(
        format!("make '{property}' optional"),
        vec![PatchOp::Remove { path }],
    )?;

    Ok(vec![SchemaPatch {
        description: format!("make field '{property}' optional"),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("'{property}' may be omitted"),
        extends: true,
    }])
}

pub(super) fn additional_properties(
    diff: &ShapeDiff,
    differ: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let ShapeDiffKind::UnexpectedProperty { property } = &diff.kind else {
        return Ok(vec![]);
    };
    let mut patch = node_patcher(patcher, &diff.schema_path)?;

    let mut operations = vec![];
    if !matches!(patch.get("/properties"), Some(Value::Object(_))) {
        operations.push(PatchOp::Add {
            path: "/properties".into(),
            value: Value::Object(Map::new()),
        });
    }
    operations.push(PatchOp::Add {
        path: pointer::compile(&["properties", property]),
        value: infer_schema(&diff.example, differ.version())?,
    });
    patch.apply(format!("add property '{property}'"), operations)?;

    Ok(vec![SchemaPatch {
        description: format!("add property '{property}'"),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("'{property}' is documented"),
        extends: true,
    }])
}

pub(super) fn enumeration(
    diff: &ShapeDiff,
    _: &SchemaDiffer,
    patcher: &JsonPatcher,
) -> Result<Vec<SchemaPatch>, Error> {
    let mut patch = node_patcher(patcher, &diff.schema_path)?;
    if !matches!(patch.get("/enum"), Some(Value::Array(_))) {
        return Ok(vec![]);
    }
    patch.apply(
        format!("add option to enum of {}", subject(diff)),
        vec![PatchOp::Add {
            path: "/enum/-".into(),
            value: diff.example.clone(),
        }],
    )?;

    Ok(vec![SchemaPatch {
        description: format!("add {} to enum of {}", diff.example, subject(diff)),
        impact: PatchImpact::for_loosening(in_request(diff)),
        patch: patch.current_patches_relative_to(&diff.schema_path),
        effect: format!("{} accepts one more value", subject(diff)),
        extends: true,
    }])
}
