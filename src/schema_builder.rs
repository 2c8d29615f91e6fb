use schemars::schema::{
    ArrayValidation, InstanceType, ObjectValidation, Schema, SchemaObject, SingleOrVec,
    SubschemaValidation,
};
use serde_json::Value;

use crate::{Error, JsonSchemaType, OasVersion};

/// Build the smallest schema that accepts `example`.
///
/// Objects require every property they were seen with and all numbers are `number`. Array
/// items of the same kind are merged into one shape: objects keep every property seen and
/// require only those present in all of them. Shapes of different kinds become an `anyOf`.
pub fn infer_schema(example: &Value, version: OasVersion) -> Result<Value, Error> {
    Ok(serde_json::to_value(Schema::Object(infer(example, version)))?)
}

fn typed(ty: JsonSchemaType) -> SchemaObject {
    SchemaObject {
        instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::from(ty)))),
        ..Default::default()
    }
}

fn infer(example: &Value, version: OasVersion) -> SchemaObject {
    match example {
        Value::Null => match version {
            OasVersion::V3_0 => {
                let mut schema = SchemaObject::default();
                schema.extensions.insert("nullable".into(), Value::Bool(true));
                schema
            }
            OasVersion::V3_1 => typed(JsonSchemaType::Null),
        },
        Value::Bool(_) => typed(JsonSchemaType::Boolean),
        Value::Number(_) => typed(JsonSchemaType::Number),
        Value::String(_) => typed(JsonSchemaType::String),
        Value::Array(items) => array_of(
            (!items.is_empty()).then(|| union(items.iter().map(|item| infer(item, version)))),
        ),
        Value::Object(fields) => SchemaObject {
            object: Some(Box::new(ObjectValidation {
                properties: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Schema::Object(infer(v, version))))
                    .collect(),
                required: fields.keys().cloned().collect(),
                ..Default::default()
            })),
            ..typed(JsonSchemaType::Object)
        },
    }
}

/// An array schema, without `items` when nothing is known about them.
fn array_of(items: Option<SchemaObject>) -> SchemaObject {
    SchemaObject {
        array: Some(Box::new(ArrayValidation {
            items: items.map(|items| SingleOrVec::Single(Box::new(Schema::Object(items)))),
            ..Default::default()
        })),
        ..typed(JsonSchemaType::Array)
    }
}

/// One schema accepting everything any of `shapes` accepts.
fn union(shapes: impl IntoIterator<Item = SchemaObject>) -> SchemaObject {
    let mut merged: Vec<SchemaObject> = vec![];
    for shape in shapes.into_iter().flat_map(alternatives) {
        match merged.iter_mut().find(|existing| same_kind(existing, &shape)) {
            Some(existing) => {
                let current = std::mem::take(existing);
                *existing = merge(current, shape);
            }
            None => merged.push(shape),
        }
    }
    match merged.len() {
        0 => SchemaObject::default(),
        1 => merged.remove(0),
        _ => SchemaObject {
            subschemas: Some(Box::new(SubschemaValidation {
                any_of: Some(merged.into_iter().map(Schema::Object).collect()),
                ..Default::default()
            })),
            ..Default::default()
        },
    }
}

/// The members of an `anyOf` built by [`union`], or the schema itself.
fn alternatives(schema: SchemaObject) -> Vec<SchemaObject> {
    let any_of = match (&schema.instance_type, &schema.subschemas) {
        (None, Some(subschemas)) => subschemas.any_of.clone(),
        _ => None,
    };
    match any_of {
        Some(members) => members.into_iter().map(schema_object).collect(),
        None => vec![schema],
    }
}

fn same_kind(a: &SchemaObject, b: &SchemaObject) -> bool {
    a == b || (a.instance_type.is_some() && a.instance_type == b.instance_type)
}

/// Merge two shapes of the same kind.
fn merge(a: SchemaObject, b: SchemaObject) -> SchemaObject {
    if a == b {
        return a;
    }
    let is = |ty: InstanceType| a.instance_type == Some(SingleOrVec::Single(Box::new(ty)));
    if is(InstanceType::Object) {
        merge_objects(a, b)
    } else if is(InstanceType::Array) {
        let items: Vec<SchemaObject> = [a, b].into_iter().filter_map(items_of).collect();
        array_of((!items.is_empty()).then(|| union(items)))
    } else {
        a
    }
}

fn merge_objects(mut a: SchemaObject, b: SchemaObject) -> SchemaObject {
    let mut object = a.object.take().unwrap_or_default();
    let other = b.object.unwrap_or_default();

    object.required = object
        .required
        .intersection(&other.required)
        .cloned()
        .collect();
    for (name, schema) in other.properties {
        let merged = match object.properties.remove(&name) {
            Some(existing) => union([schema_object(existing), schema_object(schema)]),
            None => schema_object(schema),
        };
        object.properties.insert(name, Schema::Object(merged));
    }
    a.object = Some(object);
    a
}

fn items_of(schema: SchemaObject) -> Option<SchemaObject> {
    match schema.array?.items? {
        SingleOrVec::Single(item) => Some(schema_object(*item)),
        SingleOrVec::Vec(_) => None,
    }
}

fn schema_object(schema: Schema) -> SchemaObject {
    match schema {
        Schema::Object(object) => object,
        Schema::Bool(_) => SchemaObject::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaDiffer;
    use serde_json::json;

    #[test]
    fn primitives() {
        assert_eq!(
            infer_schema(&json!(42), OasVersion::V3_1).unwrap(),
            json!({"type": "number"})
        );
        assert_eq!(
            infer_schema(&json!(null), OasVersion::V3_0).unwrap(),
            json!({"nullable": true})
        );
        assert_eq!(
            infer_schema(&json!(null), OasVersion::V3_1).unwrap(),
            json!({"type": "null"})
        );
    }

    #[test]
    fn objects_require_observed_properties() {
        let schema = infer_schema(&json!({"name": "me", "age": 3}), OasVersion::V3_1).unwrap();
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "age": {"type": "number"}},
                "required": ["age", "name"]
            })
        );
    }

    #[test]
    fn arrays_collect_distinct_item_shapes() {
        let schema = infer_schema(&json!(["a", "b", 1]), OasVersion::V3_1).unwrap();
        assert_eq!(
            schema,
            json!({
                "type": "array",
                "items": {"anyOf": [{"type": "string"}, {"type": "number"}]}
            })
        );
        let schema = infer_schema(&json!([]), OasVersion::V3_1).unwrap();
        assert_eq!(schema, json!({"type": "array"}));
    }

    #[test]
    fn array_objects_are_merged() {
        let example = json!([
            {"a": 1, "tags": []},
            {"a": "one", "b": 2, "tags": ["x"]}
        ]);
        let schema = infer_schema(&example, OasVersion::V3_1).unwrap();
        assert_eq!(
            schema["items"],
            json!({
                "type": "object",
                "properties": {
                    "a": {"anyOf": [{"type": "number"}, {"type": "string"}]},
                    "b": {"type": "number"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["a", "tags"]
            })
        );
    }

    #[test]
    fn inferred_schemas_accept_their_example() {
        let examples = [
            json!([{"a": 1}, {"a": 1, "b": 2}]),
            json!([[1], ["a", null], []]),
            json!({"pets": [{"name": "rex"}, {"name": "tom", "age": 3}, null]}),
        ];
        for version in [OasVersion::V3_0, OasVersion::V3_1] {
            for example in &examples {
                let schema = infer_schema(example, version).unwrap();
                let differ = SchemaDiffer::new(&schema, version).unwrap();
                let diffs: Vec<_> = differ.diff_by_example(example).collect();
                assert!(diffs.is_empty(), "{example} against {schema}: {diffs:?}");
            }
        }
    }
}
