use jsonschema::error::{ValidationError, ValidationErrorKind};
use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::Value;

use crate::facts::ConceptualLocation;
use crate::{pointer, Error, JsonSchemaType, OasVersion};

/// The JSON schema keywords patches can be generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum JsonSchemaKeyword {
    Type,
    OneOf,
    AnyOf,
    AllOf,
    Required,
    AdditionalProperties,
    Enum,
    /// Any keyword without dedicated handling, e.g. `maxLength` or `format`.
    Other(String),
}

impl JsonSchemaKeyword {
    /// The keyword as spelled in a schema.
    pub fn as_str(&self) -> &str {
        match self {
            JsonSchemaKeyword::Type => "type",
            JsonSchemaKeyword::OneOf => "oneOf",
            JsonSchemaKeyword::AnyOf => "anyOf",
            JsonSchemaKeyword::AllOf => "allOf",
            JsonSchemaKeyword::Required => "required",
            JsonSchemaKeyword::AdditionalProperties => "additionalProperties",
            JsonSchemaKeyword::Enum => "enum",
            JsonSchemaKeyword::Other(keyword) => keyword,
        }
    }
}

/// How an observed value differs from the type(s) a schema expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeMismatch {
    /// A number with a fraction where an `integer` is expected.
    NumberForInteger,
    /// `null` where the schema does not allow it.
    Null,
    /// An array where something else is expected.
    Array,
    /// An object where something else is expected.
    Object,
    /// Any other primitive of the wrong type.
    Primitive(JsonSchemaType),
}

impl TypeMismatch {
    fn classify(expected: &[JsonSchemaType], observed: &Value) -> Self {
        match JsonSchemaType::of_value(observed) {
            JsonSchemaType::Number if expected.contains(&JsonSchemaType::Integer) => {
                TypeMismatch::NumberForInteger
            }
            JsonSchemaType::Null => TypeMismatch::Null,
            JsonSchemaType::Array => TypeMismatch::Array,
            JsonSchemaType::Object => TypeMismatch::Object,
            other => TypeMismatch::Primitive(other),
        }
    }
}

/// The kind of mismatch + data relevant to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeDiffKind {
    /// A present value has a type the schema does not allow.
    UnmatchedType {
        /// The types declared by the schema node.
        expected: Vec<JsonSchemaType>,
        /// What was found instead.
        mismatch: TypeMismatch,
    },
    /// A required property is absent.
    MissingRequired {
        /// The absent property.
        property: String,
    },
    /// A property is present that `additionalProperties: false` forbids.
    UnexpectedProperty {
        /// The unexpected property.
        property: String,
    },
    /// No alternative of a `oneOf`/`anyOf` accepts the value.
    UnmatchedPolymorphic,
    /// More than one alternative of a `oneOf` accepts the value.
    AmbiguousPolymorphic,
    /// The value is not one of the `enum` options.
    UnmatchedEnum,
    /// Any other keyword rejected the value.
    UnmatchedKeyword,
}

/// A single place where an example does not match a schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeDiff {
    /// What does not match.
    pub kind: ShapeDiffKind,
    /// The keyword that rejected the value.
    pub keyword: JsonSchemaKeyword,
    /// Pointer to the schema node that rejected the value.
    pub schema_path: String,
    /// Pointer to the rejecting keyword itself, as reported by the validator.
    pub keyword_path: String,
    /// Pointer into the example to the offending value.
    pub property_path: String,
    /// The property name the diff is about, or `""` at the root.
    pub key: String,
    /// The offending value.
    pub example: Value,
    /// Whether the schema is in a request, a response or a component.
    pub location: Option<ConceptualLocation>,
}

/// Compares example values against one schema.
pub struct SchemaDiffer {
    schema: Value,
    version: OasVersion,
    location: Option<ConceptualLocation>,
    validator: Validator,
}

impl SchemaDiffer {
    /// Prepare `schema` for diffing. Fails if the schema cannot be compiled.
    pub fn new(schema: &Value, version: OasVersion) -> Result<Self, Error> {
        Self::compile(schema, version, false)
    }

    /// Like [`SchemaDiffer::new`], but a schema with `properties` rejects any property it
    /// does not list as [`ShapeDiffKind::UnexpectedProperty`], unless it sets
    /// `additionalProperties` itself. Free-form objects without `properties` stay open.
    ///
    /// Schemas combined with `allOf`, `oneOf` or `anyOf` stay open, since each of them may
    /// list only part of the properties.
    pub fn closed(schema: &Value, version: OasVersion) -> Result<Self, Error> {
        Self::compile(schema, version, true)
    }

    fn compile(schema: &Value, version: OasVersion, closed: bool) -> Result<Self, Error> {
        let draft = match version {
            OasVersion::V3_0 => Draft::Draft4,
            OasVersion::V3_1 => Draft::Draft202012,
        };
        let mut validation_schema = schema.clone();
        if version == OasVersion::V3_0 {
            nullable_to_type(&mut validation_schema);
        }
        if closed {
            close_objects(&mut validation_schema, true);
        }
        let validator = jsonschema::options()
            .with_draft(draft)
            .should_validate_formats(false)
            .build(&validation_schema)
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;

        Ok(Self {
            schema: schema.clone(),
            version,
            location: None,
            validator,
        })
    }

    /// Attach the conceptual location of the schema to every diff.
    pub fn at(mut self, location: ConceptualLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// The schema diffs are computed against.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// The OpenAPI version the schema belongs to.
    pub fn version(&self) -> OasVersion {
        self.version
    }

    /// The location given to [`SchemaDiffer::at`].
    pub fn location(&self) -> Option<&ConceptualLocation> {
        self.location.as_ref()
    }

    /// Lazily list every mismatch between `example` and the schema.
    ///
    /// An absent optional property is never a mismatch.
    pub fn diff_by_example<'a>(
        &'a self,
        example: &'a Value,
    ) -> impl Iterator<Item = ShapeDiff> + 'a {
        self.validator
            .iter_errors(example)
            .flat_map(move |error| self.emit(error))
    }

    fn emit(&self, error: ValidationError<'_>) -> Vec<ShapeDiff> {
        let keyword_path = error.schema_path.to_string();
        let property_path = error.instance_path.to_string();
        let instance = error.instance.into_owned();
        let keyword = pointer::last(&keyword_path).unwrap_or_default();
        let emitted = Emitted {
            keyword_path,
            property_path,
            instance,
        };

        tracing::trace!(
            keyword = %keyword,
            schema_path = %emitted.keyword_path,
            instance_path = %emitted.property_path,
            "validation error"
        );

        match (keyword.as_str(), error.kind) {
            ("type", _) => vec![self.emit_type(emitted)],
            ("required", ValidationErrorKind::Required { property }) => {
                vec![self.emit_required(emitted, property)]
            }
            ("additionalProperties", ValidationErrorKind::AdditionalProperties { unexpected }) => {
                unexpected
                    .into_iter()
                    .map(|property| self.emit_unexpected_property(&emitted, property))
                    .collect()
            }
            ("oneOf", ValidationErrorKind::OneOfMultipleValid { .. }) => vec![self.emit_node(
                emitted,
                JsonSchemaKeyword::OneOf,
                ShapeDiffKind::AmbiguousPolymorphic,
            )],
            ("oneOf", _) => vec![self.emit_node(
                emitted,
                JsonSchemaKeyword::OneOf,
                ShapeDiffKind::UnmatchedPolymorphic,
            )],
            ("anyOf", _) => vec![self.emit_node(
                emitted,
                JsonSchemaKeyword::AnyOf,
                ShapeDiffKind::UnmatchedPolymorphic,
            )],
            ("enum", _) => vec![self.emit_node(
                emitted,
                JsonSchemaKeyword::Enum,
                ShapeDiffKind::UnmatchedEnum,
            )],
            (_, ValidationErrorKind::FalseSchema { .. }) => {
                // The rejecting node is the `false` schema itself, not a keyword of it.
                let schema_path = emitted.keyword_path.clone();
                vec![self.diff(
                    emitted,
                    schema_path,
                    JsonSchemaKeyword::Other("false".into()),
                    ShapeDiffKind::UnmatchedKeyword,
                )]
            }
            (other, _) => {
                let keyword = JsonSchemaKeyword::Other(other.to_owned());
                vec![self.emit_node(emitted, keyword, ShapeDiffKind::UnmatchedKeyword)]
            }
        }
    }

    fn emit_type(&self, emitted: Emitted) -> ShapeDiff {
        let segments = pointer::decode(&emitted.keyword_path).unwrap_or_default();
        // `.../allOf/<i>/type`: the value cannot satisfy the intersection as a whole.
        let in_all_of = segments.len() >= 3 && segments[segments.len() - 3] == "allOf";
        let node_path = pointer::parent(&emitted.keyword_path, 1);
        let expected = self
            .node(&node_path)
            .map(JsonSchemaType::declared_by)
            .unwrap_or_default();
        let kind = ShapeDiffKind::UnmatchedType {
            mismatch: TypeMismatch::classify(&expected, &emitted.instance),
            expected,
        };
        if in_all_of {
            let schema_path = pointer::parent(&emitted.keyword_path, 3);
            self.diff(emitted, schema_path, JsonSchemaKeyword::AllOf, kind)
        } else {
            self.diff(emitted, node_path, JsonSchemaKeyword::Type, kind)
        }
    }

    fn emit_required(&self, emitted: Emitted, property: Value) -> ShapeDiff {
        let property = match property {
            Value::String(name) => name,
            other => other.to_string(),
        };
        let schema_path = pointer::parent(&emitted.keyword_path, 1);
        let mut diff = self.diff(
            emitted,
            schema_path,
            JsonSchemaKeyword::Required,
            ShapeDiffKind::MissingRequired {
                property: property.clone(),
            },
        );
        diff.key = property;
        diff
    }

    fn emit_unexpected_property(&self, emitted: &Emitted, property: String) -> ShapeDiff {
        let example = emitted.instance.get(&property).cloned().unwrap_or(Value::Null);
        ShapeDiff {
            kind: ShapeDiffKind::UnexpectedProperty {
                property: property.clone(),
            },
            keyword: JsonSchemaKeyword::AdditionalProperties,
            schema_path: pointer::parent(&emitted.keyword_path, 1),
            keyword_path: emitted.keyword_path.clone(),
            property_path: pointer::append(&emitted.property_path, &[&property]),
            key: property,
            example,
            location: self.location.clone(),
        }
    }

    fn emit_node(
        &self,
        emitted: Emitted,
        keyword: JsonSchemaKeyword,
        kind: ShapeDiffKind,
    ) -> ShapeDiff {
        let schema_path = pointer::parent(&emitted.keyword_path, 1);
        self.diff(emitted, schema_path, keyword, kind)
    }

    fn diff(
        &self,
        emitted: Emitted,
        schema_path: String,
        keyword: JsonSchemaKeyword,
        kind: ShapeDiffKind,
    ) -> ShapeDiff {
        ShapeDiff {
            kind,
            keyword,
            schema_path,
            key: pointer::last(&emitted.property_path).unwrap_or_default(),
            keyword_path: emitted.keyword_path,
            property_path: emitted.property_path,
            example: emitted.instance,
            location: self.location.clone(),
        }
    }

    fn node(&self, path: &str) -> Option<&Value> {
        match path {
            "" | "/" => Some(&self.schema),
            _ => self.schema.pointer(path),
        }
    }
}

/// What every emitter starts from.
struct Emitted {
    keyword_path: String,
    property_path: String,
    instance: Value,
}

/// Rewrite OpenAPI 3.0 `nullable: true` into a JSON schema type that accepts `null`.
///
/// Only `type` and `enum` values change, so pointers into the schema stay valid.
fn nullable_to_type(schema: &mut Value) {
    match schema {
        Value::Object(fields) => {
            if fields.get("nullable") == Some(&Value::Bool(true)) {
                match fields.get_mut("type") {
                    Some(Value::String(ty)) => {
                        let ty = std::mem::take(ty);
                        fields.insert("type".into(), serde_json::json!([ty, "null"]));
                    }
                    Some(Value::Array(types)) if !types.contains(&Value::from("null")) => {
                        types.push(Value::from("null"));
                    }
                    _ => (),
                }
                if let Some(Value::Array(options)) = fields.get_mut("enum") {
                    if !options.contains(&Value::Null) {
                        options.push(Value::Null);
                    }
                }
            }
            for value in fields.values_mut() {
                nullable_to_type(value);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(nullable_to_type),
        _ => (),
    }
}

/// Add `additionalProperties: false` to schemas that list `properties` but do not mention it.
///
/// Only keys are added, so pointers into the schema stay valid.
fn close_objects(schema: &mut Value, closable: bool) {
    let Value::Object(fields) = schema else {
        return;
    };
    let combined = ["allOf", "oneOf", "anyOf"]
        .iter()
        .any(|keyword| fields.contains_key(*keyword));
    if closable
        && fields.contains_key("properties")
        && !combined
        && !fields.contains_key("additionalProperties")
    {
        fields.insert("additionalProperties".into(), Value::Bool(false));
    }

    for (keyword, value) in fields.iter_mut() {
        match (keyword.as_str(), value) {
            ("properties" | "patternProperties" | "$defs" | "definitions", Value::Object(map)) => {
                map.values_mut().for_each(|schema| close_objects(schema, true));
            }
            ("items" | "prefixItems", Value::Array(schemas)) => {
                schemas.iter_mut().for_each(|schema| close_objects(schema, true));
            }
            ("items" | "additionalProperties" | "additionalItems", schema) => {
                close_objects(schema, true);
            }
            ("allOf" | "oneOf" | "anyOf", Value::Array(schemas)) => {
                schemas.iter_mut().for_each(|schema| close_objects(schema, false));
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diffs(schema: Value, example: Value, version: OasVersion) -> Vec<ShapeDiff> {
        let differ = SchemaDiffer::new(&schema, version).unwrap();
        differ.diff_by_example(&example).collect()
    }

    fn string_field_schema() -> Value {
        json!({"type": "object", "properties": {"stringField": {"type": "string"}}})
    }

    #[test]
    fn valid_example_has_no_diffs() {
        let example = json!({"stringField": "hello-string"});
        let d = diffs(string_field_schema(), example, OasVersion::V3_1);
        assert!(d.is_empty());
    }

    #[test]
    fn optional_absent_property_is_not_a_diff() {
        assert!(diffs(string_field_schema(), json!({}), OasVersion::V3_1).is_empty());
    }

    #[test]
    fn type_mismatches_are_classified() {
        let cases = [
            (json!(123), TypeMismatch::Primitive(JsonSchemaType::Integer)),
            (json!(["1", "2", "3", true]), TypeMismatch::Array),
            (json!({"field": "string"}), TypeMismatch::Object),
            (json!(null), TypeMismatch::Null),
        ];
        for (value, mismatch) in cases {
            let d = diffs(string_field_schema(), json!({ "stringField": value }), OasVersion::V3_1);
            assert_eq!(d.len(), 1);
            assert_eq!(d[0].keyword, JsonSchemaKeyword::Type);
            assert_eq!(d[0].property_path, "/stringField");
            assert_eq!(d[0].schema_path, "/properties/stringField");
            assert_eq!(d[0].key, "stringField");
            assert_eq!(d[0].example, value);
            assert_eq!(
                d[0].kind,
                ShapeDiffKind::UnmatchedType {
                    expected: vec![JsonSchemaType::String],
                    mismatch
                }
            );
        }
    }

    #[test]
    fn number_for_integer() {
        let d = diffs(json!({"type": "integer"}), json!(1.5), OasVersion::V3_1);
        assert_eq!(
            d[0].kind,
            ShapeDiffKind::UnmatchedType {
                expected: vec![JsonSchemaType::Integer],
                mismatch: TypeMismatch::NumberForInteger
            }
        );
    }

    #[test]
    fn nullable_is_honoured_for_3_0() {
        let schema = json!({"type": "string", "nullable": true});
        assert!(diffs(schema.clone(), json!(null), OasVersion::V3_0).is_empty());
        assert_eq!(diffs(schema, json!(null), OasVersion::V3_1).len(), 1);
    }

    #[test]
    fn missing_required() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let d = diffs(schema, json!({}), OasVersion::V3_1);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].keyword, JsonSchemaKeyword::Required);
        assert_eq!(d[0].schema_path, "");
        assert_eq!(d[0].key, "name");
        assert_eq!(
            d[0].kind,
            ShapeDiffKind::MissingRequired {
                property: "name".into()
            }
        );
    }

    #[test]
    fn unexpected_properties() {
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        let d = diffs(schema, json!({"a": 1}), OasVersion::V3_1);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].keyword, JsonSchemaKeyword::AdditionalProperties);
        assert_eq!(d[0].property_path, "/a");
        assert_eq!(d[0].example, json!(1));
    }

    #[test]
    fn closed_schemas_report_unlisted_properties() {
        let schema = json!({"type": "object", "properties": {}});
        let example = json!({"name": "me"});
        assert!(diffs(schema.clone(), example.clone(), OasVersion::V3_0).is_empty());

        let differ = SchemaDiffer::closed(&schema, OasVersion::V3_0).unwrap();
        let d: Vec<_> = differ.diff_by_example(&example).collect();
        assert_eq!(d.len(), 1);
        assert_eq!(
            d[0].kind,
            ShapeDiffKind::UnexpectedProperty {
                property: "name".into()
            }
        );
        assert_eq!(d[0].schema_path, "");
        assert_eq!(d[0].property_path, "/name");
        assert_eq!(differ.schema(), &schema);
    }

    #[test]
    fn closed_schemas_reach_nested_objects() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {"owner": {"type": "object", "properties": {"id": {"type": "string"}}}}
            }
        });
        let differ = SchemaDiffer::closed(&schema, OasVersion::V3_1).unwrap();
        let d: Vec<_> = differ
            .diff_by_example(&json!([{"owner": {"id": "1", "email": "a@b"}}]))
            .collect();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].property_path, "/0/owner/email");
        assert_eq!(d[0].schema_path, "/items/properties/owner");
    }

    #[test]
    fn closed_schemas_keep_open_declarations() {
        let open = json!({"type": "object", "properties": {}, "additionalProperties": true});
        let differ = SchemaDiffer::closed(&open, OasVersion::V3_1).unwrap();
        assert_eq!(differ.diff_by_example(&json!({"a": 1})).count(), 0);

        let combined = json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "number"}}},
                {"type": "object", "properties": {"b": {"type": "number"}}}
            ]
        });
        let differ = SchemaDiffer::closed(&combined, OasVersion::V3_1).unwrap();
        assert_eq!(differ.diff_by_example(&json!({"a": 1, "b": 2})).count(), 0);
    }

    #[test]
    fn polymorphic_and_all_of() {
        let d = diffs(json!({"oneOf": [{"type": "string"}]}), json!(42), OasVersion::V3_1);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].keyword, JsonSchemaKeyword::OneOf);
        assert_eq!(d[0].kind, ShapeDiffKind::UnmatchedPolymorphic);

        let d = diffs(
            json!({"oneOf": [{"type": "number"}, {"type": "integer"}]}),
            json!(1),
            OasVersion::V3_1,
        );
        assert_eq!(d[0].kind, ShapeDiffKind::AmbiguousPolymorphic);

        let d = diffs(json!({"allOf": [{"type": "string"}]}), json!(42), OasVersion::V3_1);
        assert_eq!(d[0].keyword, JsonSchemaKeyword::AllOf);
        assert_eq!(d[0].schema_path, "");
    }

    #[test]
    fn diffs_are_lazy() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}}
        });
        let differ = SchemaDiffer::new(&schema, OasVersion::V3_1).unwrap();
        let example = json!({"a": 1, "b": 2});
        assert!(differ.diff_by_example(&example).next().is_some());
        assert_eq!(differ.diff_by_example(&example).count(), 2);
    }
}
