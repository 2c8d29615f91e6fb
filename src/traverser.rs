use serde_json::{Map, Value};

use crate::facts::{ConceptualLocation, Fact, FactKind, Location, ParameterIn, ParameterLocation};
use crate::pointer;
use crate::Error;

/// HTTP methods that can appear as keys of a path item, in traversal order.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Keys of a schema object whose values are schemas themselves, traversed as their own facts.
const NESTED_SCHEMA_KEYS: [&str; 8] = [
    "properties",
    "items",
    "additionalProperties",
    "oneOf",
    "anyOf",
    "allOf",
    "not",
    "required",
];

/// Collapse every `{name}` template expression to `{}`, so renaming a path parameter does not
/// change the identity of an operation.
pub fn normalize_path_pattern(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut in_template = false;
    for c in path.chars() {
        match c {
            '{' => {
                in_template = true;
                normalized.push_str("{}");
            }
            '}' if in_template => in_template = false,
            _ if in_template => (),
            _ => normalized.push(c),
        }
    }
    normalized
}

/// Walks a dereferenced OpenAPI document and collects one [`Fact`] per addressable element.
pub struct OpenApiTraverser {
    facts: Vec<Fact>,
}

/// The conceptual parts shared by everything below one operation.
struct OperationContext<'a> {
    method: &'a str,
    pattern: String,
    conceptual_path: Vec<String>,
}

impl OperationContext<'_> {
    fn request(
        &self,
        content_type: Option<&str>,
        parameter: Option<ParameterLocation>,
    ) -> ConceptualLocation {
        ConceptualLocation::InRequest {
            method: self.method.to_owned(),
            path: self.pattern.clone(),
            content_type: content_type.map(str::to_owned),
            parameter,
        }
    }

    fn response(
        &self,
        status_code: &str,
        content_type: Option<&str>,
        header: Option<&str>,
    ) -> ConceptualLocation {
        ConceptualLocation::InResponse {
            method: self.method.to_owned(),
            path: self.pattern.clone(),
            status_code: status_code.to_owned(),
            content_type: content_type.map(str::to_owned),
            header: header.map(str::to_owned),
        }
    }

    fn extend(&self, segments: &[&str]) -> Vec<String> {
        let mut path = self.conceptual_path.clone();
        path.extend(segments.iter().map(|s| (*s).to_owned()));
        path
    }
}

impl OpenApiTraverser {
    /// Traverse `document`. Fails if mandatory top-level structure is missing.
    pub fn traverse(document: &Value) -> Result<Vec<Fact>, Error> {
        let root = document.as_object().ok_or(Error::MissingField("openapi"))?;
        let version = root.get("openapi").and_then(Value::as_str);
        if !version.map_or(false, |v| v.starts_with("3.")) {
            return Err(Error::MissingField("openapi"));
        }
        if !root.get("info").map_or(false, Value::is_object) {
            return Err(Error::MissingField("info"));
        }
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(Error::MissingField("paths"))?;

        let mut walker = OpenApiTraverser { facts: vec![] };
        walker.traverse_specification(root);
        for (raw_path, path_item) in paths {
            walker.traverse_path_item(raw_path, path_item);
        }
        if let Some(schemas) = root
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(Value::as_object)
        {
            for (name, schema) in schemas {
                walker.traverse_component_schema(name, schema);
            }
        }

        tracing::debug!(facts = walker.facts.len(), "traversed document");
        Ok(walker.facts)
    }

    fn push(
        &mut self,
        kind: FactKind,
        json_path: String,
        conceptual_path: Vec<String>,
        conceptual_location: ConceptualLocation,
        value: Value,
    ) {
        self.facts.push(Fact {
            kind,
            location: Location {
                json_path,
                conceptual_path,
                conceptual_location,
            },
            value,
        });
    }

    fn traverse_specification(&mut self, root: &Map<String, Value>) {
        let value = without_keys(root, &["paths", "components"]);
        self.push(
            FactKind::Specification,
            String::new(),
            vec![],
            ConceptualLocation::Specification,
            value,
        );
    }

    fn traverse_path_item(&mut self, raw_path: &str, path_item: &Value) {
        let pattern = normalize_path_pattern(raw_path);
        let shared_parameters = path_item
            .get("parameters")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let index = i.to_string();
                        (pointer::compile(&["paths", raw_path, "parameters", &index]), p)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for method in HTTP_METHODS {
            let Some(operation) = path_item.get(method).and_then(Value::as_object) else {
                continue;
            };
            let json_path = pointer::compile(&["paths", raw_path, method]);
            let context = OperationContext {
                method,
                pattern: pattern.clone(),
                conceptual_path: vec![method.to_owned(), pattern.clone()],
            };

            let mut value = without_keys(
                operation,
                &["parameters", "requestBody", "responses", "callbacks"],
            );
            if let Value::Object(ref mut fields) = value {
                fields.insert("method".into(), Value::String(method.to_owned()));
                fields.insert("pathPattern".into(), Value::String(pattern.clone()));
            }
            self.push(
                FactKind::Operation,
                json_path.clone(),
                context.conceptual_path.clone(),
                ConceptualLocation::Operation {
                    method: method.to_owned(),
                    path: pattern.clone(),
                },
                value,
            );

            // Operation level parameters override path level ones with the same `in` and `name`.
            let mut parameters = shared_parameters.clone();
            if let Some(own) = operation.get("parameters").and_then(Value::as_array) {
                for (i, param) in own.iter().enumerate() {
                    let param_path = pointer::append(&json_path, &["parameters", &i.to_string()]);
                    parameters.retain(|(_, existing)| !same_parameter(existing, param));
                    parameters.push((param_path, param));
                }
            }
            for (param_path, param) in parameters {
                self.traverse_parameter(&context, param_path, param);
            }

            if let Some(request_body) = operation.get("requestBody").and_then(Value::as_object) {
                self.traverse_request_body(&context, &json_path, request_body);
            }

            if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
                for (status_code, response) in responses {
                    if let Some(response) = response.as_object() {
                        self.traverse_response(&context, &json_path, status_code, response);
                    }
                }
            }
        }
    }

    fn traverse_parameter(&mut self, context: &OperationContext, json_path: String, param: &Value) {
        let name = param.get("name").and_then(Value::as_str);
        let location = param.get("in").and_then(Value::as_str).and_then(ParameterIn::parse);
        let (Some(name), Some(location)) = (name, location) else {
            tracing::warn!(%json_path, "skipping parameter without a valid `name` and `in`");
            return;
        };
        self.push(
            location.fact_kind(),
            json_path,
            context.extend(&["parameters", location.as_str(), name]),
            context.request(
                None,
                Some(ParameterLocation {
                    location,
                    name: name.to_owned(),
                }),
            ),
            param.clone(),
        );
    }

    fn traverse_request_body(
        &mut self,
        context: &OperationContext,
        operation_path: &str,
        request_body: &Map<String, Value>,
    ) {
        let json_path = pointer::append(operation_path, &["requestBody"]);
        let conceptual_path = context.extend(&["requestBody"]);
        self.push(
            FactKind::Request,
            json_path.clone(),
            conceptual_path.clone(),
            context.request(None, None),
            without_keys(request_body, &["content"]),
        );

        if let Some(content) = request_body.get("content").and_then(Value::as_object) {
            for (content_type, media) in content {
                self.traverse_body(
                    &pointer::append(&json_path, &["content", content_type]),
                    extended(&conceptual_path, &["content", content_type]),
                    content_type,
                    media,
                    context.request(Some(content_type), None),
                );
            }
        }
    }

    fn traverse_response(
        &mut self,
        context: &OperationContext,
        operation_path: &str,
        status_code: &str,
        response: &Map<String, Value>,
    ) {
        let json_path = pointer::append(operation_path, &["responses", status_code]);
        let conceptual_path = context.extend(&["responses", status_code]);
        let mut value = without_keys(response, &["content", "headers"]);
        if let Value::Object(ref mut fields) = value {
            fields.insert("statusCode".into(), Value::String(status_code.to_owned()));
        }
        self.push(
            FactKind::Response,
            json_path.clone(),
            conceptual_path.clone(),
            context.response(status_code, None, None),
            value,
        );

        if let Some(headers) = response.get("headers").and_then(Value::as_object) {
            for (name, header) in headers {
                self.push(
                    FactKind::ResponseHeader,
                    pointer::append(&json_path, &["headers", name]),
                    extended(&conceptual_path, &["headers", name]),
                    context.response(status_code, None, Some(name)),
                    header.clone(),
                );
            }
        }

        if let Some(content) = response.get("content").and_then(Value::as_object) {
            for (content_type, media) in content {
                self.traverse_body(
                    &pointer::append(&json_path, &["content", content_type]),
                    extended(&conceptual_path, &["content", content_type]),
                    content_type,
                    media,
                    context.response(status_code, Some(content_type), None),
                );
            }
        }
    }

    fn traverse_body(
        &mut self,
        json_path: &str,
        conceptual_path: Vec<String>,
        content_type: &str,
        media: &Value,
        location: ConceptualLocation,
    ) {
        let Some(media) = media.as_object() else {
            return;
        };
        let mut value = without_keys(media, &["schema", "example", "examples"]);
        if let Value::Object(ref mut fields) = value {
            fields.insert("contentType".into(), Value::String(content_type.to_owned()));
        }
        self.push(
            FactKind::Body,
            json_path.to_owned(),
            conceptual_path.clone(),
            location.clone(),
            value,
        );

        if let Some(example) = media.get("example") {
            self.push(
                FactKind::BodyExample,
                pointer::append(json_path, &["example"]),
                extended(&conceptual_path, &["example"]),
                location.clone(),
                serde_json::json!({ "contentType": content_type, "value": example }),
            );
        }
        if let Some(examples) = media.get("examples").and_then(Value::as_object) {
            for (name, example) in examples {
                // Examples given by `externalValue` have nothing to check against.
                let Some(example_value) = example.get("value") else {
                    continue;
                };
                self.push(
                    FactKind::BodyExample,
                    pointer::append(json_path, &["examples", name, "value"]),
                    extended(&conceptual_path, &["examples", name]),
                    location.clone(),
                    serde_json::json!({ "contentType": content_type, "value": example_value }),
                );
            }
        }

        if let Some(schema) = media.get("schema") {
            self.traverse_schema(
                schema,
                pointer::append(json_path, &["schema"]),
                extended(&conceptual_path, &["schema"]),
                &location,
                FactKind::Schema,
            );
        }
    }

    fn traverse_component_schema(&mut self, name: &str, schema: &Value) {
        let json_path = pointer::compile(&["components", "schemas", name]);
        let conceptual_path = vec!["components".to_owned(), "schemas".to_owned(), name.to_owned()];
        let location = ConceptualLocation::InComponentSchema {
            schema_name: name.to_owned(),
        };
        if let Some(example) = schema.get("example") {
            self.push(
                FactKind::ComponentSchemaExample,
                pointer::append(&json_path, &["example"]),
                extended(&conceptual_path, &["example"]),
                location.clone(),
                serde_json::json!({ "value": example }),
            );
        }
        self.traverse_schema(
            schema,
            json_path,
            conceptual_path,
            &location,
            FactKind::ComponentSchema,
        );
    }

    fn traverse_schema(
        &mut self,
        schema: &Value,
        json_path: String,
        conceptual_path: Vec<String>,
        location: &ConceptualLocation,
        kind: FactKind,
    ) {
        let Some(fields) = schema.as_object() else {
            // Boolean schemas are facts of their own, with nothing below them.
            self.push(kind, json_path, conceptual_path, location.clone(), schema.clone());
            return;
        };
        self.push(
            kind,
            json_path.clone(),
            conceptual_path.clone(),
            location.clone(),
            without_keys(fields, &NESTED_SCHEMA_KEYS),
        );
        self.traverse_nested_schemas(fields, &json_path, &conceptual_path, location);
    }

    fn traverse_field(
        &mut self,
        key: &str,
        required: bool,
        schema: &Value,
        json_path: String,
        conceptual_path: Vec<String>,
        location: &ConceptualLocation,
    ) {
        let flat = match schema.as_object() {
            Some(fields) => without_keys(fields, &NESTED_SCHEMA_KEYS),
            None => schema.clone(),
        };
        self.push(
            FactKind::Field,
            json_path.clone(),
            conceptual_path.clone(),
            location.clone(),
            serde_json::json!({ "key": key, "required": required, "flatSchema": flat }),
        );
        if let Some(fields) = schema.as_object() {
            self.traverse_nested_schemas(fields, &json_path, &conceptual_path, location);
        }
    }

    fn traverse_nested_schemas(
        &mut self,
        fields: &Map<String, Value>,
        json_path: &str,
        conceptual_path: &[String],
        location: &ConceptualLocation,
    ) {
        if let Some(properties) = fields.get("properties").and_then(Value::as_object) {
            let required: Vec<&str> = fields
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for (key, property) in properties {
                self.traverse_field(
                    key,
                    required.contains(&key.as_str()),
                    property,
                    pointer::append(json_path, &["properties", key]),
                    extended(conceptual_path, &["properties", key]),
                    location,
                );
            }
        }

        match fields.get("items") {
            Some(Value::Array(tuple)) => {
                for (i, item) in tuple.iter().enumerate() {
                    let index = i.to_string();
                    self.traverse_schema(
                        item,
                        pointer::append(json_path, &["items", &index]),
                        extended(conceptual_path, &["items", &index]),
                        location,
                        FactKind::Schema,
                    );
                }
            }
            Some(items) => self.traverse_schema(
                items,
                pointer::append(json_path, &["items"]),
                extended(conceptual_path, &["items"]),
                location,
                FactKind::Schema,
            ),
            None => (),
        }

        for keyword in ["additionalProperties", "not"] {
            if let Some(schema @ Value::Object(_)) = fields.get(keyword) {
                self.traverse_schema(
                    schema,
                    pointer::append(json_path, &[keyword]),
                    extended(conceptual_path, &[keyword]),
                    location,
                    FactKind::Schema,
                );
            }
        }

        for keyword in ["oneOf", "anyOf", "allOf"] {
            if let Some(branches) = fields.get(keyword).and_then(Value::as_array) {
                for (i, branch) in branches.iter().enumerate() {
                    let index = i.to_string();
                    self.traverse_schema(
                        branch,
                        pointer::append(json_path, &[keyword, &index]),
                        extended(conceptual_path, &[keyword, &index]),
                        location,
                        FactKind::Schema,
                    );
                }
            }
        }
    }
}

fn extended(conceptual_path: &[String], segments: &[&str]) -> Vec<String> {
    let mut path = conceptual_path.to_vec();
    path.extend(segments.iter().map(|s| (*s).to_owned()));
    path
}

fn without_keys(object: &Map<String, Value>, keys: &[&str]) -> Value {
    Value::Object(
        object
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

fn same_parameter(a: &Value, b: &Value) -> bool {
    a.get("name") == b.get("name") && a.get("in") == b.get("in")
}
