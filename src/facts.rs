use serde::Serialize;
use serde_json::Value;

/// What kind of element of an OpenAPI document a [`Fact`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum FactKind {
    Specification,
    Operation,
    Request,
    QueryParameter,
    PathParameter,
    HeaderParameter,
    CookieParameter,
    Body,
    Response,
    ResponseHeader,
    /// A schema node that is a named property of an object schema.
    Field,
    /// Any other schema node: a body schema root, `items`, a polymorphic branch.
    Schema,
    BodyExample,
    ComponentSchema,
    ComponentSchemaExample,
}

/// Where a request parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum ParameterIn {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParameterIn {
    /// Parse the `in` field of a parameter object.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "query" => ParameterIn::Query,
            "path" => ParameterIn::Path,
            "header" => ParameterIn::Header,
            "cookie" => ParameterIn::Cookie,
            _ => return None,
        })
    }

    /// The spelling used in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterIn::Query => "query",
            ParameterIn::Path => "path",
            ParameterIn::Header => "header",
            ParameterIn::Cookie => "cookie",
        }
    }

    pub(crate) fn fact_kind(&self) -> FactKind {
        match self {
            ParameterIn::Query => FactKind::QueryParameter,
            ParameterIn::Path => FactKind::PathParameter,
            ParameterIn::Header => FactKind::HeaderParameter,
            ParameterIn::Cookie => FactKind::CookieParameter,
        }
    }
}

/// A request parameter, identified by where it lives and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[allow(missing_docs)]
pub struct ParameterLocation {
    #[serde(rename = "in")]
    pub location: ParameterIn,
    pub name: String,
}

/// Which part of an API an element belongs to, independent of JSON structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConceptualLocation {
    /// Document level metadata.
    Specification,
    /// An operation as a whole.
    Operation {
        /// Lower-case HTTP method.
        method: String,
        /// Normalized path pattern.
        path: String,
    },
    /// Anything sent by the client.
    #[serde(rename_all = "camelCase")]
    InRequest {
        /// Lower-case HTTP method.
        method: String,
        /// Normalized path pattern.
        path: String,
        /// Set for request bodies.
        content_type: Option<String>,
        /// Set for request parameters.
        parameter: Option<ParameterLocation>,
    },
    /// Anything sent by the server.
    #[serde(rename_all = "camelCase")]
    InResponse {
        /// Lower-case HTTP method.
        method: String,
        /// Normalized path pattern.
        path: String,
        /// The response key, e.g. `200` or `default`.
        status_code: String,
        /// Set for response bodies.
        content_type: Option<String>,
        /// Set for response headers.
        header: Option<String>,
    },
    /// A reusable schema under `components.schemas`.
    #[serde(rename_all = "camelCase")]
    InComponentSchema {
        /// The key under `components.schemas`.
        schema_name: String,
    },
}

impl ConceptualLocation {
    /// Whether the element is part of what clients send.
    pub fn in_request(&self) -> bool {
        matches!(self, ConceptualLocation::InRequest { .. })
    }

    /// Whether the element is part of what servers send.
    pub fn in_response(&self) -> bool {
        matches!(self, ConceptualLocation::InResponse { .. })
    }
}

/// Where a [`Fact`] was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// JSON pointer into the dereferenced document.
    pub json_path: String,
    /// The identity of the element. Stable when surrounding structure moves.
    pub conceptual_path: Vec<String>,
    /// Which part of the API the element belongs to.
    pub conceptual_location: ConceptualLocation,
}

/// A normalized observation about one element of an OpenAPI document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    /// What the element is.
    pub kind: FactKind,
    /// Where the element is.
    pub location: Location,
    /// The element's own content, with child elements stripped.
    pub value: Value,
}

/// Turn a conceptual path into a lookup key.
///
/// Segments are escaped as JSON pointer tokens, so the `/` delimiter never appears inside a
/// segment and distinct paths always yield distinct keys.
pub fn conceptual_path_identifier<S: AsRef<str>>(conceptual_path: &[S]) -> String {
    crate::pointer::compile(conceptual_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_do_not_collide() {
        let a = conceptual_path_identifier(&["get", "/a/b"]);
        let b = conceptual_path_identifier(&["get", "/a", "b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn only_requests_are_in_request() {
        let request = ConceptualLocation::InRequest {
            method: "post".into(),
            path: "/pets".into(),
            content_type: Some("application/json".into()),
            parameter: None,
        };
        let component = ConceptualLocation::InComponentSchema {
            schema_name: "Pet".into(),
        };
        assert!(request.in_request());
        assert!(!component.in_request());
        assert!(!component.in_response());
    }
}
