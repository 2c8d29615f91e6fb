use std::path::PathBuf;

use schemars::schema::InstanceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The errors that can happen in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to (de)serialize JSON.
    ///
    /// Any errors from serde that happen while converting values into our types end up here.
    #[error("failed to parse json")]
    Serde(#[from] serde_json::Error),
    /// A source file could not be parsed as YAML (or JSON).
    #[error("failed to parse {path}")]
    Yaml {
        /// The file in question.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A source file parsed as a value, but could not be scanned for source positions.
    #[error("failed to scan {path}: {message}")]
    YamlScan {
        /// The file in question.
        path: PathBuf,
        /// What the scanner complained about.
        message: String,
    },
    /// A source file could not be read.
    #[error("failed to read {path}")]
    Io {
        /// The file in question.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The document is missing a mandatory top-level field, or it has the wrong shape.
    #[error("document is missing mandatory field `{0}`")]
    MissingField(&'static str),
    /// A JSON schema could not be compiled for validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A `$ref` points at something that does not exist.
    #[error("could not resolve reference `{0}`")]
    UnresolvedRef(String),
    /// A string is not a well-formed JSON pointer.
    #[error("invalid json pointer `{0}`")]
    InvalidPointer(String),
    /// A JSON pointer does not resolve inside the value it was applied to.
    #[error("no value at `{0}`")]
    MissingPointer(String),
    /// Applying patch operations failed.
    #[error("failed to apply patch")]
    Patch(#[from] json_patch::PatchError),
}

/// All primitive types defined in JSON schema.
#[derive(Serialize, Deserialize, Clone, Copy, Ord, Eq, PartialEq, PartialOrd, Hash, Debug)]
#[allow(missing_docs)]
pub enum JsonSchemaType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "null")]
    Null,
}

impl JsonSchemaType {
    /// The most specific type of a concrete value. Whole numbers are `Integer`.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => JsonSchemaType::Null,
            Value::Bool(_) => JsonSchemaType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => JsonSchemaType::Integer,
            Value::Number(n) if n.as_f64().map_or(false, |f| f.fract() == 0.0) => {
                JsonSchemaType::Integer
            }
            Value::Number(_) => JsonSchemaType::Number,
            Value::String(_) => JsonSchemaType::String,
            Value::Array(_) => JsonSchemaType::Array,
            Value::Object(_) => JsonSchemaType::Object,
        }
    }

    /// Parse the keyword spelling used inside `type`.
    pub fn from_keyword(name: &str) -> Option<Self> {
        Some(match name {
            "string" => JsonSchemaType::String,
            "number" => JsonSchemaType::Number,
            "integer" => JsonSchemaType::Integer,
            "object" => JsonSchemaType::Object,
            "array" => JsonSchemaType::Array,
            "boolean" => JsonSchemaType::Boolean,
            "null" => JsonSchemaType::Null,
            _ => return None,
        })
    }

    /// The keyword spelling used inside `type`.
    pub fn as_keyword(self) -> &'static str {
        match self {
            JsonSchemaType::String => "string",
            JsonSchemaType::Number => "number",
            JsonSchemaType::Integer => "integer",
            JsonSchemaType::Object => "object",
            JsonSchemaType::Array => "array",
            JsonSchemaType::Boolean => "boolean",
            JsonSchemaType::Null => "null",
        }
    }

    /// Read the declared types of a schema node. A missing `type` yields an empty list.
    pub fn declared_by(schema: &Value) -> Vec<Self> {
        match schema.get("type") {
            Some(Value::String(name)) => Self::from_keyword(name).into_iter().collect(),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(Self::from_keyword)
                .collect(),
            _ => vec![],
        }
    }
}

impl From<JsonSchemaType> for InstanceType {
    fn from(t: JsonSchemaType) -> Self {
        match t {
            JsonSchemaType::String => InstanceType::String,
            JsonSchemaType::Number => InstanceType::Number,
            JsonSchemaType::Integer => InstanceType::Integer,
            JsonSchemaType::Object => InstanceType::Object,
            JsonSchemaType::Array => InstanceType::Array,
            JsonSchemaType::Boolean => InstanceType::Boolean,
            JsonSchemaType::Null => InstanceType::Null,
        }
    }
}

/// OpenAPI major/minor line of a document.
///
/// Selects the JSON schema dialect used for validation and how `null` is expressed in
/// generated schemas.
#[derive(Serialize, Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum OasVersion {
    /// OpenAPI 3.0.x. Schemas are a Draft 4 dialect and use `nullable`.
    #[serde(rename = "3.0")]
    V3_0,
    /// OpenAPI 3.1.x. Schemas are JSON schema 2020-12.
    #[default]
    #[serde(rename = "3.1")]
    V3_1,
}

impl OasVersion {
    /// Detect the version from the `openapi` field of a document.
    pub fn of_document(document: &Value) -> Result<Self, Error> {
        match document.get("openapi").and_then(Value::as_str) {
            Some(v) if v.starts_with("3.0") => Ok(OasVersion::V3_0),
            Some(v) if v.starts_with("3.") => Ok(OasVersion::V3_1),
            _ => Err(Error::MissingField("openapi")),
        }
    }
}

/// How a patch affects consumers of the document.
///
/// Callers decide policy based on this, e.g. only auto-applying [`PatchImpact::is_safe`] patches.
#[derive(Serialize, Deserialize, Clone, Copy, Ord, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PatchImpact {
    /// Something entirely new is documented.
    Addition,
    /// Existing consumers keep working.
    #[serde(rename = "BackwardsCompatible")]
    Compatible,
    /// Existing consumers may break.
    #[serde(rename = "BackwardsIncompatible")]
    Incompatible,
    /// No classification could be made.
    #[serde(rename = "BackwardsCompatibilityUnknown")]
    Unknown,
}

impl PatchImpact {
    /// Whether the patch can be applied without breaking anyone.
    pub fn is_safe(&self) -> bool {
        matches!(self, PatchImpact::Addition | PatchImpact::Compatible)
    }

    /// Classify a change that loosens what a schema accepts.
    ///
    /// Accepting more in a request is compatible. Promising less in a response is not.
    pub fn for_loosening(in_request: bool) -> Self {
        if in_request {
            PatchImpact::Compatible
        } else {
            PatchImpact::Incompatible
        }
    }
}
