//! Serializable OpenAPI 3.0 document model.
//!
//! Only the subset the accumulator emits is modelled. Schemas stay as raw JSON so
//! resource definitions pass through untouched.

use oas3::spec::SecurityScheme;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const OPENAPI_VERSION: &str = "3.0.3";

#[derive(Debug, Clone, Serialize)]
pub struct SpecDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    pub paths: BTreeMap<String, PathItem>,
    pub components: Components,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl SpecDocument {
    pub fn operation(&self, path: &str, method: &str) -> Option<&Operation> {
        self.paths
            .get(path)
            .and_then(|item| item.get(&method.to_ascii_lowercase()))
    }

    /// Every operation in the document, with its path and lowercase method.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str, &Operation)> {
        self.paths.iter().flat_map(|(path, item)| {
            item.iter()
                .map(move |(method, op)| (path.as_str(), method.as_str(), op))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Info {
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operations on one path keyed by lowercase method.
pub type PathItem = BTreeMap<String, Operation>;

#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub tags: Vec<String>,
    pub description: String,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Response>,
    /// `[{scheme: []}]`, or empty for public operations
    pub security: Vec<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    pub description: String,
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaType {
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Components {
    pub schemas: BTreeMap<String, Value>,
    #[serde(rename = "securitySchemes", serialize_with = "serialize_schemes")]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
}

/// Security schemes are written without `null` members, which OpenAPI validators
/// reject for string-typed fields such as `description`.
fn serialize_schemes<S: Serializer>(
    schemes: &BTreeMap<String, SecurityScheme>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut out: BTreeMap<&str, Value> = BTreeMap::new();
    for (name, scheme) in schemes {
        let value = serde_json::to_value(scheme).map_err(serde::ser::Error::custom)?;
        out.insert(name.as_str(), strip_nulls(value));
    }
    out.serialize(serializer)
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

/// `http`/`basic`
pub fn basic_http_scheme() -> SecurityScheme {
    SecurityScheme::Http {
        scheme: "basic".to_string(),
        bearer_format: None,
        description: None,
    }
}

/// `http`/`bearer` with `bearerFormat: JWT`
pub fn bearer_jwt_scheme() -> SecurityScheme {
    SecurityScheme::Http {
        scheme: "bearer".to_string(),
        bearer_format: Some("JWT".to_string()),
        description: None,
    }
}
