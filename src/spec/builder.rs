//! Incremental spec accumulation and the freeze point.

use super::types::{
    basic_http_scheme, bearer_jwt_scheme, Components, Info, MediaType, Operation, Parameter,
    ParameterLocation, PathItem, RequestBody, Response, Server, SpecDocument, Tag,
    OPENAPI_VERSION,
};
use crate::schema::Schema;
use crate::template::IdParam;
use http::Method;
use oas3::spec::SecurityScheme;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

/// Names of the schemes every document declares.
pub const BASIC_HTTP: &str = "basic_http";
pub const JWT_ACCESS_TOKEN: &str = "jwt_access_token";
pub const JWT_REFRESH_TOKEN: &str = "jwt_refresh_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    DuplicateSchema(String),
    DuplicateSecurityScheme(String),
    DuplicateOperation { method: String, path: String },
    UnknownSecurityScheme { scheme: String, operation: String },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::DuplicateSchema(name) => write!(f, "schema '{name}' is already declared"),
            SpecError::DuplicateSecurityScheme(name) => {
                write!(f, "security scheme '{name}' is already declared")
            }
            SpecError::DuplicateOperation { method, path } => {
                write!(f, "operation {method} {path} is already declared")
            }
            SpecError::UnknownSecurityScheme { scheme, operation } => write!(
                f,
                "operation '{operation}' references undeclared security scheme '{scheme}'"
            ),
        }
    }
}

impl std::error::Error for SpecError {}

/// Schema reference for a request or response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySchema {
    /// Component name under `#/components/schemas/`
    pub component: String,
    /// Array of the component instead of a single one
    pub many: bool,
}

impl BodySchema {
    pub fn single(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            many: false,
        }
    }

    pub fn many(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            many: true,
        }
    }

    fn to_json(&self) -> Value {
        let reference = json!({ "$ref": format!("#/components/schemas/{}", self.component) });
        if self.many {
            json!({ "type": "array", "items": reference })
        } else {
            reference
        }
    }
}

/// One operation to append: the record produced for each bound (resource, verb).
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub method: Method,
    /// Documentation path (`/cats/{cat_id}`)
    pub path: String,
    pub tag: String,
    pub operation_id: String,
    pub path_params: Vec<IdParam>,
    pub query: Option<Schema>,
    pub input: Option<BodySchema>,
    pub output: Option<BodySchema>,
    pub status: u16,
    pub security: Option<String>,
    pub description: String,
}

fn status_description(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        422 => "Unprocessable Entity",
        _ => "Success",
    }
}

impl OperationSpec {
    fn to_operation(&self) -> Operation {
        let mut parameters: Vec<Parameter> = self
            .path_params
            .iter()
            .map(|p| Parameter {
                name: p.name.to_string(),
                location: ParameterLocation::Path,
                required: true,
                schema: json!({ "type": p.id_type.openapi_type() }),
            })
            .collect();
        if let Some(query) = &self.query {
            parameters.extend(query.input_properties().map(|(name, schema, required)| {
                Parameter {
                    name: name.to_string(),
                    location: ParameterLocation::Query,
                    required,
                    schema: schema.clone(),
                }
            }));
        }

        let request_body = self.input.as_ref().map(|input| {
            let schema = input.to_json();
            let mut content = BTreeMap::new();
            content.insert(JSON.to_string(), MediaType { schema: schema.clone() });
            content.insert(FORM.to_string(), MediaType { schema });
            RequestBody {
                description: String::new(),
                required: false,
                content,
            }
        });

        let mut responses = BTreeMap::new();
        let mut content = BTreeMap::new();
        if let Some(output) = &self.output {
            content.insert(
                JSON.to_string(),
                MediaType {
                    schema: output.to_json(),
                },
            );
        }
        responses.insert(
            self.status.to_string(),
            Response {
                description: status_description(self.status).to_string(),
                content,
            },
        );
        if self.input.is_some() || self.query.is_some() {
            responses.insert(
                "422".to_string(),
                Response {
                    description: status_description(422).to_string(),
                    content: BTreeMap::new(),
                },
            );
        }

        let security = match &self.security {
            Some(name) => {
                let mut requirement = BTreeMap::new();
                requirement.insert(name.clone(), Vec::new());
                vec![requirement]
            }
            None => Vec::new(),
        };

        Operation {
            tags: vec![self.tag.clone()],
            description: self.description.clone(),
            operation_id: self.operation_id.clone(),
            parameters,
            request_body,
            responses,
            security,
        }
    }
}

/// Registration-phase accumulator for the process-wide spec document.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    document: SpecDocument,
}

impl SpecBuilder {
    /// A document declaring the built-in `basic_http`, `jwt_access_token` and
    /// `jwt_refresh_token` schemes.
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        let mut security_schemes = BTreeMap::new();
        security_schemes.insert(BASIC_HTTP.to_string(), basic_http_scheme());
        security_schemes.insert(JWT_ACCESS_TOKEN.to_string(), bearer_jwt_scheme());
        security_schemes.insert(JWT_REFRESH_TOKEN.to_string(), bearer_jwt_scheme());
        Self {
            document: SpecDocument {
                openapi: OPENAPI_VERSION.to_string(),
                info: Info {
                    title: title.into(),
                    version: version.into(),
                },
                servers: Vec::new(),
                paths: BTreeMap::new(),
                components: Components {
                    schemas: BTreeMap::new(),
                    security_schemes,
                },
                tags: Vec::new(),
            },
        }
    }

    pub fn servers(&mut self, servers: Vec<Server>) {
        self.document.servers = servers;
    }

    pub fn security_scheme(
        &mut self,
        name: impl Into<String>,
        scheme: SecurityScheme,
    ) -> Result<(), SpecError> {
        let name = name.into();
        if self.document.components.security_schemes.contains_key(&name) {
            return Err(SpecError::DuplicateSecurityScheme(name));
        }
        debug!(scheme = %name, "Security scheme declared");
        self.document
            .components
            .security_schemes
            .insert(name, scheme);
        Ok(())
    }

    pub fn get_security_scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.document.components.security_schemes.get(name)
    }

    /// Fails if `name` is already a component schema. Nothing is recorded.
    pub fn check_schema(&self, name: &str) -> Result<(), SpecError> {
        if self.document.components.schemas.contains_key(name) {
            return Err(SpecError::DuplicateSchema(name.to_string()));
        }
        Ok(())
    }

    pub fn add_schema(&mut self, name: impl Into<String>, definition: Value) -> Result<(), SpecError> {
        let name = name.into();
        self.check_schema(&name)?;
        self.document.components.schemas.insert(name, definition);
        Ok(())
    }

    pub fn add_tag(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.document.tags.iter().any(|t| t.name == name) {
            self.document.tags.push(Tag { name });
        }
    }

    /// Fails if `op` references an undeclared scheme or its (path, method) is taken.
    /// Nothing is recorded.
    pub fn check_operation(&self, op: &OperationSpec) -> Result<(), SpecError> {
        if let Some(scheme) = &op.security {
            if !self
                .document
                .components
                .security_schemes
                .contains_key(scheme)
            {
                return Err(SpecError::UnknownSecurityScheme {
                    scheme: scheme.clone(),
                    operation: op.operation_id.clone(),
                });
            }
        }
        let method = op.method.as_str().to_ascii_lowercase();
        if self
            .document
            .paths
            .get(&op.path)
            .is_some_and(|item| item.contains_key(&method))
        {
            return Err(SpecError::DuplicateOperation {
                method: op.method.to_string(),
                path: op.path.clone(),
            });
        }
        Ok(())
    }

    /// Append one operation, keyed by (path, method).
    pub fn add_operation(&mut self, op: &OperationSpec) -> Result<(), SpecError> {
        self.check_operation(op)?;
        let item: &mut PathItem = self.document.paths.entry(op.path.clone()).or_default();
        item.insert(op.method.as_str().to_ascii_lowercase(), op.to_operation());
        Ok(())
    }

    pub fn document(&self) -> &SpecDocument {
        &self.document
    }

    /// End the registration phase. The result is immutable and cheap to share.
    pub fn freeze(self) -> FrozenSpec {
        let operations = self.document.operations().count();
        let json = serde_json::to_value(&self.document).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Spec document failed to serialize");
            Value::Null
        });
        info!(
            paths = self.document.paths.len(),
            operations,
            schemas = self.document.components.schemas.len(),
            "Spec document frozen"
        );
        FrozenSpec {
            document: Arc::new(self.document),
            json: Arc::new(json),
        }
    }
}

/// The read-only document served during the serving phase.
#[derive(Debug, Clone)]
pub struct FrozenSpec {
    document: Arc<SpecDocument>,
    json: Arc<Value>,
}

impl FrozenSpec {
    pub fn document(&self) -> &SpecDocument {
        &self.document
    }

    pub fn to_json(&self) -> &Value {
        &self.json
    }
}
