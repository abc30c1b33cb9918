//! Registration errors, domain errors raised by resources, and the handler that maps
//! domain errors to responses.
//!
//! Every [`RegistryError`] is fatal: it is returned while resources are being declared,
//! before anything is served.
//!
//! Capability methods return `anyhow::Result`. Whatever they raise is passed to the
//! registry's [`ErrorHandler`] untouched. The [`DefaultErrorHandler`] renders
//! [`HttpError`] with its own status and payload and turns anything else into a logged
//! `500`.

use crate::dispatcher::HandlerResponse;
use crate::spec::SpecError;
use crate::template::TemplateError;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The resource group was already merged into a registry or another group
    AlreadyBound,
    /// A group was added to itself or to one of its own descendants
    GroupCycle,
    DuplicateResource(String),
    /// The resource declares an empty capability set
    NoCapabilities(String),
    /// A provider or default names a scheme the document does not declare
    UnknownSecurityScheme(String),
    Template(TemplateError),
    Spec(SpecError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyBound => write!(f, "resource group is already bound"),
            RegistryError::GroupCycle => write!(f, "resource group cannot contain itself"),
            RegistryError::DuplicateResource(name) => {
                write!(f, "resource '{name}' is already registered")
            }
            RegistryError::NoCapabilities(name) => {
                write!(f, "resource '{name}' declares no capabilities")
            }
            RegistryError::UnknownSecurityScheme(name) => {
                write!(f, "security scheme '{name}' is not declared")
            }
            RegistryError::Template(err) => write!(f, "{err}"),
            RegistryError::Spec(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Template(err) => Some(err),
            RegistryError::Spec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateError> for RegistryError {
    fn from(err: TemplateError) -> Self {
        RegistryError::Template(err)
    }
}

impl From<SpecError> for RegistryError {
    fn from(err: SpecError) -> Self {
        RegistryError::Spec(err)
    }
}

/// An error carrying the HTTP status it should be answered with.
///
/// Rendered as the payload object with `msg` set to the message.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    pub payload: Map<String, Value>,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            payload: Map::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = self.payload.clone();
        body.insert("msg".to_string(), Value::String(self.message.clone()));
        Value::Object(body)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for HttpError {}

/// Maps resource errors to responses.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, err: &anyhow::Error) -> HandlerResponse;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, err: &anyhow::Error) -> HandlerResponse {
        if let Some(http) = err.downcast_ref::<HttpError>() {
            return HandlerResponse::json(http.status, http.to_json());
        }
        error!(error = %err, "Unhandled resource error");
        HandlerResponse::json(500, json!({ "error": "Internal Server Error" }))
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(&anyhow::Error) -> HandlerResponse + Send + Sync,
{
    fn handle(&self, err: &anyhow::Error) -> HandlerResponse {
        self(err)
    }
}
