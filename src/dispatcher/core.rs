//! Transport-neutral request and response types, and dispatch failures.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]

use crate::ids::RequestId;
use crate::router::ParamVec;
use crate::schema::ValidationError;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum inline headers/cookies before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage. Names keep their original case; lookups are
/// case-insensitive.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// First value for `name` in `headers`, compared case-insensitively (RFC 7230).
#[inline]
pub fn header_value<'h>(headers: &'h HeaderVec, name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Request body as received, before any schema is applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs in wire order
    Form(Vec<(String, String)>),
    /// A body that could not be decoded for its declared content type
    Invalid(String),
}

/// A parsed HTTP request, independent of the server that received it.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub body: RequestBody,
}

impl HandlerRequest {
    /// Build a request from a method and a path that may carry a query string.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP verb
    /// * `path_and_query` - Request target such as `/cats?page=2`. The query string is
    ///   percent-decoded into [`HandlerRequest::query_params`]; an empty path becomes `/`.
    ///
    /// # Returns
    ///
    /// A request with a fresh request id, no headers and an empty body.
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, q),
            None => (path_and_query, ""),
        };
        let query_params = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect();
        Self {
            request_id: RequestId::new(),
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query_params,
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    #[must_use]
    pub fn with_form<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body = RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Get a query parameter by name (last occurrence wins)
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// External base URL (`scheme://host`) the request was addressed to, if known.
    ///
    /// The scheme comes from the first `X-Forwarded-Proto` value and defaults to
    /// `http`.
    ///
    /// # Returns
    ///
    /// `None` when the request has no `Host` header.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        let host = self.get_header("host")?;
        let scheme = self
            .get_header("x-forwarded-proto")
            .and_then(|p| p.split(',').next())
            .map(str::trim)
            .unwrap_or("http");
        Some(format!("{scheme}://{host}"))
    }
}

/// Response ready to be written by the transport.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// JSON body; `Value::Null` together with no content type means no body at all
    pub body: Value,
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a JSON response with a content type header
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Content-Type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// A response with no body, e.g. `204 No Content`
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            body: Value::Null,
        }
    }

    /// Create an error response `{"error": message}`
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    pub fn has_body(&self) -> bool {
        !(self.body.is_null() && self.get_header("content-type").is_none())
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Add or replace a header (case-insensitive)
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}

/// Why a request did not reach (or came back from) a capability method successfully.
#[derive(Debug)]
pub enum DispatchError {
    /// No route, or a path identifier that does not convert to its declared type
    NotFound,
    /// The path exists but the verb is not bound on it
    MethodNotAllowed(Vec<Method>),
    /// The operation's security provider rejected the request
    Unauthorized { scheme: String },
    /// The body could not be decoded at all
    BadRequest(String),
    /// Body or query failed the schema; never reaches the resource
    Validation(ValidationError),
    /// Raised by the resource itself; passed through untouched
    Resource(anyhow::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotFound => write!(f, "not found"),
            DispatchError::MethodNotAllowed(allowed) => {
                let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                write!(f, "method not allowed (allowed: {})", names.join(", "))
            }
            DispatchError::Unauthorized { scheme } => {
                write!(f, "request not authorized for security scheme '{scheme}'")
            }
            DispatchError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            DispatchError::Validation(err) => write!(f, "{err}"),
            DispatchError::Resource(err) => write!(f, "resource error: {err}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Validation(err) => Some(err),
            DispatchError::Resource(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DispatchError {
    fn from(err: ValidationError) -> Self {
        DispatchError::Validation(err)
    }
}
