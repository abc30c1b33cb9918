//! # Security Module
//!
//! Optional enforcement for the security schemes operations declare.
//!
//! Every operation bound by the registry names at most one scheme (see
//! [`crate::resource::SecurityRequirement`]). The scheme always appears in the spec
//! document; when a [`SecurityProvider`] is also registered for it, the dispatcher asks
//! the provider to validate each request before any input is loaded. A rejected request
//! gets `401` and never reaches the resource. Claims the provider extracts are handed to
//! the capability method through [`crate::resource::RequestContext::claims`].
//! Optional operations skip validation for requests without credentials
//! ([`SecurityProvider::has_credentials`]); fresh ones also need `"fresh": true` in the
//! claims.
//!
//! ## Providers
//!
//! - [`BearerJwtProvider`]: `Authorization: Bearer <jwt>` verified as HS256 against a
//!   shared secret, with `exp`, optional `token_type` and scope checks
//! - [`BasicAuthProvider`]: `Authorization: Basic` credentials checked by a closure
//!
//! ```rust
//! use crudrouter::security::{SecurityProvider, SecurityRequest};
//! use crudrouter::spec::SecurityScheme;
//!
//! struct ApiKeyProvider { key: String }
//!
//! impl SecurityProvider for ApiKeyProvider {
//!     fn validate(&self, _scheme: &SecurityScheme, _scopes: &[String], req: &SecurityRequest) -> bool {
//!         req.get_header("x-api-key").map(|k| k == self.key).unwrap_or(false)
//!     }
//! }
//! ```

use crate::dispatcher::{header_value, HeaderVec};
use crate::router::ParamVec;
use crate::spec::SecurityScheme;
use serde_json::Value;
use std::sync::Arc;

/// Credentials view of a request, borrowed from the dispatcher's parsed request.
pub struct SecurityRequest<'a> {
    pub headers: &'a HeaderVec,
    pub query: &'a ParamVec,
    pub cookies: &'a HeaderVec,
}

fn exact<'v>(pairs: &'v [(Arc<str>, String)], name: &str) -> Option<&'v str> {
    pairs
        .iter()
        .find(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}

impl SecurityRequest<'_> {
    pub fn get_header(&self, name: &str) -> Option<&str> {
        header_value(self.headers, name)
    }

    /// Query arguments and cookies match names exactly.
    pub fn get_query(&self, name: &str) -> Option<&str> {
        exact(self.query, name)
    }

    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        exact(self.cookies, name)
    }
}

/// Validates requests for one named security scheme.
pub trait SecurityProvider: Send + Sync {
    /// `true` if the request carries acceptable credentials for `scheme`.
    fn validate(&self, scheme: &SecurityScheme, scopes: &[String], req: &SecurityRequest) -> bool;

    /// Claims for a request `validate` accepted. `None` when the provider has none.
    fn extract_claims(&self, scheme: &SecurityScheme, req: &SecurityRequest) -> Option<Value> {
        let _ = (scheme, req);
        None
    }

    /// Whether the request presents any credentials for `scheme` at all. Operations
    /// with optional security let requests without credentials through anonymously.
    fn has_credentials(&self, scheme: &SecurityScheme, req: &SecurityRequest) -> bool {
        let _ = scheme;
        req.get_header("authorization").is_some()
    }
}

pub use basic_auth::BasicAuthProvider;
pub use bearer_jwt::BearerJwtProvider;

mod basic_auth;
mod bearer_jwt;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lookups() {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Authorization"), "Bearer abc".to_string()));
        let mut query = ParamVec::new();
        query.push((Arc::from("api_key"), "k1".to_string()));
        let mut cookies = HeaderVec::new();
        cookies.push((Arc::from("session"), "s1".to_string()));
        let req = SecurityRequest {
            headers: &headers,
            query: &query,
            cookies: &cookies,
        };
        assert_eq!(req.get_header("authorization"), Some("Bearer abc"));
        assert_eq!(req.get_query("api_key"), Some("k1"));
        assert_eq!(req.get_query("API_KEY"), None);
        assert_eq!(req.get_cookie("session"), Some("s1"));
    }
}
