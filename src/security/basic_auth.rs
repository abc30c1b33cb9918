use crate::security::{SecurityProvider, SecurityRequest};
use crate::spec::SecurityScheme;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

type VerifyFn = dyn Fn(&str, &str) -> bool + Send + Sync;

/// `Authorization: Basic` provider delegating the credential check to a closure.
///
/// Accepted requests carry `{"sub": <username>}` as claims.
pub struct BasicAuthProvider {
    verify: Box<VerifyFn>,
}

impl BasicAuthProvider {
    pub fn new<F>(verify: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            verify: Box::new(verify),
        }
    }

    fn credentials(req: &SecurityRequest) -> Option<(String, String)> {
        let encoded = req.get_header("authorization")?.strip_prefix("Basic ")?;
        let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, password) = text.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

impl SecurityProvider for BasicAuthProvider {
    fn validate(&self, scheme: &SecurityScheme, _scopes: &[String], req: &SecurityRequest) -> bool {
        match scheme {
            SecurityScheme::Http { scheme, .. } if scheme.eq_ignore_ascii_case("basic") => {}
            _ => {
                debug!("Basic auth validation failed: unsupported security scheme");
                return false;
            }
        }
        match Self::credentials(req) {
            Some((user, password)) => (self.verify)(&user, &password),
            None => {
                debug!("Basic auth validation failed: missing or malformed credentials");
                false
            }
        }
    }

    fn extract_claims(&self, _scheme: &SecurityScheme, req: &SecurityRequest) -> Option<Value> {
        Self::credentials(req).map(|(user, _)| json!({ "sub": user }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HeaderVec;
    use crate::router::ParamVec;
    use crate::spec::{basic_http_scheme, bearer_jwt_scheme};
    use std::sync::Arc;

    #[test]
    fn test_basic_credentials() {
        let provider = BasicAuthProvider::new(|u, p| u == "tom" && p == "meow");
        let mut headers = HeaderVec::new();
        let creds = general_purpose::STANDARD.encode("tom:meow");
        headers.push((Arc::from("Authorization"), format!("Basic {creds}")));
        let query = ParamVec::new();
        let cookies = HeaderVec::new();
        let req = SecurityRequest {
            headers: &headers,
            query: &query,
            cookies: &cookies,
        };
        assert!(provider.validate(&basic_http_scheme(), &[], &req));
        assert!(!provider.validate(&bearer_jwt_scheme(), &[], &req));
        assert_eq!(
            provider.extract_claims(&basic_http_scheme(), &req),
            Some(json!({"sub": "tom"}))
        );
    }
}
