use crate::security::{SecurityProvider, SecurityRequest};
use crate::spec::SecurityScheme;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::{debug, warn};

/// Default clock skew tolerance for `exp`, in seconds.
const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Bearer provider for HS256 JSON Web Tokens signed with a shared secret.
///
/// A token is accepted only when its signature verifies against the secret and its
/// `exp` claim lies in the future (within the configured leeway). When a token type is
/// configured, the `token_type` claim must match it, which keeps refresh tokens off
/// routes that require access tokens. Required scopes are read from a whitespace
/// separated `scope` claim.
pub struct BearerJwtProvider {
    key: DecodingKey,
    leeway_secs: u64,
    cookie_name: Option<String>,
    token_type: Option<String>,
}

impl BearerJwtProvider {
    /// Create a provider verifying tokens signed with `secret`.
    ///
    /// # Arguments
    ///
    /// * `secret` - HMAC secret shared with the token issuer
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            leeway_secs: DEFAULT_LEEWAY_SECS,
            cookie_name: None,
            token_type: None,
        }
    }

    /// Clock skew tolerance applied to `exp`.
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Also accept the token from this cookie.
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Require `"token_type": <kind>` in the claims.
    pub fn token_type(mut self, kind: impl Into<String>) -> Self {
        self.token_type = Some(kind.into());
        self
    }

    fn extract_token<'a>(&self, req: &'a SecurityRequest) -> Option<&'a str> {
        if let Some(name) = &self.cookie_name {
            if let Some(t) = req.get_cookie(name) {
                return Some(t);
            }
        }
        req.get_header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
    }

    /// Verified claims of a well-formed, unexpired token of the expected type.
    fn decode(&self, token: &str) -> Option<Value> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = self.leeway_secs;

        let claims = match jsonwebtoken::decode::<Value>(token, &self.key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        debug!("BearerJWT token validation failed: token expired")
                    }
                    ErrorKind::InvalidSignature => {
                        debug!("BearerJWT token validation failed: invalid signature")
                    }
                    ErrorKind::MissingRequiredClaim(claim) => {
                        debug!(claim = %claim, "BearerJWT token validation failed: missing claim")
                    }
                    _ => debug!(error = ?e, "BearerJWT token validation failed: malformed token"),
                }
                return None;
            }
        };

        if let Some(expected) = &self.token_type {
            let actual = claims.get("token_type").and_then(Value::as_str);
            if actual != Some(expected.as_str()) {
                warn!(
                    expected = %expected,
                    actual = ?actual,
                    "BearerJWT validation failed: wrong token type"
                );
                return None;
            }
        }
        Some(claims)
    }

    pub(crate) fn validate_token(&self, token: &str, scopes: &[String]) -> bool {
        let Some(claims) = self.decode(token) else {
            return false;
        };
        let token_scopes = claims.get("scope").and_then(Value::as_str).unwrap_or("");
        let has_all_scopes = scopes
            .iter()
            .all(|s| token_scopes.split_whitespace().any(|ts| ts == s));
        if !has_all_scopes {
            warn!(
                token_scopes = %token_scopes,
                required = ?scopes,
                "BearerJWT validation failed: missing required scopes"
            );
        }
        has_all_scopes
    }
}

impl SecurityProvider for BearerJwtProvider {
    fn validate(&self, scheme: &SecurityScheme, scopes: &[String], req: &SecurityRequest) -> bool {
        match scheme {
            SecurityScheme::Http { scheme, .. } if scheme.eq_ignore_ascii_case("bearer") => {}
            _ => {
                debug!("BearerJWT validation failed: unsupported security scheme");
                return false;
            }
        }
        match self.extract_token(req) {
            Some(token) => self.validate_token(token, scopes),
            None => {
                debug!("BearerJWT validation failed: missing token");
                false
            }
        }
    }

    fn extract_claims(&self, _scheme: &SecurityScheme, req: &SecurityRequest) -> Option<Value> {
        self.extract_token(req).and_then(|t| self.decode(t))
    }

    /// A malformed `Authorization` header still counts, so it is rejected rather than
    /// treated as anonymous.
    fn has_credentials(&self, _scheme: &SecurityScheme, req: &SecurityRequest) -> bool {
        req.get_header("authorization").is_some()
            || self
                .cookie_name
                .as_deref()
                .is_some_and(|name| req.get_cookie(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HeaderVec;
    use crate::router::ParamVec;
    use crate::spec::bearer_jwt_scheme;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(mut claims: Value, secret: &str) -> String {
        if claims.get("exp").is_none() {
            claims["exp"] = json!(now() + 600);
        }
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn check(provider: &BearerJwtProvider, auth: &str) -> (bool, Option<Value>) {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("authorization"), auth.to_string()));
        let query = ParamVec::new();
        let cookies = HeaderVec::new();
        let req = SecurityRequest {
            headers: &headers,
            query: &query,
            cookies: &cookies,
        };
        let scheme = bearer_jwt_scheme();
        (
            provider.validate(&scheme, &[], &req),
            provider.extract_claims(&scheme, &req),
        )
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let p = BearerJwtProvider::new("sig");
        let t = token(json!({"sub": "tom"}), "sig");
        let (ok, claims) = check(&p, &format!("Bearer {t}"));
        assert!(ok);
        assert_eq!(claims.unwrap()["sub"], "tom");
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let p = BearerJwtProvider::new("sig");
        let t = token(json!({"sub": "tom"}), "other");
        assert_eq!(check(&p, &format!("Bearer {t}")), (false, None));
        assert!(!check(&p, "Basic dG9tOnB3").0);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let p = BearerJwtProvider::new("sig");
        let genuine = token(json!({"sub": "tom"}), "sig");
        let forged_claims = token(json!({"sub": "admin"}), "whatever");
        let mut parts: Vec<&str> = genuine.split('.').collect();
        parts[1] = forged_claims.split('.').nth(1).unwrap();
        let spliced = parts.join(".");
        assert_eq!(check(&p, &format!("Bearer {spliced}")), (false, None));
    }

    #[test]
    fn test_literal_signature_part_is_not_enough() {
        let p = BearerJwtProvider::new("s3cr1t");
        // {"alg":"HS256"}.{"sub":"admin","exp":9999999999}.s3cr1t
        let t = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhZG1pbiIsImV4cCI6OTk5OTk5OTk5OX0.s3cr1t";
        assert!(!check(&p, &format!("Bearer {t}")).0);
    }

    #[test]
    fn test_expired_and_exp_less_tokens_are_rejected() {
        let p = BearerJwtProvider::new("sig");
        let expired = token(json!({"sub": "tom", "exp": now() - 3600}), "sig");
        assert_eq!(check(&p, &format!("Bearer {expired}")), (false, None));

        let no_exp = jsonwebtoken::encode(
            &Header::default(),
            &json!({"sub": "tom"}),
            &EncodingKey::from_secret(b"sig"),
        )
        .unwrap();
        assert!(!check(&p, &format!("Bearer {no_exp}")).0);
    }

    #[test]
    fn test_leeway_accepts_recent_expiry() {
        let p = BearerJwtProvider::new("sig").leeway(120);
        let t = token(json!({"exp": now() - 10}), "sig");
        assert!(check(&p, &format!("Bearer {t}")).0);
    }

    #[test]
    fn test_token_type_enforced() {
        let p = BearerJwtProvider::new("sig").token_type("access");
        let refresh = token(json!({"token_type": "refresh"}), "sig");
        let access = token(json!({"token_type": "access"}), "sig");
        assert!(!check(&p, &format!("Bearer {refresh}")).0);
        assert!(check(&p, &format!("Bearer {access}")).0);
    }

    #[test]
    fn test_scopes() {
        let p = BearerJwtProvider::new("sig");
        let t = token(json!({"scope": "read write"}), "sig");
        assert!(p.validate_token(&t, &["read".to_string()]));
        assert!(!p.validate_token(&t, &["admin".to_string()]));
    }

    #[test]
    fn test_has_credentials() {
        let p = BearerJwtProvider::new("sig").cookie_name("access_token_cookie");
        let scheme = bearer_jwt_scheme();
        let query = ParamVec::new();
        let empty = HeaderVec::new();
        let mut cookies = HeaderVec::new();
        cookies.push((Arc::from("access_token_cookie"), "x".to_string()));
        let anonymous = SecurityRequest {
            headers: &empty,
            query: &query,
            cookies: &empty,
        };
        let with_cookie = SecurityRequest {
            headers: &empty,
            query: &query,
            cookies: &cookies,
        };
        assert!(!p.has_credentials(&scheme, &anonymous));
        assert!(p.has_credentials(&scheme, &with_cookie));
    }
}
