//! # Resources
//!
//! A resource is any type implementing [`Resource`]. It declares the capabilities it
//! supports through [`Resource::capabilities`] and overrides the matching methods; the
//! registry binds routes and spec operations for exactly that set.
//!
//! ```rust
//! use crudrouter::capability::{Capability, CapabilitySet};
//! use crudrouter::envelope::Reply;
//! use crudrouter::resource::{BoundIds, OperationConfig, RequestContext, Resource};
//! use crudrouter::schema::Fields;
//! use serde_json::json;
//!
//! struct Ping;
//!
//! impl Resource for Ping {
//!     fn capabilities(&self) -> CapabilitySet {
//!         CapabilitySet::NON_LISTABLE_RETRIEVE
//!     }
//!
//!     fn operation(&self, _cap: Capability) -> OperationConfig {
//!         OperationConfig::new().description("Answer a ping.")
//!     }
//!
//!     fn retrieve(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
//!         Ok(json!({"id": ids.last().cloned()}).into())
//!     }
//! }
//! ```

use crate::capability::{Capability, CapabilitySet};
use crate::dispatcher::{header_value, HeaderVec};
use crate::envelope::Reply;
use crate::ids::RequestId;
use crate::router::MAX_INLINE_PARAMS;
use crate::schema::{Fields, Schema};
use crate::urls::{UrlError, UrlTable};
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Which security scheme an operation requires.
///
/// `Optional` and `Fresh` document the scheme exactly like `Scheme`; they only change
/// how a registered provider is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SecurityRequirement {
    /// Use the registry's default scheme, if one is configured
    #[default]
    Default,
    Scheme(String),
    /// Anonymous requests are let through; credentials that are sent must be valid
    Optional(String),
    /// Valid credentials whose claims carry `"fresh": true`
    Fresh(String),
    /// Publicly accessible even when a default scheme is configured
    Public,
}

/// Per-capability metadata read once at registration.
#[derive(Debug, Clone, Default)]
pub struct OperationConfig {
    pub security: SecurityRequirement,
    /// Extra query arguments, validated before the capability method runs
    pub query: Option<Schema>,
    pub description: Option<String>,
}

impl OperationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn security(mut self, scheme: impl Into<String>) -> Self {
        self.security = SecurityRequirement::Scheme(scheme.into());
        self
    }

    #[must_use]
    pub fn optional_security(mut self, scheme: impl Into<String>) -> Self {
        self.security = SecurityRequirement::Optional(scheme.into());
        self
    }

    #[must_use]
    pub fn fresh_security(mut self, scheme: impl Into<String>) -> Self {
        self.security = SecurityRequirement::Fresh(scheme.into());
        self
    }

    #[must_use]
    pub fn public(mut self) -> Self {
        self.security = SecurityRequirement::Public;
        self
    }

    #[must_use]
    pub fn query(mut self, schema: Schema) -> Self {
        self.query = Some(schema);
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Typed path identifiers bound for one request, in template order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundIds(SmallVec<[(Arc<str>, Value); MAX_INLINE_PARAMS]>);

impl BoundIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Arc<str>, value: Value) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The innermost identifier, i.e. the resource's own id on item routes.
    pub fn last(&self) -> Option<&Value> {
        self.0.last().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// The first `n` identifiers.
    pub fn prefix(&self, n: usize) -> BoundIds {
        BoundIds(self.0.iter().take(n).cloned().collect())
    }

    /// `(name, value)` pairs for URL generation.
    pub fn as_params(&self) -> Vec<(&str, Value)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v.clone())).collect()
    }
}

/// Request-scoped context handed to every capability method.
pub struct RequestContext<'a> {
    pub request_id: RequestId,
    /// `scheme://host` the request was addressed to
    pub base_url: &'a str,
    pub headers: &'a HeaderVec,
    /// Validated extra query arguments (empty when none are declared)
    pub query: Fields,
    /// Claims extracted by the operation's security provider
    pub claims: Option<Value>,
    pub(crate) urls: &'a UrlTable,
}

impl<'a> RequestContext<'a> {
    /// Absolute URL of a named resource, e.g. for `next` links.
    pub fn url_for(&self, name: &str, params: &[(&str, Value)]) -> Result<String, UrlError> {
        self.urls.url_for(self.base_url, name, params)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(self.headers, name)
    }
}

fn unsupported(capability: Capability) -> anyhow::Error {
    anyhow::anyhow!("resource declares {capability} but does not implement it")
}

/// Capability interface consumed by the dispatcher.
///
/// Only methods for declared capabilities are ever called. Errors are domain errors:
/// the dispatcher hands them to the registry's error handler unchanged.
pub trait Resource: Send + Sync + 'static {
    fn capabilities(&self) -> CapabilitySet;

    /// Security, query arguments and description for one capability.
    fn operation(&self, capability: Capability) -> OperationConfig {
        let _ = capability;
        OperationConfig::default()
    }

    /// `POST` on the collection path. `parents` holds every identifier but the last.
    fn create(
        &self,
        ctx: &RequestContext<'_>,
        parents: &BoundIds,
        fields: Fields,
    ) -> anyhow::Result<Reply> {
        let _ = (ctx, parents, fields);
        Err(unsupported(Capability::Create))
    }

    /// `GET` on the collection path. `query` repeats `ctx.query` for convenience.
    fn list(
        &self,
        ctx: &RequestContext<'_>,
        parents: &BoundIds,
        query: &Fields,
    ) -> anyhow::Result<Reply> {
        let _ = (ctx, parents, query);
        Err(unsupported(Capability::List))
    }

    fn retrieve(&self, ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
        let _ = (ctx, ids);
        Err(unsupported(Capability::Retrieve))
    }

    /// `PUT` with a full body. Defaults to [`Resource::update`], which is correct for
    /// resources whose update already handles complete records.
    fn replace(
        &self,
        ctx: &RequestContext<'_>,
        ids: &BoundIds,
        fields: Fields,
    ) -> anyhow::Result<Reply> {
        self.update(ctx, ids, fields)
    }

    /// `PATCH` with only the fields the client sent.
    fn update(
        &self,
        ctx: &RequestContext<'_>,
        ids: &BoundIds,
        fields: Fields,
    ) -> anyhow::Result<Reply> {
        let _ = (ctx, ids, fields);
        Err(unsupported(Capability::Update))
    }

    fn delete(&self, ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<()> {
        let _ = (ctx, ids);
        Err(unsupported(Capability::Delete))
    }
}
