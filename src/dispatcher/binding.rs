//! Per-resource request handling.
//!
//! A [`ResourceBinding`] is created by the registry for every bound resource. It
//! converts the matched path identifiers, enforces the operation's security provider,
//! validates the query and body, calls the capability method and renders the reply
//! with derived links.

use super::core::{DispatchError, HandlerRequest, HandlerResponse, RequestBody};
use crate::capability::{Capability, CapabilitySet, InputMode, PathKind};
use crate::envelope::Links;
use crate::resource::{BoundIds, RequestContext, Resource};
use crate::router::RouteMatch;
use crate::schema::{Fields, InputLocation, Schema};
use crate::security::{SecurityProvider, SecurityRequest};
use crate::spec::SecurityScheme;
use crate::template::{fill_path, PathTemplate};
use crate::urls::UrlTable;
use http::Method;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a registered provider is applied to an operation's scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    #[default]
    Required,
    /// Requests without credentials proceed with no claims
    Optional,
    /// Claims must carry `"fresh": true`
    Fresh,
}

/// What the registry resolved for one bound capability.
#[derive(Debug, Clone, Default)]
pub struct BoundOperation {
    /// Effective scheme name, `None` when public
    pub security: Option<String>,
    pub policy: AuthPolicy,
    pub query: Option<Schema>,
}

/// Shared, read-only state a binding needs while handling a request.
pub struct DispatchEnv<'a> {
    /// `scheme://host` links and generated URLs are rooted at
    pub base_url: &'a str,
    pub urls: &'a UrlTable,
    pub providers: &'a HashMap<String, Arc<dyn SecurityProvider>>,
    pub schemes: &'a BTreeMap<String, SecurityScheme>,
}

pub struct ResourceBinding {
    name: Arc<str>,
    template: PathTemplate,
    schema: Schema,
    capabilities: CapabilitySet,
    operations: Vec<(Capability, BoundOperation)>,
    resource: Arc<dyn Resource>,
}

impl ResourceBinding {
    pub fn new(
        name: Arc<str>,
        template: PathTemplate,
        schema: Schema,
        resource: Arc<dyn Resource>,
        operations: Vec<(Capability, BoundOperation)>,
    ) -> Self {
        let capabilities = operations.iter().map(|(c, _)| *c).collect();
        Self {
            name,
            template,
            schema,
            capabilities,
            operations,
            resource,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn operation(&self, cap: Capability) -> Option<&BoundOperation> {
        self.operations
            .iter()
            .find(|(c, _)| *c == cap)
            .map(|(_, op)| op)
    }

    fn capability_for(&self, kind: PathKind, method: &Method) -> Option<Capability> {
        self.capabilities
            .on_path(kind)
            .find(|c| &c.method() == method)
    }

    /// Convert the raw path values to their declared types. A value that does not
    /// convert means the URL names nothing.
    fn bind_ids(&self, route: &RouteMatch) -> Result<BoundIds, DispatchError> {
        let params = match route.route.kind {
            PathKind::Item => self.template.id_params(),
            PathKind::Collection => self.template.parent_params(),
        };
        let mut ids = BoundIds::new();
        for param in params {
            let raw = route
                .get_path_param(&param.name)
                .ok_or(DispatchError::NotFound)?;
            let value = param.id_type.convert(raw).ok_or_else(|| {
                debug!(
                    resource = %self.name,
                    param = %param.name,
                    raw = %raw,
                    expected = %param.id_type,
                    "Path identifier did not convert"
                );
                DispatchError::NotFound
            })?;
            ids.push(param.name.clone(), value);
        }
        Ok(ids)
    }

    fn authorize(
        &self,
        scheme_name: &str,
        policy: AuthPolicy,
        req: &HandlerRequest,
        env: &DispatchEnv<'_>,
    ) -> Result<Option<Value>, DispatchError> {
        let Some(provider) = env.providers.get(scheme_name) else {
            return Ok(None);
        };
        let unauthorized = || DispatchError::Unauthorized {
            scheme: scheme_name.to_string(),
        };
        let Some(scheme) = env.schemes.get(scheme_name) else {
            warn!(scheme = %scheme_name, "Provider registered for undeclared scheme");
            return Err(unauthorized());
        };
        let sec_req = SecurityRequest {
            headers: &req.headers,
            query: &req.query_params,
            cookies: &req.cookies,
        };
        if policy == AuthPolicy::Optional && !provider.has_credentials(scheme, &sec_req) {
            debug!(
                request_id = %req.request_id,
                resource = %self.name,
                scheme = %scheme_name,
                "No credentials on optional scheme, continuing anonymously"
            );
            return Ok(None);
        }
        if !provider.validate(scheme, &[], &sec_req) {
            debug!(
                request_id = %req.request_id,
                resource = %self.name,
                scheme = %scheme_name,
                "Security validation failed"
            );
            return Err(unauthorized());
        }
        let claims = provider.extract_claims(scheme, &sec_req);
        if policy == AuthPolicy::Fresh {
            let fresh = claims
                .as_ref()
                .and_then(|c| c.get("fresh"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !fresh {
                debug!(
                    request_id = %req.request_id,
                    resource = %self.name,
                    scheme = %scheme_name,
                    "Fresh credentials required"
                );
                return Err(unauthorized());
            }
        }
        Ok(claims)
    }

    fn load_query(&self, op: &BoundOperation, req: &HandlerRequest) -> Result<Fields, DispatchError> {
        let Some(query) = &op.query else {
            return Ok(Fields::new());
        };
        let raw = query.coerce_pairs(
            req.query_params
                .iter()
                .map(|(k, v)| (k.as_ref(), v.as_str())),
        );
        Ok(query.load_query(&raw)?)
    }

    fn load_body(&self, mode: InputMode, req: &HandlerRequest) -> Result<Fields, DispatchError> {
        let (raw, location) = match &req.body {
            RequestBody::Empty => (Fields::new(), InputLocation::Json),
            RequestBody::Json(Value::Object(map)) => (map.clone(), InputLocation::Json),
            RequestBody::Json(_) => {
                return Err(DispatchError::BadRequest(
                    "request body must be a JSON object".to_string(),
                ))
            }
            RequestBody::Form(pairs) => (
                self.schema
                    .coerce_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
                InputLocation::Form,
            ),
            RequestBody::Invalid(reason) => return Err(DispatchError::BadRequest(reason.clone())),
        };
        Ok(self.schema.load(&raw, mode, location)?)
    }

    fn url(&self, base_url: &str, doc_path: &str, ids: &BoundIds) -> String {
        let filled = fill_path(doc_path, |name| ids.get(name)).unwrap_or_else(|missing| {
            warn!(resource = %self.name, missing = %missing, "Link path could not be filled");
            doc_path.to_string()
        });
        format!("{}{}", base_url.trim_end_matches('/'), filled)
    }

    /// Links every response of this capability carries before the reply's own.
    fn base_links(&self, cap: Capability, base_url: &str, ids: &BoundIds) -> Links {
        let parents = ids.prefix(self.template.parent_params().len());
        let collection = self.url(base_url, self.template.collection_path(), &parents);
        match cap {
            Capability::List => Links::new().with("self", collection),
            Capability::Retrieve => Links::new()
                .with("self", self.url(base_url, self.template.item_path(), ids))
                .with("collection", collection),
            _ => Links::new().with("collection", collection),
        }
    }

    /// Handle one matched request.
    ///
    /// Security runs before the query and body are loaded, so a rejected request never
    /// has its input validated.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MethodNotAllowed`] if the verb is not bound on this path kind
    /// - [`DispatchError::NotFound`] if a path identifier does not convert
    /// - [`DispatchError::Unauthorized`] if the operation's provider rejects the request
    /// - [`DispatchError::BadRequest`] or [`DispatchError::Validation`] for bad input
    /// - [`DispatchError::Resource`] for errors raised by the capability method
    pub fn handle(
        &self,
        route: &RouteMatch,
        req: &HandlerRequest,
        env: &DispatchEnv<'_>,
    ) -> Result<HandlerResponse, DispatchError> {
        let kind = route.route.kind;
        let cap = self
            .capability_for(kind, &req.method)
            .ok_or_else(|| DispatchError::MethodNotAllowed(self.allowed(kind)))?;
        let op = self.operation(cap).cloned().unwrap_or_default();
        let ids = self.bind_ids(route)?;

        let claims = match &op.security {
            Some(scheme) => self.authorize(scheme, op.policy, req, env)?,
            None => None,
        };
        let query = self.load_query(&op, req)?;
        let fields = match cap.input_mode() {
            Some(mode) => Some(self.load_body(mode, req)?),
            None => None,
        };

        let ctx = RequestContext {
            request_id: req.request_id,
            base_url: env.base_url,
            headers: &req.headers,
            query,
            claims,
            urls: env.urls,
        };
        debug!(
            request_id = %req.request_id,
            resource = %self.name,
            capability = %cap,
            ids = ids.len(),
            "Dispatching to resource"
        );

        let fields = fields.unwrap_or_default();
        let reply = match cap {
            Capability::Create => self.resource.create(&ctx, &ids, fields),
            Capability::List => self.resource.list(&ctx, &ids, &ctx.query),
            Capability::Retrieve => self.resource.retrieve(&ctx, &ids),
            Capability::Replace => self.resource.replace(&ctx, &ids, fields),
            Capability::Update => self.resource.update(&ctx, &ids, fields),
            Capability::Delete => {
                self.resource
                    .delete(&ctx, &ids)
                    .map_err(DispatchError::Resource)?;
                return Ok(HandlerResponse::empty(cap.default_status()));
            }
        }
        .map_err(DispatchError::Resource)?;

        let base_links = self.base_links(cap, env.base_url, &ids);
        Ok(reply
            .into_envelope()
            .render(&self.schema, cap.is_many(), base_links, cap.default_status()))
    }

    fn allowed(&self, kind: PathKind) -> Vec<Method> {
        let mut methods: Vec<Method> = self.capabilities.on_path(kind).map(Capability::method).collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}
