//! # Registry
//!
//! Registration happens in two phases.
//!
//! **Registration.** An [`Api`] collects resources. Each one is parsed, bound to a route
//! per declared capability and described by one spec operation per capability. A
//! [`ResourceGroup`] collects declarations before any registry exists and is merged
//! into an `Api` (or another group) later, exactly once, in declaration order.
//!
//! **Serving.** [`Api::build`] freezes everything into an [`App`]: the route table, the
//! spec document and the URL table are read-only from then on and the `App` can be
//! shared across request coroutines behind an `Arc`.
//!
//! ```rust
//! use crudrouter::capability::CapabilitySet;
//! use crudrouter::config::ApiConfig;
//! use crudrouter::dispatcher::HandlerRequest;
//! use crudrouter::envelope::Reply;
//! use crudrouter::registry::Api;
//! use crudrouter::resource::{BoundIds, RequestContext, Resource};
//! use crudrouter::schema::Schema;
//! use http::Method;
//! use serde_json::json;
//!
//! struct Cats;
//!
//! impl Resource for Cats {
//!     fn capabilities(&self) -> CapabilitySet {
//!         CapabilitySet::NON_LISTABLE_RETRIEVE
//!     }
//!
//!     fn retrieve(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
//!         Ok(json!({"id": ids.get_i64("cat_id"), "name": "Tom"}).into())
//!     }
//! }
//!
//! let schema = Schema::new("Cat", json!({
//!     "type": "object",
//!     "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
//! })).unwrap();
//!
//! let mut api = Api::new(ApiConfig::new("Cat API")).unwrap();
//! api.resource("/cats/<int:cat_id>", "Cat", schema, Cats).unwrap();
//! let app = api.build();
//!
//! let res = app.handle(&HandlerRequest::new(Method::GET, "/cats/7").with_header("Host", "feline.io"));
//! assert_eq!(res.status, 200);
//! assert_eq!(res.body["name"], "Tom");
//! ```

use crate::capability::{Capability, InputMode, PathKind};
use crate::config::ApiConfig;
use crate::dispatcher::{
    AuthPolicy, BoundOperation, DispatchEnv, DispatchError, HandlerRequest, HandlerResponse,
    ResourceBinding,
};
use crate::error::{DefaultErrorHandler, ErrorHandler, RegistryError};
use crate::resource::{Resource, SecurityRequirement};
use crate::router::{RouteEntry, Router};
use crate::schema::Schema;
use crate::security::SecurityProvider;
use crate::spec::{BodySchema, FrozenSpec, OperationSpec, SecurityScheme, SpecBuilder};
use crate::template::PathTemplate;
use crate::urls::{UrlError, UrlTable};
use http::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

/// A resource waiting to be registered.
#[derive(Clone)]
pub struct ResourceDeclaration {
    pub path: String,
    pub name: String,
    pub schema: Schema,
    pub resource: Arc<dyn Resource>,
}

impl ResourceDeclaration {
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        schema: Schema,
        resource: impl Resource,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            schema,
            resource: Arc::new(resource),
        }
    }
}

impl fmt::Debug for ResourceDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDeclaration")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("schema", &self.schema.name())
            .field("capabilities", &self.resource.capabilities())
            .finish()
    }
}

/// `CatWhisker` → `cat_whisker`
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            out.push('_');
            prev_lower = false;
        }
    }
    out
}

/// Root registry for the registration phase.
pub struct Api {
    config: ApiConfig,
    spec: SpecBuilder,
    bindings: Vec<ResourceBinding>,
    routes: Vec<RouteEntry>,
    urls: UrlTable,
    providers: HashMap<String, Arc<dyn SecurityProvider>>,
    error_handler: Arc<dyn ErrorHandler>,
    url_slot: Arc<OnceLock<Arc<UrlTable>>>,
}

impl Api {
    /// Start a registry. Configured schemes are declared next to the built-in ones.
    pub fn new(config: ApiConfig) -> Result<Self, RegistryError> {
        let mut spec = SpecBuilder::new(config.title.clone(), config.version.clone());
        spec.servers(config.servers.clone());
        for (name, scheme) in &config.security_schemes {
            spec.security_scheme(name.clone(), scheme.clone())?;
        }
        if let Some(default) = &config.default_security_scheme {
            if spec.get_security_scheme(default).is_none() {
                return Err(RegistryError::UnknownSecurityScheme(default.clone()));
            }
        }
        info!(title = %config.title, version = %config.version, "Api created");
        Ok(Self {
            config,
            spec,
            bindings: Vec::new(),
            routes: Vec::new(),
            urls: UrlTable::default(),
            providers: HashMap::new(),
            error_handler: Arc::new(DefaultErrorHandler),
            url_slot: Arc::new(OnceLock::new()),
        })
    }

    /// Declare an additional named scheme operations may reference.
    pub fn security_scheme(
        &mut self,
        name: impl Into<String>,
        scheme: SecurityScheme,
    ) -> Result<(), RegistryError> {
        Ok(self.spec.security_scheme(name, scheme)?)
    }

    /// Enforce a declared scheme with a provider.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownSecurityScheme`] if `scheme` has not been declared.
    pub fn security_provider(
        &mut self,
        scheme: impl Into<String>,
        provider: Arc<dyn SecurityProvider>,
    ) -> Result<(), RegistryError> {
        let scheme = scheme.into();
        if self.spec.get_security_scheme(&scheme).is_none() {
            return Err(RegistryError::UnknownSecurityScheme(scheme));
        }
        debug!(scheme = %scheme, "Security provider registered");
        self.providers.insert(scheme, provider);
        Ok(())
    }

    pub fn error_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.error_handler = Arc::new(handler);
    }

    pub fn resource(
        &mut self,
        path: &str,
        name: &str,
        schema: Schema,
        resource: impl Resource,
    ) -> Result<(), RegistryError> {
        self.add_resource(ResourceDeclaration::new(path, name, schema, resource))
    }

    /// Bind every declared capability of one resource.
    ///
    /// Every check runs before anything is recorded, so a failed registration leaves
    /// the spec document, routes and URL table exactly as they were.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateResource`] if the name is already registered
    /// - [`RegistryError::Template`] if the path template does not parse
    /// - [`RegistryError::NoCapabilities`] if the resource declares none
    /// - [`RegistryError::Spec`] for a taken schema name or (path, verb), or an
    ///   undeclared security scheme
    pub fn add_resource(&mut self, decl: ResourceDeclaration) -> Result<(), RegistryError> {
        if self.urls.contains(&decl.name) {
            return Err(RegistryError::DuplicateResource(decl.name));
        }
        let template = PathTemplate::parse_resource(&decl.path)?;
        let capabilities = decl.resource.capabilities();
        if capabilities.is_empty() {
            return Err(RegistryError::NoCapabilities(decl.name));
        }

        let name: Arc<str> = Arc::from(decl.name.as_str());
        let partial_name = capabilities
            .contains(Capability::Update)
            .then(|| format!("{name}Partial"));
        self.spec.check_schema(&name)?;
        if let Some(partial) = &partial_name {
            self.spec.check_schema(partial)?;
        }

        let mut planned = Vec::with_capacity(6);
        for cap in capabilities.iter() {
            let config = decl.resource.operation(cap);
            let (security, policy) = match config.security {
                SecurityRequirement::Default => {
                    (self.config.default_security_scheme.clone(), AuthPolicy::Required)
                }
                SecurityRequirement::Scheme(scheme) => (Some(scheme), AuthPolicy::Required),
                SecurityRequirement::Optional(scheme) => (Some(scheme), AuthPolicy::Optional),
                SecurityRequirement::Fresh(scheme) => (Some(scheme), AuthPolicy::Fresh),
                SecurityRequirement::Public => (None, AuthPolicy::Required),
            };
            let kind = cap.path_kind();
            let (path, path_params) = match kind {
                PathKind::Item => (template.item_path(), template.id_params()),
                PathKind::Collection => (template.collection_path(), template.parent_params()),
            };
            let input = cap.input_mode().map(|mode| match (mode, &partial_name) {
                (InputMode::Partial, Some(partial)) => BodySchema::single(partial.clone()),
                _ => BodySchema::single(name.to_string()),
            });
            let output = match (cap.has_output(), cap.is_many()) {
                (false, _) => None,
                (true, true) => Some(BodySchema::many(name.to_string())),
                (true, false) => Some(BodySchema::single(name.to_string())),
            };
            let spec_op = OperationSpec {
                method: cap.method(),
                path: path.to_string(),
                tag: name.to_string(),
                operation_id: format!("{}_{}", cap.as_str(), snake_case(&name)),
                path_params: path_params.to_vec(),
                query: config.query.clone(),
                input,
                output,
                status: cap.default_status(),
                security: security.clone(),
                description: config.description.unwrap_or_default(),
            };
            self.spec.check_operation(&spec_op)?;
            let bound = BoundOperation {
                security,
                policy,
                query: config.query,
            };
            planned.push((cap, kind, spec_op, bound));
        }

        self.spec
            .add_schema(name.to_string(), decl.schema.definition().clone())?;
        if let Some(partial) = &partial_name {
            self.spec
                .add_schema(partial.clone(), decl.schema.partial_definition())?;
        }
        self.spec.add_tag(name.to_string());

        let mut operations = Vec::with_capacity(planned.len());
        for (cap, kind, spec_op, bound) in planned {
            self.spec.add_operation(&spec_op)?;
            info!(
                resource = %name,
                verb = %spec_op.method,
                path = %spec_op.path,
                security = ?bound.security,
                policy = ?bound.policy,
                "Operation bound"
            );
            self.routes.push(RouteEntry {
                method: spec_op.method,
                path_pattern: spec_op.path,
                resource: Arc::clone(&name),
                kind,
            });
            operations.push((cap, bound));
        }

        self.urls.insert(Arc::clone(&name), template.clone(), capabilities);
        self.bindings.push(ResourceBinding::new(
            name,
            template,
            decl.schema,
            decl.resource,
            operations,
        ));
        Ok(())
    }

    /// Merge a group's declarations, in order. The group becomes bound to this registry.
    pub fn add_group(&mut self, group: &ResourceGroup) -> Result<(), RegistryError> {
        let pending = group.bind(GroupTarget::Root(Arc::clone(&self.url_slot)))?;
        info!(resources = pending.len(), "Resource group bound");
        for decl in pending {
            self.add_resource(decl)?;
        }
        Ok(())
    }

    /// Operations accumulated so far.
    pub fn spec(&self) -> &SpecBuilder {
        &self.spec
    }

    /// End registration.
    pub fn build(self) -> App {
        let urls = Arc::new(self.urls);
        // build consumes the Api, so the slot is always empty here
        let _ = self.url_slot.set(Arc::clone(&urls));
        let router = Router::new(self.routes);
        let spec = self.spec.freeze();
        let bindings = self
            .bindings
            .into_iter()
            .map(|b| (Arc::<str>::from(b.name()), b))
            .collect();
        App {
            router,
            bindings,
            spec,
            urls,
            providers: self.providers,
            error_handler: self.error_handler,
            spec_path: self.config.spec_path,
            default_base_url: self
                .config
                .servers
                .first()
                .map(|s| s.url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
        }
    }
}

/// Frozen registry for the serving phase.
pub struct App {
    router: Router,
    bindings: HashMap<Arc<str>, ResourceBinding>,
    spec: FrozenSpec,
    urls: Arc<UrlTable>,
    providers: HashMap<String, Arc<dyn SecurityProvider>>,
    error_handler: Arc<dyn ErrorHandler>,
    spec_path: String,
    default_base_url: String,
}

impl App {
    pub fn spec(&self) -> &FrozenSpec {
        &self.spec
    }

    pub fn urls(&self) -> &UrlTable {
        &self.urls
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn spec_path(&self) -> &str {
        &self.spec_path
    }

    /// Handle one request end to end.
    ///
    /// # Returns
    ///
    /// The rendered response, or the mapped error response (404, 405 with `Allow`,
    /// 401, 400, 422, or the error handler's). It always carries `X-Request-Id`.
    pub fn handle(&self, req: &HandlerRequest) -> HandlerResponse {
        let mut res = self.dispatch(req);
        res.set_header("X-Request-Id", req.request_id.to_string());
        res
    }

    fn dispatch(&self, req: &HandlerRequest) -> HandlerResponse {
        if req.method == Method::GET && req.path == self.spec_path {
            return HandlerResponse::json(200, self.spec.to_json().clone());
        }

        let Some(route) = self.router.route(&req.method, &req.path) else {
            let allowed = self.router.allowed_methods(&req.path);
            let err = if allowed.is_empty() {
                DispatchError::NotFound
            } else {
                DispatchError::MethodNotAllowed(allowed)
            };
            debug!(request_id = %req.request_id, method = %req.method, path = %req.path, error = %err, "No route");
            return self.error_response(err);
        };
        let Some(binding) = self.bindings.get(&route.route.resource) else {
            return self.error_response(DispatchError::NotFound);
        };

        let base_url = req
            .base_url()
            .unwrap_or_else(|| self.default_base_url.clone());
        let env = DispatchEnv {
            base_url: &base_url,
            urls: &self.urls,
            providers: &self.providers,
            schemes: &self.spec.document().components.security_schemes,
        };
        match binding.handle(&route, req, &env) {
            Ok(res) => res,
            Err(err) => {
                debug!(request_id = %req.request_id, resource = %binding.name(), error = %err, "Dispatch failed");
                self.error_response(err)
            }
        }
    }

    fn error_response(&self, err: DispatchError) -> HandlerResponse {
        match err {
            DispatchError::NotFound => HandlerResponse::error(404, "Not Found"),
            DispatchError::MethodNotAllowed(allowed) => {
                let mut res = HandlerResponse::error(405, "Method Not Allowed");
                let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                res.set_header("Allow", names.join(", "));
                res
            }
            DispatchError::Unauthorized { .. } => HandlerResponse::error(401, "Unauthorized"),
            DispatchError::BadRequest(message) => HandlerResponse::json(
                400,
                json!({ "error": "Bad Request", "message": message }),
            ),
            DispatchError::Validation(err) => HandlerResponse::json(
                422,
                json!({ "error": "Unprocessable Entity", "messages": err.to_json() }),
            ),
            DispatchError::Resource(err) => self.error_handler.handle(&err),
        }
    }
}

enum GroupTarget {
    Root(Arc<OnceLock<Arc<UrlTable>>>),
    Group(ResourceGroup),
}

struct GroupInner {
    pending: Mutex<Vec<ResourceDeclaration>>,
    target: OnceLock<GroupTarget>,
}

/// Resources declared before the registry that will serve them exists.
///
/// Cloning yields another handle to the same group.
#[derive(Clone)]
pub struct ResourceGroup {
    inner: Arc<GroupInner>,
}

impl Default for ResourceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GroupInner {
                pending: Mutex::new(Vec::new()),
                target: OnceLock::new(),
            }),
        }
    }

    pub fn resource(
        &self,
        path: &str,
        name: &str,
        schema: Schema,
        resource: impl Resource,
    ) -> Result<(), RegistryError> {
        self.add_resource(ResourceDeclaration::new(path, name, schema, resource))
    }

    /// Queue a declaration. Fails once the group is bound, since it would never be
    /// registered.
    pub fn add_resource(&self, decl: ResourceDeclaration) -> Result<(), RegistryError> {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_bound() {
            return Err(RegistryError::AlreadyBound);
        }
        pending.push(decl);
        Ok(())
    }

    /// Move another group's declarations into this one, after those already queued.
    pub fn add_group(&self, child: &ResourceGroup) -> Result<(), RegistryError> {
        if self.is_same(child) || self.ancestors().any(|g| g.is_same(child)) {
            return Err(RegistryError::GroupCycle);
        }
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_bound() {
            return Err(RegistryError::AlreadyBound);
        }
        let moved = child.bind(GroupTarget::Group(self.clone()))?;
        debug!(resources = moved.len(), "Resource group merged into parent group");
        pending.extend(moved);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.inner.target.get().is_some()
    }

    /// Names of the declarations still queued, in order.
    pub fn pending_names(&self) -> Vec<String> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    /// Path of a named resource, resolved by the root registry this group ends up in.
    pub fn path_for(&self, name: &str, params: &[(&str, Value)]) -> Result<String, UrlError> {
        self.root_urls()?.path_for(name, params)
    }

    pub fn url_for(
        &self,
        base_url: &str,
        name: &str,
        params: &[(&str, Value)],
    ) -> Result<String, UrlError> {
        self.root_urls()?.url_for(base_url, name, params)
    }

    fn is_same(&self, other: &ResourceGroup) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ancestors(&self) -> impl Iterator<Item = ResourceGroup> {
        let mut current = self.clone();
        std::iter::from_fn(move || match current.inner.target.get() {
            Some(GroupTarget::Group(parent)) => {
                current = parent.clone();
                Some(parent.clone())
            }
            _ => None,
        })
    }

    fn root_urls(&self) -> Result<Arc<UrlTable>, UrlError> {
        let mut current = self.clone();
        loop {
            let next = match current.inner.target.get() {
                None => return Err(UrlError::Unbound),
                Some(GroupTarget::Root(slot)) => {
                    return slot.get().cloned().ok_or(UrlError::NotServing)
                }
                Some(GroupTarget::Group(parent)) => parent.clone(),
            };
            current = next;
        }
    }

    /// Mark the group bound and hand over its queue.
    fn bind(&self, target: GroupTarget) -> Result<Vec<ResourceDeclaration>, RegistryError> {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner
            .target
            .set(target)
            .map_err(|_| RegistryError::AlreadyBound)?;
        Ok(std::mem::take(&mut *pending))
    }
}

impl fmt::Debug for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGroup")
            .field("pending", &self.pending_names())
            .field("bound", &self.is_bound())
            .finish()
    }
}
