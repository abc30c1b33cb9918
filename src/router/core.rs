//! Router core module, on the hot path for every request.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::capability::PathKind;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::radix::RadixRouter;

/// Maximum number of path/query parameters before heap allocation.
/// Resource identifier chains rarely go past four levels.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage.
///
/// Names are `Arc<str>` shared with the route tree; values are per-request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One bound (method, path) pair and the resource that answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    /// Documentation-form path, e.g. `/cats/{cat_id}/whiskers`
    pub path_pattern: String,
    /// Name of the resource binding that handles this route
    pub resource: Arc<str>,
    pub kind: PathKind,
}

/// Result of matching a request path to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteEntry>,
    /// Raw path parameter values in template order
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Route table for every bound resource.
///
/// Built once when the registry is frozen and shared read-only across request
/// coroutines afterwards.
#[derive(Clone)]
pub struct Router {
    radix: RadixRouter,
    routes: Vec<Arc<RouteEntry>>,
}

impl Router {
    pub fn new(routes: Vec<RouteEntry>) -> Self {
        let routes: Vec<Arc<RouteEntry>> = routes.into_iter().map(Arc::new).collect();
        let (radix, displaced) = RadixRouter::new(routes.clone());
        for old in &displaced {
            warn!(
                method = %old.method,
                path = %old.path_pattern,
                resource = %old.resource,
                "Route replaced by a later registration"
            );
        }
        info!(routes_count = routes.len(), "Router built");
        Self { radix, routes }
    }

    /// Match a request method and path (without query string).
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let (route, path_params) = self.radix.route(method, path)?;
        debug!(
            method = %method,
            path = %path,
            resource = %route.resource,
            params = ?path_params,
            "Route matched"
        );
        Some(RouteMatch { route, path_params })
    }

    /// Methods bound on a path; empty when no route matches the path at all.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        self.radix.allowed_methods(path)
    }

    pub fn routes(&self) -> &[Arc<RouteEntry>] {
        &self.routes
    }
}
