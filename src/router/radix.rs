//! Radix tree implementation for route matching.
//!
//! Paths are split into segments; static segments match exactly and `{param}`
//! segments match any single segment. Routes live on terminal nodes keyed by HTTP
//! method. Static children are tried before parameter children, and a failed branch
//! backtracks so that `/cats/whiskers` (static) and `/cats/{cat_id}` can coexist.
//!
//! Lookup is O(k) in the number of path segments, independent of the number of
//! registered resources.

use http::Method;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{ParamVec, RouteEntry};

#[derive(Clone)]
struct RadixNode {
    /// The path segment this node represents (without leading /)
    segment: Cow<'static, str>,
    /// Route per HTTP method when this node terminates a path
    routes: HashMap<Method, Arc<RouteEntry>>,
    /// Parameter name if this segment is a path parameter (`{id}` -> `id`)
    param_name: Option<Arc<str>>,
    children: Vec<RadixNode>,
    /// Parameter children; several are allowed so sibling resources may name the
    /// same position differently (`/cats/{cat_id}/whiskers` vs `/cats/{id}`)
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn new(segment: Cow<'static, str>) -> Self {
        Self {
            segment,
            routes: HashMap::new(),
            param_name: None,
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn new_param(param_name: Arc<str>) -> Self {
        Self {
            segment: Cow::Borrowed(""),
            routes: HashMap::new(),
            param_name: Some(param_name),
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    /// Insert a route, returning the route it displaced for the same method.
    fn insert(&mut self, segments: &[&str], route: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.routes.insert(route.method.clone(), route);
        };

        if let Some(param_name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(param_name))
            {
                return child.insert(remaining, route);
            }
            let mut child = RadixNode::new_param(Arc::from(param_name));
            let displaced = child.insert(remaining, route);
            self.param_children.push(child);
            return displaced;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *segment) {
            return child.insert(remaining, route);
        }
        let mut child = RadixNode::new(Cow::Owned((*segment).to_string()));
        let displaced = child.insert(remaining, route);
        self.children.push(child);
        displaced
    }

    /// Find the terminal node for `segments` that satisfies `accept`.
    fn search<'n>(
        &'n self,
        segments: &[&str],
        accept: &dyn Fn(&RadixNode) -> bool,
        params: &mut ParamVec,
    ) -> Option<&'n RadixNode> {
        let Some((segment, remaining)) = segments.split_first() else {
            return accept(self).then_some(self);
        };

        for child in &self.children {
            if child.segment == *segment {
                if let Some(found) = child.search(remaining, accept, params) {
                    return Some(found);
                }
            }
        }

        for child in &self.param_children {
            if let Some(name) = &child.param_name {
                let value = urlencoding::decode(segment)
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| (*segment).to_string());
                params.push((Arc::clone(name), value));
                if let Some(found) = child.search(remaining, accept, params) {
                    return Some(found);
                }
                // Backtrack
                params.pop();
            }
        }

        None
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Radix tree router keyed by documentation path (`/cats/{cat_id}`) and method.
#[derive(Clone)]
pub struct RadixRouter {
    root: RadixNode,
}

impl RadixRouter {
    /// Build a tree from route entries. Later entries replace earlier ones registered
    /// for the same method and path; those displaced entries are returned.
    pub fn new(routes: Vec<Arc<RouteEntry>>) -> (Self, Vec<Arc<RouteEntry>>) {
        let mut root = RadixNode::new(Cow::Borrowed(""));
        let mut displaced = Vec::new();
        for route in routes {
            let pattern = route.path_pattern.clone();
            if let Some(old) = root.insert(&split_path(&pattern), route) {
                displaced.push(old);
            }
        }
        (Self { root }, displaced)
    }

    /// Match a request to a route, extracting (percent-decoded) path parameters.
    pub fn route(&self, method: &Method, path: &str) -> Option<(Arc<RouteEntry>, ParamVec)> {
        let segments = split_path(path);
        let mut params = ParamVec::new();
        let accept = |node: &RadixNode| node.routes.contains_key(method);
        let node = self.root.search(&segments, &accept, &mut params)?;
        let route = node.routes.get(method)?;
        Some((Arc::clone(route), params))
    }

    /// Methods registered for a path, used to distinguish 405 from 404.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let segments = split_path(path);
        let mut params = ParamVec::new();
        let accept = |node: &RadixNode| !node.routes.is_empty();
        match self.root.search(&segments, &accept, &mut params) {
            Some(node) => {
                let mut methods: Vec<Method> = node.routes.keys().cloned().collect();
                methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                methods
            }
            None => Vec::new(),
        }
    }
}
