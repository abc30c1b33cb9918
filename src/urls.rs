//! URL generation by resource name.
//!
//! Given a resource name and a set of parameters, [`UrlTable::path_for`] chooses the
//! resource path the parameters can fill, preferring the path bound for GET, then PUT,
//! PATCH, DELETE and POST. Among equally preferred paths the item path (more
//! identifiers) wins. Parameters the path does not consume become the query string, in
//! the order given.

use crate::capability::{CapabilitySet, PathKind};
use crate::template::{fill_path, value_to_segment, PathTemplate};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const METHOD_PREFERENCE: [Method; 5] = [
    Method::GET,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::POST,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    UnknownResource(String),
    /// No bound path of the resource can be filled from the given parameters
    MissingParameters { resource: String, missing: Vec<String> },
    /// A resource group was asked for a URL before it was bound to a registry
    Unbound,
    /// The root registry has not been frozen yet
    NotServing,
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::UnknownResource(name) => write!(f, "no resource named '{name}'"),
            UrlError::MissingParameters { resource, missing } => write!(
                f,
                "cannot build a URL for '{resource}': missing {}",
                missing.join(", ")
            ),
            UrlError::Unbound => write!(f, "resource group is not bound to a registry"),
            UrlError::NotServing => write!(f, "registry has not been built yet"),
        }
    }
}

impl std::error::Error for UrlError {}

#[derive(Debug, Clone)]
struct UrlEntry {
    template: PathTemplate,
    capabilities: CapabilitySet,
}

/// Name → path lookup for every bound resource. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct UrlTable {
    entries: HashMap<Arc<str>, UrlEntry>,
}

impl UrlTable {
    pub(crate) fn insert(&mut self, name: Arc<str>, template: PathTemplate, capabilities: CapabilitySet) {
        self.entries.insert(
            name,
            UrlEntry {
                template,
                capabilities,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Path plus query string for a named resource.
    ///
    /// Bound paths are tried in verb order GET, PUT, PATCH, DELETE, POST; the first one
    /// every placeholder of which is in `params` wins. Parameters the path does not use
    /// become the query string.
    ///
    /// # Arguments
    ///
    /// * `name` - Registered resource name, e.g. `CatWhisker`
    /// * `params` - Placeholder and query values
    ///
    /// # Errors
    ///
    /// - [`UrlError::UnknownResource`] if no resource has that name
    /// - [`UrlError::MissingParameters`] if no bound path can be filled
    pub fn path_for(&self, name: &str, params: &[(&str, Value)]) -> Result<String, UrlError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| UrlError::UnknownResource(name.to_string()))?;

        let mut tried: Vec<PathKind> = Vec::with_capacity(2);
        let mut missing: Vec<String> = Vec::new();
        for method in &METHOD_PREFERENCE {
            for kind in [PathKind::Item, PathKind::Collection] {
                if tried.contains(&kind) || !entry.capabilities.serves(kind, method) {
                    continue;
                }
                tried.push(kind);
                let doc_path = match kind {
                    PathKind::Item => entry.template.item_path(),
                    PathKind::Collection => entry.template.collection_path(),
                };
                let lookup = |n: &str| params.iter().find(|(k, _)| *k == n).map(|(_, v)| v);
                match fill_path(doc_path, lookup) {
                    Ok(path) => return Ok(with_query(path, doc_path, params)),
                    Err(name) => missing.push(name),
                }
            }
        }

        missing.dedup();
        Err(UrlError::MissingParameters {
            resource: name.to_string(),
            missing,
        })
    }

    /// Absolute URL: `base_url` followed by [`UrlTable::path_for`].
    pub fn url_for(
        &self,
        base_url: &str,
        name: &str,
        params: &[(&str, Value)],
    ) -> Result<String, UrlError> {
        let path = self.path_for(name, params)?;
        Ok(format!("{}{}", base_url.trim_end_matches('/'), path))
    }
}

fn with_query(mut path: String, doc_path: &str, params: &[(&str, Value)]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in params {
        if doc_path.contains(&format!("{{{key}}}")) {
            continue;
        }
        query.append_pair(key, &value_to_segment(value));
        any = true;
    }
    if any {
        path.push('?');
        path.push_str(&query.finish());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use serde_json::json;

    fn table() -> UrlTable {
        let mut t = UrlTable::default();
        t.insert(
            Arc::from("Cat"),
            PathTemplate::parse_resource("/cats/<int:cat_id>").unwrap(),
            CapabilitySet::CRUD,
        );
        t.insert(
            Arc::from("CatAction"),
            PathTemplate::parse_resource("/cats/<int:cat_id>/actions/<int:cat_action_id>").unwrap(),
            CapabilitySet::of(&[Capability::Create, Capability::Update]),
        );
        t.insert(
            Arc::from("CatSync"),
            PathTemplate::parse_resource("/cats/<int:cat_id>/syncs/<cat_sync_id>").unwrap(),
            CapabilitySet::of(&[Capability::Create, Capability::Retrieve]),
        );
        t
    }

    #[test]
    fn test_collection_with_query() {
        assert_eq!(
            table().path_for("Cat", &[("page", json!(2))]).unwrap(),
            "/cats?page=2"
        );
    }

    #[test]
    fn test_item_preferred_when_all_ids_given() {
        assert_eq!(
            table().path_for("Cat", &[("cat_id", json!(1))]).unwrap(),
            "/cats/1"
        );
    }

    #[test]
    fn test_patch_only_item_path() {
        let url = table()
            .url_for(
                "http://feline.io",
                "CatAction",
                &[("cat_id", json!(1)), ("cat_action_id", json!(1))],
            )
            .unwrap();
        assert_eq!(url, "http://feline.io/cats/1/actions/1");
    }

    #[test]
    fn test_non_listable_collection_reachable_through_post() {
        assert_eq!(
            table().path_for("CatSync", &[("cat_id", json!(1))]).unwrap(),
            "/cats/1/syncs"
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            table().path_for("Dog", &[]).unwrap_err(),
            UrlError::UnknownResource("Dog".to_string())
        );
        assert!(matches!(
            table().path_for("CatSync", &[]),
            Err(UrlError::MissingParameters { .. })
        ));
    }
}
