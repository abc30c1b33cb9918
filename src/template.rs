//! # Path Templates
//!
//! Resources are declared with a URL template that marks identifiers with typed
//! placeholders, for example `/cats/<int:cat_id>/whiskers/<int:whisker_id>`.
//! Parsing a template yields:
//!
//! - the ordered identifier chain ([`IdParam`]), parents first and the resource's own
//!   identifier last
//! - the *item path* in documentation form (`/cats/{cat_id}/whiskers/{whisker_id}`)
//! - the *collection path*, which is the item path minus its final segment
//!   (`/cats/{cat_id}/whiskers`)
//!
//! Untyped placeholders (`<name>`) are strings. Supported converter names are `string`,
//! `path`, `int`, `integer`, `float` and `number`; anything else is a [`TemplateError`].
//!
//! ```rust
//! use crudrouter::template::{IdType, PathTemplate};
//!
//! let t = PathTemplate::parse("/cats/<int:cat_id>/syncs/<cat_sync_id>").unwrap();
//! assert_eq!(t.item_path(), "/cats/{cat_id}/syncs/{cat_sync_id}");
//! assert_eq!(t.collection_path(), "/cats/{cat_id}/syncs");
//! assert_eq!(t.id_params()[0].id_type, IdType::Integer);
//! assert_eq!(t.id_params()[1].id_type, IdType::String);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:([^:<>]+):)?([^<>]+)>").expect("placeholder regex should be valid")
});

/// JSON type of a path identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdType {
    String,
    Integer,
    Number,
}

impl IdType {
    /// Map a placeholder converter name to its identifier type.
    pub fn from_converter(converter: &str) -> Option<Self> {
        match converter {
            "string" | "path" => Some(IdType::String),
            "int" | "integer" => Some(IdType::Integer),
            "float" | "number" => Some(IdType::Number),
            _ => None,
        }
    }

    /// The OpenAPI `type` keyword for this identifier.
    pub fn openapi_type(self) -> &'static str {
        match self {
            IdType::String => "string",
            IdType::Integer => "integer",
            IdType::Number => "number",
        }
    }

    /// Convert a raw path segment into a JSON value of this type.
    ///
    /// Returns `None` when the segment does not match, in which case the route is
    /// treated as not matching at all.
    pub fn convert(self, raw: &str) -> Option<Value> {
        if raw.is_empty() {
            return None;
        }
        match self {
            IdType::String => Some(Value::String(raw.to_string())),
            IdType::Integer => raw.parse::<i64>().ok().map(Value::from),
            IdType::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.openapi_type())
    }
}

/// One identifier in a resource's identifier chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParam {
    pub id_type: IdType,
    pub name: Arc<str>,
}

/// Errors raised while parsing a path template. All of them are fatal at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The placeholder names a converter this crate does not know.
    UnknownType { template: String, converter: String },
    /// Two placeholders share a name.
    DuplicateName { template: String, name: String },
    /// Unbalanced angle brackets, a missing leading slash, or an empty placeholder name.
    Malformed { template: String, reason: &'static str },
    /// A resource template must end in its own identifier placeholder.
    MissingItemId { template: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UnknownType {
                template,
                converter,
            } => write!(f, "unknown placeholder type '{converter}' in template '{template}'"),
            TemplateError::DuplicateName { template, name } => {
                write!(f, "placeholder '{name}' appears twice in template '{template}'")
            }
            TemplateError::Malformed { template, reason } => {
                write!(f, "malformed template '{template}': {reason}")
            }
            TemplateError::MissingItemId { template } => write!(
                f,
                "template '{template}' must end with the resource's own identifier placeholder"
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Parsed resource path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    id_params: Vec<IdParam>,
    item_path: String,
    collection_path: String,
}

impl PathTemplate {
    /// Parse a template into its identifier chain and documentation paths.
    ///
    /// Templates without placeholders are accepted here (`id_params` is empty);
    /// [`PathTemplate::parse_resource`] adds the stricter rule used for resources.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if !template.starts_with('/') {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
                reason: "must start with '/'",
            });
        }

        let mut id_params: Vec<IdParam> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(template) {
            let converter = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("string");
            let name = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if name.is_empty() {
                return Err(TemplateError::Malformed {
                    template: template.to_string(),
                    reason: "empty placeholder name",
                });
            }
            let id_type =
                IdType::from_converter(converter).ok_or_else(|| TemplateError::UnknownType {
                    template: template.to_string(),
                    converter: converter.to_string(),
                })?;
            if id_params.iter().any(|p| p.name.as_ref() == name) {
                return Err(TemplateError::DuplicateName {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            id_params.push(IdParam {
                id_type,
                name: Arc::from(name),
            });
        }

        let item_path = PLACEHOLDER.replace_all(template, "{$2}").into_owned();
        if item_path.contains('<') || item_path.contains('>') {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
                reason: "unbalanced '<' or '>'",
            });
        }
        let collection_path = match item_path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((head, _)) => head.to_string(),
        };

        Ok(Self {
            raw: template.to_string(),
            id_params,
            item_path,
            collection_path,
        })
    }

    /// Parse a template that declares a resource: its final segment must be a placeholder.
    ///
    /// # Errors
    ///
    /// Everything [`PathTemplate::parse`] rejects, plus
    /// [`TemplateError::MissingItemId`] when the template ends in a literal segment.
    pub fn parse_resource(template: &str) -> Result<Self, TemplateError> {
        let parsed = Self::parse(template)?;
        let last = parsed.item_path.rsplit('/').next().unwrap_or_default();
        let own_id = parsed.id_params.last().map(|p| format!("{{{}}}", p.name));
        if own_id.as_deref() != Some(last) {
            return Err(TemplateError::MissingItemId {
                template: template.to_string(),
            });
        }
        Ok(parsed)
    }

    /// The template as declared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Full identifier chain in left-to-right order.
    pub fn id_params(&self) -> &[IdParam] {
        &self.id_params
    }

    /// Every identifier except the resource's own.
    pub fn parent_params(&self) -> &[IdParam] {
        match self.id_params.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }

    pub fn item_path(&self) -> &str {
        &self.item_path
    }

    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }
}

/// Substitute `{name}` segments of a documentation path with concrete values.
///
/// Values are percent-encoded. Returns the name of the first placeholder that has no
/// value.
pub fn fill_path<'a, F>(doc_path: &str, mut lookup: F) -> Result<String, String>
where
    F: FnMut(&str) -> Option<&'a Value>,
{
    let mut out = String::with_capacity(doc_path.len() + 16);
    for segment in doc_path.split('/').skip(1) {
        out.push('/');
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                let value = lookup(name).ok_or_else(|| name.to_string())?;
                out.push_str(&urlencoding::encode(&value_to_segment(value)));
            }
            None => out.push_str(segment),
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Render a JSON scalar the way it appears in a URL.
pub fn value_to_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_template() {
        let t = PathTemplate::parse("/cats/<int:cat_id>/whiskers/<int:whisker_id>").unwrap();
        let names: Vec<&str> = t.id_params().iter().map(|p| p.name.as_ref()).collect();
        assert_eq!(names, vec!["cat_id", "whisker_id"]);
        assert!(t.id_params().iter().all(|p| p.id_type == IdType::Integer));
        assert_eq!(t.item_path(), "/cats/{cat_id}/whiskers/{whisker_id}");
        assert_eq!(t.collection_path(), "/cats/{cat_id}/whiskers");
        assert_eq!(t.parent_params().len(), 1);
    }

    #[test]
    fn test_untyped_placeholder_is_string() {
        let t = PathTemplate::parse("/docs/<slug>").unwrap();
        assert_eq!(t.id_params()[0].id_type, IdType::String);
        assert_eq!(t.collection_path(), "/docs");
    }

    #[test]
    fn test_converter_aliases() {
        let t = PathTemplate::parse("/a/<path:p>/b/<float:f>/c/<number:n>/d/<integer:i>").unwrap();
        let types: Vec<IdType> = t.id_params().iter().map(|p| p.id_type).collect();
        assert_eq!(
            types,
            vec![IdType::String, IdType::Number, IdType::Number, IdType::Integer]
        );
    }

    #[test]
    fn test_top_level_collection_is_root() {
        let t = PathTemplate::parse("/<int:id>").unwrap();
        assert_eq!(t.collection_path(), "/");
        assert!(t.parent_params().is_empty());
    }

    #[test]
    fn test_unknown_type_fails() {
        let err = PathTemplate::parse("/cats/<uuid:cat_id>").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownType { ref converter, .. } if converter == "uuid"));
    }

    #[test]
    fn test_duplicate_and_malformed() {
        assert!(matches!(
            PathTemplate::parse("/a/<id>/b/<int:id>"),
            Err(TemplateError::DuplicateName { .. })
        ));
        assert!(matches!(
            PathTemplate::parse("/a/<id"),
            Err(TemplateError::Malformed { .. })
        ));
        assert!(matches!(
            PathTemplate::parse("cats/<id>"),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_resource_template_must_end_with_id() {
        assert!(matches!(
            PathTemplate::parse_resource("/cats"),
            Err(TemplateError::MissingItemId { .. })
        ));
        assert!(matches!(
            PathTemplate::parse_resource("/cats/<int:cat_id>/whiskers"),
            Err(TemplateError::MissingItemId { .. })
        ));
        assert!(PathTemplate::parse_resource("/cats/<int:cat_id>").is_ok());
    }

    #[test]
    fn test_convert_values() {
        assert_eq!(IdType::Integer.convert("42"), Some(json!(42)));
        assert_eq!(IdType::Integer.convert("4x"), None);
        assert_eq!(IdType::Number.convert("2.5"), Some(json!(2.5)));
        assert_eq!(IdType::String.convert("abc"), Some(json!("abc")));
        assert_eq!(IdType::String.convert(""), None);
    }

    #[test]
    fn test_fill_path() {
        let values = [("cat_id", json!(1)), ("sync_id", json!("a b"))];
        let lookup = |name: &str| values.iter().find(|(k, _)| *k == name).map(|(_, v)| v);
        assert_eq!(
            fill_path("/cats/{cat_id}/syncs/{sync_id}", lookup).unwrap(),
            "/cats/1/syncs/a%20b"
        );
        assert_eq!(
            fill_path("/cats/{cat_id}/x/{missing}", lookup).unwrap_err(),
            "missing"
        );
    }
}
