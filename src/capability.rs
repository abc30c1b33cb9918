//! Capability taxonomy.
//!
//! A resource declares which of the six capabilities it implements as a
//! [`CapabilitySet`]. The binder reads the set, never the implementing type, to decide
//! which routes and spec operations exist. The verb, path and default status for each
//! capability are fixed:
//!
//! | Capability | Path       | Verb   | Status |
//! |------------|------------|--------|--------|
//! | Create     | collection | POST   | 201    |
//! | List       | collection | GET    | 200    |
//! | Retrieve   | item       | GET    | 200    |
//! | Replace    | item       | PUT    | 200    |
//! | Update     | item       | PATCH  | 200    |
//! | Delete     | item       | DELETE | 204    |

use http::Method;
use std::fmt;

/// Which of a resource's two paths an operation lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Collection,
    Item,
}

/// How the request body is loaded for an input-bearing capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Every required field must be present.
    Full,
    /// All fields optional.
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Create,
    List,
    Retrieve,
    Replace,
    Update,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Create,
        Capability::List,
        Capability::Retrieve,
        Capability::Replace,
        Capability::Update,
        Capability::Delete,
    ];

    pub fn method(self) -> Method {
        match self {
            Capability::Create => Method::POST,
            Capability::List | Capability::Retrieve => Method::GET,
            Capability::Replace => Method::PUT,
            Capability::Update => Method::PATCH,
            Capability::Delete => Method::DELETE,
        }
    }

    pub fn path_kind(self) -> PathKind {
        match self {
            Capability::Create | Capability::List => PathKind::Collection,
            _ => PathKind::Item,
        }
    }

    /// Success status used when the returned envelope does not set one.
    pub fn default_status(self) -> u16 {
        match self {
            Capability::Create => 201,
            Capability::Delete => 204,
            _ => 200,
        }
    }

    /// Body loading mode, or `None` for capabilities that take no body.
    pub fn input_mode(self) -> Option<InputMode> {
        match self {
            Capability::Create | Capability::Replace => Some(InputMode::Full),
            Capability::Update => Some(InputMode::Partial),
            _ => None,
        }
    }

    /// Whether the response body is serialized through the resource schema.
    pub fn has_output(self) -> bool {
        self != Capability::Delete
    }

    /// List results are serialized with the `many` flag.
    pub fn is_many(self) -> bool {
        self == Capability::List
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::List => "list",
            Capability::Retrieve => "retrieve",
            Capability::Replace => "replace",
            Capability::Update => "update",
            Capability::Delete => "delete",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of capability tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);
    /// Retrieve without List: the item can be fetched but the collection is not browsable.
    pub const NON_LISTABLE_RETRIEVE: CapabilitySet = CapabilitySet(1 << Capability::Retrieve as u8);
    /// Retrieve together with List.
    pub const RETRIEVE: CapabilitySet =
        CapabilitySet((1 << Capability::Retrieve as u8) | (1 << Capability::List as u8));
    pub const CRUD: CapabilitySet = CapabilitySet(0b0011_1111);

    pub fn of(caps: &[Capability]) -> Self {
        caps.iter().fold(Self::EMPTY, |set, c| set.with(*c))
    }

    #[must_use]
    pub fn with(self, cap: Capability) -> Self {
        CapabilitySet(self.0 | cap.bit())
    }

    #[must_use]
    pub fn union(self, other: CapabilitySet) -> Self {
        CapabilitySet(self.0 | other.0)
    }

    pub fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Capabilities in table order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Capabilities bound on the given path.
    pub fn on_path(self, kind: PathKind) -> impl Iterator<Item = Capability> {
        self.iter().filter(move |c| c.path_kind() == kind)
    }

    pub fn has_path(self, kind: PathKind) -> bool {
        self.on_path(kind).next().is_some()
    }

    /// Whether any capability on the path answers the given method.
    pub fn serves(self, kind: PathKind, method: &Method) -> bool {
        self.on_path(kind).any(|c| &c.method() == method)
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, c| set.with(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_contains_everything() {
        let all: Vec<Capability> = CapabilitySet::CRUD.iter().collect();
        assert_eq!(all, Capability::ALL.to_vec());
    }

    #[test]
    fn test_retrieve_variants() {
        assert!(CapabilitySet::RETRIEVE.contains(Capability::List));
        assert!(!CapabilitySet::NON_LISTABLE_RETRIEVE.contains(Capability::List));
        assert!(CapabilitySet::NON_LISTABLE_RETRIEVE.contains(Capability::Retrieve));
    }

    #[test]
    fn test_verb_table() {
        assert_eq!(Capability::Create.method(), Method::POST);
        assert_eq!(Capability::Create.default_status(), 201);
        assert_eq!(Capability::Delete.default_status(), 204);
        assert_eq!(Capability::Update.input_mode(), Some(InputMode::Partial));
        assert_eq!(Capability::Replace.input_mode(), Some(InputMode::Full));
        assert_eq!(Capability::List.path_kind(), PathKind::Collection);
        assert_eq!(Capability::Retrieve.path_kind(), PathKind::Item);
        assert!(!Capability::Delete.has_output());
    }

    #[test]
    fn test_paths_and_methods() {
        let set = CapabilitySet::of(&[Capability::Create, Capability::Retrieve]);
        assert!(set.has_path(PathKind::Collection));
        assert!(set.serves(PathKind::Collection, &Method::POST));
        assert!(!set.serves(PathKind::Collection, &Method::GET));
        assert!(set.serves(PathKind::Item, &Method::GET));
        assert!(!set.serves(PathKind::Item, &Method::PUT));
    }
}
