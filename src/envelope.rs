//! # Response Envelopes
//!
//! A capability method may return bare data or an [`Envelope`] that controls how
//! links and metadata reach the client:
//!
//! - **Plain** renders the serialized data only. Links are resolved but not emitted.
//! - **Headed** adds a `Link` header (`<url>; rel="name"`, joined by `, `), any extra
//!   headers, and an `Access-Control-Expose-Headers` header listing the added headers
//!   that are not CORS-safelisted.
//! - **Wrapped** renders `{"<data_key>": data, "links": {...}, ...extras}` with
//!   `data_key` defaulting to `"data"`.
//!
//! Links derived by the dispatcher are merged under the envelope's own links: for the
//! same relation name the envelope wins.

use crate::dispatcher::HandlerResponse;
use crate::schema::Schema;
use serde_json::{Map, Value};

/// Headers a browser may read without being told about them.
pub const CORS_SAFELISTED_HEADERS: [&str; 7] = [
    "Cache-Control",
    "Content-Language",
    "Content-Length",
    "Content-Type",
    "Expires",
    "Last-Modified",
    "Pragma",
];

fn is_safelisted(name: &str) -> bool {
    CORS_SAFELISTED_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Ordered relation name → URL map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links(Vec<(String, String)>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a relation, replacing any previous URL in place.
    pub fn insert(&mut self, rel: impl Into<String>, url: impl Into<String>) {
        let rel = rel.into();
        let url = url.into();
        match self.0.iter_mut().find(|(r, _)| *r == rel) {
            Some(slot) => slot.1 = url,
            None => self.0.push((rel, url)),
        }
    }

    #[must_use]
    pub fn with(mut self, rel: impl Into<String>, url: impl Into<String>) -> Self {
        self.insert(rel, url);
        self
    }

    pub fn get(&self, rel: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(r, _)| r == rel)
            .map(|(_, u)| u.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(r, u)| (r.as_str(), u.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `{**base, **self}`: base order first, explicit values win per key, new keys last.
    #[must_use]
    pub fn merged_over(self, base: Links) -> Links {
        let mut merged = base;
        for (rel, url) in self.0 {
            merged.insert(rel, url);
        }
        merged
    }

    /// `Link` header value, or `None` when there are no links.
    pub fn to_header(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(rel, url)| format!("<{url}>; rel=\"{rel}\""))
            .collect();
        Some(parts.join(", "))
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(rel, url)| (rel.clone(), Value::String(url.clone())))
            .collect();
        Value::Object(map)
    }
}

impl<R: Into<String>, U: Into<String>> FromIterator<(R, U)> for Links {
    fn from_iter<I: IntoIterator<Item = (R, U)>>(iter: I) -> Self {
        let mut links = Links::new();
        for (rel, url) in iter {
            links.insert(rel, url);
        }
        links
    }
}

/// How an envelope renders into the transport response.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeKind {
    Plain,
    Headed {
        headers: Vec<(String, String)>,
    },
    Wrapped {
        data_key: String,
        extras: Map<String, Value>,
    },
}

/// Result wrapper carrying data plus links and an optional status override.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    data: Value,
    status: Option<u16>,
    links: Links,
    kind: EnvelopeKind,
}

impl Envelope {
    fn with_kind(data: Value, kind: EnvelopeKind) -> Self {
        Self {
            data,
            status: None,
            links: Links::new(),
            kind,
        }
    }

    pub fn plain(data: impl Into<Value>) -> Self {
        Self::with_kind(data.into(), EnvelopeKind::Plain)
    }

    pub fn headed(data: impl Into<Value>) -> Self {
        Self::with_kind(data.into(), EnvelopeKind::Headed { headers: Vec::new() })
    }

    pub fn wrapped(data: impl Into<Value>) -> Self {
        Self::with_kind(
            data.into(),
            EnvelopeKind::Wrapped {
                data_key: "data".to_string(),
                extras: Map::new(),
            },
        )
    }

    /// Override the success status the dispatcher would otherwise use.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn link(mut self, rel: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.insert(rel, url);
        self
    }

    #[must_use]
    pub fn links(mut self, links: Links) -> Self {
        self.links = links.merged_over(self.links);
        self
    }

    /// Extra response header. Only Headed envelopes emit headers; other kinds ignore it.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        if let EnvelopeKind::Headed { headers } = &mut self.kind {
            headers.push((name.into(), value.to_string()));
        }
        self
    }

    /// Top-level key holding the data. Only meaningful for Wrapped envelopes.
    #[must_use]
    pub fn data_key(mut self, key: impl Into<String>) -> Self {
        if let EnvelopeKind::Wrapped { data_key, .. } = &mut self.kind {
            *data_key = key.into();
        }
        self
    }

    /// Extra top-level member. Only meaningful for Wrapped envelopes.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let EnvelopeKind::Wrapped { extras, .. } = &mut self.kind {
            extras.insert(key.into(), value.into());
        }
        self
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn explicit_links(&self) -> &Links {
        &self.links
    }

    pub fn kind(&self) -> &EnvelopeKind {
        &self.kind
    }

    /// Status to send: the override if set, else `default`.
    pub fn resolve_status(&self, default: u16) -> u16 {
        self.status.unwrap_or(default)
    }

    /// Render into a response, serializing `data` through `schema`.
    pub fn render(
        self,
        schema: &Schema,
        many: bool,
        base_links: Links,
        default_status: u16,
    ) -> HandlerResponse {
        let status = self.resolve_status(default_status);
        let links = self.links.merged_over(base_links);
        let dumped = schema.dump(&self.data, many);

        match self.kind {
            EnvelopeKind::Plain => HandlerResponse::json(status, dumped),
            EnvelopeKind::Headed { headers } => {
                let mut res = HandlerResponse::json(status, dumped);
                let mut added: Vec<String> = Vec::new();
                if let Some(link_header) = links.to_header() {
                    res.set_header("Link", link_header);
                    added.push("Link".to_string());
                }
                for (name, value) in headers {
                    res.set_header(&name, value);
                    if !added.iter().any(|a| a.eq_ignore_ascii_case(&name)) {
                        added.push(name);
                    }
                }
                let exposed: Vec<&str> = added
                    .iter()
                    .map(String::as_str)
                    .filter(|h| !is_safelisted(h))
                    .collect();
                if !exposed.is_empty() {
                    res.set_header("Access-Control-Expose-Headers", exposed.join(", "));
                }
                res
            }
            EnvelopeKind::Wrapped { data_key, extras } => {
                let mut body = extras;
                body.insert("links".to_string(), links.to_json());
                body.insert(data_key, dumped);
                HandlerResponse::json(status, Value::Object(body))
            }
        }
    }
}

/// What a capability method hands back: bare data or an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Data(Value),
    Envelope(Envelope),
}

impl Reply {
    /// Serialize any record type into a plain reply.
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Reply::Data(serde_json::to_value(value)?))
    }

    /// Normalize to an envelope, wrapping bare data as Plain.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Reply::Data(data) => Envelope::plain(data),
            Reply::Envelope(envelope) => envelope,
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Data(value)
    }
}

impl From<Envelope> for Reply {
    fn from(envelope: Envelope) -> Self {
        Reply::Envelope(envelope)
    }
}
