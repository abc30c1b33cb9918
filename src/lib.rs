//! # crudrouter
//!
//! **crudrouter** binds CRUD resources to HTTP routes and an
//! [OpenAPI 3.0](https://spec.openapis.org/oas/v3.0.3) document from one declaration per
//! resource, and serves them on the `may` coroutine runtime through `may_minihttp`.
//!
//! A resource declares a path template such as `/cats/<int:cat_id>`, a record
//! [`schema::Schema`] and the [`capability::Capability`] set it supports. The registry
//! derives a collection route and an item route, one spec operation per capability,
//! request loading and validation, response dumping, links between resources, and
//! the final status code.
//!
//! ## Architecture
//!
//! - **[`template`]** - path template parsing (`<int:cat_id>` → `{cat_id}`)
//! - **[`capability`]** - the six CRUD capabilities and their HTTP mapping
//! - **[`schema`]** - record schemas: input loading, output dumping, validation errors
//! - **[`envelope`]** - Plain, Headed and Wrapped response envelopes with links
//! - **[`resource`]** - the [`resource::Resource`] trait resources implement
//! - **[`router`]** - radix-tree route matching
//! - **[`dispatcher`]** - per-request binding of ids, security, input and output
//! - **[`spec`]** - OpenAPI document accumulation and freezing
//! - **[`registry`]** - [`registry::Api`], [`registry::App`] and deferred
//!   [`registry::ResourceGroup`]s
//! - **[`security`]** - bearer JWT and HTTP basic security providers
//! - **[`server`]** - HTTP/1.1 transport
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]** - YAML, env and tracing setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as AppService<br/>(may_minihttp)
//!     participant App as App
//!     participant Router as Router
//!     participant Binding as ResourceBinding
//!     participant Resource as Resource
//!
//!     Client->>Server: GET /cats/1/whiskers
//!     Server->>App: HandlerRequest
//!     App->>Router: route(GET, /cats/1/whiskers)
//!     alt No Route Match
//!         Router-->>Client: 404 / 405 with Allow
//!     end
//!     Router-->>App: RouteMatch (CatWhisker, collection, {cat_id})
//!     App->>Binding: handle(match, request)
//!     Binding->>Binding: convert ids, check security,<br/>load query and body
//!     alt Invalid input
//!         Binding-->>Client: 422 with field messages
//!     end
//!     Binding->>Resource: list(ctx, parents, query)
//!     Resource-->>Binding: Reply (data or Envelope)
//!     Binding->>Binding: dump, derive links, render envelope
//!     Binding-->>Server: HandlerResponse
//!     Server-->>Client: 200 JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crudrouter::config::ApiConfig;
//! use crudrouter::registry::Api;
//! use crudrouter::server::{AppService, HttpServer};
//! use std::sync::Arc;
//!
//! let mut api = Api::new(ApiConfig::new("Cat API").server("http://localhost:8080"))?;
//! // api.resource("/cats/<int:cat_id>", "Cat", cat_schema, Cats)?;
//! let app = Arc::new(api.build());
//! let server = HttpServer(AppService::new(app)).start("0.0.0.0:8080")?;
//! server.join().ok();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The frozen document is served at `GET /spec` (configurable via
//! [`config::ApiConfig::spec_path`]).

pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod resource;
pub mod router;
pub mod runtime_config;
pub mod schema;
pub mod security;
pub mod server;
pub mod spec;
pub mod template;
pub mod urls;

pub use capability::{Capability, CapabilitySet};
pub use envelope::{Envelope, Reply};
pub use error::{HttpError, RegistryError};
pub use registry::{Api, App, ResourceGroup};
pub use resource::{BoundIds, OperationConfig, RequestContext, Resource};
pub use schema::{Fields, Schema};
