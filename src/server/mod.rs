//! # Server Module
//!
//! HTTP/1.1 transport for a frozen [`crate::registry::App`], built on `may_minihttp`
//! coroutines. The server only translates between the wire and
//! [`crate::dispatcher::HandlerRequest`]/[`crate::dispatcher::HandlerResponse`]; all
//! routing and rendering happens in the `App`.
//!
//! Besides the registry's routes and spec document, the service answers
//! `GET /health` with `{"status": "ok"}`.
//!
//! ```rust,no_run
//! use crudrouter::config::ApiConfig;
//! use crudrouter::registry::Api;
//! use crudrouter::server::{AppService, HttpServer};
//! use std::sync::Arc;
//!
//! let app = Api::new(ApiConfig::new("Cat API")).unwrap().build();
//! let handle = HttpServer(AppService::new(Arc::new(app)))
//!     .start("0.0.0.0:8080")
//!     .unwrap();
//! handle.join().unwrap();
//! ```

mod http_server;
mod request;
mod response;
mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{decode_body, parse_cookies, parse_request, read_body};
pub use response::{write_handler_response, HeaderLines};
pub use service::{health_response, AppService};
