//! # Router Module
//!
//! Matches incoming requests to the resource routes derived at registration time.
//!
//! Every bound resource contributes up to two documentation paths (collection and
//! item). Each `(method, path)` pair becomes one [`RouteEntry`]; the router returns the
//! entry together with the raw path parameter values, and the dispatcher takes it from
//! there (type conversion, GET branching, envelope rendering).
//!
//! ```rust
//! use crudrouter::capability::PathKind;
//! use crudrouter::router::{RouteEntry, Router};
//! use http::Method;
//! use std::sync::Arc;
//!
//! let router = Router::new(vec![RouteEntry {
//!     method: Method::GET,
//!     path_pattern: "/cats/{cat_id}".to_string(),
//!     resource: Arc::from("Cat"),
//!     kind: PathKind::Item,
//! }]);
//! let m = router.route(&Method::GET, "/cats/3").unwrap();
//! assert_eq!(m.get_path_param("cat_id"), Some("3"));
//! ```

mod core;
mod radix;

pub use core::{ParamVec, RouteEntry, RouteMatch, Router, MAX_INLINE_PARAMS};
