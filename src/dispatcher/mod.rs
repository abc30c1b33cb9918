//! # Dispatcher Module
//!
//! Transport-independent request handling. The server parses wire requests into
//! [`HandlerRequest`], the registry's [`crate::registry::App`] routes them, and the
//! matching [`ResourceBinding`] runs the bound capability:
//!
//! 1. Convert path identifiers to their declared types (`404` if one does not convert)
//! 2. Run the operation's security provider, if one is registered (`401` on failure)
//! 3. Validate extra query arguments and the body (`422` on failure, the resource is
//!    never called)
//! 4. Call the capability method
//! 5. Render the reply through its envelope with the derived base links
//!
//! Errors raised by the resource come back as [`DispatchError::Resource`] and are
//! mapped to a response by the registry's error handler.

mod binding;
mod core;

pub use binding::{AuthPolicy, BoundOperation, DispatchEnv, ResourceBinding};
pub use core::{
    header_value, DispatchError, HandlerRequest, HandlerResponse, HeaderVec, RequestBody, MAX_INLINE_HEADERS,
};
