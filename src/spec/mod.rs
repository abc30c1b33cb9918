//! # Spec Accumulator
//!
//! Builds the OpenAPI 3.0 document describing every bound operation. The registry
//! appends to a [`SpecBuilder`] while resources are registered and calls
//! [`SpecBuilder::freeze`] once, before serving; the resulting [`FrozenSpec`] is shared
//! read-only by every request that asks for the documentation endpoint.
//!
//! Each bound (resource, verb) contributes one operation carrying:
//!
//! - the resource name as its only tag
//! - typed path parameters for the identifiers the route binds
//! - query parameters from the operation's extra-argument schema
//! - request body refs (full schema for POST/PUT, the `<Name>Partial` component for
//!   PATCH, none for GET/DELETE)
//! - the success status and response schema (an array of refs for list)
//! - `security: [{<scheme>: []}]`, or `[]` when public

mod builder;
mod types;

pub use builder::{
    BodySchema, FrozenSpec, OperationSpec, SpecBuilder, SpecError, BASIC_HTTP, JWT_ACCESS_TOKEN,
    JWT_REFRESH_TOKEN,
};
pub use oas3::spec::SecurityScheme;
pub use types::{
    basic_http_scheme, bearer_jwt_scheme, Components, Info, MediaType, Operation, Parameter,
    ParameterLocation, PathItem, RequestBody, Response, Server, SpecDocument, Tag,
    OPENAPI_VERSION,
};
