//! GraphQL surface generated from the registry.

mod filters;
mod schema;
mod service;

pub use filters::{
    BOOLEAN_FILTER, FLOAT_FILTER, ID_FILTER, INT_FILTER, STRING_FILTER, filter_input_for,
};
pub use schema::{JSON_SCALAR, build_schema};
pub use service::{USER_ID_HEADER, request_context, router};
