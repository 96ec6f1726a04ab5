//! docgraph - metadata-driven CRUD and query layer over JSON documents.
//!
//! Entities are declared once in a [`Registry`](registry::Registry) with
//! per-property validation, default, transform and output hooks. The
//! [`Engine`] compiles declarative filters into store queries, paginates
//! them, and runs create/update input through the mutation pipeline. The
//! `graphql` module turns the same registry into a dynamic GraphQL schema.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod graphql;
pub mod orm;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use engine::Engine;
pub use error::{Error, Result};
