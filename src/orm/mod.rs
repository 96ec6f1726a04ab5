//! Query layer: filter expressions, their compiled form, and pagination.
//!
//! - `filter`: the wire-level filter expression
//! - `query`: compiler producing a typed [`StoreQuery`]
//! - `sql`: rendering of [`StoreQuery`] into SQLite fragments
//! - `sort`: sort keys
//! - `pagination`: page/limit normalization and [`PageResult`]

mod filter;
mod pagination;
mod query;
mod sort;
mod sql;

pub use filter::{FilterExpression, FilterOperator, OperatorBag};
pub use pagination::{
    DEFAULT_LIMIT, MAX_LIMIT, PageRequest, PageResult, PaginationOptions, skip_for, total_pages,
};
pub use query::{
    Comparison, Condition, Constraint, FieldPath, Scalar, StoreQuery, compile, compile_for,
};
pub use sort::{OrderDirection, SortField, SortKey, check_sort};
pub use sql::{SqlValue, order_by_sql};
