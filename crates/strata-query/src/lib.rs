//! SQL statement building for Strata.
//!
//! `strata-query` is the **statement construction layer**. The ORM query
//! delegates all SQL text generation here: a keyed select list, aliased
//! joins, filtering clauses and the DML builders used by table persistence.
//!
//! SQL is generated for a specific [`Dialect`] only when a statement is
//! built, so the same query renders correctly for Postgres, SQLite or MySQL.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod join;
pub mod select;

pub use builder::{DeleteQuery, InsertQuery, UpdateQuery};
pub use clause::{Limit, Offset, OrderBy, OrderDirection};
pub use expr::{BinaryOp, Expr};
pub use join::{Join, JoinType};
pub use select::SelectQuery;
pub use strata_core::Dialect;
