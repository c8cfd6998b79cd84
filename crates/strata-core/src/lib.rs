//! Core types and traits for Strata.
//!
//! This crate provides the foundational abstractions shared by the query
//! builder and the ORM layer:
//!
//! - `Value` and `Row` for dynamically-typed SQL data
//! - `Data`, `Record` and `Entity` for hydrated result trees
//! - `Connection` trait for database connections
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod entity;
pub mod error;
pub mod row;
pub mod value;

pub use connection::{Connection, Dialect};
pub use entity::{Data, Entity, Record};
pub use error::{
    AssociationError, AssociationErrorKind, ConfigError, Error, QueryError, QueryErrorKind,
    Result, TypeError,
};
pub use row::{ColumnInfo, Row};
pub use value::Value;
