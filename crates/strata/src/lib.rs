//! Strata - association-aware eager loading and result hydration for SQL.
//!
//! Strata maps tables and the relationships between them, and loads a query's
//! results together with their associated rows:
//!
//! - Tables registered in a [`TableLocator`] under an alias
//! - `belongsTo`, `hasOne`, `hasMany` and `belongsToMany` associations
//! - `contain()` trees that are joined into the query or loaded by one
//!   secondary query per association
//! - `matching()` and `not_matching()` filters on related rows
//! - Results folded into nested [`Entity`] trees
//!
//! # Quick Start
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! async fn example(cx: &Cx, conn: &impl Connection) -> Outcome<(), Error> {
//!     let locator = TableLocator::new();
//!     let articles = locator
//!         .add(
//!             Table::new("Articles")
//!                 .with_columns(["id", "title", "author_id"])
//!                 .belongs_to("Authors", AssociationOptions::new())
//!                 .has_many("Comments", AssociationOptions::new()),
//!         )
//!         .unwrap();
//!     locator.add(Table::new("Authors").with_columns(["id", "name"])).unwrap();
//!     locator.add(Table::new("Comments").with_columns(["id", "article_id", "body"])).unwrap();
//!
//!     // Authors is joined, Comments is loaded by a second query.
//!     articles
//!         .query()
//!         .contain(["Authors", "Comments"])
//!         .all(cx, conn)
//!         .await
//!         .map(|results| {
//!             for article in &results {
//!                 println!("{:?} by {:?}", article.get("title"), article.get_path("author.name"));
//!             }
//!         })
//! }
//! ```
//!
//! # Crates
//!
//! - `strata-core`: values, rows, entities, errors and the `Connection` trait
//! - `strata-query`: the dialect-aware SQL builders
//! - `strata-orm`: tables, associations, eager loading and hydration

pub use strata_core::{
    AssociationError, AssociationErrorKind, ConfigError, Connection, Cx, Data, Dialect, Entity,
    Error, Outcome, QueryError, QueryErrorKind, Record, Result, Row, TypeError, Value,
};

pub use strata_query::{
    BinaryOp, DeleteQuery, Expr, InsertQuery, Join, JoinType, Limit, Offset, OrderBy,
    OrderDirection, SelectQuery, UpdateQuery,
};

pub use strata_orm::{
    Association, AssociationCollection, AssociationConfig, AssociationKind, AssociationMapEntry,
    AssociationOptions, AssociationType, AttachOptions, Behavior, BehaviorRegistry,
    BufferedStatement, CallbackStatement, Contain, ContainOptions, ContainSpec, EagerLoadable,
    EagerLoader, EventManager, Fields, Finder, FinderOptions, Junction, ModelEvent, Query,
    QueryBuilder, ResultFormatter, ResultSet, ResultSetFactory, RowInjector, SaveOptions,
    Statement, Strategy, Table, TableConfig, TableLocator,
};

pub use strata_orm::inflector;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AssociationOptions, Connection, ContainOptions, ContainSpec, Cx, Data, Entity, Error,
        Expr, Finder, JoinType, OrderBy, Outcome, Query, ResultSet, SaveOptions, Strategy, Table,
        TableLocator, Value,
    };
}
