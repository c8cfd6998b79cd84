//! Tables, associations, eager loading and result hydration.
//!
//! `strata-orm` is the **ORM layer** of Strata. It sits on top of the SQL
//! builders in `strata-query` and turns declared relationships between tables
//! into joins and secondary queries:
//!
//! - [`Table`] and [`TableLocator`] hold table metadata and resolve
//!   associations by alias
//! - [`Association`] models `belongsTo`, `hasOne`, `hasMany` and
//!   `belongsToMany` relationships
//! - [`EagerLoader`] plans which contained associations are joined and which
//!   are loaded by a secondary query
//! - [`ResultSetFactory`] folds flat rows back into nested entities
//!
//! Everything that touches the database takes a `&Cx` and returns an
//! [`Outcome`], so cancellation propagates the way it does in the rest of
//! the stack.

use std::future::Future;
use std::pin::Pin;

/// Unwrap an `Outcome`, returning early on anything but `Ok`.
macro_rules! try_outcome {
    ($e:expr) => {
        match $e {
            ::strata_core::Outcome::Ok(v) => v,
            ::strata_core::Outcome::Err(e) => return ::strata_core::Outcome::Err(e),
            ::strata_core::Outcome::Cancelled(r) => return ::strata_core::Outcome::Cancelled(r),
            ::strata_core::Outcome::Panicked(p) => return ::strata_core::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result` inside a function returning `Outcome`.
macro_rules! try_result {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return ::strata_core::Outcome::Err(e),
        }
    };
}

pub mod association;
pub mod association_collection;
pub mod behavior;
pub mod config;
pub mod eager;
pub mod event;
pub mod inflector;
pub mod locator;
pub mod query;
pub mod result_set;
pub mod statement;
pub mod table;

/// A boxed, sendable future. Used where async calls recurse.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use association::{
    Association, AssociationKind, AssociationOptions, AssociationType, AttachOptions, Junction,
    Strategy,
};
pub use association_collection::AssociationCollection;
pub use behavior::{Behavior, BehaviorRegistry};
pub use config::{AssociationConfig, TableConfig};
pub use eager::{
    AssociationMapEntry, Contain, ContainOptions, ContainSpec, EagerLoadable, EagerLoader, Fields,
    QueryBuilder,
};
pub use event::{EventManager, ModelEvent};
pub use locator::TableLocator;
pub use query::{Query, ResultFormatter};
pub use result_set::{ResultSet, ResultSetFactory};
pub use statement::{BufferedStatement, CallbackStatement, RowInjector, Statement};
pub use table::{Finder, FinderOptions, SaveOptions, Table};
