//! Eager loading of contained associations.
//!
//! `contain()` records a raw [`Contain`] tree on the query's [`EagerLoader`].
//! When the query is planned, the tree is normalized into
//! [`EagerLoadable`] nodes bound to their [`Association`](crate::Association),
//! partitioned into associations joined into the query and associations
//! loaded by a secondary query once the primary rows are known.

mod contain;
mod loadable;
mod loader;

pub use contain::{Contain, ContainOptions, ContainSpec, Fields, QueryBuilder};
pub use loadable::EagerLoadable;
pub use loader::{AssociationMapEntry, EagerLoader, MATCHING_PROPERTY};
