//! The table registry.
//!
//! A `TableLocator` owns every table instance of an application, keyed by
//! alias. Associations never hold their target table; they look it up here by
//! alias, which keeps mutually associated tables free of ownership cycles.
//! Table classes can be defined as factories so a class can be instantiated
//! under several aliases on demand.

use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use indexmap::IndexMap;
use strata_core::{Error, Result};

use crate::association::plugin_split;
use crate::table::Table;

/// Builds a table of one class for the requested alias.
pub type TableFactory = Arc<dyn Fn(&str) -> Table + Send + Sync>;

/// Bind `slot` to `locator`.
///
/// A table or association belongs to a single locator for its whole life.
/// Binding it again to the same locator is a no-op; binding it to another
/// one fails.
pub(crate) fn bind_once(
    slot: &OnceLock<Weak<TableLocator>>,
    locator: &Arc<TableLocator>,
    owner: &str,
) -> Result<()> {
    let target = Arc::downgrade(locator);
    let bound = slot.get_or_init(|| target.clone());
    if Weak::ptr_eq(bound, &target) {
        return Ok(());
    }
    Err(Error::config(format!(
        "`{owner}` is already registered with another table locator"
    )))
}

/// Registry of tables by alias.
pub struct TableLocator {
    this: Weak<TableLocator>,
    factories: RwLock<IndexMap<String, TableFactory>>,
    instances: RwLock<IndexMap<String, Arc<Table>>>,
}

impl TableLocator {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            factories: RwLock::new(IndexMap::new()),
            instances: RwLock::new(IndexMap::new()),
        })
    }

    /// Define how tables of `class` are built.
    pub fn define(
        &self,
        class: impl Into<String>,
        factory: impl Fn(&str) -> Table + Send + Sync + 'static,
    ) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.into(), Arc::new(factory));
    }

    /// Register a table under its alias, replacing any table with that alias.
    ///
    /// Each association's configured strategy is validated first.
    pub fn add(&self, table: Table) -> Result<Arc<Table>> {
        for association in table.associations().iter() {
            association
                .validate_strategy(association.strategy())
                .map_err(|err| match err {
                    Error::Association(inner) => {
                        Error::Association(inner.for_association(association.name()))
                    }
                    other => other,
                })?;
        }
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| Error::config("Table locator is being dropped"))?;
        let table = Arc::new(table);
        table.bind_locator(&this)?;

        tracing::debug!(
            alias = %table.alias(),
            table = %table.table_name(),
            associations = table.associations().keys().len(),
            "Registered table"
        );
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.alias().to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// The table registered as `alias`, building it from the class of the
    /// same name when it is not registered yet.
    pub fn get(&self, alias: &str) -> Result<Arc<Table>> {
        self.get_with(alias, alias)
    }

    /// The table registered as `alias`, building it from `class` when it is
    /// not registered yet.
    pub fn get_with(&self, alias: &str, class: &str) -> Result<Arc<Table>> {
        if let Some(table) = self.lookup(alias) {
            return Ok(table);
        }
        let factory = {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            factories
                .get(class)
                .or_else(|| factories.get(plugin_split(class)))
                .cloned()
        };
        let Some(factory) = factory else {
            return Err(Error::config(format!(
                "Table class `{class}` for alias `{alias}` could not be found"
            )));
        };
        self.add(factory(alias))
    }

    /// The table registered as `alias`, registering the one `build` returns
    /// when there is none.
    pub fn get_or_insert_with(&self, alias: &str, build: impl FnOnce() -> Table) -> Result<Arc<Table>> {
        match self.lookup(alias) {
            Some(table) => Ok(table),
            None => self.add(build()),
        }
    }

    fn lookup(&self, alias: &str) -> Option<Arc<Table>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .cloned()
    }

    pub fn exists(&self, alias: &str) -> bool {
        self.lookup(alias).is_some()
    }

    pub fn remove(&self, alias: &str) -> Option<Arc<Table>> {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(alias)
    }

    /// Forget every registered table and factory.
    pub fn clear(&self) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Aliases of the registered tables, in registration order.
    pub fn aliases(&self) -> Vec<String> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl fmt::Debug for TableLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("TableLocator")
            .field("tables", &self.aliases())
            .field("factories", &factories)
            .finish()
    }
}
