//! The associations declared on one table.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{AssociationErrorKind, Connection, Cx, Entity, Error, Outcome, Result};

use crate::association::{Association, AssociationType};
use crate::locator::TableLocator;
use crate::table::{SaveOptions, Table};

/// Associations keyed by alias, in declaration order.
#[derive(Debug, Default)]
pub struct AssociationCollection {
    items: IndexMap<String, Arc<Association>>,
}

impl AssociationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an association, replacing any existing one with the same alias.
    pub fn add(&mut self, association: Association) -> Arc<Association> {
        let association = Arc::new(association);
        self.items
            .insert(association.name().to_string(), Arc::clone(&association));
        association
    }

    pub fn get(&self, alias: &str) -> Option<Arc<Association>> {
        self.items.get(alias).cloned()
    }

    /// The association whose results nest under `property`.
    pub fn get_by_property(&self, property: &str) -> Option<Arc<Association>> {
        self.items
            .values()
            .find(|a| a.property() == property)
            .cloned()
    }

    pub fn has(&self, alias: &str) -> bool {
        self.items.contains_key(alias)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.items.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Association>> {
        self.items.values()
    }

    /// Associations of the given types, in declaration order.
    pub fn get_by_type(&self, types: &[AssociationType]) -> Vec<Arc<Association>> {
        self.items
            .values()
            .filter(|a| types.contains(&a.association_type()))
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, alias: &str) -> Option<Arc<Association>> {
        self.items.shift_remove(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn bind_locator(&self, locator: &Arc<TableLocator>) -> Result<()> {
        for association in self.items.values() {
            association.bind_locator(locator)?;
        }
        Ok(())
    }

    /// Associations named by `options`, rejecting names that are not declared.
    fn selected(&self, table: &Table, options: &SaveOptions) -> Result<Vec<Arc<Association>>> {
        let Some(aliases) = options.aliases() else {
            return Ok(self.items.values().cloned().collect());
        };
        aliases
            .iter()
            .map(|alias| {
                self.get(alias).ok_or_else(|| {
                    Error::association(
                        AssociationErrorKind::NotAssociated,
                        format!("Cannot save {alias}, it is not associated to {}", table.alias()),
                    )
                })
            })
            .collect()
    }

    /// Save associations whose target owns the key `entity` refers to.
    pub async fn save_parents<C: Connection>(
        &self,
        table: &Table,
        entity: &mut Entity,
        options: &SaveOptions,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        self.save_associations(table, entity, options, false, cx, conn)
            .await
    }

    /// Save associations that refer to `entity`'s key.
    pub async fn save_children<C: Connection>(
        &self,
        table: &Table,
        entity: &mut Entity,
        options: &SaveOptions,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        self.save_associations(table, entity, options, true, cx, conn)
            .await
    }

    async fn save_associations<C: Connection>(
        &self,
        table: &Table,
        entity: &mut Entity,
        options: &SaveOptions,
        owning_side: bool,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        let selected = try_result!(self.selected(table, options));
        for association in selected {
            if association.is_owning_side(table) != owning_side {
                continue;
            }
            let property = association.property();
            let has_data = entity.get(property).is_some_and(|d| !d.is_blank());
            if !has_data || !entity.is_dirty(property) {
                continue;
            }
            if !try_outcome!(
                association
                    .save_associated(entity, options.clone(), cx, conn)
                    .await
            ) {
                tracing::debug!(
                    table = %table.alias(),
                    association = %association.name(),
                    "Associated save aborted"
                );
                return Outcome::Ok(false);
            }
        }
        Outcome::Ok(true)
    }

    /// Cascade a delete of `entity` into every association.
    ///
    /// Associations that cascade callbacks run first, while the rows the
    /// bulk cascades remove are still present for their listeners.
    pub async fn cascade_delete<C: Connection>(
        &self,
        entity: &Entity,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        let (callbacks, bulk): (Vec<_>, Vec<_>) = self
            .items
            .values()
            .partition(|a| a.cascade_callbacks());
        for association in callbacks.into_iter().chain(bulk) {
            if !try_outcome!(association.cascade_delete(entity, cx, conn).await) {
                return Outcome::Ok(false);
            }
        }
        Outcome::Ok(true)
    }
}
