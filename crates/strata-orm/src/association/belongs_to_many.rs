//! Many-to-many associations through a junction table.
//!
//! The junction table holds the source foreign key and the target foreign key.
//! Unless one is registered under the junction alias beforehand, a minimal
//! junction table is registered on first use. Rows read back through the
//! junction carry the junction row under the target entity's `_joinData`
//! property.

use std::sync::{Arc, OnceLock};

use strata_core::{
    AssociationErrorKind, Connection, Cx, Data, Entity, Error, Outcome, Result, Value,
};
use strata_query::Expr;

use super::{Association, AssociationOptions, AttachOptions, dependent};
use crate::eager::{ContainOptions, Fields};
use crate::inflector;
use crate::query::Query;
use crate::table::{Finder, SaveOptions, Table};

/// Property the junction row is nested under on each target entity.
pub const JUNCTION_PROPERTY: &str = "_joinData";

/// Junction table metadata of a many-to-many association.
#[derive(Debug)]
pub struct Junction {
    /// Table name, e.g. `articles_tags`.
    table: String,
    /// Registry and SQL alias, e.g. `ArticlesTags`.
    alias: String,
    /// Junction columns referencing the target.
    target_foreign_key: Vec<String>,
    /// Target-to-junction link used to join the junction when loading.
    target_link: OnceLock<Arc<Association>>,
}

impl Junction {
    pub(crate) fn new(name: &str, source_alias: &str, options: &AssociationOptions) -> Self {
        let table = options.join_table.clone().unwrap_or_else(|| {
            let mut tables = [
                inflector::underscore(source_alias),
                inflector::underscore(name),
            ];
            tables.sort();
            tables.join("_")
        });
        let alias = options
            .through
            .clone()
            .unwrap_or_else(|| inflector::camelize(&table));
        let target_foreign_key = options
            .target_foreign_key
            .clone()
            .unwrap_or_else(|| vec![inflector::foreign_key(name)]);

        Self {
            table,
            alias,
            target_foreign_key,
            target_link: OnceLock::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn target_foreign_key(&self) -> &[String] {
        &self.target_foreign_key
    }

    /// The junction table, registering a minimal one when none exists.
    pub fn junction_table(&self, assoc: &Association) -> Result<Arc<Table>> {
        let locator = assoc.locator()?;
        let columns: Vec<String> = assoc
            .foreign_key()
            .iter()
            .chain(&self.target_foreign_key)
            .cloned()
            .collect();
        locator.get_or_insert_with(&self.alias, || {
            Table::new(&self.alias)
                .table(&self.table)
                .with_columns(columns.clone())
                .with_primary_key(columns)
        })
    }

    /// `Target hasMany Junction`, keyed by the target foreign key.
    pub fn target_link(&self, assoc: &Association) -> Result<Arc<Association>> {
        if let Some(link) = self.target_link.get() {
            return Ok(Arc::clone(link));
        }
        self.junction_table(assoc)?;
        let link = Association::has_many(
            &self.alias,
            assoc.name(),
            AssociationOptions::new()
                .foreign_key(self.target_foreign_key.clone())
                .property_name(JUNCTION_PROPERTY),
        );
        link.bind_locator(&assoc.locator()?)?;
        Ok(Arc::clone(self.target_link.get_or_init(|| Arc::new(link))))
    }

    /// Join the junction, then the target through it.
    pub(crate) fn attach_to(
        &self,
        assoc: &Association,
        query: &mut Query,
        options: AttachOptions,
    ) -> Result<()> {
        let link = self.target_link(assoc)?;
        let binding_key = assoc.binding_key()?;
        if binding_key.len() != assoc.foreign_key().len() {
            return Err(Error::association(
                AssociationErrorKind::KeyMismatch,
                format!(
                    "Cannot match provided foreignKey for \"{}\", got \"({})\" but expected foreign key for \"({})\"",
                    assoc.name(),
                    assoc.foreign_key().join(", "),
                    binding_key.join(", ")
                ),
            ));
        }
        let junction_conditions: Vec<Expr> = assoc
            .foreign_key()
            .iter()
            .zip(&binding_key)
            .map(|(fk, bk)| {
                Expr::qualified(&self.alias, fk).eq(Expr::qualified(assoc.source_alias(), bk))
            })
            .collect();

        let junction_fields = match options.contain.fields {
            Some(Fields::Disabled) => Some(Fields::Disabled),
            _ => None,
        };
        link.attach_join(
            query,
            AttachOptions {
                contain: ContainOptions {
                    foreign_key: Some(Vec::new()),
                    conditions: Some(junction_conditions),
                    join_type: options.contain.join_type,
                    fields: junction_fields,
                    ..ContainOptions::default()
                },
                alias_path: self.alias.clone(),
                property_path: String::new(),
                include_fields: options.include_fields,
                table: None,
            },
        )?;
        query
            .eager_loader_mut()
            .add_to_joins_map(&self.alias, Arc::clone(&link), true, None);

        let target_key = link.binding_key()?;
        if target_key.len() != self.target_foreign_key.len() {
            return Err(Error::association(
                AssociationErrorKind::KeyMismatch,
                format!(
                    "Cannot match provided targetForeignKey for \"{}\", got \"({})\" but expected foreign key for \"({})\"",
                    assoc.name(),
                    self.target_foreign_key.join(", "),
                    target_key.join(", ")
                ),
            ));
        }
        let mut target_options = options;
        target_options.contain.foreign_key = Some(Vec::new());
        let conditions = target_options.contain.conditions.get_or_insert_with(Vec::new);
        for (pk, tfk) in target_key.iter().zip(&self.target_foreign_key) {
            conditions.push(
                Expr::qualified(assoc.name(), pk).eq(Expr::qualified(&self.alias, tfk)),
            );
        }
        assoc.attach_join(query, target_options)
    }

    /// Save each target entity, then the junction row linking it to `entity`.
    pub(crate) async fn save_associated<C: Connection>(
        &self,
        assoc: &Association,
        entity: &mut Entity,
        options: SaveOptions,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        if !matches!(entity.get(assoc.property()), Some(Data::List(_))) {
            return Outcome::Ok(true);
        }
        let target = try_result!(assoc.target());
        let junction = try_result!(self.junction_table(assoc));
        let binding_key = try_result!(assoc.binding_key());
        let source_values = entity.extract(&binding_key);
        if source_values.iter().any(Value::is_null) {
            return Outcome::Err(Error::association(
                AssociationErrorKind::MissingPrimaryKey,
                format!(
                    "Could not find primary key value for source entity of `{}`",
                    assoc.name()
                ),
            ));
        }
        let target_key = target.primary_key().to_vec();
        let nested = options.nested(assoc.name());

        let Some(Data::List(items)) = entity.get_mut(assoc.property()) else {
            return Outcome::Ok(true);
        };
        for item in items.iter_mut() {
            let Data::Entity(target_entity) = item else {
                continue;
            };
            let joint = target_entity.unset(JUNCTION_PROPERTY);
            if !try_outcome!(target.save(target_entity, nested.clone(), cx, conn).await) {
                return Outcome::Ok(false);
            }

            let mut link = match joint {
                Some(Data::Entity(existing)) => existing,
                Some(Data::Record(fields)) => {
                    let mut link = junction.new_entity();
                    for (field, value) in fields {
                        link.set(field, value);
                    }
                    link
                }
                _ => junction.new_entity(),
            };
            let target_values = target_entity.extract(&target_key);
            let keys = assoc
                .foreign_key()
                .iter()
                .zip(&source_values)
                .chain(self.target_foreign_key.iter().zip(&target_values));
            for (column, value) in keys {
                if link.is_new() || link.value(column) != Some(value) {
                    link.set(column.clone(), value.clone());
                }
            }
            if !try_outcome!(junction.save(&mut link, SaveOptions::default(), cx, conn).await) {
                return Outcome::Ok(false);
            }
            target_entity.set(JUNCTION_PROPERTY, link);
            target_entity.set_dirty(JUNCTION_PROPERTY, false);
        }
        Outcome::Ok(true)
    }

    /// Remove junction rows of `entity`. Target rows are never deleted.
    pub(crate) async fn cascade_delete<C: Connection>(
        &self,
        assoc: &Association,
        entity: &Entity,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        if !assoc.dependent() {
            return Outcome::Ok(true);
        }
        let junction = try_result!(self.junction_table(assoc));
        let binding_key = try_result!(assoc.binding_key());
        let values = entity.extract(&binding_key);
        if values.iter().any(Value::is_null) {
            return Outcome::Ok(true);
        }
        let mut query = try_result!(junction.find(&Finder::all()));
        for (fk, value) in assoc.foreign_key().iter().zip(values) {
            query.and_where(Expr::qualified(&self.alias, fk).eq(value));
        }
        dependent::delete_matching(&junction, query, assoc.cascade_callbacks(), cx, conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_junction_naming_is_sorted() {
        let junction = Junction::new("Tags", "Articles", &AssociationOptions::new());
        assert_eq!(junction.table_name(), "articles_tags");
        assert_eq!(junction.alias(), "ArticlesTags");
        assert_eq!(junction.target_foreign_key(), ["tag_id"]);

        let reversed = Junction::new("Articles", "Tags", &AssociationOptions::new());
        assert_eq!(reversed.table_name(), "articles_tags");
    }

    #[test]
    fn explicit_junction_options() {
        let junction = Junction::new(
            "Tags",
            "Articles",
            &AssociationOptions::new()
                .through("Taggings")
                .join_table("taggings")
                .target_foreign_key(["label_id"]),
        );
        assert_eq!(junction.table_name(), "taggings");
        assert_eq!(junction.alias(), "Taggings");
        assert_eq!(junction.target_foreign_key(), ["label_id"]);
    }
}
