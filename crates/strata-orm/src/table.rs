//! Tables: the repository a query is built against.
//!
//! A `Table` describes one database table under a registry alias: its name,
//! primary key and columns, its associations, finders, behaviors and event
//! listeners. Tables are shared as `Arc<Table>` through a
//! [`TableLocator`](crate::locator::TableLocator); associations reach their
//! target table by alias through the same locator.
//!
//! Persistence (`save`, `delete`) orchestrates associated rows: parents are
//! saved before the entity's own row and children after it, and dependent
//! rows are removed before the row that owns them.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use strata_core::{
    AssociationErrorKind, Connection, Cx, Data, Entity, Error, Outcome, Result, Value,
};
use strata_query::{DeleteQuery, Expr, InsertQuery, UpdateQuery};

use crate::BoxFuture;
use crate::association::{Association, AssociationOptions};
use crate::association_collection::AssociationCollection;
use crate::behavior::{Behavior, BehaviorRegistry};
use crate::event::{EventManager, ModelEvent};
use crate::inflector;
use crate::locator::{TableLocator, bind_once};
use crate::query::Query;

/// Options passed to a finder.
pub type FinderOptions = IndexMap<String, Value>;

/// A custom finder: refines a query using its options.
pub type FinderFn = Arc<dyn Fn(Query, &FinderOptions) -> Result<Query> + Send + Sync>;

/// A finder name with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Finder {
    pub name: String,
    pub options: FinderOptions,
}

impl Finder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: FinderOptions::new(),
        }
    }

    /// The finder every table provides; it leaves the query as is.
    pub fn all() -> Self {
        Self::new("all")
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl Default for Finder {
    fn default() -> Self {
        Self::all()
    }
}

impl From<&str> for Finder {
    fn from(name: &str) -> Self {
        Finder::new(name)
    }
}

impl From<String> for Finder {
    fn from(name: String) -> Self {
        Finder::new(name)
    }
}

/// Which associations `Table::save` cascades into.
///
/// `None` saves every association whose property is dirty. A list restricts
/// the cascade to the named aliases; dotted entries (`"Authors.Books"`)
/// restrict the nested save of `Authors` in turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    pub associated: Option<Vec<String>>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            associated: Some(aliases.into_iter().map(Into::into).collect()),
        }
    }

    /// Save only the entity's own row.
    pub fn without_associations() -> Self {
        Self {
            associated: Some(Vec::new()),
        }
    }

    /// Top-level aliases named by the list, in order and deduplicated.
    pub fn aliases(&self) -> Option<Vec<String>> {
        self.associated.as_ref().map(|list| {
            let mut aliases: Vec<String> = Vec::new();
            for entry in list {
                let alias = entry.split('.').next().unwrap_or(entry).to_string();
                if !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            }
            aliases
        })
    }

    /// Options for the nested save of `alias`.
    pub fn nested(&self, alias: &str) -> SaveOptions {
        let Some(list) = &self.associated else {
            return SaveOptions::default();
        };
        let prefix = format!("{alias}.");
        let nested: Vec<String> = list
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect();
        if nested.is_empty() {
            SaveOptions::default()
        } else {
            SaveOptions {
                associated: Some(nested),
            }
        }
    }
}

/// A database table under a registry alias.
pub struct Table {
    alias: String,
    table: String,
    primary_key: Vec<String>,
    columns: Vec<String>,
    entity_class: String,
    display_field: Option<String>,
    associations: AssociationCollection,
    finders: IndexMap<String, FinderFn>,
    behaviors: BehaviorRegistry,
    events: EventManager,
    locator: OnceLock<Weak<TableLocator>>,
}

impl Table {
    /// A table registered as `alias`. The table name defaults to the
    /// underscored alias, the entity class to the singular alias and the
    /// primary key to `id`.
    pub fn new(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            table: inflector::underscore(&alias),
            entity_class: inflector::singularize(&alias),
            alias,
            primary_key: vec!["id".to_string()],
            columns: Vec::new(),
            display_field: None,
            associations: AssociationCollection::new(),
            finders: IndexMap::new(),
            behaviors: BehaviorRegistry::new(),
            events: EventManager::new(),
            locator: OnceLock::new(),
        }
    }

    // ==================== Builder ====================

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_entity_class(mut self, class: impl Into<String>) -> Self {
        self.entity_class = class.into();
        self
    }

    #[must_use]
    pub fn display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn belongs_to(mut self, name: &str, options: AssociationOptions) -> Self {
        let assoc = Association::belongs_to(name, &self.alias, options);
        self.associations.add(assoc);
        self
    }

    #[must_use]
    pub fn has_one(mut self, name: &str, options: AssociationOptions) -> Self {
        let assoc = Association::has_one(name, &self.alias, options);
        self.associations.add(assoc);
        self
    }

    #[must_use]
    pub fn has_many(mut self, name: &str, options: AssociationOptions) -> Self {
        let assoc = Association::has_many(name, &self.alias, options);
        self.associations.add(assoc);
        self
    }

    #[must_use]
    pub fn belongs_to_many(mut self, name: &str, options: AssociationOptions) -> Self {
        let assoc = Association::belongs_to_many(name, &self.alias, options);
        self.associations.add(assoc);
        self
    }

    /// Register a custom finder callable as `find(name)`.
    #[must_use]
    pub fn finder(
        mut self,
        name: impl Into<String>,
        finder: impl Fn(Query, &FinderOptions) -> Result<Query> + Send + Sync + 'static,
    ) -> Self {
        self.finders.insert(name.into(), Arc::new(finder));
        self
    }

    /// Attach a behavior.
    pub fn behavior(mut self, behavior: Arc<dyn Behavior>) -> Result<Self> {
        self.behaviors.add(behavior)?;
        Ok(self)
    }

    #[must_use]
    pub fn on(
        mut self,
        event: ModelEvent,
        listener: impl Fn(&mut Entity) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.events.on(event, Arc::new(listener));
        self
    }

    #[must_use]
    pub fn on_before_find(
        mut self,
        listener: impl Fn(&mut Query, &FinderOptions, bool) + Send + Sync + 'static,
    ) -> Self {
        self.events.on_before_find(Arc::new(listener));
        self
    }

    // ==================== Accessors ====================

    /// Registry alias, also used as the SQL alias of the table.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn entity_class(&self) -> &str {
        &self.entity_class
    }

    pub fn get_display_field(&self) -> &str {
        self.display_field
            .as_deref()
            .or_else(|| ["title", "name"].into_iter().find(|f| self.has_column(f)))
            .or_else(|| self.primary_key.first().map(String::as_str))
            .unwrap_or("id")
    }

    pub fn associations(&self) -> &AssociationCollection {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<Arc<Association>> {
        self.associations.get(name)
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.associations.has(name)
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub(crate) fn bind_locator(&self, locator: &Arc<TableLocator>) -> Result<()> {
        bind_once(&self.locator, locator, &self.alias)?;
        self.associations.bind_locator(locator)
    }

    pub fn locator(&self) -> Result<Arc<TableLocator>> {
        self.locator
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                Error::config(format!(
                    "Table `{}` is not registered with a table locator",
                    self.alias
                ))
            })
    }

    /// A new, unsaved entity of this table's entity class.
    pub fn new_entity(&self) -> Entity {
        Entity::new(&self.entity_class, &self.alias)
    }

    // ==================== Finding ====================

    /// A blank query on this table.
    pub fn query(self: &Arc<Self>) -> Query {
        Query::new(Arc::clone(self))
    }

    /// A query on this table refined by `finder`.
    pub fn find(self: &Arc<Self>, finder: &Finder) -> Result<Query> {
        self.call_finder(finder, self.query())
    }

    pub fn has_finder(&self, name: &str) -> bool {
        name == "all" || self.finders.contains_key(name) || self.behaviors.has_finder(name)
    }

    /// Apply `finder` to `query`: built-in `all`, then custom finders, then
    /// finders provided by behaviors.
    pub fn call_finder(&self, finder: &Finder, query: Query) -> Result<Query> {
        let query = query.apply_options(&finder.options);
        let options = query.get_options().clone();
        if finder.name == "all" {
            return Ok(query);
        }
        if let Some(custom) = self.finders.get(&finder.name) {
            return custom(query, &options);
        }
        if self.behaviors.has_finder(&finder.name) {
            return self.behaviors.call_finder(&finder.name, query, &options);
        }
        Err(Error::config(format!(
            "Unknown finder method \"{}\" on table `{}`",
            finder.name, self.alias
        )))
    }

    /// Invoke a method provided by one of the table's behaviors.
    pub fn call_method(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.behaviors.call_method(method, args)
    }

    /// Whether a row matches `conditions`.
    pub async fn exists<C: Connection>(
        self: &Arc<Self>,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        let mut query = try_result!(self.find(&Finder::all()));
        query = query
            .select_expr("existing", Expr::raw("1"))
            .limit(1)
            .enable_hydration(false);
        for condition in conditions {
            query.and_where(condition);
        }
        let rows = try_outcome!(query.all(cx, conn).await);
        Outcome::Ok(!rows.is_empty())
    }

    // ==================== Bulk operations ====================

    /// `UPDATE` every row matching `conditions`; returns the affected row count.
    #[tracing::instrument(level = "debug", skip(self, values, conditions, cx, conn), fields(table = %self.table))]
    pub async fn update_all<C: Connection>(
        &self,
        values: IndexMap<String, Value>,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<u64, Error> {
        let mut update = UpdateQuery::new(&self.table);
        for (column, value) in values {
            update = update.set(column, value);
        }
        for condition in conditions {
            update = update.filter(condition.without_qualifier(&self.alias));
        }
        let (sql, params) = update.build_with_dialect(conn.dialect());
        tracing::debug!(sql = %sql, "Bulk update");
        conn.execute(cx, &sql, &params).await
    }

    /// `DELETE` every row matching `conditions`; returns the affected row count.
    #[tracing::instrument(level = "debug", skip(self, conditions, cx, conn), fields(table = %self.table))]
    pub async fn delete_all<C: Connection>(
        &self,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<u64, Error> {
        let mut delete = DeleteQuery::new(&self.table);
        for condition in conditions {
            delete = delete.filter(condition.without_qualifier(&self.alias));
        }
        let (sql, params) = delete.build_with_dialect(conn.dialect());
        tracing::debug!(sql = %sql, "Bulk delete");
        conn.execute(cx, &sql, &params).await
    }

    // ==================== Persistence ====================

    fn key_conditions(&self, entity: &Entity) -> Option<Vec<Expr>> {
        let values = entity.extract(&self.primary_key);
        if values.iter().any(Value::is_null) {
            return None;
        }
        Some(
            self.primary_key
                .iter()
                .zip(values)
                .map(|(column, value)| Expr::col(column).eq(value))
                .collect(),
        )
    }

    /// Dirty scalar fields that map to columns of this table.
    fn dirty_values(&self, entity: &Entity) -> IndexMap<String, Value> {
        entity
            .dirty_fields()
            .filter(|field| self.columns.is_empty() || self.has_column(field))
            .filter_map(|field| match entity.get(field) {
                Some(Data::Value(value)) => Some((field.to_string(), value.clone())),
                Some(Data::Null) => Some((field.to_string(), Value::Null)),
                _ => None,
            })
            .collect()
    }

    /// Persist `entity` and the associated entities found on it.
    ///
    /// Returns `false` when a listener or an associated save aborted. A clean
    /// entity that is not new is left untouched.
    pub fn save<'a, C: Connection>(
        self: &'a Arc<Self>,
        entity: &'a mut Entity,
        options: SaveOptions,
        cx: &'a Cx,
        conn: &'a C,
    ) -> BoxFuture<'a, Outcome<bool, Error>> {
        Box::pin(async move {
            if !entity.is_new() && !entity.has_dirty() {
                return Outcome::Ok(true);
            }
            if !try_result!(self.events.dispatch(ModelEvent::BeforeSave, entity)) {
                return Outcome::Ok(false);
            }
            if !try_outcome!(
                self.associations
                    .save_parents(self, entity, &options, cx, conn)
                    .await
            ) {
                return Outcome::Ok(false);
            }

            if entity.is_new() {
                try_outcome!(self.insert_row(entity, cx, conn).await);
            } else {
                try_outcome!(self.update_row(entity, cx, conn).await);
            }

            if !try_outcome!(
                self.associations
                    .save_children(self, entity, &options, cx, conn)
                    .await
            ) {
                return Outcome::Ok(false);
            }
            try_result!(self.events.dispatch(ModelEvent::AfterSave, entity));
            entity.clean();
            entity.set_new(false);
            Outcome::Ok(true)
        })
    }

    async fn insert_row<C: Connection>(
        &self,
        entity: &mut Entity,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<(), Error> {
        let values = self.dirty_values(entity);
        let (sql, params) = InsertQuery::new(&self.table)
            .values(values)
            .build_with_dialect(conn.dialect());
        tracing::debug!(table = %self.table, sql = %sql, "Inserting row");
        let id = try_outcome!(conn.insert(cx, &sql, &params).await);

        if let [primary] = self.primary_key.as_slice() {
            if !entity.has(primary) {
                entity.set(primary.clone(), Value::BigInt(id));
            }
        }
        Outcome::Ok(())
    }

    async fn update_row<C: Connection>(
        &self,
        entity: &mut Entity,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<(), Error> {
        let values = self.dirty_values(entity);
        if values.is_empty() {
            return Outcome::Ok(());
        }
        let Some(conditions) = self.key_conditions(entity) else {
            return Outcome::Err(Error::association(
                AssociationErrorKind::MissingPrimaryKey,
                format!(
                    "All primary key value(s) are needed for updating, `{}` entity is missing `{}`",
                    self.entity_class,
                    self.primary_key.join(", ")
                ),
            ));
        };

        let mut update = UpdateQuery::new(&self.table);
        for (column, value) in values {
            update = update.set(column, value);
        }
        for condition in conditions {
            update = update.filter(condition);
        }
        let (sql, params) = update.build_with_dialect(conn.dialect());
        tracing::debug!(table = %self.table, sql = %sql, "Updating row");
        try_outcome!(conn.execute(cx, &sql, &params).await);
        Outcome::Ok(())
    }

    /// Delete `entity`'s row after cascading into dependent associations.
    ///
    /// Returns `false` for new entities, when a listener or cascade aborted,
    /// or when no row was deleted.
    pub fn delete<'a, C: Connection>(
        self: &'a Arc<Self>,
        entity: &'a mut Entity,
        cx: &'a Cx,
        conn: &'a C,
    ) -> BoxFuture<'a, Outcome<bool, Error>> {
        Box::pin(async move {
            if entity.is_new() {
                return Outcome::Ok(false);
            }
            let Some(conditions) = self.key_conditions(entity) else {
                return Outcome::Err(Error::association(
                    AssociationErrorKind::MissingPrimaryKey,
                    format!(
                        "Deleting requires all primary key values of `{}` ({})",
                        self.alias,
                        self.primary_key.join(", ")
                    ),
                ));
            };
            if !try_result!(self.events.dispatch(ModelEvent::BeforeDelete, entity)) {
                return Outcome::Ok(false);
            }
            if !try_outcome!(self.associations.cascade_delete(entity, cx, conn).await) {
                return Outcome::Ok(false);
            }

            let mut delete = DeleteQuery::new(&self.table);
            for condition in conditions {
                delete = delete.filter(condition);
            }
            let (sql, params) = delete.build_with_dialect(conn.dialect());
            tracing::debug!(table = %self.table, sql = %sql, "Deleting row");
            let affected = try_outcome!(conn.execute(cx, &sql, &params).await);
            if affected == 0 {
                return Outcome::Ok(false);
            }
            try_result!(self.events.dispatch(ModelEvent::AfterDelete, entity));
            Outcome::Ok(true)
        })
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("alias", &self.alias)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("entity_class", &self.entity_class)
            .field("associations", &self.associations.keys())
            .field("finders", &self.finders.keys().collect::<Vec<_>>())
            .field("behaviors", &self.behaviors)
            .finish_non_exhaustive()
    }
}
