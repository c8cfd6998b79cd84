//! Associations between tables.
//!
//! An [`Association`] describes one directed relationship from a *source*
//! table (the one declaring it) to a *target* table. The target is never held
//! directly: it is looked up by alias through the [`TableLocator`] the source
//! table was registered with, so tables that reference each other do not form
//! ownership cycles.
//!
//! Behavior that differs per relationship lives in the per-kind modules and is
//! dispatched on [`AssociationKind`].

pub mod belongs_to;
pub mod belongs_to_many;
pub mod dependent;
pub mod has_many;
pub mod has_one;
pub mod select_loader;

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::{
    AssociationErrorKind, Connection, Cx, Data, Entity, Error, Outcome, Record, Result, Value,
};
use strata_query::{Expr, Join, JoinType, OrderBy};

use crate::eager::{ContainOptions, ContainSpec, Fields};
use crate::inflector;
use crate::locator::{TableLocator, bind_once};
use crate::query::{Query, ResultFormatter};
use crate::statement::RowInjector;
use crate::table::{Finder, SaveOptions, Table};

pub use belongs_to_many::Junction;
pub use select_loader::EagerLoadOptions;

/// How an association is loaded when contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Joined into the parent query.
    Join,
    /// Loaded by a secondary query filtered by the collected parent keys.
    Select,
    /// Loaded by a secondary query filtered by a subquery built from the parent query.
    Subquery,
}

impl Strategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Strategy::Join => "join",
            Strategy::Select => "select",
            Strategy::Subquery => "subquery",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of a relationship, seen from the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationType {
    /// One-to-one: `Users` has one `Profiles`.
    OneToOne,
    /// One-to-many: one `Articles` row has many `Comments`.
    OneToMany,
    /// Many-to-one: many `Articles` belong to one `Authors` row.
    ManyToOne,
    /// Many-to-many: `Articles` have many `Tags` via a junction table.
    ManyToMany,
}

impl AssociationType {
    /// Whether an eager load yields at most one row per parent.
    pub const fn is_single(self) -> bool {
        matches!(self, AssociationType::OneToOne | AssociationType::ManyToOne)
    }
}

/// The relationship variant and its kind-specific state.
#[derive(Debug)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany(Junction),
}

/// Declaration options for an association.
#[derive(Debug, Clone, Default)]
pub struct AssociationOptions {
    /// Registry class of the target; defaults to the association name.
    pub class_name: Option<String>,
    pub foreign_key: Option<Vec<String>>,
    pub binding_key: Option<Vec<String>>,
    /// Junction column pointing at the target (many-to-many only).
    pub target_foreign_key: Option<Vec<String>>,
    /// Alias of the junction table (many-to-many only).
    pub through: Option<String>,
    /// Name of the junction table (many-to-many only).
    pub join_table: Option<String>,
    pub property_name: Option<String>,
    pub strategy: Option<Strategy>,
    pub join_type: Option<JoinType>,
    pub dependent: Option<bool>,
    pub cascade_callbacks: bool,
    pub conditions: Vec<Expr>,
    pub finder: Option<Finder>,
    pub sort: Vec<OrderBy>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn class_name(mut self, class: impl Into<String>) -> Self {
        self.class_name = Some(class.into());
        self
    }

    #[must_use]
    pub fn foreign_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn binding_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binding_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn target_foreign_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_foreign_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn through(mut self, alias: impl Into<String>) -> Self {
        self.through = Some(alias.into());
        self
    }

    #[must_use]
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    #[must_use]
    pub fn property_name(mut self, property: impl Into<String>) -> Self {
        self.property_name = Some(property.into());
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    #[must_use]
    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = Some(dependent);
        self
    }

    #[must_use]
    pub fn cascade_callbacks(mut self, cascade: bool) -> Self {
        self.cascade_callbacks = cascade;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn finder(mut self, finder: impl Into<Finder>) -> Self {
        self.finder = Some(finder.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, order: OrderBy) -> Self {
        self.sort.push(order);
        self
    }
}

/// Options for attaching an association to a query as a join.
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    pub contain: ContainOptions,
    pub alias_path: String,
    pub property_path: String,
    /// Select the target's columns when no explicit list is given.
    pub include_fields: bool,
    /// Overrides the joined table name.
    pub table: Option<String>,
}

/// A relationship between a source table and a target table.
#[derive(Debug)]
pub struct Association {
    name: String,
    class_name: String,
    source_alias: String,
    kind: AssociationKind,
    foreign_key: Vec<String>,
    binding_key: Option<Vec<String>>,
    conditions: Vec<Expr>,
    dependent: bool,
    cascade_callbacks: bool,
    join_type: JoinType,
    property_name: String,
    strategy: Strategy,
    finder: Finder,
    sort: Vec<OrderBy>,
    locator: OnceLock<Weak<TableLocator>>,
}

/// `Blog.Authors` -> `Authors`.
pub(crate) fn plugin_split(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, alias)| alias)
}

impl Association {
    fn build(
        kind: AssociationKind,
        name: &str,
        source_alias: &str,
        options: AssociationOptions,
    ) -> Self {
        let alias = plugin_split(name).to_string();
        let class_name = options.class_name.unwrap_or_else(|| name.to_string());
        let foreign_key = options.foreign_key.unwrap_or_else(|| {
            vec![match kind {
                AssociationKind::BelongsTo => inflector::foreign_key(&alias),
                _ => inflector::foreign_key(source_alias),
            }]
        });
        let property_name = options.property_name.unwrap_or_else(|| match kind {
            AssociationKind::BelongsTo | AssociationKind::HasOne => {
                inflector::underscore(&inflector::singularize(&alias))
            }
            AssociationKind::HasMany | AssociationKind::BelongsToMany(_) => {
                inflector::underscore(&alias)
            }
        });
        let (default_strategy, default_dependent) = match kind {
            AssociationKind::BelongsTo | AssociationKind::HasOne => (Strategy::Join, false),
            AssociationKind::HasMany => (Strategy::Select, false),
            AssociationKind::BelongsToMany(_) => (Strategy::Select, true),
        };
        let default_join_type = match kind {
            AssociationKind::BelongsToMany(_) => JoinType::Inner,
            _ => JoinType::Left,
        };

        Self {
            name: alias,
            class_name,
            source_alias: source_alias.to_string(),
            kind,
            foreign_key,
            binding_key: options.binding_key,
            conditions: options.conditions,
            dependent: options.dependent.unwrap_or(default_dependent),
            cascade_callbacks: options.cascade_callbacks,
            join_type: options.join_type.unwrap_or(default_join_type),
            property_name,
            strategy: options.strategy.unwrap_or(default_strategy),
            finder: options.finder.unwrap_or_default(),
            sort: options.sort,
            locator: OnceLock::new(),
        }
    }

    /// `source` belongs to the target: the foreign key lives on the source table.
    pub fn belongs_to(name: &str, source_alias: &str, options: AssociationOptions) -> Self {
        Self::build(AssociationKind::BelongsTo, name, source_alias, options)
    }

    /// `source` has one target row: the foreign key lives on the target table.
    pub fn has_one(name: &str, source_alias: &str, options: AssociationOptions) -> Self {
        Self::build(AssociationKind::HasOne, name, source_alias, options)
    }

    /// `source` has many target rows: the foreign key lives on the target table.
    pub fn has_many(name: &str, source_alias: &str, options: AssociationOptions) -> Self {
        Self::build(AssociationKind::HasMany, name, source_alias, options)
    }

    /// Many-to-many through a junction table holding both foreign keys.
    pub fn belongs_to_many(name: &str, source_alias: &str, options: AssociationOptions) -> Self {
        let junction = Junction::new(plugin_split(name), source_alias, &options);
        Self::build(
            AssociationKind::BelongsToMany(junction),
            name,
            source_alias,
            options,
        )
    }

    // ==================== Accessors ====================

    /// Alias of the association, which is also the SQL alias of the target.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn source_alias(&self) -> &str {
        &self.source_alias
    }

    pub fn kind(&self) -> &AssociationKind {
        &self.kind
    }

    pub fn association_type(&self) -> AssociationType {
        match self.kind {
            AssociationKind::BelongsTo => AssociationType::ManyToOne,
            AssociationKind::HasOne => AssociationType::OneToOne,
            AssociationKind::HasMany => AssociationType::OneToMany,
            AssociationKind::BelongsToMany(_) => AssociationType::ManyToMany,
        }
    }

    pub fn foreign_key(&self) -> &[String] {
        &self.foreign_key
    }

    /// Property the associated data is nested under on the source entity.
    pub fn property(&self) -> &str {
        &self.property_name
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn dependent(&self) -> bool {
        self.dependent
    }

    pub fn cascade_callbacks(&self) -> bool {
        self.cascade_callbacks
    }

    /// Conditions applied to every find and join of this association.
    pub fn conditions(&self) -> &[Expr] {
        &self.conditions
    }

    pub fn finder(&self) -> &Finder {
        &self.finder
    }

    pub fn sort(&self) -> &[OrderBy] {
        &self.sort
    }

    /// Strategies this kind of association can be loaded with.
    pub fn valid_strategies(&self) -> &'static [Strategy] {
        match self.kind {
            AssociationKind::BelongsTo | AssociationKind::HasOne => {
                &[Strategy::Join, Strategy::Select]
            }
            AssociationKind::HasMany | AssociationKind::BelongsToMany(_) => {
                &[Strategy::Select, Strategy::Subquery]
            }
        }
    }

    /// Reject a strategy this association cannot be loaded with.
    pub fn validate_strategy(&self, strategy: Strategy) -> Result<()> {
        if self.valid_strategies().contains(&strategy) {
            return Ok(());
        }
        let valid: Vec<_> = self
            .valid_strategies()
            .iter()
            .map(|s| s.as_str())
            .collect();
        Err(Error::association(
            AssociationErrorKind::InvalidStrategy,
            format!(
                "Invalid strategy \"{strategy}\" was provided for `{}`. Valid options are ({}).",
                self.name,
                valid.join(", ")
            ),
        ))
    }

    // ==================== Tables ====================

    pub(crate) fn bind_locator(&self, locator: &Arc<TableLocator>) -> Result<()> {
        bind_once(&self.locator, locator, &self.name)
    }

    pub(crate) fn locator(&self) -> Result<Arc<TableLocator>> {
        self.locator
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                Error::config(format!(
                    "Association `{}` of `{}` is not bound to a table locator",
                    self.name, self.source_alias
                ))
            })
    }

    /// The target table, resolved through the locator.
    pub fn target(&self) -> Result<Arc<Table>> {
        self.locator()?.get_with(&self.name, &self.class_name)
    }

    /// The source table, resolved through the locator.
    pub fn source(&self) -> Result<Arc<Table>> {
        self.locator()?.get(&self.source_alias)
    }

    /// Whether `side` holds the key the other table's foreign key points at.
    pub fn is_owning_side(&self, side: &Table) -> bool {
        match self.kind {
            AssociationKind::BelongsTo => side.alias() == self.name,
            AssociationKind::HasOne | AssociationKind::HasMany => {
                side.alias() == self.source_alias
            }
            AssociationKind::BelongsToMany(_) => true,
        }
    }

    /// Columns the foreign key refers to; the owning side's primary key unless set.
    pub fn binding_key(&self) -> Result<Vec<String>> {
        if let Some(key) = &self.binding_key {
            return Ok(key.clone());
        }
        let owner = match self.kind {
            AssociationKind::BelongsTo => self.target()?,
            _ => self.source()?,
        };
        Ok(owner.primary_key().to_vec())
    }

    /// Columns on the source rows used to look up associated rows.
    pub(crate) fn source_key(&self) -> Result<Vec<String>> {
        if self.association_type() == AssociationType::ManyToOne {
            Ok(self.foreign_key.clone())
        } else {
            self.binding_key()
        }
    }

    /// `Name.field`.
    pub fn alias_field(&self, field: &str) -> String {
        format!("{}.{field}", self.name)
    }

    // ==================== Eager loading ====================

    fn effective_strategy(&self, options: &ContainOptions) -> Strategy {
        options.strategy.unwrap_or(self.strategy)
    }

    /// Whether this association can be satisfied by a join in the parent query.
    ///
    /// To-many associations join only when used for matching.
    pub fn can_be_joined(&self, options: &ContainOptions) -> bool {
        match self.kind {
            AssociationKind::HasMany | AssociationKind::BelongsToMany(_) => options.is_matching(),
            AssociationKind::BelongsTo | AssociationKind::HasOne => {
                self.effective_strategy(options) == Strategy::Join
            }
        }
    }

    /// Whether parent keys must be collected before loading this association.
    pub fn requires_keys(&self, options: &ContainOptions) -> bool {
        self.effective_strategy(options) == Strategy::Select
    }

    /// Equality conditions between the binding key and `foreign_key`.
    pub fn join_condition(&self, foreign_key: &[String]) -> Result<Vec<Expr>> {
        let binding_key = self.binding_key()?;
        if foreign_key.len() != binding_key.len() {
            if binding_key.is_empty() {
                let table = match self.kind {
                    AssociationKind::BelongsTo => self.target()?.table_name().to_string(),
                    _ => self.source()?.table_name().to_string(),
                };
                return Err(Error::association(
                    AssociationErrorKind::MissingPrimaryKey,
                    format!(
                        "The \"{table}\" table does not define a primary key, and cannot have join conditions generated."
                    ),
                ));
            }
            return Err(Error::association(
                AssociationErrorKind::KeyMismatch,
                format!(
                    "Cannot match provided foreignKey for \"{}\", got \"({})\" but expected foreign key for \"({})\"",
                    self.name,
                    foreign_key.join(", "),
                    binding_key.join(", ")
                ),
            ));
        }

        Ok(foreign_key
            .iter()
            .zip(&binding_key)
            .map(|(fk, bk)| match self.kind {
                AssociationKind::BelongsTo => Expr::qualified(&self.name, bk)
                    .eq(Expr::qualified(&self.source_alias, fk)),
                _ => Expr::qualified(&self.source_alias, bk).eq(Expr::qualified(&self.name, fk)),
            })
            .collect())
    }

    /// Join this association into `query` and select its fields.
    #[tracing::instrument(level = "trace", skip(self, query, options), fields(association = %self.name))]
    pub fn attach_to(&self, query: &mut Query, options: AttachOptions) -> Result<()> {
        if let AssociationKind::BelongsToMany(junction) = &self.kind {
            return junction.attach_to(self, query, options);
        }
        self.attach_join(query, options)
    }

    pub(crate) fn attach_join(&self, query: &mut Query, options: AttachOptions) -> Result<()> {
        let target = self.target()?;
        let contain = &options.contain;
        let table = options
            .table
            .clone()
            .unwrap_or_else(|| target.table_name().to_string());
        let foreign_key = contain
            .foreign_key
            .clone()
            .unwrap_or_else(|| self.foreign_key.clone());
        let join_type = contain.join_type.unwrap_or(self.join_type);
        let finder = contain.finder.as_ref().unwrap_or(&self.finder);

        let mut dummy = self.find(Some(finder))?.eager_loaded(true);
        if let Some(builder) = &contain.query_builder {
            dummy = builder.apply(dummy);
        }
        if contain.is_matching()
            && self.strategy == Strategy::Join
            && !dummy.eager_loader().contain_tree().is_empty()
        {
            return Err(Error::association(
                AssociationErrorKind::UnsupportedContain,
                format!(
                    "`{}` association cannot contain() associations when using JOIN strategy.",
                    self.name
                ),
            ));
        }
        if !foreign_key.is_empty() {
            for condition in self.join_condition(&foreign_key)? {
                dummy.and_where(condition);
            }
        }
        for condition in contain.conditions.iter().flatten() {
            dummy.and_where(condition.clone());
        }
        dummy.trigger_before_find();

        query.join(Join::new(
            join_type,
            table,
            self.name.clone(),
            dummy.where_conditions().to_vec(),
        ));

        self.append_fields(query, &dummy, &options, &target)?;
        self.format_association_results(query, &dummy, &options);
        self.bind_new_associations(query, &dummy, &options);
        self.append_not_matching(query, &options, &target);
        Ok(())
    }

    fn append_fields(
        &self,
        query: &mut Query,
        surrogate: &Query,
        options: &AttachOptions,
        target: &Table,
    ) -> Result<()> {
        if !query.eager_loader().is_auto_fields_enabled() {
            return Ok(());
        }
        let (explicit, include_fields) = match &options.contain.fields {
            Some(Fields::Disabled) => (&[][..], false),
            Some(fields) => (fields.columns(), options.include_fields),
            None => (&[][..], options.include_fields),
        };

        let mut fields: IndexMap<String, Expr> = surrogate.select_clause().clone();
        for field in explicit {
            fields.insert(field.clone(), Expr::field(field));
        }
        if (fields.is_empty() && include_fields) || surrogate.auto_fields() == Some(true) {
            for column in target.columns() {
                fields.insert(column.clone(), Expr::col(column));
            }
        }
        let aliased = query.alias_fields(fields, &self.name);
        query.select_fields(aliased);
        Ok(())
    }

    /// Re-root result formatters declared on the surrogate query so they only
    /// see the nested data at this association's property path.
    fn format_association_results(
        &self,
        query: &mut Query,
        surrogate: &Query,
        options: &AttachOptions,
    ) {
        let formatters: Vec<ResultFormatter> = surrogate.result_formatters().to_vec();
        if formatters.is_empty() || options.property_path.is_empty() {
            return;
        }
        let path: Vec<String> = options
            .property_path
            .split('.')
            .map(str::to_string)
            .collect();
        let hydrate = query.is_hydration_enabled();
        let formatter: ResultFormatter = Arc::new(move |mut results: Vec<Data>| {
            let extracted: Vec<Data> = results
                .iter()
                .map(|row| extract_path(row, &path))
                .collect();
            let formatted = formatters
                .iter()
                .fold(extracted, |data, formatter| formatter(data));
            for (row, value) in results.iter_mut().zip(formatted) {
                insert_path(row, &path, value);
                if hydrate {
                    if let Some(entity) = row.as_entity_mut() {
                        entity.clean();
                    }
                }
            }
            results
        });
        query.prepend_formatter(formatter);
    }

    /// Re-root containments declared on the surrogate under this association.
    fn bind_new_associations(&self, query: &mut Query, surrogate: &Query, options: &AttachOptions) {
        let loader = surrogate.eager_loader();
        let contain = loader.contain_tree();
        let matching = loader.matching_tree();
        if contain.is_empty() && matching.is_none_or(IndexMap::is_empty) {
            return;
        }

        let mut rerooted = ContainSpec::new();
        for (alias, node) in contain {
            rerooted = rerooted.node(format!("{}.{alias}", options.alias_path), node.clone());
        }
        let eager_loader = query.eager_loader_mut();
        if !rerooted.is_empty() {
            eager_loader.contain(rerooted);
        }
        for (alias, node) in matching.into_iter().flatten() {
            eager_loader.set_matching_node(&format!("{}.{alias}", options.alias_path), node.clone());
        }
    }

    /// For `not_matching`: keep only rows where the target's primary key is NULL.
    fn append_not_matching(&self, query: &mut Query, options: &AttachOptions, target: &Table) {
        if options.contain.negate_match != Some(true) {
            return;
        }
        for column in target.primary_key() {
            query.and_where(Expr::qualified(&self.name, column).is_null());
        }
    }

    /// Build the row injector that splices externally loaded rows into the
    /// parent rows of `query`'s statement.
    pub async fn eager_load<C: Connection>(
        &self,
        options: EagerLoadOptions,
        query: &Query,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<RowInjector, Error> {
        select_loader::build_eager_loader(self, options, query, cx, conn).await
    }

    /// Move the data at `nest_key` into the source bucket's property.
    pub fn transform_row(&self, row: &mut Record, nest_key: &str, target_property: Option<&str>) {
        let property = target_property.unwrap_or(&self.property_name).to_string();
        let has_source = row
            .get(&self.source_alias)
            .is_some_and(|bucket| !bucket.is_null());
        if !has_source {
            return;
        }
        let value = row.shift_remove(nest_key).unwrap_or_default();
        if let Some(bucket) = row.get_mut(&self.source_alias) {
            bucket.set_field(property, value);
        }
    }

    /// Placeholder for an association that was not loaded into this row.
    pub fn default_row_value(&self, row: &mut Record, joined: bool) {
        let value = match self.kind {
            AssociationKind::HasMany | AssociationKind::BelongsToMany(_) if !joined => {
                Data::List(Vec::new())
            }
            _ => Data::Null,
        };
        if let Some(bucket) = row.get_mut(&self.source_alias) {
            if !bucket.is_null() {
                bucket.set_field(self.property_name.clone(), value);
            }
        }
    }

    // ==================== Proxies ====================

    /// A query on the target through `finder`, restricted by this association's conditions.
    pub fn find(&self, finder: Option<&Finder>) -> Result<Query> {
        let target = self.target()?;
        let mut query = target.find(finder.unwrap_or(&self.finder))?;
        for condition in &self.conditions {
            query.and_where(condition.clone());
        }
        Ok(query)
    }

    /// Whether any target row matches `conditions` and this association's conditions.
    pub async fn exists<C: Connection>(
        &self,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        let target = try_result!(self.target());
        target
            .exists(self.scoped(conditions), cx, conn)
            .await
    }

    /// Update target rows matching `conditions` and this association's conditions.
    pub async fn update_all<C: Connection>(
        &self,
        values: IndexMap<String, Value>,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<u64, Error> {
        let target = try_result!(self.target());
        target
            .update_all(values, self.scoped(conditions), cx, conn)
            .await
    }

    /// Delete target rows matching `conditions` and this association's conditions.
    pub async fn delete_all<C: Connection>(
        &self,
        conditions: Vec<Expr>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<u64, Error> {
        let target = try_result!(self.target());
        target
            .delete_all(self.scoped(conditions), cx, conn)
            .await
    }

    /// Association conditions followed by `conditions`.
    ///
    /// The target is registered under the association name, so conditions
    /// written against `Name.column` address it directly.
    fn scoped(&self, conditions: Vec<Expr>) -> Vec<Expr> {
        self.conditions.iter().cloned().chain(conditions).collect()
    }

    // ==================== Persistence ====================

    /// Save the associated data found on `entity`.
    pub async fn save_associated<C: Connection>(
        &self,
        entity: &mut Entity,
        options: SaveOptions,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        match &self.kind {
            AssociationKind::BelongsTo => {
                belongs_to::save_associated(self, entity, options, cx, conn).await
            }
            AssociationKind::HasOne => {
                has_one::save_associated(self, entity, options, cx, conn).await
            }
            AssociationKind::HasMany => {
                has_many::save_associated(self, entity, options, cx, conn).await
            }
            AssociationKind::BelongsToMany(junction) => {
                junction
                    .save_associated(self, entity, options, cx, conn)
                    .await
            }
        }
    }

    /// Delete or unlink associated rows before `entity` is deleted.
    pub async fn cascade_delete<C: Connection>(
        &self,
        entity: &Entity,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<bool, Error> {
        match &self.kind {
            AssociationKind::BelongsTo => Outcome::Ok(true),
            AssociationKind::HasOne | AssociationKind::HasMany => {
                dependent::cascade_delete(self, entity, cx, conn).await
            }
            AssociationKind::BelongsToMany(junction) => {
                junction.cascade_delete(self, entity, cx, conn).await
            }
        }
    }
}

/// Data at a dotted property path, `Null` when any segment is missing.
pub(crate) fn extract_path(row: &Data, path: &[String]) -> Data {
    path.iter()
        .try_fold(row, |node, segment| node.get(segment))
        .cloned()
        .unwrap_or_default()
}

/// Set `value` at a dotted property path when every parent segment exists.
pub(crate) fn insert_path(row: &mut Data, path: &[String], value: Data) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = row;
    for segment in parents {
        match node.get_mut(segment) {
            Some(next) => node = next,
            None => return,
        }
    }
    node.set_field(last.clone(), value);
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_alias, self.name)
    }
}
