//! ORM queries.
//!
//! A [`Query`] wraps a [`SelectQuery`] with the table it reads from, the
//! containments of its [`EagerLoader`] and the hydration settings. Planning
//! happens when the query runs: default fields are added, contained
//! associations are joined or scheduled for a secondary query, and the rows
//! are folded into entities by a [`ResultSetFactory`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{Connection, Cx, Data, Dialect, Error, Outcome, Result, Value};
use strata_query::{Expr, Join, JoinType, Limit, Offset, OrderBy, SelectQuery};

use crate::BoxFuture;
use crate::eager::{ContainOptions, ContainSpec, EagerLoader};
use crate::result_set::{ResultSet, ResultSetFactory};
use crate::statement::{BufferedStatement, Statement};
use crate::table::{Finder, FinderOptions, Table};

/// Post-processing applied to the hydrated results, in registration order.
pub type ResultFormatter = Arc<dyn Fn(Vec<Data>) -> Vec<Data> + Send + Sync>;

/// A SELECT against one table, with eager loading and hydration.
#[derive(Clone)]
pub struct Query {
    repository: Arc<Table>,
    parts: SelectQuery,
    eager_loader: EagerLoader,
    options: FinderOptions,
    hydrate: bool,
    auto_fields: Option<bool>,
    has_fields: bool,
    eager_loaded: bool,
    before_find_fired: bool,
    formatters: Vec<ResultFormatter>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("repository", &self.repository.alias())
            .field("parts", &self.parts)
            .field("eager_loader", &self.eager_loader)
            .field("options", &self.options)
            .field("hydrate", &self.hydrate)
            .field("auto_fields", &self.auto_fields)
            .field("eager_loaded", &self.eager_loaded)
            .field("formatters", &self.formatters.len())
            .finish_non_exhaustive()
    }
}

impl Query {
    pub fn new(repository: Arc<Table>) -> Self {
        Self {
            repository,
            parts: SelectQuery::new(),
            eager_loader: EagerLoader::new(),
            options: FinderOptions::new(),
            hydrate: true,
            auto_fields: None,
            has_fields: false,
            eager_loaded: false,
            before_find_fired: false,
            formatters: Vec::new(),
        }
    }

    pub fn repository(&self) -> &Arc<Table> {
        &self.repository
    }

    // ==================== Finders and options ====================

    /// Refine the query through a finder of its table.
    pub fn call_finder(self, finder: &Finder) -> Result<Query> {
        let repository = Arc::clone(&self.repository);
        repository.call_finder(finder, self)
    }

    /// Apply finder options.
    ///
    /// `fields`, `contain`, `order`, `limit`, `offset` and `page` are
    /// applied to the query; any other key is kept for custom finders and
    /// `before_find` listeners.
    #[must_use]
    pub fn apply_options(mut self, options: &FinderOptions) -> Self {
        let mut page = None;
        for (key, value) in options {
            match (key.as_str(), value) {
                ("fields", value) => {
                    self = self.select(text_list(value));
                }
                ("contain", value) => {
                    self = self.contain(text_list(value));
                }
                ("order", value) => {
                    for field in text_list(value) {
                        self.parts.order_by(OrderBy::asc(&field));
                    }
                }
                ("limit", value) if value.as_i64().is_some() => {
                    self.parts.limit = value.as_i64().map(|n| Limit(clamp(n)));
                }
                ("offset", value) if value.as_i64().is_some() => {
                    self.parts.offset = value.as_i64().map(|n| Offset(clamp(n)));
                }
                ("page", value) if value.as_i64().is_some() => page = value.as_i64(),
                _ => {
                    self.options.insert(key.clone(), value.clone());
                }
            }
        }
        if let (Some(page), Some(Limit(limit))) = (page, self.parts.limit) {
            let skipped = clamp(page.saturating_sub(1));
            self.parts.offset = Some(Offset(skipped.saturating_mul(limit)));
        }
        self
    }

    /// Options not consumed by the query itself.
    pub fn get_options(&self) -> &FinderOptions {
        &self.options
    }

    // ==================== Selection ====================

    /// Select `Alias.column` or bare `column` references.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            let expr = Expr::field(&field);
            self.parts.select(field, expr);
        }
        self
    }

    /// Select an arbitrary expression under `key`.
    #[must_use]
    pub fn select_expr(mut self, key: impl Into<String>, expr: Expr) -> Self {
        self.parts.select(key, expr);
        self
    }

    /// Add already keyed fields to the select list.
    pub fn select_fields(&mut self, fields: IndexMap<String, Expr>) {
        self.parts.fields.extend(fields);
    }

    pub fn select_clause(&self) -> &IndexMap<String, Expr> {
        &self.parts.fields
    }

    pub fn set_auto_fields(&mut self, enable: bool) {
        self.auto_fields = Some(enable);
    }

    /// Also select every column of the table when fields were selected.
    #[must_use]
    pub fn enable_auto_fields(mut self, enable: bool) -> Self {
        self.auto_fields = Some(enable);
        self
    }

    /// `None` until auto fields are set either way.
    pub fn auto_fields(&self) -> Option<bool> {
        self.auto_fields
    }

    /// Whether the caller selected fields, as of the last planning pass.
    pub(crate) fn has_fields(&self) -> bool {
        self.has_fields
    }

    // ==================== Clauses ====================

    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.parts.and_where(condition);
        self
    }

    pub fn and_where(&mut self, condition: Expr) {
        self.parts.and_where(condition);
    }

    pub fn where_conditions(&self) -> &[Expr] {
        &self.parts.conditions
    }

    /// Add a join, replacing any join with the same alias.
    pub fn join(&mut self, join: Join) {
        self.parts.join(join);
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.parts.order_by(order);
        self
    }

    #[must_use]
    pub fn group_by(mut self, expr: Expr) -> Self {
        self.parts.group_by(expr);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.parts.limit = Some(Limit(limit));
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.parts.offset = Some(Offset(offset));
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.parts.distinct = true;
        self
    }

    /// The SQL delegate, as planned so far.
    pub(crate) fn select_query(&self) -> &SelectQuery {
        &self.parts
    }

    // ==================== Eager loading ====================

    /// Load associations along with the results.
    ///
    /// ```ignore
    /// let query = articles
    ///     .query()
    ///     .contain(["Authors.Books", "Comments"])
    ///     .contain(ContainSpec::new().with("Tags", ContainOptions::new().fields(["id", "name"])));
    /// ```
    #[must_use]
    pub fn contain(mut self, spec: impl Into<ContainSpec>) -> Self {
        self.eager_loader.contain(spec);
        self
    }

    #[must_use]
    pub fn clear_contain(mut self) -> Self {
        self.eager_loader.clear_contain();
        self
    }

    /// Keep rows that have a related row along `path`. The related data is
    /// nested under `_matchingData`.
    #[must_use]
    pub fn matching(self, path: &str) -> Self {
        self.matching_options(path, ContainOptions::new())
    }

    /// [`matching`](Self::matching) with a builder refining the joined association.
    #[must_use]
    pub fn matching_with(
        self,
        path: &str,
        builder: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.matching_options(path, ContainOptions::new().query_builder(builder))
    }

    /// Keep rows that have no related row along `path`.
    #[must_use]
    pub fn not_matching(self, path: &str) -> Self {
        self.matching_options(
            path,
            ContainOptions::new()
                .join_type(JoinType::Left)
                .without_fields()
                .negate_match(true),
        )
    }

    /// Inner join along `path` without selecting the related data.
    #[must_use]
    pub fn inner_join_with(self, path: &str) -> Self {
        self.matching_options(
            path,
            ContainOptions::new()
                .join_type(JoinType::Inner)
                .without_fields(),
        )
    }

    /// Left join along `path` without selecting the related data.
    #[must_use]
    pub fn left_join_with(self, path: &str) -> Self {
        self.matching_options(
            path,
            ContainOptions::new()
                .join_type(JoinType::Left)
                .without_fields(),
        )
    }

    /// Matching join with explicit options.
    #[must_use]
    pub fn matching_options(mut self, path: &str, options: ContainOptions) -> Self {
        self.eager_loader.set_matching(path, options);
        self
    }

    /// Mark the query as loading associated data for another query.
    #[must_use]
    pub fn eager_loaded(mut self, eager_loaded: bool) -> Self {
        self.eager_loaded = eager_loaded;
        self
    }

    pub fn is_eager_loaded(&self) -> bool {
        self.eager_loaded
    }

    pub fn eager_loader(&self) -> &EagerLoader {
        &self.eager_loader
    }

    pub fn eager_loader_mut(&mut self) -> &mut EagerLoader {
        &mut self.eager_loader
    }

    // ==================== Results ====================

    /// Return plain records instead of entities.
    #[must_use]
    pub fn enable_hydration(mut self, enable: bool) -> Self {
        self.hydrate = enable;
        self
    }

    pub fn is_hydration_enabled(&self) -> bool {
        self.hydrate
    }

    /// Add a formatter that runs after the formatters already registered.
    #[must_use]
    pub fn format_results(
        mut self,
        formatter: impl Fn(Vec<Data>) -> Vec<Data> + Send + Sync + 'static,
    ) -> Self {
        self.formatters.push(Arc::new(formatter));
        self
    }

    /// Add a formatter that runs before the formatters already registered.
    pub fn prepend_formatter(&mut self, formatter: ResultFormatter) {
        self.formatters.insert(0, formatter);
    }

    pub fn result_formatters(&self) -> &[ResultFormatter] {
        &self.formatters
    }

    // ==================== Events ====================

    /// Run the `before_find` hooks of behaviors and listeners, once.
    pub fn trigger_before_find(&mut self) {
        if self.before_find_fired {
            return;
        }
        self.before_find_fired = true;
        let repository = Arc::clone(&self.repository);
        let options = self.options.clone();
        let primary = !self.eager_loaded;
        for behavior in repository.behaviors().iter() {
            behavior.before_find(self, &options, primary);
        }
        repository
            .events()
            .dispatch_before_find(self, &options, primary);
    }

    // ==================== Planning ====================

    /// `Alias__column` label and qualified expression for a field reference.
    pub fn alias_field(&self, field: &str, alias: Option<&str>) -> (String, Expr) {
        match field.split_once('.') {
            Some((table, column)) => (format!("{table}__{column}"), Expr::qualified(table, column)),
            None => {
                let alias = alias.unwrap_or_else(|| self.repository.alias());
                (format!("{alias}__{field}"), Expr::qualified(alias, field))
            }
        }
    }

    /// Label plain column references `Alias__column`.
    ///
    /// A column keyed by its own reference is relabelled, qualified by
    /// `default_alias` when it has no table. Other keys are left alone.
    pub fn alias_fields(
        &self,
        fields: IndexMap<String, Expr>,
        default_alias: &str,
    ) -> IndexMap<String, Expr> {
        fields
            .into_iter()
            .map(|(key, expr)| {
                let reference = match expr.as_column() {
                    Some((Some(table), name)) if key == format!("{table}.{name}") => {
                        Some(format!("{table}.{name}"))
                    }
                    Some((None, name)) if key == name => Some(name.to_string()),
                    _ => None,
                };
                match reference {
                    Some(reference) => self.alias_field(&reference, Some(default_alias)),
                    None => (key, expr),
                }
            })
            .collect()
    }

    fn add_default_fields(&mut self) {
        self.has_fields = true;
        if self.parts.fields.is_empty() || self.auto_fields == Some(true) {
            self.has_fields = false;
            let repository = Arc::clone(&self.repository);
            for column in repository.columns() {
                self.parts.fields.insert(column.clone(), Expr::col(column));
            }
        }
        let fields = std::mem::take(&mut self.parts.fields);
        self.parts.fields = self.alias_fields(fields, self.repository.alias());
    }

    /// Prepare the query for execution: FROM clause, default fields and
    /// contained associations.
    #[tracing::instrument(level = "trace", skip(self), fields(table = %self.repository.alias()))]
    pub fn transform(&mut self) -> Result<()> {
        let repository = Arc::clone(&self.repository);
        self.parts.from = Some((
            repository.table_name().to_string(),
            repository.alias().to_string(),
        ));
        self.add_default_fields();
        EagerLoader::attach_associations(self, &repository, !self.has_fields)
    }

    /// The SQL this query runs, without running it.
    pub fn sql(&self, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        let mut query = self.clone();
        query.trigger_before_find();
        query.transform()?;
        Ok(query.parts.build_with_dialect(dialect))
    }

    // ==================== Execution ====================

    /// Run the query and hydrate its results.
    pub fn all<'a, C: Connection>(
        self,
        cx: &'a Cx,
        conn: &'a C,
    ) -> BoxFuture<'a, Outcome<ResultSet, Error>> {
        Box::pin(async move {
            let mut query = self;
            query.trigger_before_find();
            try_result!(query.transform());

            let (sql, params) = query.parts.build_with_dialect(conn.dialect());
            tracing::debug!(
                table = %query.repository.alias(),
                eager_loaded = query.eager_loaded,
                params = params.len(),
                "Executing query"
            );
            tracing::trace!(sql = %sql, "Query SQL");

            let rows = try_outcome!(conn.query(cx, &sql, &params).await);
            tracing::debug!(row_count = rows.len(), "Fetched rows");
            let statement: Box<dyn Statement> =
                Box::new(BufferedStatement::from_rows(query.parts.field_keys(), rows));
            let mut statement =
                try_outcome!(EagerLoader::load_external(&query, statement, cx, conn).await);

            let factory = try_result!(ResultSetFactory::collect_data(&mut query));
            let results = factory.create_result_set(statement.fetch_all()).into_vec();
            let results = query
                .formatters
                .iter()
                .fold(results, |data, formatter| formatter(data));
            Outcome::Ok(ResultSet::new(results))
        })
    }

    /// The first result, if any.
    pub async fn first<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<Option<Data>, Error> {
        let results = try_outcome!(self.limit(1).all(cx, conn).await);
        Outcome::Ok(results.into_vec().into_iter().next())
    }

    /// A copy for counting: hooks fired, no auto fields, no limit, offset,
    /// order or formatters.
    pub fn clean_copy(&self) -> Query {
        let mut copy = self.clone();
        copy.trigger_before_find();
        copy.auto_fields = Some(false);
        copy.parts.limit = None;
        copy.parts.offset = None;
        copy.parts.order_by.clear();
        copy.formatters.clear();
        copy
    }

    /// Number of rows the query matches, ignoring limit and offset.
    pub fn count<'a, C: Connection>(
        &self,
        cx: &'a Cx,
        conn: &'a C,
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        let mut query = self.clean_copy();
        Box::pin(async move {
            let complex = query.parts.distinct
                || !query.parts.group_by.is_empty()
                || query.parts.fields.values().any(|expr| expr.as_column().is_none());

            if complex {
                try_result!(query.transform());
                let (sql, params) = query.parts.build_with_dialect(conn.dialect());
                tracing::trace!(sql = %sql, "Counting rows of a grouped query");
                let rows = try_outcome!(conn.query(cx, &sql, &params).await);
                return Outcome::Ok(rows.len() as u64);
            }

            query.eager_loader.enable_auto_fields(false);
            query.parts.fields = IndexMap::from([("count".to_string(), Expr::count_star())]);
            try_result!(query.transform());
            let (sql, params) = query.parts.build_with_dialect(conn.dialect());
            tracing::trace!(sql = %sql, "Count SQL");
            let rows = try_outcome!(conn.query(cx, &sql, &params).await);
            let count = rows
                .first()
                .and_then(|row| row.get_by_name("count"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Outcome::Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}

fn clamp(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// A text option as a list: a single string or an array of strings.
fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Text(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
