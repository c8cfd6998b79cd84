//! Dialect-aware SELECT builder.
//!
//! `SelectQuery` is the SQL-building delegate of the ORM query: it holds the
//! keyed select list, the aliased joins and the filtering clauses, and defers
//! SQL generation until a dialect is known.

use crate::clause::{Limit, Offset, OrderBy};
use crate::expr::Expr;
use crate::join::Join;
use indexmap::IndexMap;
use strata_core::{Dialect, Value};

/// Non-generic SELECT representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    /// FROM table and its alias
    pub from: Option<(String, String)>,
    /// Selected expressions keyed by result label
    pub fields: IndexMap<String, Expr>,
    /// JOIN clauses keyed by alias
    pub joins: IndexMap<String, Join>,
    /// WHERE conditions, ANDed together
    pub conditions: Vec<Expr>,
    /// ORDER BY terms
    pub order_by: Vec<OrderBy>,
    /// GROUP BY expressions
    pub group_by: Vec<Expr>,
    /// LIMIT clause
    pub limit: Option<Limit>,
    /// OFFSET clause
    pub offset: Option<Offset>,
    /// DISTINCT flag
    pub distinct: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the FROM table and alias.
    pub fn from(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from = Some((table.into(), alias.into()));
        self
    }

    /// Add a selected expression under `key`. An existing key is replaced in place.
    pub fn select(&mut self, key: impl Into<String>, expr: Expr) -> &mut Self {
        self.fields.insert(key.into(), expr);
        self
    }

    /// Replace the whole select list.
    pub fn set_fields(&mut self, fields: IndexMap<String, Expr>) -> &mut Self {
        self.fields = fields;
        self
    }

    /// Result labels of the select list, in order.
    pub fn field_keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Add or replace the join registered under the join's alias.
    pub fn join(&mut self, join: Join) -> &mut Self {
        self.joins.insert(join.alias.clone(), join);
        self
    }

    /// AND a condition into the WHERE clause.
    pub fn and_where(&mut self, condition: Expr) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    /// Append an ORDER BY term.
    pub fn order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by.push(order);
        self
    }

    /// Append a GROUP BY expression.
    pub fn group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.push(expr);
        self
    }

    /// Build the SQL query and parameters with a specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(dialect, &mut params, 0);
        (sql, params)
    }

    /// Build the SQL, appending parameters to an existing list.
    ///
    /// Used when this query is nested inside another statement so placeholders
    /// keep counting from the outer statement's parameters.
    pub fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.fields.is_empty() {
            sql.push('*');
        } else {
            let field_sqls: Vec<_> = self
                .fields
                .iter()
                .map(|(key, expr)| {
                    let expr_sql = expr.build_with_dialect(dialect, params, offset);
                    match expr.as_column() {
                        Some((None, name)) if name == key => expr_sql,
                        _ => format!("{expr_sql} AS {}", dialect.quote_identifier(key)),
                    }
                })
                .collect();
            sql.push_str(&field_sqls.join(", "));
        }

        // FROM
        if let Some((table, alias)) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(&dialect.quote_identifier(table));
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }

        // JOINs
        for join in self.joins.values() {
            sql.push_str(&join.build(dialect, params, offset));
        }

        // WHERE
        if let Some(condition) = Expr::all(self.conditions.iter().cloned()) {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.build_with_dialect(dialect, params, offset));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            let group_sqls: Vec<_> = self
                .group_by
                .iter()
                .map(|g| g.build_with_dialect(dialect, params, offset))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_sqls.join(", "));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let order_strs: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build(dialect, params, offset))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_strs.join(", "));
        }

        // LIMIT
        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        // OFFSET
        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinType;

    fn articles() -> SelectQuery {
        let mut q = SelectQuery::new().from("articles", "Articles");
        q.select("Articles__id", Expr::qualified("Articles", "id"));
        q.select("Articles__title", Expr::qualified("Articles", "title"));
        q
    }

    #[test]
    fn test_aliased_fields_and_from() {
        let (sql, params) = articles().build_with_dialect(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT \"Articles\".\"id\" AS \"Articles__id\", \"Articles\".\"title\" AS \"Articles__title\" FROM \"articles\" AS \"Articles\""
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_join_keyed_by_alias_replaces() {
        let mut q = articles();
        q.join(Join::left(
            "authors",
            "Authors",
            Expr::qualified("Authors", "id").eq(Expr::qualified("Articles", "author_id")),
        ));
        q.join(Join::new(JoinType::Inner, "authors", "Authors", Vec::new()));
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.joins["Authors"].join_type, JoinType::Inner);
    }

    #[test]
    fn test_where_params_continue_numbering() {
        let mut q = articles();
        q.and_where(Expr::qualified("Articles", "id").eq(1));
        q.and_where(Expr::qualified("Articles", "title").eq("x"));
        q.limit = Some(Limit(5));
        let (sql, params) = q.build_with_dialect(Dialect::Postgres);
        assert!(sql.ends_with(
            "WHERE \"Articles\".\"id\" = $1 AND \"Articles\".\"title\" = $2 LIMIT 5"
        ));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_nested_in_query() {
        let mut inner = SelectQuery::new().from("articles", "Articles");
        inner.select("Articles__author_id", Expr::qualified("Articles", "author_id"));
        inner.and_where(Expr::qualified("Articles", "published").eq(true));

        let mut outer = SelectQuery::new().from("authors", "Authors");
        outer.select("Authors__id", Expr::qualified("Authors", "id"));
        outer.and_where(Expr::qualified("Authors", "active").eq(true));
        outer.and_where(Expr::qualified("Authors", "id").in_query(inner));
        let (sql, params) = outer.build_with_dialect(Dialect::Postgres);
        assert!(sql.contains("\"Authors\".\"active\" = $1"));
        assert!(sql.contains("IN (SELECT \"Articles\".\"author_id\" AS \"Articles__author_id\" FROM \"articles\" AS \"Articles\" WHERE \"Articles\".\"published\" = $2)"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_bare_column_not_aliased() {
        let mut q = SelectQuery::new().from("tags", "Tags");
        q.select("name", Expr::col("name"));
        q.select("total", Expr::count_star());
        let (sql, _) = q.build_with_dialect(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"name\", COUNT(*) AS \"total\" FROM \"tags\" AS \"Tags\""
        );
    }
}
