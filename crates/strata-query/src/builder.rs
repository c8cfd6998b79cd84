//! Statement builders for INSERT, UPDATE, DELETE operations.

use crate::expr::Expr;
use indexmap::IndexMap;
use strata_core::{Dialect, Value};

/// INSERT statement builder.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    table: String,
    values: IndexMap<String, Value>,
}

impl InsertQuery {
    /// Create a new INSERT builder for the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: IndexMap::new(),
        }
    }

    /// Set a column value.
    pub fn value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    /// Set several column values at once.
    pub fn values(mut self, values: IndexMap<String, Value>) -> Self {
        self.values.extend(values);
        self
    }

    /// Build the INSERT SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let columns: Vec<_> = self
            .values
            .keys()
            .map(|c| dialect.quote_identifier(c))
            .collect();
        let params: Vec<_> = self.values.values().cloned().collect();
        let placeholders: Vec<_> = (1..=params.len()).map(|i| dialect.placeholder(i)).collect();

        let sql = if columns.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES",
                dialect.quote_identifier(&self.table)
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.quote_identifier(&self.table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        (sql, params)
    }
}

/// UPDATE statement builder.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    table: String,
    set: IndexMap<String, Value>,
    conditions: Vec<Expr>,
}

impl UpdateQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: IndexMap::new(),
            conditions: Vec::new(),
        }
    }

    /// Set a column to a new value.
    pub fn set(mut self, column: impl Into<String>, value: Value) -> Self {
        self.set.insert(column.into(), value);
        self
    }

    /// AND a condition into the WHERE clause.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether there is anything to update.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Build the UPDATE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let assignments: Vec<_> = self
            .set
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!(
                    "{} = {}",
                    dialect.quote_identifier(column),
                    dialect.placeholder(params.len())
                )
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            assignments.join(", ")
        );
        if let Some(condition) = Expr::all(self.conditions.iter().cloned()) {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.build_with_dialect(dialect, &mut params, 0));
        }
        (sql, params)
    }
}

/// DELETE statement builder.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    table: String,
    conditions: Vec<Expr>,
}

impl DeleteQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    /// AND a condition into the WHERE clause.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Build the DELETE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        if let Some(condition) = Expr::all(self.conditions.iter().cloned()) {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.build_with_dialect(dialect, &mut params, 0));
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql() {
        let (sql, params) = InsertQuery::new("articles")
            .value("title", Value::Text("Hello".into()))
            .value("author_id", Value::BigInt(1))
            .build_with_dialect(Dialect::Postgres);
        assert_eq!(
            sql,
            "INSERT INTO \"articles\" (\"title\", \"author_id\") VALUES ($1, $2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_update_params_precede_where() {
        let (sql, params) = UpdateQuery::new("articles")
            .set("title", Value::Text("New".into()))
            .filter(Expr::col("id").eq(7))
            .build_with_dialect(Dialect::Postgres);
        assert_eq!(sql, "UPDATE \"articles\" SET \"title\" = $1 WHERE \"id\" = $2");
        assert_eq!(params, vec![Value::Text("New".into()), Value::Int(7)]);
    }

    #[test]
    fn test_delete_sql() {
        let (sql, params) = DeleteQuery::new("comments")
            .filter(Expr::col("article_id").eq(Value::BigInt(3)))
            .build_with_dialect(Dialect::Sqlite);
        assert_eq!(sql, "DELETE FROM \"comments\" WHERE \"article_id\" = ?1");
        assert_eq!(params, vec![Value::BigInt(3)]);
    }
}
