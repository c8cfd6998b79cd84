//! JOIN clause types.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use strata_core::{Dialect, Value};

/// A JOIN clause against an aliased table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// Alias the table is joined under
    pub alias: String,
    /// ON conditions, ANDed together
    pub conditions: Vec<Expr>,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

impl Join {
    pub fn new(
        join_type: JoinType,
        table: impl Into<String>,
        alias: impl Into<String>,
        conditions: Vec<Expr>,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: alias.into(),
            conditions,
        }
    }

    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self::new(JoinType::Inner, table, alias, vec![on])
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self::new(JoinType::Left, table, alias, vec![on])
    }

    /// Generate SQL for this JOIN clause.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> String {
        let mut sql = format!(
            " {} {} AS {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.alias)
        );
        match Expr::all(self.conditions.iter().cloned()) {
            Some(on) => {
                sql.push_str(" ON ");
                sql.push_str(&on.build_with_dialect(dialect, params, offset));
            }
            None => sql.push_str(" ON 1 = 1"),
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_join_sql() {
        let join = Join::left(
            "authors",
            "Authors",
            Expr::qualified("Authors", "id").eq(Expr::qualified("Articles", "author_id")),
        );
        let mut params = Vec::new();
        let sql = join.build(Dialect::Postgres, &mut params, 0);
        assert_eq!(
            sql,
            " LEFT JOIN \"authors\" AS \"Authors\" ON \"Authors\".\"id\" = \"Articles\".\"author_id\""
        );
    }

    #[test]
    fn test_join_without_conditions() {
        let join = Join::new(JoinType::Inner, "tags", "Tags", Vec::new());
        let mut params = Vec::new();
        assert_eq!(
            join.build(Dialect::Postgres, &mut params, 0),
            " INNER JOIN \"tags\" AS \"Tags\" ON 1 = 1"
        );
    }

    #[test]
    fn test_join_type_deserializes_lowercase() {
        let t: JoinType = serde_json::from_str("\"inner\"").unwrap();
        assert_eq!(t, JoinType::Inner);
    }
}
