//! SQL expressions for query building.
//!
//! This module provides the expression tree used for WHERE conditions, join
//! conditions, selected fields and ORDER BY terms.

use crate::select::SelectQuery;
use strata_core::{Dialect, Value};

/// A SQL expression that can be used in WHERE, ON, SELECT, etc.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value
    Literal(Value),

    /// Binary operation (e.g., a = b, a > b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// Function call (e.g., COUNT(*), UPPER(name))
    Function { name: String, args: Vec<Expr> },

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IN (SELECT ...) with the subquery's parameters bound inline
    InQuery {
        expr: Box<Expr>,
        query: Box<SelectQuery>,
        negated: bool,
    },

    /// Row value, e.g. `(a, b)`
    Tuple(Vec<Expr>),

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// Raw SQL fragment (escape hatch)
    Raw(String),

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Special aggregate: COUNT(*)
    CountStar,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create an unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a qualified column reference (table.column).
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Parse a `Alias.column` or bare `column` reference.
    pub fn field(path: &str) -> Self {
        match path.split_once('.') {
            Some((table, column)) => Expr::qualified(table, column),
            None => Expr::col(path),
        }
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Create a row value `(a, b, ...)`.
    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::Tuple(items)
    }

    /// COUNT(*)
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    /// Generic function call.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    // ==================== Comparison Operators ====================

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// AND together a list of conditions; `None` when the list is empty.
    pub fn all(conditions: impl IntoIterator<Item = Expr>) -> Option<Self> {
        conditions.into_iter().reduce(|acc, next| acc.and(next))
    }

    /// OR together a list of conditions, each parenthesized.
    pub fn any(conditions: impl IntoIterator<Item = Expr>) -> Option<Self> {
        conditions
            .into_iter()
            .map(Expr::paren)
            .reduce(|acc, next| acc.or(next))
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== Pattern Matching ====================

    /// LIKE pattern match
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    // ==================== IN Lists ====================

    /// IN list of values
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN list of values
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// IN (subquery)
    pub fn in_query(self, query: SelectQuery) -> Self {
        Expr::InQuery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    /// Wrap expression in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    // ==================== SQL Generation ====================

    /// Build SQL string and collect parameters (default PostgreSQL dialect).
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        self.build_with_dialect(Dialect::Postgres, params, offset)
    }

    /// Build SQL string with specific dialect.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    format!(
                        "{}.{}",
                        dialect.quote_identifier(t),
                        dialect.quote_identifier(name)
                    )
                } else {
                    dialect.quote_identifier(name)
                }
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_with_dialect(dialect, params, offset);
                let right_sql = right.build_with_dialect(dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Not(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("NOT {expr_sql}")
            }

            Expr::Function { name, args } => {
                let arg_sqls: Vec<_> = args
                    .iter()
                    .map(|a| a.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("{name}({})", arg_sqls.join(", "))
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { "NOT " } else { "" };
                if values.is_empty() {
                    // IN () is invalid SQL; an empty set matches nothing
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::InQuery {
                expr,
                query,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { "NOT " } else { "" };
                let sub_sql = query.build_into(dialect, params, offset);
                format!("{expr_sql} {not_str}IN ({sub_sql})")
            }

            Expr::Tuple(items) => {
                let item_sqls: Vec<_> = items
                    .iter()
                    .map(|i| i.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("({})", item_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                params.push(Value::Text(pattern.clone()));
                let param = dialect.placeholder(offset + params.len());
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}LIKE {param}")
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Paren(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("({expr_sql})")
            }

            Expr::CountStar => "COUNT(*)".to_string(),
        }
    }

    /// Drop the `alias.` qualifier from every column reference to `alias`.
    ///
    /// UPDATE and DELETE statements address the bare table, so conditions
    /// written against the query alias are rewritten with this first.
    pub fn without_qualifier(self, alias: &str) -> Self {
        let strip = |e: Box<Expr>| Box::new(e.without_qualifier(alias));
        match self {
            Expr::Column {
                table: Some(t),
                name,
            } if t == alias => Expr::col(name),
            Expr::Binary { left, op, right } => Expr::Binary {
                left: strip(left),
                op,
                right: strip(right),
            },
            Expr::Not(e) => Expr::Not(strip(e)),
            Expr::Function { name, args } => Expr::Function {
                name,
                args: args.into_iter().map(|a| a.without_qualifier(alias)).collect(),
            },
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: strip(expr),
                values: values
                    .into_iter()
                    .map(|v| v.without_qualifier(alias))
                    .collect(),
                negated,
            },
            Expr::InQuery {
                expr,
                query,
                negated,
            } => Expr::InQuery {
                expr: strip(expr),
                query,
                negated,
            },
            Expr::Tuple(items) => Expr::Tuple(
                items
                    .into_iter()
                    .map(|i| i.without_qualifier(alias))
                    .collect(),
            ),
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: strip(expr),
                negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => Expr::Like {
                expr: strip(expr),
                pattern,
                negated,
            },
            Expr::Paren(e) => Expr::Paren(strip(e)),
            other => other,
        }
    }

    /// The `(table, column)` this expression references, if it is a column.
    pub fn as_column(&self) -> Option<(Option<&str>, &str)> {
        match self {
            Expr::Column { table, name } => Some((table.as_deref(), name)),
            _ => None,
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_column() {
        let mut params = Vec::new();
        let sql = Expr::field("Articles.id").build(&mut params, 0);
        assert_eq!(sql, "\"Articles\".\"id\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_eq_binds_literal() {
        let mut params = Vec::new();
        let sql = Expr::qualified("Authors", "id")
            .eq(Expr::qualified("Articles", "author_id"))
            .and(Expr::qualified("Authors", "active").eq(true))
            .build(&mut params, 0);
        assert_eq!(
            sql,
            "\"Authors\".\"id\" = \"Articles\".\"author_id\" AND \"Authors\".\"active\" = $1"
        );
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_in_list_and_offset() {
        let mut params = vec![Value::Int(0)];
        let sql = Expr::col("id")
            .in_list(vec![Value::Int(1), Value::Int(2)])
            .build_with_dialect(Dialect::Sqlite, &mut params, 0);
        assert_eq!(sql, "\"id\" IN (?2, ?3)");
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let mut params = Vec::new();
        let sql = Expr::col("id")
            .in_list(Vec::<Value>::new())
            .build(&mut params, 0);
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn test_any_parenthesizes() {
        let mut params = Vec::new();
        let expr = Expr::any(vec![
            Expr::col("a").eq(1).and(Expr::col("b").eq(2)),
            Expr::col("a").eq(3).and(Expr::col("b").eq(4)),
        ])
        .unwrap();
        let sql = expr.build(&mut params, 0);
        assert_eq!(
            sql,
            "(\"a\" = $1 AND \"b\" = $2) OR (\"a\" = $3 AND \"b\" = $4)"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_all_empty_is_none() {
        assert!(Expr::all(Vec::new()).is_none());
    }

    #[test]
    fn test_without_qualifier_only_strips_alias() {
        let mut params = Vec::new();
        let expr = Expr::qualified("Comments", "article_id")
            .eq(1)
            .and(Expr::qualified("Articles", "id").is_not_null())
            .without_qualifier("Comments");
        assert_eq!(
            expr.build(&mut params, 0),
            "\"article_id\" = $1 AND \"Articles\".\"id\" IS NOT NULL"
        );
    }

    #[test]
    fn test_is_null() {
        let mut params = Vec::new();
        let sql = Expr::qualified("Comments", "id").is_null().build(&mut params, 0);
        assert_eq!(sql, "\"Comments\".\"id\" IS NULL");
    }
}
