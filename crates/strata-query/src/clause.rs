//! SQL clause types (ORDER BY, LIMIT, OFFSET)

use crate::expr::Expr;
use strata_core::{Dialect, Value};

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderBy {
    /// Ascending order on a `Alias.column` path or a bare column.
    pub fn asc(field: &str) -> Self {
        Self {
            expr: Expr::field(field),
            direction: OrderDirection::Asc,
        }
    }

    /// Descending order on a `Alias.column` path or a bare column.
    pub fn desc(field: &str) -> Self {
        Self {
            expr: Expr::field(field),
            direction: OrderDirection::Desc,
        }
    }

    /// Order by an arbitrary expression.
    pub fn expr(expr: Expr, direction: OrderDirection) -> Self {
        Self { expr, direction }
    }

    /// Generate SQL for this ORDER BY term.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> String {
        let expr_sql = self.expr.build_with_dialect(dialect, params, offset);
        match self.direction {
            OrderDirection::Asc => format!("{expr_sql} ASC"),
            OrderDirection::Desc => format!("{expr_sql} DESC"),
        }
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);
