//! Deleting dependent rows when their owner is deleted.

use std::sync::Arc;

use strata_core::{Connection, Cx, Entity, Error, Outcome, Value};
use strata_query::Expr;

use super::Association;
use crate::query::Query;
use crate::table::Table;

/// Delete the target rows owned by `entity` when the association is dependent.
///
/// A missing binding value means the entity was never linked to anything, so
/// nothing is deleted.
pub async fn cascade_delete<C: Connection>(
    assoc: &Association,
    entity: &Entity,
    cx: &Cx,
    conn: &C,
) -> Outcome<bool, Error> {
    if !assoc.dependent() {
        return Outcome::Ok(true);
    }
    let target = try_result!(assoc.target());
    let binding_key = try_result!(assoc.binding_key());
    let values = entity.extract(&binding_key);
    if values.iter().any(Value::is_null) {
        return Outcome::Ok(true);
    }

    let mut query = try_result!(assoc.find(None));
    for (fk, value) in assoc.foreign_key().iter().zip(values) {
        query.and_where(Expr::qualified(assoc.name(), fk).eq(value));
    }
    tracing::debug!(
        association = %assoc.name(),
        cascade_callbacks = assoc.cascade_callbacks(),
        "Deleting dependent rows"
    );
    delete_matching(&target, query, assoc.cascade_callbacks(), cx, conn).await
}

/// Delete the rows `query` selects from `table`.
///
/// With `callbacks`, rows are loaded and deleted one at a time so their own
/// delete events and cascades run; the first refused delete stops the loop.
/// Otherwise a single bulk DELETE is issued with the query's conditions.
pub(crate) async fn delete_matching<C: Connection>(
    table: &Arc<Table>,
    query: Query,
    callbacks: bool,
    cx: &Cx,
    conn: &C,
) -> Outcome<bool, Error> {
    if !callbacks {
        let conditions = query.where_conditions().to_vec();
        try_outcome!(table.delete_all(conditions, cx, conn).await);
        return Outcome::Ok(true);
    }

    let related = try_outcome!(query.all(cx, conn).await);
    for mut row in related.into_vec() {
        let Some(entity) = row.as_entity_mut() else {
            continue;
        };
        if !try_outcome!(table.delete(entity, cx, conn).await) {
            return Outcome::Ok(false);
        }
    }
    Outcome::Ok(true)
}
