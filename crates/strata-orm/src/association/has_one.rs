//! One-to-one associations where the target holds the foreign key.

use strata_core::{Connection, Cx, Data, Entity, Error, Outcome};

use super::Association;
use crate::table::SaveOptions;

/// Point the target's foreign key at `entity`, then save the target.
pub async fn save_associated<C: Connection>(
    assoc: &Association,
    entity: &mut Entity,
    options: SaveOptions,
    cx: &Cx,
    conn: &C,
) -> Outcome<bool, Error> {
    if !matches!(entity.get(assoc.property()), Some(Data::Entity(_))) {
        return Outcome::Ok(true);
    }
    let target = try_result!(assoc.target());
    let binding_key = try_result!(assoc.binding_key());
    let values = entity.extract(&binding_key);

    let Some(Data::Entity(related)) = entity.get_mut(assoc.property()) else {
        return Outcome::Ok(true);
    };
    for (fk, value) in assoc.foreign_key().iter().zip(values) {
        if related.value(fk) != Some(&value) {
            related.set(fk.clone(), value);
        }
    }
    target
        .save(related, options.nested(assoc.name()), cx, conn)
        .await
}
