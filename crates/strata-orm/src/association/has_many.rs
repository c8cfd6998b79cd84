//! One-to-many associations where the target holds the foreign key.

use strata_core::{Connection, Cx, Data, Entity, Error, Outcome};

use super::Association;
use crate::table::SaveOptions;

/// Save every entity in the association property, appending them to `entity`.
///
/// Existing target rows that are not in the property are left untouched.
pub async fn save_associated<C: Connection>(
    assoc: &Association,
    entity: &mut Entity,
    options: SaveOptions,
    cx: &Cx,
    conn: &C,
) -> Outcome<bool, Error> {
    if !matches!(entity.get(assoc.property()), Some(Data::List(_))) {
        return Outcome::Ok(true);
    }
    let target = try_result!(assoc.target());
    let binding_key = try_result!(assoc.binding_key());
    let values = entity.extract(&binding_key);
    let nested = options.nested(assoc.name());

    let Some(Data::List(items)) = entity.get_mut(assoc.property()) else {
        return Outcome::Ok(true);
    };
    for item in items.iter_mut() {
        let Data::Entity(related) = item else {
            continue;
        };
        for (fk, value) in assoc.foreign_key().iter().zip(&values) {
            if related.value(fk) != Some(value) {
                related.set(fk.clone(), value.clone());
            }
        }
        if !try_outcome!(target.save(related, nested.clone(), cx, conn).await) {
            tracing::debug!(association = %assoc.name(), "Saving a related entity was aborted");
            return Outcome::Ok(false);
        }
    }
    Outcome::Ok(true)
}
