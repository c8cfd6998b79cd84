//! Many-to-one associations where the source holds the foreign key.

use strata_core::{Connection, Cx, Data, Entity, Error, Outcome};

use super::Association;
use crate::table::SaveOptions;

/// Save the parent entity first, then copy its key into `entity`'s foreign key.
pub async fn save_associated<C: Connection>(
    assoc: &Association,
    entity: &mut Entity,
    options: SaveOptions,
    cx: &Cx,
    conn: &C,
) -> Outcome<bool, Error> {
    let target = try_result!(assoc.target());
    let binding_key = try_result!(assoc.binding_key());

    let values = {
        let Some(Data::Entity(parent)) = entity.get_mut(assoc.property()) else {
            return Outcome::Ok(true);
        };
        if !try_outcome!(target.save(parent, options.nested(assoc.name()), cx, conn).await) {
            return Outcome::Ok(false);
        }
        parent.extract(&binding_key)
    };

    for (fk, value) in assoc.foreign_key().iter().zip(values) {
        if entity.value(fk) != Some(&value) {
            entity.set(fk.clone(), value);
        }
    }
    Outcome::Ok(true)
}
