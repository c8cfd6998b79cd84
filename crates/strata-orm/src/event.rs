//! Table events.
//!
//! Two kinds of listeners exist. `Model.beforeFind` listeners see every query
//! on a table once, before it is planned. Entity listeners run around save and
//! delete; a `false` returned from a `before*` listener aborts the operation
//! without an error, while an `Err` aborts it and propagates.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{Entity, Result};

use crate::query::Query;
use crate::table::FinderOptions;

/// Lifecycle points an entity listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
}

impl ModelEvent {
    pub const fn name(self) -> &'static str {
        match self {
            ModelEvent::BeforeSave => "Model.beforeSave",
            ModelEvent::AfterSave => "Model.afterSave",
            ModelEvent::BeforeDelete => "Model.beforeDelete",
            ModelEvent::AfterDelete => "Model.afterDelete",
        }
    }
}

/// `(query, finder options, primary)`; `primary` is false for queries built
/// while eager loading another table.
pub type BeforeFindListener = Arc<dyn Fn(&mut Query, &FinderOptions, bool) + Send + Sync>;

pub type EntityListener = Arc<dyn Fn(&mut Entity) -> Result<bool> + Send + Sync>;

/// Listeners registered on one table.
#[derive(Clone, Default)]
pub struct EventManager {
    before_find: Vec<BeforeFindListener>,
    entity: IndexMap<ModelEvent, Vec<EntityListener>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_find(&mut self, listener: BeforeFindListener) {
        self.before_find.push(listener);
    }

    pub fn on(&mut self, event: ModelEvent, listener: EntityListener) {
        self.entity.entry(event).or_default().push(listener);
    }

    pub fn has_listeners(&self, event: ModelEvent) -> bool {
        self.entity.get(&event).is_some_and(|l| !l.is_empty())
    }

    pub fn dispatch_before_find(&self, query: &mut Query, options: &FinderOptions, primary: bool) {
        for listener in &self.before_find {
            listener(query, options, primary);
        }
    }

    /// Run the listeners of `event` in registration order.
    ///
    /// Stops at the first listener returning `false` and reports `false`.
    pub fn dispatch(&self, event: ModelEvent, entity: &mut Entity) -> Result<bool> {
        for listener in self.entity.get(&event).into_iter().flatten() {
            if !listener(entity)? {
                tracing::debug!(event = event.name(), source = entity.source(), "Event stopped");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity: IndexMap<_, _> = self
            .entity
            .iter()
            .map(|(event, listeners)| (event.name(), listeners.len()))
            .collect();
        f.debug_struct("EventManager")
            .field("before_find", &self.before_find.len())
            .field("entity", &entity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Error, Value};

    #[test]
    fn dispatch_stops_at_first_refusal() {
        let mut events = EventManager::new();
        events.on(
            ModelEvent::BeforeSave,
            Arc::new(|e: &mut Entity| {
                e.set("touched", Value::Bool(true));
                Ok(false)
            }),
        );
        events.on(
            ModelEvent::BeforeSave,
            Arc::new(|e: &mut Entity| {
                e.set("second", Value::Bool(true));
                Ok(true)
            }),
        );

        let mut entity = Entity::new("Article", "Articles");
        assert!(!events.dispatch(ModelEvent::BeforeSave, &mut entity).unwrap());
        assert!(entity.has("touched"));
        assert!(!entity.has("second"));
        assert!(events.dispatch(ModelEvent::AfterSave, &mut entity).unwrap());
    }

    #[test]
    fn listener_errors_propagate() {
        let mut events = EventManager::new();
        events.on(
            ModelEvent::BeforeDelete,
            Arc::new(|_: &mut Entity| Err(Error::Custom("locked".into()))),
        );
        let mut entity = Entity::new("Article", "Articles");
        assert!(events.dispatch(ModelEvent::BeforeDelete, &mut entity).is_err());
        assert!(events.has_listeners(ModelEvent::BeforeDelete));
        assert!(!events.has_listeners(ModelEvent::AfterDelete));
    }
}
