//! Behaviors: reusable components that add finders and methods to a table.
//!
//! A behavior declares what it provides up front through
//! [`Behavior::provided_finders`] and [`Behavior::provided_methods`]; the
//! registry uses those lists to route calls and to refuse two behaviors
//! providing the same name.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{Error, Result, Value};

use crate::query::Query;
use crate::table::FinderOptions;

/// A pluggable component attached to a table.
pub trait Behavior: Send + Sync {
    /// Name the behavior is registered under.
    fn name(&self) -> &str;

    /// Finder names handled by [`Behavior::find`].
    fn provided_finders(&self) -> &[&'static str] {
        &[]
    }

    /// Method names handled by [`Behavior::call`].
    fn provided_methods(&self) -> &[&'static str] {
        &[]
    }

    /// Apply the finder `finder` to `query`.
    fn find(&self, finder: &str, query: Query, options: &FinderOptions) -> Result<Query> {
        let _ = (query, options);
        Err(Error::config(format!(
            "Behavior `{}` does not provide the `{finder}` finder",
            self.name()
        )))
    }

    /// Invoke the method `method`.
    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let _ = args;
        Err(Error::config(format!(
            "Behavior `{}` does not provide the `{method}` method",
            self.name()
        )))
    }

    /// Observe every query on the table before it is planned.
    fn before_find(&self, query: &mut Query, options: &FinderOptions, primary: bool) {
        let _ = (query, options, primary);
    }
}

/// Behaviors attached to one table, with their finder and method maps.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: IndexMap<String, Arc<dyn Behavior>>,
    finders: IndexMap<String, String>,
    methods: IndexMap<String, String>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a behavior, rejecting finder or method names another behavior provides.
    pub fn add(&mut self, behavior: Arc<dyn Behavior>) -> Result<()> {
        let name = behavior.name().to_string();
        for (kind, provided, map) in [
            ("finder", behavior.provided_finders(), &self.finders),
            ("method", behavior.provided_methods(), &self.methods),
        ] {
            for item in provided {
                if let Some(owner) = map.get(*item) {
                    if *owner != name {
                        return Err(Error::config(format!(
                            "{name} contains duplicate {kind} \"{item}\" which is already provided by \"{owner}\""
                        )));
                    }
                }
            }
        }

        for finder in behavior.provided_finders() {
            self.finders.insert((*finder).to_string(), name.clone());
        }
        for method in behavior.provided_methods() {
            self.methods.insert((*method).to_string(), name.clone());
        }
        self.behaviors.insert(name, behavior);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.behaviors.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Behavior>> {
        self.behaviors.get(name)
    }

    pub fn has_finder(&self, finder: &str) -> bool {
        self.finders.contains_key(finder)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn call_finder(&self, finder: &str, query: Query, options: &FinderOptions) -> Result<Query> {
        let owner = self
            .finders
            .get(finder)
            .and_then(|name| self.behaviors.get(name))
            .ok_or_else(|| Error::config(format!("Cannot call finder \"{finder}\", it does not exist")))?;
        owner.find(finder, query, options)
    }

    pub fn call_method(&self, method: &str, args: &[Value]) -> Result<Value> {
        let owner = self
            .methods
            .get(method)
            .and_then(|name| self.behaviors.get(name))
            .ok_or_else(|| Error::config(format!("Cannot call \"{method}\", it does not exist")))?;
        owner.call(method, args)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Behavior>> {
        self.behaviors.values()
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("behaviors", &self.behaviors.keys().collect::<Vec<_>>())
            .field("finders", &self.finders)
            .field("methods", &self.methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slugged;

    impl Behavior for Slugged {
        fn name(&self) -> &str {
            "Slugged"
        }

        fn provided_finders(&self) -> &[&'static str] {
            &["slugged"]
        }

        fn provided_methods(&self) -> &[&'static str] {
            &["slug"]
        }

        fn call(&self, _method: &str, args: &[Value]) -> Result<Value> {
            let text = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(Value::Text(text.to_lowercase().replace(' ', "-")))
        }
    }

    struct AlsoSlugged;

    impl Behavior for AlsoSlugged {
        fn name(&self) -> &str {
            "AlsoSlugged"
        }

        fn provided_methods(&self) -> &[&'static str] {
            &["slug"]
        }
    }

    #[test]
    fn methods_route_to_their_behavior() {
        let mut registry = BehaviorRegistry::new();
        registry.add(Arc::new(Slugged)).unwrap();
        assert!(registry.has_finder("slugged"));
        assert!(registry.has_method("slug"));
        assert_eq!(
            registry
                .call_method("slug", &[Value::Text("Hello World".into())])
                .unwrap(),
            Value::Text("hello-world".into())
        );
        assert!(registry.call_method("missing", &[]).is_err());
    }

    #[test]
    fn duplicate_method_is_rejected() {
        let mut registry = BehaviorRegistry::new();
        registry.add(Arc::new(Slugged)).unwrap();
        let err = registry.add(Arc::new(AlsoSlugged)).unwrap_err();
        assert!(err.to_string().contains("duplicate method \"slug\""));
        assert!(!registry.has("AlsoSlugged"));
    }
}
