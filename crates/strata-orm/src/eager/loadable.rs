//! A normalized containment node.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Contain, ContainOptions};
use crate::association::Association;

/// One contained association, bound to its [`Association`] and placed in the
/// containment tree.
///
/// Cloning copies the children; the association itself is shared.
#[derive(Debug, Clone, Default)]
pub struct EagerLoadable {
    name: String,
    associations: IndexMap<String, EagerLoadable>,
    instance: Option<Arc<Association>>,
    config: ContainOptions,
    /// Dotted path of association names from the query's table.
    alias_path: String,
    /// Dotted path of entity properties the data is nested under.
    property_path: String,
    can_be_joined: bool,
    for_matching: Option<bool>,
    target_property: Option<String>,
}

impl EagerLoadable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_instance(mut self, instance: Arc<Association>) -> Self {
        self.instance = Some(instance);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ContainOptions) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_paths(mut self, alias_path: impl Into<String>, property_path: impl Into<String>) -> Self {
        self.alias_path = alias_path.into();
        self.property_path = property_path.into();
        self
    }

    #[must_use]
    pub fn with_target_property(mut self, property: impl Into<String>) -> Self {
        self.target_property = Some(property.into());
        self
    }

    #[must_use]
    pub fn joinable(mut self, can_be_joined: bool) -> Self {
        self.can_be_joined = can_be_joined;
        self
    }

    #[must_use]
    pub fn for_matching_flag(mut self, matching: bool) -> Self {
        self.for_matching = Some(matching);
        self
    }

    pub fn add_association(&mut self, name: impl Into<String>, association: EagerLoadable) {
        self.associations.insert(name.into(), association);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn associations(&self) -> &IndexMap<String, EagerLoadable> {
        &self.associations
    }

    pub(crate) fn associations_mut(&mut self) -> &mut IndexMap<String, EagerLoadable> {
        &mut self.associations
    }

    pub fn instance(&self) -> Option<&Arc<Association>> {
        self.instance.as_ref()
    }

    pub fn config(&self) -> &ContainOptions {
        &self.config
    }

    pub fn set_config(&mut self, config: ContainOptions) {
        self.config = config;
    }

    pub fn alias_path(&self) -> &str {
        &self.alias_path
    }

    pub fn property_path(&self) -> &str {
        &self.property_path
    }

    pub fn can_be_joined(&self) -> bool {
        self.can_be_joined
    }

    pub fn set_can_be_joined(&mut self, can_be_joined: bool) {
        self.can_be_joined = can_be_joined;
    }

    /// `Some(true)` for nodes registered as matching joins.
    pub fn for_matching(&self) -> Option<bool> {
        self.for_matching
    }

    pub fn target_property(&self) -> Option<&str> {
        self.target_property.as_deref()
    }

    /// The node and its children as a raw tree `contain()` accepts.
    pub fn as_contain_array(&self) -> IndexMap<String, Contain> {
        let associations = self
            .associations
            .values()
            .flat_map(EagerLoadable::as_contain_array)
            .collect();
        let mut options = self.config.clone();
        if let Some(matching) = self.for_matching {
            options.matching = Some(matching);
        }
        IndexMap::from([(
            self.name.clone(),
            Contain {
                options,
                associations,
            },
        )])
    }
}

impl PartialEq for EagerLoadable {
    fn eq(&self, other: &Self) -> bool {
        let same_instance = match (&self.instance, &other.instance) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_instance
            && self.name == other.name
            && self.config == other.config
            && self.alias_path == other.alias_path
            && self.property_path == other.property_path
            && self.can_be_joined == other.can_be_joined
            && self.for_matching == other.for_matching
            && self.target_property == other.target_property
            && self.associations == other.associations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Strategy;

    #[test]
    fn contain_array_nests_children() {
        let mut authors = EagerLoadable::new("Authors")
            .with_config(ContainOptions::new().fields(["id", "name"]))
            .with_paths("Authors", "author")
            .joinable(true);
        authors.add_association(
            "Books",
            EagerLoadable::new("Books")
                .with_config(ContainOptions::new().strategy(Strategy::Subquery))
                .with_paths("Authors.Books", "author.books"),
        );

        let tree = authors.as_contain_array();
        let node = &tree["Authors"];
        assert_eq!(node.options, ContainOptions::new().fields(["id", "name"]));
        assert_eq!(
            node.associations["Books"].options.strategy,
            Some(Strategy::Subquery)
        );
    }

    #[test]
    fn matching_flag_is_exported() {
        let loadable = EagerLoadable::new("Tags").for_matching_flag(true);
        assert_eq!(loadable.as_contain_array()["Tags"].options.matching, Some(true));
    }

    #[test]
    fn clones_copy_children() {
        let mut parent = EagerLoadable::new("Authors");
        parent.add_association("Books", EagerLoadable::new("Books"));
        let mut copy = parent.clone();
        copy.associations_mut()["Books"].set_can_be_joined(true);
        assert!(!parent.associations()["Books"].can_be_joined());
        assert_ne!(parent, copy);
    }
}
