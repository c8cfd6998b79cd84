//! Declarative table configuration.
//!
//! Tables and their associations can be described in JSON and registered in
//! one go with [`TableLocator::load_json`]:
//!
//! ```json
//! [
//!   {
//!     "alias": "Articles",
//!     "columns": ["id", "title", "author_id"],
//!     "associations": [
//!       { "type": "belongs_to", "name": "Authors" },
//!       { "type": "has_many", "name": "Comments", "sort": { "Comments.id": "asc" } }
//!     ]
//!   }
//! ]
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::{Error, Result, Value};
use strata_query::{Expr, JoinType, OrderBy};

use crate::association::{AssociationOptions, Strategy};
use crate::locator::TableLocator;
use crate::table::{Finder, Table};

/// One table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default)]
    pub associations: Vec<AssociationConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationConfigKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One association of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociationConfig {
    #[serde(rename = "type")]
    pub kind: AssociationConfigKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_foreign_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<bool>,
    #[serde(default)]
    pub cascade_callbacks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder: Option<String>,
    /// `field -> value` equality conditions.
    #[serde(default)]
    pub conditions: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub sort: IndexMap<String, SortDirection>,
}

/// JSON scalars become the matching SQL value; anything else stays JSON.
fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(i),
            None => n.as_f64().map_or(Value::Json(serde_json::Value::Number(n)), Value::Double),
        },
        other => Value::Json(other),
    }
}

impl AssociationConfig {
    pub fn to_options(&self) -> AssociationOptions {
        let mut options = AssociationOptions::new();
        options.class_name = self.class_name.clone();
        options.foreign_key = self.foreign_key.clone();
        options.binding_key = self.binding_key.clone();
        options.target_foreign_key = self.target_foreign_key.clone();
        options.through = self.through.clone();
        options.join_table = self.join_table.clone();
        options.property_name = self.property_name.clone();
        options.strategy = self.strategy;
        options.join_type = self.join_type;
        options.dependent = self.dependent;
        options.cascade_callbacks = self.cascade_callbacks;
        options.finder = self.finder.as_deref().map(Finder::from);
        options.conditions = self
            .conditions
            .iter()
            .map(|(field, value)| match json_to_value(value.clone()) {
                Value::Null => Expr::field(field).is_null(),
                value => Expr::field(field).eq(value),
            })
            .collect();
        options.sort = self
            .sort
            .iter()
            .map(|(field, direction)| match direction {
                SortDirection::Asc => OrderBy::asc(field),
                SortDirection::Desc => OrderBy::desc(field),
            })
            .collect();
        options
    }
}

impl TableConfig {
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(&self.alias).with_columns(self.columns.clone());
        if let Some(name) = &self.table {
            table = table.table(name);
        }
        if let Some(key) = &self.primary_key {
            table = table.with_primary_key(key.clone());
        }
        if let Some(class) = &self.entity_class {
            table = table.with_entity_class(class);
        }
        if let Some(field) = &self.display_field {
            table = table.display_field(field);
        }
        for association in &self.associations {
            let options = association.to_options();
            table = match association.kind {
                AssociationConfigKind::BelongsTo => table.belongs_to(&association.name, options),
                AssociationConfigKind::HasOne => table.has_one(&association.name, options),
                AssociationConfigKind::HasMany => table.has_many(&association.name, options),
                AssociationConfigKind::BelongsToMany => {
                    table.belongs_to_many(&association.name, options)
                }
            };
        }
        table
    }
}

impl TableLocator {
    /// Register every table described by a JSON array of [`TableConfig`]s.
    pub fn load_json(&self, json: &str) -> Result<Vec<Arc<Table>>> {
        let configs: Vec<TableConfig> =
            serde_json::from_str(json).map_err(|e| Error::Serde(e.to_string()))?;
        configs
            .iter()
            .map(|config| self.add(config.to_table()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationKind;

    const BLOG: &str = r#"[
        {
            "alias": "Articles",
            "columns": ["id", "title", "author_id"],
            "associations": [
                {"type": "belongs_to", "name": "Authors", "join_type": "inner"},
                {"type": "has_many", "name": "Comments", "dependent": true,
                 "conditions": {"Comments.published": true},
                 "sort": {"Comments.id": "desc"}},
                {"type": "belongs_to_many", "name": "Tags", "strategy": "subquery"}
            ]
        },
        {"alias": "Authors", "columns": ["id", "name"]}
    ]"#;

    #[test]
    fn loads_tables_and_associations() {
        let locator = TableLocator::new();
        let tables = locator.load_json(BLOG).unwrap();
        assert_eq!(tables.len(), 2);

        let articles = locator.get("Articles").unwrap();
        let authors = articles.association("Authors").unwrap();
        assert_eq!(authors.join_type(), JoinType::Inner);

        let comments = articles.association("Comments").unwrap();
        assert!(comments.dependent());
        assert_eq!(comments.conditions().len(), 1);
        assert_eq!(comments.sort(), [OrderBy::desc("Comments.id")]);

        let tags = articles.association("Tags").unwrap();
        assert_eq!(tags.strategy(), Strategy::Subquery);
        assert!(matches!(tags.kind(), AssociationKind::BelongsToMany(_)));
    }

    #[test]
    fn unknown_keys_and_bad_strategies_fail() {
        let locator = TableLocator::new();
        let err = locator
            .load_json(r#"[{"alias": "Articles", "colums": []}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Serde(_)));

        let err = locator
            .load_json(
                r#"[{"alias": "Articles", "associations": [
                    {"type": "has_many", "name": "Comments", "strategy": "join"}
                ]}]"#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Invalid strategy"));
    }

    #[test]
    fn config_round_trips_through_json() {
        let configs: Vec<TableConfig> = serde_json::from_str(BLOG).unwrap();
        let json = serde_json::to_string(&configs).unwrap();
        let again: Vec<TableConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(configs, again);
    }
}
