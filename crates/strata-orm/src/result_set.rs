//! Folding flat rows into nested results.
//!
//! The primary statement yields one flat row per result, with columns
//! labelled `Alias__column` and externally loaded data already spliced in
//! under each association's nest key. [`ResultSetFactory`] groups the columns
//! by alias, nests every association into its parent and hydrates entities.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use strata_core::{Data, Entity, Record, Result};

use crate::eager::{AssociationMapEntry, MATCHING_PROPERTY};
use crate::query::Query;

/// Hydrated results of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<Data>);

impl ResultSet {
    pub fn new(items: Vec<Data>) -> Self {
        Self(items)
    }

    pub fn into_vec(self) -> Vec<Data> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Data> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Data> {
        self.0.first()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(Data::to_json).collect())
    }
}

impl IntoIterator for ResultSet {
    type Item = Data;
    type IntoIter = std::vec::IntoIter<Data>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Data;
    type IntoIter = std::slice::Iter<'a, Data>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Column labels of one alias, mapped to field names.
type ColumnMap = IndexMap<String, String>;

/// Everything needed to group the rows of one executed query.
///
/// A LEFT JOIN that matched nothing is detected by every selected column of
/// the joined alias being null, so a matched row whose selected columns are
/// all null also reads back as a missing association. Selecting the
/// association's fields explicitly turns the collapse off.
#[derive(Debug, Clone)]
pub struct ResultSetFactory {
    primary_alias: String,
    entity_class: String,
    hydrate: bool,
    /// Joined buckets with no data become null.
    collapse_nulls: bool,
    matching_assoc: IndexMap<String, AssociationMapEntry>,
    /// Contained associations by nest key, children before parents.
    contain_assoc: IndexMap<String, AssociationMapEntry>,
    matching_columns: IndexMap<String, ColumnMap>,
    fields: IndexMap<String, ColumnMap>,
}

impl ResultSetFactory {
    /// Read the association map and column layout of a planned query.
    pub fn collect_data(query: &mut Query) -> Result<Self> {
        let repository = Arc::clone(query.repository());
        let map = query.eager_loader_mut().associations_map(&repository)?;

        let (matching, contain): (Vec<_>, Vec<_>) = map.into_iter().partition(|e| e.matching);
        let matching_assoc: IndexMap<String, AssociationMapEntry> = matching
            .into_iter()
            .map(|entry| (entry.alias.clone(), entry))
            .collect();
        let contain_assoc = contain
            .into_iter()
            .rev()
            .map(|entry| (entry.nest_key.clone(), entry))
            .collect();

        let primary_alias = repository.alias().to_string();
        let mut fields: IndexMap<String, ColumnMap> = IndexMap::new();
        for label in query.select_clause().keys() {
            let label = label.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
            let (alias, field) = match label.split_once("__") {
                Some((alias, field)) if !alias.is_empty() => (alias, field),
                _ => (primary_alias.as_str(), label),
            };
            fields
                .entry(alias.to_string())
                .or_default()
                .insert(label.to_string(), field.to_string());
        }
        let mut matching_columns = IndexMap::new();
        for alias in matching_assoc.keys() {
            if let Some(columns) = fields.shift_remove(alias) {
                matching_columns.insert(alias.clone(), columns);
            }
        }

        let auto_fields = query.auto_fields();
        let collapse_nulls =
            auto_fields != Some(false) && (!query.has_fields() || auto_fields == Some(true));

        Ok(Self {
            entity_class: repository.entity_class().to_string(),
            primary_alias,
            hydrate: query.is_hydration_enabled(),
            collapse_nulls,
            matching_assoc,
            contain_assoc,
            matching_columns,
            fields,
        })
    }

    /// Group every row.
    pub fn create_result_set(&self, rows: Vec<Record>) -> ResultSet {
        ResultSet::new(rows.into_iter().map(|row| self.group_result(row)).collect())
    }

    fn hydrated(&self, class: &str, source: &str, fields: Record) -> Data {
        if self.hydrate {
            Data::Entity(Entity::hydrate(class, source, fields))
        } else {
            Data::Record(fields)
        }
    }

    /// Fold one flat row into its nested result.
    pub fn group_result(&self, mut row: Record) -> Data {
        let mut results = Record::new();
        let mut present: IndexSet<String> = IndexSet::new();

        let mut matching_data = Record::new();
        for (alias, columns) in &self.matching_columns {
            let bucket = take_columns(&mut row, columns);
            let data = match self.matching_assoc.get(alias) {
                Some(entry) => self.hydrated(&entry.entity_class, entry.instance.name(), bucket),
                None => Data::Record(bucket),
            };
            matching_data.insert(alias.clone(), data);
        }

        for (alias, columns) in &self.fields {
            results.insert(alias.clone(), Data::Record(take_columns(&mut row, columns)));
            present.insert(alias.clone());
        }
        results
            .entry(self.primary_alias.clone())
            .or_insert_with(|| Data::Record(Record::new()));
        present.shift_remove(&self.primary_alias);

        for (key, entry) in &self.contain_assoc {
            let joined = entry.can_be_joined;
            if joined && self.fields.get(key).is_none_or(IndexMap::is_empty) {
                continue;
            }
            if !joined {
                match row.swap_remove(key) {
                    Some(value) if !value.is_null() => {
                        results.insert(key.clone(), value);
                    }
                    _ => {
                        entry.instance.default_row_value(&mut results, false);
                        continue;
                    }
                }
            }
            present.shift_remove(key);

            if joined && self.collapse_nulls && !entry.explicit_fields {
                let has_data = results
                    .get(key)
                    .and_then(Data::as_record)
                    .is_some_and(|bucket| bucket.values().any(|v| !v.is_blank()));
                if !has_data {
                    results.insert(key.clone(), Data::Null);
                }
            }
            if joined {
                if let Some(slot) = results.get_mut(key) {
                    if let Data::Record(bucket) = slot {
                        let fields = std::mem::take(bucket);
                        *slot = self.hydrated(&entry.entity_class, entry.instance.name(), fields);
                    }
                }
            }
            entry
                .instance
                .transform_row(&mut results, key, entry.target_property.as_deref());
        }

        let mut primary = results
            .swap_remove(&self.primary_alias)
            .unwrap_or_else(|| Data::Record(Record::new()));
        for alias in present {
            if let Some(value) = results.swap_remove(&alias).filter(|v| !v.is_null()) {
                primary.set_field(alias, value);
            }
        }
        if !matching_data.is_empty() {
            primary.set_field(MATCHING_PROPERTY, Data::Record(matching_data));
        }

        match primary {
            Data::Record(fields) if self.hydrate => {
                Data::Entity(Entity::hydrate(&self.entity_class, &self.primary_alias, fields))
            }
            other => other,
        }
    }
}

fn take_columns(row: &mut Record, columns: &ColumnMap) -> Record {
    columns
        .iter()
        .map(|(label, field)| (field.clone(), row.swap_remove(label).unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationOptions;
    use crate::eager::ContainOptions;
    use crate::locator::TableLocator;
    use crate::table::Table;
    use crate::ContainSpec;
    use strata_core::Value;

    fn blog() -> Arc<TableLocator> {
        let locator = TableLocator::new();
        locator
            .add(
                Table::new("Articles")
                    .with_columns(["id", "title", "author_id"])
                    .belongs_to("Authors", AssociationOptions::new())
                    .has_many("Comments", AssociationOptions::new()),
            )
            .unwrap();
        locator
            .add(Table::new("Authors").with_columns(["id", "name"]))
            .unwrap();
        locator
            .add(Table::new("Comments").with_columns(["id", "article_id", "body"]))
            .unwrap();
        locator
    }

    fn factory(query: Query) -> ResultSetFactory {
        let mut query = query;
        query.trigger_before_find();
        query.transform().unwrap();
        ResultSetFactory::collect_data(&mut query).unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Data::from(v.clone())))
            .collect()
    }

    fn orphan_row() -> Record {
        row(&[
            ("Articles__id", Value::Int(1)),
            ("Articles__title", Value::Text("First".into())),
            ("Articles__author_id", Value::Null),
            ("Authors__id", Value::Null),
            ("Authors__name", Value::Null),
        ])
    }

    #[test]
    fn left_join_miss_collapses_to_null() {
        let locator = blog();
        let query = locator.get("Articles").unwrap().query().contain("Authors");
        let result = factory(query).group_result(orphan_row());

        let article = result.as_entity().unwrap();
        assert_eq!(article.class(), "Article");
        assert_eq!(article.value("title"), Some(&Value::Text("First".into())));
        assert_eq!(article.get("author"), Some(&Data::Null));
        assert!(!article.has_dirty());
    }

    #[test]
    fn explicit_association_fields_keep_nulls() {
        let locator = blog();
        let query = locator
            .get("Articles")
            .unwrap()
            .query()
            .contain(ContainSpec::new().with("Authors", ContainOptions::new().fields(["id", "name"])));
        let result = factory(query).group_result(orphan_row());

        let author = result.get("author").and_then(Data::as_entity).unwrap();
        assert_eq!(author.class(), "Author");
        assert_eq!(author.get("name"), Some(&Data::Null));
    }

    #[test]
    fn joined_rows_nest_under_the_property() {
        let locator = blog();
        let query = locator.get("Articles").unwrap().query().contain("Authors");
        let result = factory(query).group_result(row(&[
            ("Articles__id", Value::Int(1)),
            ("Articles__title", Value::Text("First".into())),
            ("Articles__author_id", Value::Int(4)),
            ("Authors__id", Value::Int(4)),
            ("Authors__name", Value::Text("Ann".into())),
        ]));
        assert_eq!(
            result.get_path("author.name").and_then(Data::as_value),
            Some(&Value::Text("Ann".into()))
        );
    }

    #[test]
    fn missing_external_data_defaults_to_empty_list() {
        let locator = blog();
        let query = locator.get("Articles").unwrap().query().contain("Comments");
        let result = factory(query).group_result(row(&[
            ("Articles__id", Value::Int(1)),
            ("Articles__title", Value::Text("First".into())),
            ("Articles__author_id", Value::Int(4)),
        ]));
        assert_eq!(result.get("comments"), Some(&Data::List(Vec::new())));
    }

    #[test]
    fn external_data_is_moved_into_the_parent() {
        let locator = blog();
        let query = locator.get("Articles").unwrap().query().contain("Comments");
        let mut flat = row(&[("Articles__id", Value::Int(1))]);
        let comment = Entity::hydrate(
            "Comment",
            "Comments",
            row(&[("id", Value::Int(9)), ("body", Value::Text("Hi".into()))]),
        );
        flat.insert("Comments".into(), Data::List(vec![Data::Entity(comment)]));

        let result = factory(query).group_result(flat);
        let comments = result.get("comments").and_then(Data::as_list).unwrap();
        assert_eq!(comments.len(), 1);
        assert!(result.get("Comments").is_none());
    }

    #[test]
    fn matching_data_is_kept_apart() {
        let locator = blog();
        let query = locator.get("Articles").unwrap().query().matching("Authors");
        let result = factory(query).group_result(row(&[
            ("Articles__id", Value::Int(1)),
            ("Articles__title", Value::Text("First".into())),
            ("Articles__author_id", Value::Int(4)),
            ("Authors__id", Value::Int(4)),
            ("Authors__name", Value::Text("Ann".into())),
        ]));
        assert!(result.get("author").is_none());
        let matched = result
            .get_path("_matchingData.Authors")
            .and_then(Data::as_entity)
            .unwrap();
        assert_eq!(matched.value("name"), Some(&Value::Text("Ann".into())));
    }

    #[test]
    fn hydration_can_be_disabled() {
        let locator = blog();
        let query = locator
            .get("Articles")
            .unwrap()
            .query()
            .contain("Authors")
            .enable_hydration(false);
        let result = factory(query).group_result(row(&[
            ("Articles__id", Value::Int(1)),
            ("Authors__id", Value::Int(4)),
            ("Authors__name", Value::Text("Ann".into())),
        ]));
        assert!(result.as_record().is_some());
        assert!(result.get("author").and_then(Data::as_record).is_some());
    }

    #[test]
    fn result_set_serializes_as_a_list() {
        let set = ResultSet::new(vec![Data::from(Value::Int(1)), Data::Null]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_json(), serde_json::json!([1, null]));
    }
}
