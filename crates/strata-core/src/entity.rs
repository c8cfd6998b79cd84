//! Dynamic records and entities produced by result hydration.
//!
//! A hydrated row is a tree: the primary entity holds scalar columns plus
//! nested entities (to-one associations) and lists (to-many associations).
//! `Data` is the node type of that tree, `Record` an insertion-ordered map of
//! field name to node, and `Entity` a record tagged with the table it came from
//! and a per-field dirty set.

use indexmap::{IndexMap, IndexSet};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::value::Value;

/// Insertion-ordered map of field name to data.
pub type Record = IndexMap<String, Data>;

/// One node of a result tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    Null,
    Value(Value),
    Record(Record),
    Entity(Entity),
    List(Vec<Data>),
}

impl Data {
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null | Data::Value(Value::Null))
    }

    /// Null or an empty list; what an unmatched association looks like.
    pub fn is_blank(&self) -> bool {
        match self {
            Data::List(items) => items.is_empty(),
            other => other.is_null(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Data::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Data::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Data::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Data::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    /// Field lookup on a record or entity.
    pub fn get(&self, field: &str) -> Option<&Data> {
        match self {
            Data::Record(r) => r.get(field),
            Data::Entity(e) => e.get(field),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Data> {
        match self {
            Data::Record(r) => r.get_mut(field),
            Data::Entity(e) => e.fields.get_mut(field),
            _ => None,
        }
    }

    /// Remove a field from a record or entity, keeping the order of the rest.
    pub fn take_field(&mut self, field: &str) -> Option<Data> {
        match self {
            Data::Record(r) => r.shift_remove(field),
            Data::Entity(e) => e.fields.shift_remove(field),
            _ => None,
        }
    }

    /// Follow a dotted path through nested records and entities.
    pub fn get_path(&self, path: &str) -> Option<&Data> {
        path.split('.')
            .try_fold(self, |node, segment| node.get(segment))
    }

    /// Set a field on a record or entity without marking it dirty.
    ///
    /// Returns `false` when this node cannot hold fields.
    pub fn set_field(&mut self, field: impl Into<String>, value: Data) -> bool {
        match self {
            Data::Record(r) => {
                r.insert(field.into(), value);
                true
            }
            Data::Entity(e) => {
                e.fields.insert(field.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Scalar value of a field, treating missing and null alike.
    pub fn value_of(&self, field: &str) -> Option<&Value> {
        self.get(field).and_then(Data::as_value).filter(|v| !v.is_null())
    }

    /// Plain JSON rendering.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Data::Null => serde_json::Value::Null,
            Data::Value(v) => v.to_json(),
            Data::Record(r) => record_to_json(r),
            Data::Entity(e) => record_to_json(&e.fields),
            Data::List(items) => serde_json::Value::Array(items.iter().map(Data::to_json).collect()),
        }
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            v => Data::Value(v),
        }
    }
}

impl From<Entity> for Data {
    fn from(entity: Entity) -> Self {
        Data::Entity(entity)
    }
}

impl From<Record> for Data {
    fn from(record: Record) -> Self {
        Data::Record(record)
    }
}

impl From<Vec<Data>> for Data {
    fn from(items: Vec<Data>) -> Self {
        Data::List(items)
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Data::Null => serializer.serialize_none(),
            Data::Value(v) => v.to_json().serialize(serializer),
            Data::Record(r) => {
                let mut map = serializer.serialize_map(Some(r.len()))?;
                for (k, v) in r {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Data::Entity(e) => e.serialize(serializer),
            Data::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// A row hydrated into an object of a table's entity class.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    class: String,
    source: String,
    fields: Record,
    dirty: IndexSet<String>,
    new: bool,
}

impl Entity {
    /// A new, unsaved entity. Every field set on it is dirty.
    pub fn new(class: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            source: source.into(),
            fields: Record::new(),
            dirty: IndexSet::new(),
            new: true,
        }
    }

    /// An entity built from persisted data: clean and not new.
    pub fn hydrate(class: impl Into<String>, source: impl Into<String>, fields: Record) -> Self {
        Self {
            class: class.into(),
            source: source.into(),
            fields,
            dirty: IndexSet::new(),
            new: false,
        }
    }

    /// Entity class name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Registry alias of the table this entity belongs to.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn get(&self, field: &str) -> Option<&Data> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Data> {
        self.fields.get_mut(field)
    }

    /// Scalar value of a field; `None` when missing or null.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields
            .get(field)
            .and_then(Data::as_value)
            .filter(|v| !v.is_null())
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|d| !d.is_null())
    }

    /// Set a field and mark it dirty.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Data>) -> &mut Self {
        let field = field.into();
        self.fields.insert(field.clone(), value.into());
        self.dirty.insert(field);
        self
    }

    /// Remove a field.
    pub fn unset(&mut self, field: &str) -> Option<Data> {
        self.dirty.shift_remove(field);
        self.fields.shift_remove(field)
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn set_dirty(&mut self, field: &str, dirty: bool) {
        if dirty {
            self.dirty.insert(field.to_string());
        } else {
            self.dirty.shift_remove(field);
        }
    }

    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Forget all dirty markers.
    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn set_new(&mut self, new: bool) {
        self.new = new;
    }

    pub fn fields(&self) -> &Record {
        &self.fields
    }

    pub fn into_fields(self) -> Record {
        self.fields
    }

    /// Scalar values of `fields`, in order; missing fields read as NULL.
    pub fn extract(&self, fields: &[String]) -> Vec<Value> {
        fields
            .iter()
            .map(|f| self.value(f).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_tracks_dirty_fields() {
        let mut e = Entity::new("Article", "Articles");
        assert!(e.is_new());
        e.set("title", Value::Text("Hi".into()));
        assert!(e.is_dirty("title"));
        assert!(!e.is_dirty("body"));
        e.clean();
        assert!(!e.has_dirty());
        assert_eq!(e.value("title"), Some(&Value::Text("Hi".into())));
    }

    #[test]
    fn hydrated_entity_is_clean() {
        let mut fields = Record::new();
        fields.insert("id".into(), Data::Value(Value::BigInt(1)));
        let e = Entity::hydrate("Article", "Articles", fields);
        assert!(!e.is_new());
        assert!(!e.has_dirty());
        assert_eq!(e.extract(&["id".to_string(), "missing".to_string()]), vec![
            Value::BigInt(1),
            Value::Null
        ]);
    }

    #[test]
    fn data_paths_and_blankness() {
        let mut author = Record::new();
        author.insert("name".into(), Data::Value(Value::Text("Ann".into())));
        author.insert("books".into(), Data::List(vec![]));
        let mut article = Record::new();
        article.insert("author".into(), Data::Record(author));
        let root = Data::Record(article);

        assert_eq!(
            root.get_path("author.name").and_then(Data::as_value),
            Some(&Value::Text("Ann".into()))
        );
        assert!(root.get_path("author.books").unwrap().is_blank());
        assert!(root.get_path("author.missing").is_none());
        assert!(Data::Null.is_blank());
        assert!(!Data::Value(Value::Int(0)).is_blank());
    }

    #[test]
    fn set_field_does_not_dirty_entity() {
        let mut data = Data::Entity(Entity::hydrate("Author", "Authors", Record::new()));
        assert!(data.set_field("books", Data::List(vec![])));
        assert!(!data.as_entity().unwrap().has_dirty());
        let mut scalar = Data::Value(Value::Int(1));
        assert!(!scalar.set_field("x", Data::Null));
    }

    #[test]
    fn serializes_as_plain_json() {
        let mut e = Entity::new("Tag", "Tags");
        e.set("id", Value::Int(3));
        e.set("labels", Data::List(vec![Data::Value(Value::Text("a".into()))]));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json, serde_json::json!({"id": 3, "labels": ["a"]}));
        assert_eq!(Data::Entity(e).to_json(), json);
    }
}
