//! Loading associations with a secondary query.
//!
//! Associations that are not joined into the parent query are fetched with one
//! extra query per association. The fetched rows are indexed by their link
//! key, and a [`RowInjector`] is returned that copies the matching rows into
//! each parent row under the association's nest key while the parent
//! statement is read.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{
    AssociationErrorKind, Connection, Cx, Data, Error, Outcome, Record, Result, Value,
};
use strata_query::{Expr, JoinType, SelectQuery};

use super::belongs_to_many::{JUNCTION_PROPERTY, Junction};
use super::{Association, AssociationKind, AssociationType, AttachOptions, Strategy};
use crate::eager::{Contain, ContainOptions, ContainSpec};
use crate::query::Query;
use crate::statement::RowInjector;

/// What the eager loader hands an association it loads externally.
#[derive(Debug, Clone, Default)]
pub struct EagerLoadOptions {
    /// Options of the containment node.
    pub contain: ContainOptions,
    /// Containments nested below the node, loaded by the fetch query.
    pub associations: IndexMap<String, Contain>,
    /// Key the loaded data is stored under in each parent row.
    pub nest_key: String,
    /// Distinct parent key tuples collected from the parent rows.
    pub keys: Vec<Vec<Value>>,
}

pub(crate) async fn build_eager_loader<C: Connection>(
    assoc: &Association,
    options: EagerLoadOptions,
    parent: &Query,
    cx: &Cx,
    conn: &C,
) -> Outcome<RowInjector, Error> {
    let strategy = options.contain.strategy.unwrap_or(assoc.strategy());
    let fetch = try_result!(build_query(assoc, &options, strategy, parent));
    tracing::debug!(
        association = %assoc.name(),
        strategy = %strategy,
        keys = options.keys.len(),
        "Loading association"
    );

    let results = try_outcome!(fetch.all(cx, conn).await);
    let result_map = try_result!(build_result_map(assoc, results.into_vec()));
    let source_keys: Vec<String> = try_result!(assoc.source_key())
        .iter()
        .map(|key| format!("{}__{key}", assoc.source_alias()))
        .collect();
    Outcome::Ok(result_injector(result_map, source_keys, options.nest_key))
}

/// The fetch query for an externally loaded association.
pub(crate) fn build_query(
    assoc: &Association,
    options: &EagerLoadOptions,
    strategy: Strategy,
    parent: &Query,
) -> Result<Query> {
    let link = link_field(assoc)?;
    let contain = &options.contain;

    let mut fetch = assoc.find(None)?;
    if let Some(finder) = &contain.finder {
        fetch = fetch.call_finder(finder)?;
    }
    if let Some(fields) = &contain.fields {
        fetch = fetch.select(fields.columns().to_vec());
    }
    for condition in contain.conditions.iter().flatten() {
        fetch.and_where(condition.clone());
    }
    fetch = fetch
        .eager_loaded(true)
        .enable_hydration(parent.is_hydration_enabled());

    if strategy == Strategy::Subquery {
        let subquery = build_subquery(assoc, parent)?;
        fetch.and_where(link_expr(&link).in_query(subquery));
    } else if let Some(filter) = filtering_condition(&link, &options.keys) {
        fetch.and_where(filter);
    }

    let sort = contain.sort.as_deref().unwrap_or(assoc.sort());
    for order in sort {
        fetch = fetch.order_by(order.clone());
    }
    if !options.associations.is_empty() {
        fetch = fetch.contain(ContainSpec::from(options.associations.clone()));
    }
    if let Some(builder) = &contain.query_builder {
        fetch = builder.apply(fetch);
    }

    match assoc.kind() {
        AssociationKind::BelongsToMany(junction) => {
            append_junction(assoc, junction, &mut fetch)?;
        }
        _ => assert_fields_present(&fetch, &link)?,
    }
    Ok(fetch)
}

/// Columns of the fetched rows that hold the parent key.
fn link_field(assoc: &Association) -> Result<Vec<String>> {
    let columns = match assoc.kind() {
        AssociationKind::BelongsToMany(junction) => {
            return Ok(assoc
                .foreign_key()
                .iter()
                .map(|fk| format!("{}.{fk}", junction.alias()))
                .collect());
        }
        AssociationKind::BelongsTo => assoc.binding_key()?,
        AssociationKind::HasOne | AssociationKind::HasMany => assoc.foreign_key().to_vec(),
    };
    Ok(columns.iter().map(|c| assoc.alias_field(c)).collect())
}

fn link_expr(link: &[String]) -> Expr {
    match link {
        [single] => Expr::field(single),
        _ => Expr::tuple(link.iter().map(|l| Expr::field(l)).collect()),
    }
}

/// `link IN (...)` for a single key, an OR of per-tuple ANDs for composite keys.
pub(crate) fn filtering_condition(link: &[String], keys: &[Vec<Value>]) -> Option<Expr> {
    if let [single] = link {
        let values: Vec<Value> = keys
            .iter()
            .filter_map(|tuple| tuple.first().cloned())
            .collect();
        return Some(Expr::field(single).in_list(values));
    }
    let tuples = keys.iter().filter_map(|tuple| {
        Expr::all(
            link.iter()
                .zip(tuple)
                .map(|(column, value)| Expr::field(column).eq(value.clone())),
        )
    });
    Some(Expr::any(tuples).unwrap_or_else(|| Expr::raw("1 = 0")))
}

/// The parent query reduced to its source key columns.
///
/// Ordering and limits are dropped unless both are present, since a limit
/// without an order does not select a stable set of parents.
fn build_subquery(assoc: &Association, parent: &Query) -> Result<SelectQuery> {
    let mut filter = parent.select_query().clone();
    if filter.limit.is_none() || filter.order_by.is_empty() {
        filter.limit = None;
        filter.offset = None;
        filter.order_by.clear();
    }
    let keys: Vec<Expr> = assoc
        .source_key()?
        .iter()
        .map(|key| Expr::qualified(assoc.source_alias(), key))
        .collect();
    filter.fields = keys
        .iter()
        .filter_map(|expr| {
            expr.as_column()
                .map(|(_, name)| (name.to_string(), expr.clone()))
        })
        .collect();
    filter.group_by = keys;
    filter.distinct = false;
    Ok(filter)
}

/// Join the junction into a many-to-many fetch query and select its columns
/// so each target row carries the junction row it was reached through.
fn append_junction(assoc: &Association, junction: &Junction, fetch: &mut Query) -> Result<()> {
    let link = junction.target_link(assoc)?;
    let junction_table = junction.junction_table(assoc)?;
    if fetch.auto_fields().is_none() {
        let empty = fetch.select_clause().is_empty();
        fetch.set_auto_fields(empty);
    }

    let temp_name = format!("{}_CJoin", assoc.name());
    let pivot: IndexMap<String, Expr> = junction_table
        .columns()
        .iter()
        .map(|column| {
            (
                format!("{temp_name}__{column}"),
                Expr::qualified(junction.alias(), column),
            )
        })
        .collect();
    fetch.select_fields(pivot);
    fetch.eager_loader_mut().add_to_joins_map(
        &temp_name,
        Arc::clone(&link),
        false,
        Some(JUNCTION_PROPERTY.to_string()),
    );
    link.attach_join(
        fetch,
        AttachOptions {
            contain: ContainOptions::new().join_type(JoinType::Inner),
            alias_path: junction.alias().to_string(),
            property_path: JUNCTION_PROPERTY.to_string(),
            include_fields: false,
            table: None,
        },
    )
}

fn assert_fields_present(fetch: &Query, link: &[String]) -> Result<()> {
    let select = fetch.select_clause();
    if select.is_empty() {
        return Ok(());
    }
    let default_alias = fetch.repository().alias();
    let selected: Vec<String> = select
        .values()
        .filter_map(Expr::as_column)
        .map(|(table, column)| format!("{}.{column}", table.unwrap_or(default_alias)))
        .collect();
    if link.iter().all(|key| selected.contains(key)) {
        return Ok(());
    }
    Err(Error::association(
        AssociationErrorKind::MissingField,
        format!(
            "You are required to select the \"{}\" field(s)",
            link.join(", ")
        ),
    ))
}

fn key_string(values: impl IntoIterator<Item = Option<Value>>) -> Option<String> {
    let mut parts = Vec::new();
    for value in values {
        match value {
            Some(value) if !value.is_null() => parts.push(value.to_key_string()),
            _ => return None,
        }
    }
    Some(parts.join(";"))
}

/// Index fetched rows by the key linking them to their parent.
fn build_result_map(assoc: &Association, results: Vec<Data>) -> Result<IndexMap<String, Data>> {
    let kind = assoc.association_type();
    let keys = match kind {
        AssociationType::OneToOne | AssociationType::OneToMany | AssociationType::ManyToMany => {
            assoc.foreign_key().to_vec()
        }
        AssociationType::ManyToOne => assoc.binding_key()?,
    };

    let mut map: IndexMap<String, Data> = IndexMap::new();
    for result in results {
        let holder = if kind == AssociationType::ManyToMany {
            result.get(JUNCTION_PROPERTY).ok_or_else(|| {
                Error::association(
                    AssociationErrorKind::MissingJoinData,
                    format!(
                        "{JUNCTION_PROPERTY} is missing from the belongsToMany results. Results cannot be created."
                    ),
                )
                .for_association(assoc.name())
            })?
        } else {
            &result
        };
        let Some(key) = key_string(
            keys.iter()
                .map(|k| holder.get(k).and_then(Data::as_value).cloned()),
        ) else {
            continue;
        };

        if kind.is_single() {
            map.insert(key, result);
        } else if let Data::List(items) = map.entry(key).or_insert_with(|| Data::List(Vec::new())) {
            items.push(result);
        }
    }
    Ok(map)
}

fn result_injector(
    result_map: IndexMap<String, Data>,
    source_keys: Vec<String>,
    nest_key: String,
) -> RowInjector {
    Arc::new(move |mut row: Record| {
        let key = key_string(
            source_keys
                .iter()
                .map(|k| row.get(k).and_then(Data::as_value).cloned()),
        );
        if let Some(found) = key.and_then(|key| result_map.get(&key)) {
            row.insert(nest_key.clone(), found.clone());
        }
        row
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Dialect;

    fn text(s: &str) -> Data {
        Data::Value(Value::Text(s.into()))
    }

    #[test]
    fn single_key_filter_is_in_list() {
        let filter = filtering_condition(
            &["Comments.article_id".to_string()],
            &[vec![Value::Int(1)], vec![Value::Int(2)]],
        )
        .unwrap();
        let mut params = Vec::new();
        let sql = filter.build_with_dialect(Dialect::Sqlite, &mut params, 0);
        assert_eq!(sql, "\"Comments\".\"article_id\" IN (?1, ?2)");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn composite_key_filter_ors_tuples() {
        let link = ["Items.order_id".to_string(), "Items.shop_id".to_string()];
        let filter = filtering_condition(
            &link,
            &[
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(2), Value::Int(20)],
            ],
        )
        .unwrap();
        let mut params = Vec::new();
        let sql = filter.build_with_dialect(Dialect::Postgres, &mut params, 0);
        assert!(sql.contains(" OR "));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn composite_key_filter_without_keys_matches_nothing() {
        let link = ["Items.order_id".to_string(), "Items.shop_id".to_string()];
        let filter = filtering_condition(&link, &[]).unwrap();
        let mut params = Vec::new();
        assert_eq!(filter.build_with_dialect(Dialect::Postgres, &mut params, 0), "1 = 0");
    }

    #[test]
    fn key_strings_skip_nulls() {
        assert_eq!(
            key_string([Some(Value::Int(1)), Some(Value::Text("a".into()))]),
            Some("1;a".to_string())
        );
        assert_eq!(key_string([Some(Value::Int(1)), Some(Value::Null)]), None);
        assert_eq!(key_string([None]), None);
    }

    #[test]
    fn injector_nests_found_rows_only() {
        let mut map = IndexMap::new();
        map.insert("1".to_string(), Data::List(vec![text("a")]));
        let injector = result_injector(map, vec!["Articles__id".into()], "Comments".into());

        let mut hit = Record::new();
        hit.insert("Articles__id".into(), Data::Value(Value::BigInt(1)));
        let hit = injector(hit);
        assert_eq!(hit["Comments"], Data::List(vec![text("a")]));

        let mut miss = Record::new();
        miss.insert("Articles__id".into(), Data::Value(Value::BigInt(2)));
        assert!(!injector(miss).contains_key("Comments"));

        let mut null = Record::new();
        null.insert("Articles__id".into(), Data::Null);
        assert!(!injector(null).contains_key("Comments"));
    }
}
