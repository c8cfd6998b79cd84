//! Planning and execution of contained associations.
//!
//! The loader turns the raw containment tree into [`EagerLoadable`] nodes and
//! partitions them: nodes that can be joined are attached to the query while
//! it is planned, everything else is loaded after the primary statement ran
//! by one secondary query per association. Secondary loads need the parent
//! keys, which are collected from the buffered primary rows.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use strata_core::{AssociationErrorKind, Connection, Cx, Data, Error, Outcome, Record, Result, Value};
use strata_query::JoinType;

use super::{Contain, ContainOptions, ContainSpec, EagerLoadable, Fields};
use crate::association::{Association, AttachOptions, EagerLoadOptions, Strategy};
use crate::query::Query;
use crate::statement::{CallbackStatement, Statement};
use crate::table::Table;

/// Property the data of matching joins is nested under.
pub const MATCHING_PROPERTY: &str = "_matchingData";

/// Parent keys by alias path, then source alias, then key string.
type CollectedKeys = IndexMap<String, IndexMap<String, IndexMap<String, Vec<Value>>>>;

/// How one association contributes to every result row.
#[derive(Debug, Clone)]
pub struct AssociationMapEntry {
    pub alias: String,
    pub instance: Arc<Association>,
    pub can_be_joined: bool,
    pub entity_class: String,
    /// Row key the association's data is found under.
    pub nest_key: String,
    /// Filter-only data, nested under `_matchingData`.
    pub matching: bool,
    pub target_property: Option<String>,
    /// The contain node selected an explicit column list.
    pub explicit_fields: bool,
}

/// The containments of one query.
///
/// Cloning copies the whole plan including the matching loader, so a cloned
/// query can be changed without touching the original.
#[derive(Debug, Clone)]
pub struct EagerLoader {
    containments: IndexMap<String, Contain>,
    normalized: Option<IndexMap<String, EagerLoadable>>,
    auto_fields: bool,
    matching: Option<Box<EagerLoader>>,
    joins_map: IndexMap<String, EagerLoadable>,
    load_external: Vec<EagerLoadable>,
    /// Alias paths of joinable nodes by root, then by alias.
    alias_list: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl Default for EagerLoader {
    fn default() -> Self {
        Self {
            containments: IndexMap::new(),
            normalized: None,
            auto_fields: true,
            matching: None,
            joins_map: IndexMap::new(),
            load_external: Vec::new(),
            alias_list: IndexMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Paths {
    alias_path: String,
    property_path: String,
    /// Alias path of the closest ancestor that is not joined.
    root: String,
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}

impl EagerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Containments ====================

    /// Merge `spec` into the containment tree.
    pub fn contain(&mut self, spec: impl Into<ContainSpec>) -> &mut Self {
        spec.into().merge_into(&mut self.containments);
        self.reset();
        self
    }

    pub fn contain_tree(&self) -> &IndexMap<String, Contain> {
        &self.containments
    }

    pub fn clear_contain(&mut self) {
        self.containments.clear();
        self.reset();
    }

    fn reset(&mut self) {
        self.normalized = None;
        self.load_external.clear();
        self.alias_list.clear();
    }

    /// No containments and no matching joins.
    pub fn is_empty(&self) -> bool {
        self.containments.is_empty() && self.matching.is_none()
    }

    /// Whether joined associations select their columns by default.
    pub fn enable_auto_fields(&mut self, enable: bool) -> &mut Self {
        self.auto_fields = enable;
        self
    }

    pub fn is_auto_fields_enabled(&self) -> bool {
        self.auto_fields
    }

    // ==================== Matching ====================

    /// Filter the query by an association path.
    ///
    /// Every segment of `path` is joined (inner unless `options` says
    /// otherwise) and its data is nested under `_matchingData`. Only the last
    /// segment gets `options` in full; the segments above it never negate.
    pub fn set_matching(&mut self, path: &str, options: ContainOptions) -> &mut Self {
        let mut leaf = options;
        if leaf.join_type.is_none() {
            leaf.join_type = Some(JoinType::Inner);
        }
        let mut shared = leaf.clone();
        shared.negate_match = Some(false);
        shared.matching = Some(true);
        shared.query_builder = None;
        leaf.matching = Some(true);

        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return self;
        };
        let mut node = ((*last).to_string(), Contain::new(leaf));
        for parent in parents.iter().rev() {
            node = (
                (*parent).to_string(),
                Contain::new(shared.clone()).with(node.0, node.1),
            );
        }
        self.matching_mut()
            .contain(ContainSpec::new().node(node.0, node.1));
        self
    }

    /// Register a raw matching node, with its children, at `path`.
    pub fn set_matching_node(&mut self, path: &str, node: Contain) {
        let Contain {
            options,
            associations,
        } = node;
        self.set_matching(path, options);
        if associations.is_empty() {
            return;
        }
        let spec = associations
            .into_iter()
            .fold(ContainSpec::new(), |spec, (alias, child)| {
                spec.node(format!("{path}.{alias}"), child)
            });
        self.matching_mut().contain(spec);
    }

    /// The raw matching tree, if any matching join was registered.
    pub fn matching_tree(&self) -> Option<&IndexMap<String, Contain>> {
        self.matching.as_deref().map(EagerLoader::contain_tree)
    }

    fn matching_mut(&mut self) -> &mut EagerLoader {
        self.matching.get_or_insert_with(Box::default)
    }

    /// Register a join made outside `contain()` so its columns are hydrated
    /// as an association.
    pub fn add_to_joins_map(
        &mut self,
        alias: &str,
        association: Arc<Association>,
        as_matching: bool,
        target_property: Option<String>,
    ) {
        let property = target_property.unwrap_or_else(|| association.property().to_string());
        self.joins_map.insert(
            alias.to_string(),
            EagerLoadable::new(alias)
                .with_paths(alias, "")
                .with_instance(association)
                .joinable(true)
                .for_matching_flag(as_matching)
                .with_target_property(property),
        );
    }

    // ==================== Normalization ====================

    /// The containment tree bound to associations of `repository`.
    ///
    /// Cached until the containments change.
    pub fn normalized(&mut self, repository: &Table) -> Result<&IndexMap<String, EagerLoadable>> {
        if self.normalized.is_none() {
            self.alias_list.clear();
            let containments = self.containments.clone();
            let root = Paths::default();
            let mut tree = IndexMap::with_capacity(containments.len());
            for (alias, node) in &containments {
                let loadable = self.normalize_contain(repository, alias, node, &root)?;
                tree.insert(alias.clone(), loadable);
            }
            self.normalized = Some(tree);
        }
        let tree: &IndexMap<String, EagerLoadable> = self.normalized.get_or_insert_with(IndexMap::new);
        Ok(tree)
    }

    fn normalize_contain(
        &mut self,
        parent: &Table,
        alias: &str,
        node: &Contain,
        paths: &Paths,
    ) -> Result<EagerLoadable> {
        let instance = parent.association(alias).ok_or_else(|| {
            Error::association(
                AssociationErrorKind::NotAssociated,
                format!("{alias} is not associated with {}", parent.alias()),
            )
        })?;
        if let Some(strategy) = node.options.strategy {
            instance.validate_strategy(strategy)?;
        }

        let alias_path = join_path(&paths.alias_path, alias);
        let property_path = if node.options.is_matching() {
            format!("{MATCHING_PROPERTY}.{alias}")
        } else {
            join_path(&paths.property_path, instance.property())
        };
        let can_be_joined = instance.can_be_joined(&node.options);
        let mut loadable = EagerLoadable::new(alias)
            .with_instance(Arc::clone(&instance))
            .with_config(node.options.clone())
            .with_paths(alias_path.clone(), property_path.clone())
            .with_target_property(instance.property())
            .joinable(can_be_joined);

        let mut child_paths = Paths {
            alias_path: alias_path.clone(),
            property_path,
            root: paths.root.clone(),
        };
        if can_be_joined {
            self.alias_list
                .entry(paths.root.clone())
                .or_default()
                .entry(alias.to_string())
                .or_default()
                .push(alias_path);
        } else {
            child_paths.root = alias_path;
        }

        if !node.associations.is_empty() {
            let target = instance.target()?;
            for (child_alias, child) in &node.associations {
                let nested = self.normalize_contain(&target, child_alias, child, &child_paths)?;
                loadable.add_association(child_alias.clone(), nested);
            }
        }
        Ok(loadable)
    }

    /// Demote nested joins whose alias is joined more than once under the
    /// same root; two joins cannot share a SQL alias.
    fn fix_strategies(&mut self) {
        let Some(tree) = self.normalized.as_mut() else {
            return;
        };
        for aliases in self.alias_list.values() {
            for paths in aliases.values().filter(|paths| paths.len() > 1) {
                for path in paths.iter().filter(|path| path.contains('.')) {
                    if let Some(loadable) = find_mut(tree, path) {
                        correct_strategy(loadable);
                    }
                }
            }
        }
    }

    // ==================== Planning ====================

    /// Nodes to join into the query, keyed by alias.
    ///
    /// Matching nodes come first and claim their alias; a contained node with
    /// the same alias is loaded separately. Everything not joined is recorded
    /// as an external association.
    pub fn attachable_associations(
        &mut self,
        repository: &Table,
    ) -> Result<IndexMap<String, EagerLoadable>> {
        self.normalized(repository)?;
        let mut matching = match self.matching.as_mut() {
            Some(loader) => {
                loader.normalized(repository)?;
                loader.normalized.take().unwrap_or_default()
            }
            None => IndexMap::new(),
        };
        self.fix_strategies();

        let mut contain = self.normalized.take().unwrap_or_default();
        let mut external = Vec::new();
        let attachable = resolve_joins(&mut contain, &mut matching, &mut external);
        self.normalized = Some(contain);
        if let Some(loader) = self.matching.as_mut() {
            loader.normalized = Some(matching);
        }
        self.load_external = external;
        Ok(attachable)
    }

    /// Nodes loaded by a secondary query after the primary statement.
    pub fn external_associations(&mut self, repository: &Table) -> Result<&[EagerLoadable]> {
        if self.load_external.is_empty() {
            self.attachable_associations(repository)?;
        }
        Ok(self.load_external.as_slice())
    }

    /// External nodes as of the last planning pass.
    pub(crate) fn external(&self) -> &[EagerLoadable] {
        &self.load_external
    }

    /// Join every attachable association into `query`.
    ///
    /// Attaching can contain further associations (declared by the query
    /// builder of a joined association), so this repeats until a pass
    /// attaches nothing new.
    pub fn attach_associations(
        query: &mut Query,
        repository: &Table,
        include_fields: bool,
    ) -> Result<()> {
        if query.eager_loader().is_empty() {
            return Ok(());
        }
        let mut processed: IndexSet<String> = IndexSet::new();
        let mut attachable = query.eager_loader_mut().attachable_associations(repository)?;
        loop {
            attachable.retain(|alias, _| !processed.contains(alias));
            if attachable.is_empty() {
                return Ok(());
            }
            for (alias, loadable) in attachable {
                if let Some(instance) = loadable.instance() {
                    tracing::trace!(
                        association = %alias,
                        alias_path = loadable.alias_path(),
                        "Attaching association"
                    );
                    instance.attach_to(
                        query,
                        AttachOptions {
                            contain: loadable.config().clone(),
                            alias_path: loadable.alias_path().to_string(),
                            property_path: loadable.property_path().to_string(),
                            include_fields,
                            table: None,
                        },
                    )?;
                }
                processed.insert(alias);
            }
            attachable = query.eager_loader_mut().attachable_associations(repository)?;
        }
    }

    /// Load the external associations of `query` into its primary statement.
    ///
    /// Each association wraps the statement in a decorator that nests its
    /// rows into every parent row as the statement is read.
    pub(crate) async fn load_external<C: Connection>(
        query: &Query,
        statement: Box<dyn Statement>,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Box<dyn Statement>, Error> {
        let external = query.eager_loader().external();
        if external.is_empty() {
            return Outcome::Ok(statement);
        }
        let (collected, mut statement) = try_result!(collect_keys(external, statement));
        if collected.is_empty() && statement.row_count() == 0 {
            return Outcome::Ok(statement);
        }

        for meta in external {
            let Some(instance) = meta.instance() else {
                continue;
            };
            let config = meta.config();
            let path = meta.alias_path();
            let alias = instance.source_alias();
            let mut keys = Vec::new();
            if instance.requires_keys(config) {
                let found = collected.get(path).and_then(|by_alias| by_alias.get(alias));
                // Nested paths may hang off joins that matched nothing.
                if !path.contains('.') && found.is_none() {
                    tracing::warn!(
                        association = %path,
                        source = %alias,
                        "Key columns missing from the primary rows"
                    );
                    return Outcome::Err(Error::association(
                        AssociationErrorKind::MissingForeignKey,
                        format!(
                            "Unable to load `{path}` association. Ensure foreign key in `{alias}` is selected."
                        ),
                    ));
                }
                match found {
                    Some(values) if !values.is_empty() => {
                        keys = values.values().cloned().collect();
                    }
                    _ => continue,
                }
            }

            let options = EagerLoadOptions {
                contain: config.clone(),
                associations: meta
                    .associations()
                    .values()
                    .flat_map(EagerLoadable::as_contain_array)
                    .collect(),
                nest_key: path.to_string(),
                keys,
            };
            let injector = try_outcome!(instance.eager_load(options, query, cx, conn).await);
            statement = Box::new(CallbackStatement::new(statement, injector));
        }
        Outcome::Ok(statement)
    }

    /// Every association contributing data to result rows, flattened:
    /// matching joins, then containments, then registered joins.
    pub fn associations_map(&mut self, repository: &Table) -> Result<Vec<AssociationMapEntry>> {
        let mut map = Vec::new();
        if self.containments.is_empty() && self.matching.is_none() && self.joins_map.is_empty() {
            return Ok(map);
        }
        if let Some(loader) = self.matching.as_mut() {
            let level = loader.normalized(repository)?;
            build_associations_map(&mut map, level, true)?;
        }
        let level = self.normalized(repository)?;
        build_associations_map(&mut map, level, false)?;
        build_associations_map(&mut map, &self.joins_map, false)?;
        Ok(map)
    }
}

fn find_mut<'a>(
    tree: &'a mut IndexMap<String, EagerLoadable>,
    path: &str,
) -> Option<&'a mut EagerLoadable> {
    let mut segments = path.split('.');
    let mut node = tree.get_mut(segments.next()?)?;
    for segment in segments {
        node = node.associations_mut().get_mut(segment)?;
    }
    Some(node)
}

fn correct_strategy(loadable: &mut EagerLoadable) {
    let current = loadable.config().strategy.unwrap_or(Strategy::Join);
    if !loadable.can_be_joined() || current != Strategy::Join {
        return;
    }
    let mut config = loadable.config().clone();
    config.strategy = Some(Strategy::Select);
    loadable.set_config(config);
    loadable.set_can_be_joined(false);
    tracing::debug!(
        alias_path = loadable.alias_path(),
        "Joined association demoted to a separate query"
    );
}

/// Split `associations` into joined nodes (returned) and external ones.
fn resolve_joins(
    associations: &mut IndexMap<String, EagerLoadable>,
    matching: &mut IndexMap<String, EagerLoadable>,
    external: &mut Vec<EagerLoadable>,
) -> IndexMap<String, EagerLoadable> {
    let mut result: IndexMap<String, EagerLoadable> = IndexMap::new();
    for (alias, loadable) in matching.iter_mut() {
        result.insert(alias.clone(), loadable.clone());
        let nested = resolve_joins(loadable.associations_mut(), &mut IndexMap::new(), external);
        for (nested_alias, nested) in nested {
            result.entry(nested_alias).or_insert(nested);
        }
    }

    for (alias, loadable) in associations.iter_mut() {
        let in_matching = matching.contains_key(alias);
        if !in_matching && loadable.can_be_joined() {
            result.insert(alias.clone(), loadable.clone());
            let nested = resolve_joins(loadable.associations_mut(), &mut IndexMap::new(), external);
            for (nested_alias, nested) in nested {
                result.entry(nested_alias).or_insert(nested);
            }
            continue;
        }
        if in_matching {
            correct_strategy(loadable);
        }
        loadable.set_can_be_joined(false);
        external.push(loadable.clone());
    }
    result
}

/// Which columns of the primary rows hold the keys each external node needs.
fn collect_keys(
    external: &[EagerLoadable],
    statement: Box<dyn Statement>,
) -> Result<(CollectedKeys, Box<dyn Statement>)> {
    let mut wanted = Vec::new();
    for meta in external {
        let Some(instance) = meta.instance() else {
            continue;
        };
        if !instance.requires_keys(meta.config()) {
            continue;
        }
        let alias = instance.source_alias();
        let columns: Vec<String> = instance
            .source_key()?
            .iter()
            .map(|key| format!("{alias}__{key}"))
            .collect();
        wanted.push((meta.alias_path().to_string(), alias.to_string(), columns));
    }
    if wanted.is_empty() {
        return Ok((CollectedKeys::new(), statement));
    }
    let buffered = statement.into_buffered();
    let keys = group_keys(buffered.rows(), &wanted);
    Ok((keys, Box::new(buffered)))
}

/// Distinct key tuples per alias path and source alias.
///
/// A row without the key columns contributes nothing. A row whose key is
/// null registers the alias with no keys, so optional associations are not
/// reported as unselected.
pub(crate) fn group_keys(rows: &[Record], wanted: &[(String, String, Vec<String>)]) -> CollectedKeys {
    let mut keys = CollectedKeys::new();
    for row in rows {
        for (path, alias, columns) in wanted {
            if !columns.iter().all(|column| row.contains_key(column)) {
                continue;
            }
            let bucket = keys
                .entry(path.clone())
                .or_default()
                .entry(alias.clone())
                .or_default();
            let values: Vec<Value> = columns
                .iter()
                .map(|column| {
                    row.get(column)
                        .and_then(Data::as_value)
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect();
            if values.iter().any(Value::is_null) {
                continue;
            }
            let key = values
                .iter()
                .map(Value::to_key_string)
                .collect::<Vec<_>>()
                .join(";");
            bucket.entry(key).or_insert(values);
        }
    }
    keys
}

fn build_associations_map(
    map: &mut Vec<AssociationMapEntry>,
    level: &IndexMap<String, EagerLoadable>,
    matching: bool,
) -> Result<()> {
    for (alias, meta) in level {
        let Some(instance) = meta.instance() else {
            continue;
        };
        let target = instance.target()?;
        let can_be_joined = meta.can_be_joined();
        map.push(AssociationMapEntry {
            alias: alias.clone(),
            instance: Arc::clone(instance),
            can_be_joined,
            entity_class: target.entity_class().to_string(),
            nest_key: if can_be_joined {
                alias.clone()
            } else {
                meta.alias_path().to_string()
            },
            matching: meta.for_matching().unwrap_or(matching),
            target_property: meta.target_property().map(str::to_string),
            explicit_fields: meta.config().fields.as_ref().is_some_and(Fields::is_explicit),
        });
        if can_be_joined && !meta.associations().is_empty() {
            build_associations_map(map, meta.associations(), matching)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationOptions;
    use crate::locator::TableLocator;

    fn blog() -> Arc<TableLocator> {
        let locator = TableLocator::new();
        locator
            .add(
                Table::new("Articles")
                    .with_columns(["id", "title", "author_id", "publisher_id"])
                    .belongs_to("Authors", AssociationOptions::new())
                    .belongs_to("Publishers", AssociationOptions::new())
                    .has_many("Comments", AssociationOptions::new()),
            )
            .unwrap();
        locator
            .add(
                Table::new("Authors")
                    .with_columns(["id", "name", "country_id"])
                    .belongs_to("Countries", AssociationOptions::new())
                    .has_many("Books", AssociationOptions::new()),
            )
            .unwrap();
        locator
            .add(
                Table::new("Publishers")
                    .with_columns(["id", "name", "country_id"])
                    .belongs_to("Countries", AssociationOptions::new()),
            )
            .unwrap();
        locator
            .add(Table::new("Countries").with_columns(["id", "name"]))
            .unwrap();
        locator
            .add(Table::new("Books").with_columns(["id", "author_id", "title"]))
            .unwrap();
        locator
            .add(Table::new("Comments").with_columns(["id", "article_id", "body"]))
            .unwrap();
        locator
    }

    fn external_paths(loader: &EagerLoader) -> Vec<String> {
        loader
            .external()
            .iter()
            .map(|l| l.alias_path().to_string())
            .collect()
    }

    #[test]
    fn normalization_is_cached_until_contain_changes() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(["Authors.Books"]);

        let first = loader.normalized(&articles).unwrap().clone();
        let second = loader.normalized(&articles).unwrap().clone();
        assert_eq!(first, second);

        let authors = &first["Authors"];
        assert_eq!(authors.alias_path(), "Authors");
        assert_eq!(authors.property_path(), "author");
        assert!(authors.can_be_joined());
        let books = &authors.associations()["Books"];
        assert_eq!(books.alias_path(), "Authors.Books");
        assert_eq!(books.property_path(), "author.books");
        assert!(!books.can_be_joined());

        loader.contain("Comments");
        let third = loader.normalized(&articles).unwrap();
        assert_ne!(&first, third);
        assert!(third.contains_key("Comments"));
    }

    #[test]
    fn unknown_association_is_rejected() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain("Editors");
        let err = loader.normalized(&articles).unwrap_err();
        assert_eq!(err.association_kind(), Some(AssociationErrorKind::NotAssociated));
        assert!(err.to_string().contains("Editors is not associated with Articles"));
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(["Authors.Books", "Authors.Countries", "Comments", "Publishers"]);

        let attachable = loader.attachable_associations(&articles).unwrap();
        let attached: Vec<&str> = attachable.values().map(|l| l.alias_path()).collect();
        assert_eq!(attached, ["Authors", "Authors.Countries", "Publishers"]);
        assert_eq!(external_paths(&loader), ["Authors.Books", "Comments"]);
        assert!(loader.external().iter().all(|l| !l.can_be_joined()));
    }

    #[test]
    fn duplicate_nested_alias_is_demoted() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(["Authors.Countries", "Publishers.Countries"]);

        let attachable = loader.attachable_associations(&articles).unwrap();
        assert!(!attachable.contains_key("Countries"));
        assert_eq!(
            external_paths(&loader),
            ["Authors.Countries", "Publishers.Countries"]
        );
        let tree = loader.normalized(&articles).unwrap();
        let demoted = &tree["Authors"].associations()["Countries"];
        assert_eq!(demoted.config().strategy, Some(Strategy::Select));
    }

    #[test]
    fn single_nested_alias_stays_joined() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(["Authors.Countries", "Publishers"]);
        let attachable = loader.attachable_associations(&articles).unwrap();
        assert!(attachable.contains_key("Countries"));
        assert!(loader.external().is_empty());
    }

    #[test]
    fn matching_claims_the_alias() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain("Authors");
        loader.set_matching("Authors", ContainOptions::new());

        let attachable = loader.attachable_associations(&articles).unwrap();
        assert!(attachable["Authors"].config().is_matching());
        assert_eq!(attachable["Authors"].property_path(), "_matchingData.Authors");
        let external = loader.external();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].config().strategy, Some(Strategy::Select));
        assert!(!external[0].config().is_matching());
    }

    #[test]
    fn matching_intermediates_never_negate() {
        let mut loader = EagerLoader::new();
        loader.set_matching(
            "Authors.Countries",
            ContainOptions::new()
                .join_type(JoinType::Left)
                .without_fields()
                .negate_match(true),
        );
        let tree = loader.matching_tree().unwrap();
        let authors = &tree["Authors"];
        assert_eq!(authors.options.negate_match, Some(false));
        assert_eq!(authors.options.matching, Some(true));
        assert_eq!(authors.options.join_type, Some(JoinType::Left));
        let countries = &authors.associations["Countries"];
        assert_eq!(countries.options.negate_match, Some(true));
        assert_eq!(countries.options.fields, Some(Fields::Disabled));
    }

    #[test]
    fn contain_array_round_trip_keeps_partition() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(ContainSpec::new()
            .path("Authors.Countries")
            .path("Publishers.Countries")
            .with("Comments", ContainOptions::new().fields(["id", "article_id"])));
        let attachable: Vec<String> = loader
            .attachable_associations(&articles)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let external = external_paths(&loader);

        let exported: IndexMap<String, Contain> = loader
            .normalized(&articles)
            .unwrap()
            .values()
            .flat_map(EagerLoadable::as_contain_array)
            .collect();
        let mut replay = EagerLoader::new();
        replay.contain(exported);
        let replayed: Vec<String> = replay
            .attachable_associations(&articles)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(replayed, attachable);
        assert_eq!(external_paths(&replay), external);
    }

    #[test]
    fn clones_do_not_share_plans() {
        let mut loader = EagerLoader::new();
        loader.contain("Authors");
        loader.set_matching("Comments", ContainOptions::new());
        let mut copy = loader.clone();
        copy.contain("Publishers");
        copy.set_matching("Tags", ContainOptions::new());
        assert_eq!(loader.contain_tree().len(), 1);
        assert_eq!(loader.matching_tree().map(IndexMap::len), Some(1));
    }

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Data::from(v.clone())))
            .collect()
    }

    #[test]
    fn keys_are_grouped_per_path_and_alias() {
        let rows = vec![
            row(&[("Articles__id", Value::Int(1)), ("Authors__id", Value::Int(7))]),
            row(&[("Articles__id", Value::Int(2)), ("Authors__id", Value::Null)]),
            row(&[("Articles__id", Value::Int(3)), ("Authors__id", Value::Int(7))]),
        ];
        let wanted = vec![
            ("Comments".to_string(), "Articles".to_string(), vec!["Articles__id".to_string()]),
            ("Authors.Books".to_string(), "Authors".to_string(), vec!["Authors__id".to_string()]),
            ("Tags".to_string(), "Articles".to_string(), vec!["Articles__missing".to_string()]),
        ];
        let keys = group_keys(&rows, &wanted);

        let comments = &keys["Comments"]["Articles"];
        assert_eq!(comments.keys().collect::<Vec<_>>(), ["1", "2", "3"]);
        let books = &keys["Authors.Books"]["Authors"];
        assert_eq!(books.len(), 1);
        assert_eq!(books["7"], vec![Value::Int(7)]);
        assert!(!keys.contains_key("Tags"));
    }

    #[test]
    fn composite_keys_join_in_column_order() {
        let rows = vec![
            row(&[("Orders__id", Value::Int(1)), ("Orders__shop", Value::Text("a".into()))]),
            row(&[("Orders__id", Value::Int(1)), ("Orders__shop", Value::Text("a".into()))]),
            row(&[("Orders__id", Value::Int(2)), ("Orders__shop", Value::Null)]),
        ];
        let wanted = vec![(
            "Items".to_string(),
            "Orders".to_string(),
            vec!["Orders__id".to_string(), "Orders__shop".to_string()],
        )];
        let keys = group_keys(&rows, &wanted);
        let items = &keys["Items"]["Orders"];
        assert_eq!(items.keys().collect::<Vec<_>>(), ["1;a"]);
        assert_eq!(items["1;a"], vec![Value::Int(1), Value::Text("a".into())]);
    }

    #[test]
    fn associations_map_flattens_joined_children() {
        let locator = blog();
        let articles = locator.get("Articles").unwrap();
        let mut loader = EagerLoader::new();
        loader.contain(["Authors.Countries", "Authors.Books"]);
        loader.attachable_associations(&articles).unwrap();

        let map = loader.associations_map(&articles).unwrap();
        let keys: Vec<(&str, bool)> = map
            .iter()
            .map(|e| (e.nest_key.as_str(), e.can_be_joined))
            .collect();
        assert_eq!(
            keys,
            [("Authors", true), ("Countries", true), ("Authors.Books", false)]
        );
        assert_eq!(map[0].entity_class, "Author");
        assert!(map.iter().all(|e| !e.matching));
    }
}
