//! The raw containment tree accepted by `Query::contain`.
//!
//! A `ContainSpec` is a list of dotted association paths (`"Authors.Books"`),
//! each optionally carrying [`ContainOptions`]. Merged into an
//! [`EagerLoader`](super::EagerLoader) it becomes a tree of [`Contain`] nodes.
//! Merging never clobbers an option that the newer entry leaves unset, and two
//! query builders declared for the same node are composed.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_query::{Expr, JoinType, OrderBy};

use crate::association::Strategy;
use crate::query::Query;
use crate::table::Finder;

/// Callback customizing the query that loads (or joins) an association.
#[derive(Clone)]
pub struct QueryBuilder(Arc<dyn Fn(Query) -> Query + Send + Sync>);

impl QueryBuilder {
    pub fn new(f: impl Fn(Query) -> Query + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, query: Query) -> Query {
        (self.0)(query)
    }

    /// `next(self(query))`.
    pub fn then(&self, next: &QueryBuilder) -> QueryBuilder {
        let first = Arc::clone(&self.0);
        let second = Arc::clone(&next.0);
        Self(Arc::new(move |query| second(first(query))))
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryBuilder(..)")
    }
}

impl PartialEq for QueryBuilder {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Which columns of an association to select.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    /// Only these columns (bare names or `Alias.column` paths).
    List(Vec<String>),
    /// Join the association without selecting any of its columns.
    Disabled,
}

impl Fields {
    /// An explicit, non-empty column list.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Fields::List(list) if !list.is_empty())
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Fields::List(list) => list,
            Fields::Disabled => &[],
        }
    }
}

/// Per-association options recognized in a containment node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainOptions {
    /// Overrides the association's foreign key. An empty list disables the
    /// generated join condition.
    pub foreign_key: Option<Vec<String>>,
    pub conditions: Option<Vec<Expr>>,
    pub fields: Option<Fields>,
    pub sort: Option<Vec<OrderBy>>,
    /// The node filters its parent instead of populating a property.
    pub matching: Option<bool>,
    pub query_builder: Option<QueryBuilder>,
    pub finder: Option<Finder>,
    pub join_type: Option<JoinType>,
    pub strategy: Option<Strategy>,
    /// Keep only parent rows that have no match (`not_matching`).
    pub negate_match: Option<bool>,
}

impl ContainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn foreign_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Join without the generated key condition.
    pub fn without_foreign_key(mut self) -> Self {
        self.foreign_key = Some(Vec::new());
        self
    }

    /// AND a condition into the association's conditions.
    pub fn condition(mut self, condition: Expr) -> Self {
        self.conditions.get_or_insert_with(Vec::new).push(condition);
        self
    }

    pub fn fields<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(Fields::List(columns.into_iter().map(Into::into).collect()));
        self
    }

    pub fn without_fields(mut self) -> Self {
        self.fields = Some(Fields::Disabled);
        self
    }

    pub fn sort(mut self, order: OrderBy) -> Self {
        self.sort.get_or_insert_with(Vec::new).push(order);
        self
    }

    pub fn matching(mut self, matching: bool) -> Self {
        self.matching = Some(matching);
        self
    }

    pub fn query_builder(mut self, f: impl Fn(Query) -> Query + Send + Sync + 'static) -> Self {
        self.query_builder = Some(QueryBuilder::new(f));
        self
    }

    pub fn finder(mut self, finder: impl Into<Finder>) -> Self {
        self.finder = Some(finder.into());
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn negate_match(mut self, negate: bool) -> Self {
        self.negate_match = Some(negate);
        self
    }

    pub fn is_matching(&self) -> bool {
        self.matching == Some(true)
    }

    /// Merge `newer` over these options. Set options win, unset ones keep the
    /// current value and query builders compose as `newer(current(q))`.
    pub fn merge(&mut self, newer: ContainOptions) {
        fn over<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        let builder = match (self.query_builder.take(), newer.query_builder) {
            (Some(first), Some(second)) => Some(first.then(&second)),
            (first, second) => second.or(first),
        };
        self.query_builder = builder;
        over(&mut self.foreign_key, newer.foreign_key);
        over(&mut self.conditions, newer.conditions);
        over(&mut self.fields, newer.fields);
        over(&mut self.sort, newer.sort);
        over(&mut self.matching, newer.matching);
        over(&mut self.finder, newer.finder);
        over(&mut self.join_type, newer.join_type);
        over(&mut self.strategy, newer.strategy);
        over(&mut self.negate_match, newer.negate_match);
    }
}

/// One node of the raw containment tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contain {
    pub options: ContainOptions,
    pub associations: IndexMap<String, Contain>,
}

impl Contain {
    pub fn new(options: ContainOptions) -> Self {
        Self {
            options,
            associations: IndexMap::new(),
        }
    }

    /// Nest a child node.
    pub fn with(mut self, alias: impl Into<String>, child: Contain) -> Self {
        self.associations.insert(alias.into(), child);
        self
    }

    pub fn merge(&mut self, newer: Contain) {
        self.options.merge(newer.options);
        for (alias, child) in newer.associations {
            self.associations.entry(alias).or_default().merge(child);
        }
    }
}

/// Input of `Query::contain`: association paths with their options.
#[derive(Debug, Clone, Default)]
pub struct ContainSpec {
    entries: Vec<(String, Contain)>,
}

impl ContainSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contain a dotted path with default options.
    pub fn path(self, path: impl Into<String>) -> Self {
        self.node(path, Contain::default())
    }

    /// Contain a dotted path; the options apply to its last segment.
    pub fn with(self, path: impl Into<String>, options: ContainOptions) -> Self {
        self.node(path, Contain::new(options))
    }

    /// Contain a dotted path customized by a query builder.
    pub fn builder(
        self,
        path: impl Into<String>,
        f: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.with(path, ContainOptions::new().query_builder(f))
    }

    pub fn node(mut self, path: impl Into<String>, node: Contain) -> Self {
        self.entries.push((path.into(), node));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge every entry into `tree`, creating intermediate nodes for dotted paths.
    pub fn merge_into(self, tree: &mut IndexMap<String, Contain>) {
        for (path, node) in self.entries {
            let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            let Some(leaf) = segments.pop() else {
                continue;
            };
            let mut pointer = &mut *tree;
            for segment in segments {
                pointer = &mut pointer.entry(segment.to_string()).or_default().associations;
            }
            pointer.entry(leaf.to_string()).or_default().merge(node);
        }
    }
}

impl From<&str> for ContainSpec {
    fn from(path: &str) -> Self {
        ContainSpec::new().path(path)
    }
}

impl From<String> for ContainSpec {
    fn from(path: String) -> Self {
        ContainSpec::new().path(path)
    }
}

impl From<&[&str]> for ContainSpec {
    fn from(paths: &[&str]) -> Self {
        paths.iter().fold(ContainSpec::new(), |spec, p| spec.path(*p))
    }
}

impl<const N: usize> From<[&str; N]> for ContainSpec {
    fn from(paths: [&str; N]) -> Self {
        ContainSpec::from(&paths[..])
    }
}

impl From<Vec<&str>> for ContainSpec {
    fn from(paths: Vec<&str>) -> Self {
        ContainSpec::from(&paths[..])
    }
}

impl From<Vec<String>> for ContainSpec {
    fn from(paths: Vec<String>) -> Self {
        paths.into_iter().fold(ContainSpec::new(), ContainSpec::path)
    }
}

impl From<IndexMap<String, Contain>> for ContainSpec {
    fn from(tree: IndexMap<String, Contain>) -> Self {
        Self {
            entries: tree.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(spec: impl Into<ContainSpec>) -> IndexMap<String, Contain> {
        let mut tree = IndexMap::new();
        spec.into().merge_into(&mut tree);
        tree
    }

    #[test]
    fn dotted_paths_nest() {
        let tree = tree(["Authors.Books", "Authors.Profiles", "Comments"]);
        assert_eq!(tree.keys().collect::<Vec<_>>(), ["Authors", "Comments"]);
        let authors = &tree["Authors"].associations;
        assert_eq!(authors.keys().collect::<Vec<_>>(), ["Books", "Profiles"]);
    }

    #[test]
    fn owned_path_lists_nest() {
        let tree = tree(vec!["Authors.Books".to_string(), "Tags".to_string()]);
        assert_eq!(tree.keys().collect::<Vec<_>>(), ["Authors", "Tags"]);
        assert!(tree["Authors"].associations.contains_key("Books"));
    }

    #[test]
    fn merge_keeps_unset_options() {
        let mut tree = tree(ContainSpec::new().with(
            "Authors",
            ContainOptions::new()
                .fields(["id", "name"])
                .strategy(Strategy::Select),
        ));
        ContainSpec::new()
            .with("Authors", ContainOptions::new().join_type(JoinType::Inner))
            .merge_into(&mut tree);

        let options = &tree["Authors"].options;
        assert_eq!(
            options.fields,
            Some(Fields::List(vec!["id".into(), "name".into()]))
        );
        assert_eq!(options.strategy, Some(Strategy::Select));
        assert_eq!(options.join_type, Some(JoinType::Inner));
    }

    #[test]
    fn second_builder_composes_instead_of_replacing() {
        let first = QueryBuilder::new(|q| q.limit(10));
        let mut options = ContainOptions {
            query_builder: Some(first.clone()),
            ..ContainOptions::default()
        };
        options.merge(ContainOptions::new().query_builder(|q| q.offset(5)));
        let merged = options.query_builder.unwrap();
        assert_ne!(merged, first);

        options = ContainOptions {
            query_builder: Some(first.clone()),
            ..ContainOptions::default()
        };
        options.merge(ContainOptions::new().join_type(JoinType::Inner));
        assert_eq!(options.query_builder, Some(first));
    }

    #[test]
    fn fields_explicitness() {
        assert!(Fields::List(vec!["id".into()]).is_explicit());
        assert!(!Fields::List(Vec::new()).is_explicit());
        assert!(!Fields::Disabled.is_explicit());
    }
}
