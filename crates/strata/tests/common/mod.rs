//! Shared fixtures: a scripted in-memory connection and a small blog schema.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use strata::{
    AssociationOptions, Connection, Cx, Error, Outcome, Row, Table, TableLocator, Value,
};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Clone)]
struct Response {
    fragment: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<Response>,
    queries: Vec<(String, Vec<Value>)>,
    executed: Vec<(String, Vec<Value>)>,
    last_insert_id: i64,
}

/// Answers each query with the rows registered for the first SQL fragment it
/// contains, and records every statement it sees.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, fragment: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> &Self {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.responses.push(Response {
            fragment: fragment.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        });
        self
    }

    pub fn queries(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").queries.clone()
    }

    /// Inserts, updates and deletes, in order.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").executed.clone()
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            let rows = guard
                .responses
                .iter()
                .find(|response| sql.contains(&response.fragment))
                .map(|response| {
                    response
                        .rows
                        .iter()
                        .map(|values| Row::new(response.columns.clone(), values.clone()))
                        .collect()
                })
                .unwrap_or_default();
            guard.queries.push((sql, params));
            Outcome::Ok(rows)
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql, params));
            Outcome::Ok(1)
        }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql, params));
            guard.last_insert_id += 1;
            Outcome::Ok(guard.last_insert_id)
        }
    }
}

/// Articles belong to Authors, have many Comments and many Tags; Authors
/// have many Books.
pub fn blog() -> (Arc<TableLocator>, Arc<Table>) {
    let locator = TableLocator::new();
    let articles = locator
        .add(
            Table::new("Articles")
                .with_columns(["id", "title", "author_id"])
                .belongs_to("Authors", AssociationOptions::new())
                .has_many("Comments", AssociationOptions::new())
                .belongs_to_many("Tags", AssociationOptions::new()),
        )
        .expect("register Articles");
    locator
        .add(
            Table::new("Authors")
                .with_columns(["id", "name"])
                .has_many("Books", AssociationOptions::new()),
        )
        .expect("register Authors");
    locator
        .add(Table::new("Books").with_columns(["id", "author_id", "title"]))
        .expect("register Books");
    locator
        .add(Table::new("Comments").with_columns(["id", "article_id", "body"]))
        .expect("register Comments");
    locator
        .add(Table::new("Tags").with_columns(["id", "name"]))
        .expect("register Tags");
    (locator, articles)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
