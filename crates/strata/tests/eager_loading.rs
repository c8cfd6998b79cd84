mod common;

use asupersync::runtime::RuntimeBuilder;
use strata::prelude::*;
use strata::AssociationErrorKind;

use common::{MockConnection, blog, text, unwrap_outcome};

const ARTICLES: &str = "FROM \"articles\" AS \"Articles\"";

#[test]
fn joined_parent_with_nested_children_by_key() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &[
            "Articles__id",
            "Articles__title",
            "Articles__author_id",
            "Authors__id",
            "Authors__name",
        ],
        vec![
            vec![Value::Int(1), text("First"), Value::Int(1), Value::Int(1), text("Ann")],
            vec![Value::Int(2), text("Second"), Value::Null, Value::Null, Value::Null],
            vec![Value::Int(3), text("Third"), Value::Int(1), Value::Int(1), text("Ann")],
        ],
    )
    .respond(
        "FROM \"books\" AS \"Books\"",
        &["Books__id", "Books__author_id", "Books__title"],
        vec![
            vec![Value::Int(10), Value::Int(1), text("Book A")],
            vec![Value::Int(11), Value::Int(1), text("Book B")],
        ],
    );

    rt.block_on(async {
        let results = unwrap_outcome(
            articles
                .query()
                .contain("Authors.Books")
                .all(&cx, &conn)
                .await,
        );
        assert_eq!(results.len(), 3);

        let first = &results.iter().next().unwrap();
        assert_eq!(
            first.get_path("author.name").and_then(Data::as_value),
            Some(&text("Ann"))
        );
        let books = first
            .get_path("author.books")
            .and_then(Data::as_list)
            .unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].as_entity().unwrap().class(), "Book");

        let orphan = results.iter().nth(1).unwrap();
        assert_eq!(orphan.get("author"), Some(&Data::Null));

        let queries = conn.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].0.contains(
            "LEFT JOIN \"authors\" AS \"Authors\" ON \"Authors\".\"id\" = \"Articles\".\"author_id\""
        ));
        assert!(queries[1].0.contains("\"Books\".\"author_id\" IN ($1)"));
        assert_eq!(queries[1].1, vec![Value::Int(1)]);
    });
}

#[test]
fn has_many_defaults_to_empty_list() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &["Articles__id", "Articles__title", "Articles__author_id"],
        vec![
            vec![Value::Int(1), text("First"), Value::Int(4)],
            vec![Value::Int(2), text("Second"), Value::Int(4)],
        ],
    )
    .respond(
        "FROM \"comments\" AS \"Comments\"",
        &["Comments__id", "Comments__article_id", "Comments__body"],
        vec![
            vec![Value::Int(7), Value::Int(1), text("Nice")],
            vec![Value::Int(8), Value::Int(1), text("Agreed")],
        ],
    );

    rt.block_on(async {
        let results = unwrap_outcome(articles.query().contain("Comments").all(&cx, &conn).await);
        let rows: Vec<&Data> = results.iter().collect();
        let comments = rows[0].get("comments").and_then(Data::as_list).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(
            comments[1].get("body").and_then(Data::as_value),
            Some(&text("Agreed"))
        );
        assert_eq!(rows[1].get("comments"), Some(&Data::List(Vec::new())));

        let queries = conn.queries();
        assert_eq!(queries[1].1, vec![Value::Int(1), Value::Int(2)]);
    });
}

#[test]
fn unselected_foreign_key_is_reported() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(ARTICLES, &["Articles__title"], vec![vec![text("First")]]);

    rt.block_on(async {
        let outcome = articles
            .query()
            .select(["title"])
            .contain("Comments")
            .all(&cx, &conn)
            .await;
        let Outcome::Err(err) = outcome else {
            panic!("expected an error");
        };
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::MissingForeignKey)
        );
        assert!(err.to_string().contains(
            "Unable to load `Comments` association. Ensure foreign key in `Articles` is selected."
        ));
        assert_eq!(conn.queries().len(), 1);
    });
}

#[test]
fn belongs_to_many_carries_junction_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &["Articles__id", "Articles__title", "Articles__author_id"],
        vec![
            vec![Value::Int(1), text("First"), Value::Null],
            vec![Value::Int(2), text("Second"), Value::Null],
        ],
    )
    .respond(
        "FROM \"tags\" AS \"Tags\"",
        &[
            "Tags__id",
            "Tags__name",
            "Tags_CJoin__article_id",
            "Tags_CJoin__tag_id",
        ],
        vec![
            vec![Value::Int(5), text("rust"), Value::Int(1), Value::Int(5)],
            vec![Value::Int(6), text("sql"), Value::Int(1), Value::Int(6)],
            vec![Value::Int(5), text("rust"), Value::Int(2), Value::Int(5)],
        ],
    );

    rt.block_on(async {
        let results = unwrap_outcome(articles.query().contain("Tags").all(&cx, &conn).await);
        let rows: Vec<&Data> = results.iter().collect();
        let first_tags = rows[0].get("tags").and_then(Data::as_list).unwrap();
        assert_eq!(first_tags.len(), 2);
        let joint = first_tags[0]
            .get("_joinData")
            .and_then(Data::as_entity)
            .unwrap();
        assert_eq!(joint.value("article_id"), Some(&Value::Int(1)));
        assert_eq!(rows[1].get("tags").and_then(Data::as_list).map(<[Data]>::len), Some(1));

        let queries = conn.queries();
        assert!(queries[1].0.contains("INNER JOIN \"articles_tags\" AS \"ArticlesTags\""));
        assert!(queries[1].0.contains("\"ArticlesTags\".\"article_id\" IN ($1, $2)"));
    });
}

#[test]
fn matching_filters_and_nests_apart() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &[
            "Articles__id",
            "Articles__title",
            "Articles__author_id",
            "Authors__id",
            "Authors__name",
        ],
        vec![vec![Value::Int(1), text("First"), Value::Int(3), Value::Int(3), text("Bo")]],
    );

    rt.block_on(async {
        let query = articles
            .query()
            .matching_with("Authors", |q| q.filter(Expr::qualified("Authors", "name").eq("Bo")));
        let results = unwrap_outcome(query.all(&cx, &conn).await);
        let article = results.first().unwrap();
        assert!(article.get("author").is_none());
        assert_eq!(
            article
                .get_path("_matchingData.Authors.name")
                .and_then(Data::as_value),
            Some(&text("Bo"))
        );

        let (sql, params) = &conn.queries()[0];
        assert!(sql.contains("INNER JOIN \"authors\" AS \"Authors\""));
        assert_eq!(params, &vec![text("Bo")]);
    });
}

#[test]
fn not_matching_excludes_related_rows() {
    let (_locator, articles) = blog();
    let (sql, _) = articles
        .query()
        .not_matching("Comments")
        .sql(strata::Dialect::Postgres)
        .unwrap();
    assert!(sql.contains(
        "LEFT JOIN \"comments\" AS \"Comments\" ON \"Articles\".\"id\" = \"Comments\".\"article_id\""
    ));
    assert!(sql.contains("\"Comments\".\"id\" IS NULL"));
    assert!(!sql.contains("Comments__"));
}

#[test]
fn count_ignores_paging_and_fields() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond("COUNT(*)", &["count"], vec![vec![Value::BigInt(7)]]);

    rt.block_on(async {
        let query = articles
            .query()
            .contain("Authors")
            .order_by(OrderBy::asc("Articles.title"))
            .limit(2);
        let count = unwrap_outcome(query.count(&cx, &conn).await);
        assert_eq!(count, 7);

        let (sql, _) = &conn.queries()[0];
        assert!(sql.starts_with("SELECT COUNT(*) AS \"count\" FROM \"articles\" AS \"Articles\""));
        assert!(sql.contains("LEFT JOIN \"authors\""));
        assert!(!sql.contains("Authors__name"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ORDER BY"));
    });
}

#[test]
fn formatters_run_in_order_after_hydration() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &["Articles__id", "Articles__title", "Articles__author_id"],
        vec![
            vec![Value::Int(1), text("First"), Value::Null],
            vec![Value::Int(2), text("Second"), Value::Null],
        ],
    );

    rt.block_on(async {
        let first = unwrap_outcome(
            articles
                .query()
                .format_results(|mut rows| {
                    rows.reverse();
                    rows
                })
                .format_results(|rows| rows.into_iter().take(1).collect())
                .first(&cx, &conn)
                .await,
        )
        .unwrap();
        assert_eq!(first.get("id").and_then(Data::as_value), Some(&Value::Int(2)));
        assert!(conn.queries()[0].0.ends_with("LIMIT 1"));
    });
}

#[test]
fn results_render_as_nested_json() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &[
            "Articles__id",
            "Articles__title",
            "Articles__author_id",
            "Authors__id",
            "Authors__name",
        ],
        vec![vec![Value::Int(1), text("First"), Value::Int(3), Value::Int(3), text("Bo")]],
    );

    rt.block_on(async {
        let results = unwrap_outcome(articles.query().contain("Authors").all(&cx, &conn).await);
        let expected = serde_json::json!([{
            "id": 1,
            "title": "First",
            "author_id": 3,
            "author": {"id": 3, "name": "Bo"},
        }]);
        assert_eq!(results.to_json(), expected);
        assert_eq!(serde_json::to_value(&results).unwrap(), expected);
    });
}

#[test]
fn nested_matching_through_has_many_nests_every_level() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let locator = TableLocator::new();
    let articles = locator
        .add(
            Table::new("Articles")
                .with_columns(["id", "title"])
                .has_many("Comments", AssociationOptions::new()),
        )
        .expect("register Articles");
    locator
        .add(
            Table::new("Comments")
                .with_columns(["id", "article_id", "author_id"])
                .belongs_to("Authors", AssociationOptions::new()),
        )
        .expect("register Comments");
    locator
        .add(Table::new("Authors").with_columns(["id", "name"]))
        .expect("register Authors");
    let conn = MockConnection::new();
    conn.respond(
        ARTICLES,
        &[
            "Articles__id",
            "Articles__title",
            "Comments__id",
            "Comments__article_id",
            "Comments__author_id",
            "Authors__id",
            "Authors__name",
        ],
        vec![vec![
            Value::Int(1),
            text("First"),
            Value::Int(7),
            Value::Int(1),
            Value::Int(3),
            Value::Int(3),
            text("Ann"),
        ]],
    );

    rt.block_on(async {
        let results = unwrap_outcome(
            articles
                .query()
                .matching("Comments.Authors")
                .all(&cx, &conn)
                .await,
        );
        let article = results.first().unwrap();
        assert_eq!(
            article
                .get_path("_matchingData.Authors.name")
                .and_then(Data::as_value),
            Some(&text("Ann"))
        );
        assert_eq!(
            article
                .get_path("_matchingData.Comments.id")
                .and_then(Data::as_value),
            Some(&Value::Int(7))
        );
        assert!(article.get("Authors").is_none());
        assert!(article.get("comments").is_none());

        let queries = conn.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].0.contains(
            "INNER JOIN \"comments\" AS \"Comments\" ON \"Articles\".\"id\" = \"Comments\".\"article_id\""
        ));
        assert!(queries[0].0.contains(
            "INNER JOIN \"authors\" AS \"Authors\" ON \"Authors\".\"id\" = \"Comments\".\"author_id\""
        ));
    });
}

#[test]
fn subquery_strategy_filters_by_the_parent_query() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_locator, articles) = blog();
    let conn = MockConnection::new();
    conn.respond(
        "FROM \"comments\" AS \"Comments\"",
        &["Comments__id", "Comments__article_id", "Comments__body"],
        vec![vec![Value::Int(7), Value::Int(1), text("Nice")]],
    )
    .respond(
        ARTICLES,
        &["Articles__id", "Articles__title", "Articles__author_id"],
        vec![vec![Value::Int(1), text("First"), Value::Null]],
    );

    rt.block_on(async {
        let results = unwrap_outcome(
            articles
                .query()
                .filter(Expr::qualified("Articles", "title").eq("First"))
                .limit(5)
                .contain(
                    ContainSpec::new().with(
                        "Comments",
                        ContainOptions::new()
                            .strategy(Strategy::Subquery)
                            .condition(Expr::qualified("Comments", "body").eq("Nice")),
                    ),
                )
                .all(&cx, &conn)
                .await,
        );
        let article = results.first().unwrap();
        let comments = article.get("comments").and_then(Data::as_list).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(
            comments[0].get("body").and_then(Data::as_value),
            Some(&text("Nice"))
        );

        let queries = conn.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].0.ends_with("LIMIT 5"));
        let (sql, params) = &queries[1];
        assert!(sql.contains("\"Comments\".\"body\" = $1"));
        assert!(sql.contains("\"Comments\".\"article_id\" IN (SELECT \"Articles\".\"id\""));
        assert!(sql.contains(
            "WHERE \"Articles\".\"title\" = $2 GROUP BY \"Articles\".\"id\")"
        ));
        assert!(!sql.contains("LIMIT"));
        assert_eq!(params, &vec![text("Nice"), text("First")]);
    });
}
