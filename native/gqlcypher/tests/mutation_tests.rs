mod common;

use common::{classic_context, context, schema, subscriptions_context, variables};
use gqlcypher::{translate_document, Context, CypherResult, Error, OperationCache};
use serde_json::{json, Value};

async fn translate_one(query: &str, context: &Context) -> gqlcypher::Result<CypherResult> {
    let cache = OperationCache::from_config(&context.config);
    let mut statements =
        translate_document(query, &variables(json!({})), &schema(), context, &cache).await?;
    assert_eq!(statements.len(), 1);
    Ok(statements.remove(0).statement)
}

const NESTED_CREATE: &str = r#"
mutation {
    createMovies(input: [
        {
            title: "Heat",
            actors: { create: [{ node: { name: "Pacino" }, edge: { screenTime: 10 } }] }
        },
        { title: "Ronin" }
    ]) {
        movies { title }
    }
}
"#;

/// Test that a batch of nested creates becomes one UNWIND statement
#[tokio::test]
async fn test_unwind_create_batches_rows() {
    let result = translate_one(NESTED_CREATE, &context()).await.unwrap();

    assert!(result.cypher.starts_with("UNWIND $create_param0 AS create_var0\nCALL {"));
    assert!(result.cypher.contains("CREATE (create_this1:Movie)"));
    assert!(result.cypher.contains("create_this1.id = randomUUID()"));
    assert!(result.cypher.contains("UNWIND create_var0.actors AS create_var2"));
    assert!(result.cypher.ends_with("RETURN collect(create_this1 { .title }) AS data"));
    assert_eq!(
        result.params["create_param0"],
        json!([
            {
                "title": "Heat",
                "actors": [{ "node": { "name": "Pacino" }, "edge": { "screenTime": 10 } }]
            },
            { "title": "Ronin", "actors": [] }
        ])
    );
}

#[tokio::test]
async fn test_classic_create_when_unwind_is_disabled() {
    let result = translate_one(NESTED_CREATE, &classic_context()).await.unwrap();
    assert!(result.cypher.starts_with("CALL {\n    CREATE (this0:Movie)"));
    assert!(result.cypher.contains("CREATE (this1:Movie)"));
    assert_eq!(result.params["this0_title"], json!("Heat"));
    assert_eq!(result.params["this1_title"], json!("Ronin"));
}

/// Connect is not expressible in the batched program, the whole create falls back
#[tokio::test]
async fn test_connect_falls_back_to_classic_create() {
    let result = translate_one(
        r#"mutation {
            createMovies(input: [{
                title: "Heat",
                actors: { connect: [{ where: { node: { name: "Pacino" } } }] }
            }]) { movies { title } }
        }"#,
        &context(),
    )
    .await
    .unwrap();

    assert!(!result.cypher.contains("UNWIND $create_param0"));
    assert!(result.cypher.starts_with("CALL {\n    CREATE (this0:Movie)"));
    assert!(result.cypher.contains("OPTIONAL MATCH (this0_actors_connect0_node:Actor)"));
}

#[tokio::test]
async fn test_subscriptions_emit_meta_from_classic_create() {
    let result = translate_one(
        r#"mutation { createMovies(input: [{ title: "Heat" }]) { movies { title } } }"#,
        &subscriptions_context(),
    )
    .await
    .unwrap();

    assert!(!result.cypher.starts_with("UNWIND"));
    assert!(result.cypher.contains("event: 'create'"));
    assert!(result.cypher.ends_with("AS meta"));
}

#[tokio::test]
async fn test_connect_or_create_conflict() {
    let result = translate_one(
        r#"mutation {
            createMovies(input: [{
                title: "Heat",
                genres: { connectOrCreate: [
                    { where: { node: { name: "Drama" } } },
                    { where: { node: { name: "Drama" } }, onCreate: { node: { name: "Crime" } } }
                ] }
            }]) { movies { title } }
        }"#,
        &context(),
    )
    .await;

    match result {
        Err(Error::ConflictingModification { type_name, fields }) => {
            assert_eq!(type_name, "Genre");
            assert_eq!(fields, "[[name]]");
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_sets_properties() {
    let result = translate_one(
        r#"mutation {
            updateMovies(where: { title: "Heat" }, update: { released: 1995 }) {
                movies { title }
            }
        }"#,
        &context(),
    )
    .await
    .unwrap();

    assert!(result.cypher.starts_with("MATCH (this:Movie)\nWHERE this.title = $this_param0"));
    assert!(result.cypher.contains("SET this.released = $this_update_released"));
    assert_eq!(result.params["this_update_released"], json!(1995));
}

fn slug_context() -> Context {
    context().with_callback("getSlug", |parent: Value| async move {
        let title = parent["title"].as_str().unwrap_or_default().to_lowercase();
        Ok::<_, anyhow::Error>(json!(title.replace(' ', "-")))
    })
}

/// Test that every registered callback value is present in the parameters
#[tokio::test]
async fn test_callbacks_are_resolved_per_input() {
    let result = translate_one(
        r#"mutation {
            createArticles(input: [{ title: "Hello World" }, { title: "Second Post" }]) {
                articles { title }
            }
        }"#,
        &slug_context(),
    )
    .await
    .unwrap();

    assert!(result
        .cypher
        .contains("$resolvedCallbacks[create_var0._callbacks.slug]"));
    assert_eq!(
        result.params["resolvedCallbacks"],
        json!({
            "this0_slug_getSlug": "hello-world",
            "this1_slug_getSlug": "second-post"
        })
    );
}

/// Test that an empty batch still supplies every parameter its statement references
#[tokio::test]
async fn test_empty_create_supplies_resolved_callbacks() {
    let result = translate_one(
        "mutation { createArticles(input: []) { articles { title } } }",
        &slug_context(),
    )
    .await
    .unwrap();

    assert!(result.cypher.contains("$resolvedCallbacks["));
    assert_eq!(result.params["create_param0"], json!([]));
    assert_eq!(result.params["resolvedCallbacks"], json!({}));
}

#[tokio::test]
async fn test_classic_create_references_resolved_callbacks() {
    let context = Context {
        config: classic_context().config,
        ..slug_context()
    };
    let result = translate_one(
        r#"mutation { createArticles(input: [{ title: "Hello World" }]) { articles { title } } }"#,
        &context,
    )
    .await
    .unwrap();

    assert!(result.cypher.contains("$resolvedCallbacks.this0_slug_getSlug"));
    assert_eq!(
        result.params["resolvedCallbacks"]["this0_slug_getSlug"],
        json!("hello-world")
    );
}

#[tokio::test]
async fn test_unregistered_callback_fails() {
    let result = translate_one(
        r#"mutation { createArticles(input: [{ title: "Hello" }]) { articles { title } } }"#,
        &context(),
    )
    .await;
    assert!(matches!(result, Err(Error::MissingCallback(name)) if name == "getSlug"));
}

#[tokio::test]
async fn test_failing_callback_fails_translation() {
    let context = context().with_callback("getSlug", |_parent: Value| async move {
        Err::<Value, _>(anyhow::anyhow!("slug service unavailable"))
    });
    let result = translate_one(
        r#"mutation { createArticles(input: [{ title: "Hello" }]) { articles { title } } }"#,
        &context,
    )
    .await;
    match result {
        Err(Error::Callback { name, message }) => {
            assert_eq!(name, "getSlug");
            assert!(message.contains("slug service unavailable"));
        }
        other => panic!("expected a callback failure, got {:?}", other),
    }
}
