mod common;

use common::{context, schema, variables};
use gqlcypher::translate::auth::{create_auth_and_params, AuthKind};
use gqlcypher::schema::AuthOperation;
use gqlcypher::translate::Translation;
use gqlcypher::{translate_document, Context, Error, OperationCache};
use serde_json::json;

fn owner(sub: &str) -> Context {
    context().with_jwt(json!({ "sub": sub, "roles": ["editor"] }))
}

#[test]
fn test_where_and_allow_compile_to_the_same_comparison() {
    let schema = schema();
    let context = owner("u1");
    let translation = Translation::new(&schema, &context);
    let post = schema.node("Post").unwrap();

    for kind in [AuthKind::Where, AuthKind::Allow] {
        let result = create_auth_and_params(post, "this", &[AuthOperation::Read], kind, &translation)
            .unwrap()
            .unwrap();
        assert_eq!(result.cypher, "this.owner = $thisauth_param0");
        assert_eq!(result.params["thisauth_param0"], json!("u1"));
    }
}

#[test]
fn test_role_rules_only_take_part_in_their_operations() {
    let schema = schema();
    let context = owner("u1");
    let translation = Translation::new(&schema, &context);
    let post = schema.node("Post").unwrap();

    let delete =
        create_auth_and_params(post, "this", &[AuthOperation::Delete], AuthKind::Allow, &translation)
            .unwrap()
            .unwrap();
    assert_eq!(delete.cypher, "any(var0 IN ['admin'] WHERE var0 IN $auth.roles)");
    assert_eq!(
        delete.params["auth"],
        json!({ "isAuthenticated": true, "roles": ["editor"] })
    );

    let update =
        create_auth_and_params(post, "this", &[AuthOperation::Update], AuthKind::Allow, &translation)
            .unwrap();
    assert!(update.is_none());
}

/// Test the read statement of an owned node end to end
#[tokio::test]
async fn test_read_filters_and_validates_owner() {
    let statements = translate_document(
        "{ posts { title } }",
        &variables(json!({})),
        &schema(),
        &owner("u1"),
        &OperationCache::new(10, std::time::Duration::from_secs(60)),
    )
    .await
    .unwrap();

    let cypher = &statements[0].statement.cypher;
    assert!(cypher.starts_with("MATCH (this:Post)\nWHERE this.owner = $thisauth_param0\nWITH this\n"));
    assert!(cypher.contains(
        "CALL apoc.util.validate(NOT (this.owner = $thisauth_param1), 'FORBIDDEN', [0])"
    ));
    assert!(cypher.ends_with("RETURN this { .title } AS this"));
    assert_eq!(statements[0].statement.params["thisauth_param0"], json!("u1"));
    assert_eq!(statements[0].statement.params["thisauth_param1"], json!("u1"));
}

#[tokio::test]
async fn test_anonymous_read_of_owned_data_is_unauthenticated() {
    let result = translate_document(
        "{ posts { title } }",
        &variables(json!({})),
        &schema(),
        &context(),
        &OperationCache::new(10, std::time::Duration::from_secs(60)),
    )
    .await;
    assert!(matches!(result, Err(Error::Unauthenticated)));
}

#[tokio::test]
async fn test_delete_is_guarded_by_roles() {
    let statements = translate_document(
        r#"mutation { deletePosts(where: { title: "Draft" }) { nodesDeleted } }"#,
        &variables(json!({})),
        &schema(),
        &owner("u1"),
        &OperationCache::new(10, std::time::Duration::from_secs(60)),
    )
    .await
    .unwrap();

    let statement = &statements[0].statement;
    assert!(statement.cypher.contains(
        "CALL apoc.util.validate(NOT (any(var0 IN ['admin'] WHERE var0 IN $auth.roles)), 'FORBIDDEN', [0])"
    ));
    assert!(statement.cypher.contains("DETACH DELETE this"));
    assert_eq!(statement.params["auth"]["roles"], json!(["editor"]));
}
