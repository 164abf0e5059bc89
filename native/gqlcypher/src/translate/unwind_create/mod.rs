//! Batched create through a single `UNWIND`
//!
//! The input list is described as one merged [`tree::TreeDescriptor`],
//! checked into a [`ast::CreateAst`] and emitted once by
//! [`visitor::CreateVisitor`]. The input itself travels as a single
//! parameter of normalized rows:
//!
//! * nested creates are stored as a list of `{ node, edge }` under their
//!   field name, whether given as one object or a list
//! * defaults are filled in for absent fields
//! * callback fields hold no value; `_callbacks` maps each to the key of
//!   its resolved value instead
//!
//! Inputs the unwind program cannot express fail with
//! [`Error::UnsupportedUnwindOptimization`] before any callback is
//! registered, so callers can fall back to the classic create.

pub mod ast;
pub mod tree;
pub mod visitor;

use serde_json::{Map, Value};
use tracing::debug;

use self::ast::{CreateAst, PropertyAst, PropertySource};
use self::tree::TreeDescriptor;
use self::visitor::CreateVisitor;
use super::projection::create_projection;
use super::{input_items, input_object, Translation};
use crate::callbacks::CallbackBucket;
use crate::constants::UNWIND_CALLBACKS_KEY;
use crate::cypher::{Clause, CypherResult, Environment, Expr, Param, Projection, Variable};
use crate::error::{Error, Result};
use crate::resolve_tree::ResolveTree;
use crate::schema::{Node, WriteOperation};

/// Prefix of every generated variable and parameter name
const UNWIND_PREFIX: &str = "create_";

/// Translates `create<Plural>(input: [...])` into one `UNWIND` statement
pub fn translate_unwind_create(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    if translation.subscriptions_enabled() {
        return Err(Error::UnsupportedUnwindOptimization(
            "subscriptions".to_string(),
        ));
    }

    let schema = translation.schema;
    let input = tree.arg("input").unwrap_or(&Value::Null);
    let items = input_items(input)
        .into_iter()
        .map(|item| input_object(item, "input"))
        .collect::<Result<Vec<_>>>()?;

    let descriptor = TreeDescriptor::describe_all(node, items.iter().copied(), schema)?;
    let ast = CreateAst::build(node, &descriptor, schema)?;
    debug!(rows = items.len(), node = %node.name, "unwind create");

    let rows = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            normalize_row(&ast, item, &format!("this{}", index), &mut translation.callbacks)
        })
        .collect::<Result<Vec<_>>>()?;

    let (clause, root) =
        CreateVisitor::new(translation).visit(&ast, Param::scoped("", Value::Array(rows)))?;

    let placeholder = Variable::placeholder();
    let projection = match tree.field(&node.plural()) {
        Some(selection) => create_projection(node, &placeholder, "this", selection, translation)?,
        None => Expr::MapProjection {
            subject: placeholder.clone(),
            items: Vec::new(),
        },
    };
    let statement = Clause::Sequence(vec![
        clause,
        Clause::Return(Projection::default().aliased(
            Expr::function("collect", vec![projection]),
            &Variable::named("data"),
        )),
    ]);

    let mut env = Environment::new(UNWIND_PREFIX);
    env.bind(&placeholder, &root);
    let cypher = statement.compile(&mut env)?;
    Ok(env.into_result(cypher))
}

/// One input object as a row of the shape `ast` reads
fn normalize_row(
    ast: &CreateAst<'_>,
    input: &Map<String, Value>,
    path: &str,
    callbacks: &mut CallbackBucket,
) -> Result<Value> {
    let mut row = normalize_properties(&ast.properties, input, path, callbacks);

    for relation in &ast.relations {
        let field = &relation.field.name;
        let create = match input.get(field) {
            Some(value) => input_object(value, field)?.get("create").unwrap_or(&Value::Null),
            None => &Value::Null,
        };
        let mut items = Vec::new();
        for (index, item) in input_items(create).into_iter().enumerate() {
            let item = input_object(item, "create")?;
            let base = format!("{}_{}{}", path, field, index);
            let node = item
                .get("node")
                .ok_or_else(|| Error::invalid(format!("create on {} requires node", field)))?;

            let mut entry = Map::new();
            entry.insert(
                "node".to_string(),
                normalize_row(
                    &relation.create,
                    input_object(node, "create.node")?,
                    &format!("{}_node", base),
                    callbacks,
                )?,
            );
            if relation.edge.is_some() {
                let empty = Map::new();
                let edge = match item.get("edge") {
                    Some(edge) => input_object(edge, "create.edge")?,
                    None => &empty,
                };
                entry.insert(
                    "edge".to_string(),
                    Value::Object(normalize_properties(
                        &relation.edge_properties,
                        edge,
                        &format!("{}_relationship", base),
                        callbacks,
                    )),
                );
            }
            items.push(Value::Object(entry));
        }
        row.insert(field.clone(), Value::Array(items));
    }

    Ok(Value::Object(row))
}

fn normalize_properties(
    properties: &[PropertyAst<'_>],
    input: &Map<String, Value>,
    path: &str,
    callbacks: &mut CallbackBucket,
) -> Map<String, Value> {
    let mut row = Map::new();
    let mut registered = Map::new();
    for property in properties {
        let field = property.field;
        match property.source {
            PropertySource::Row | PropertySource::RowOrGenerated => {
                let value = input
                    .get(&field.name)
                    .or(field.default_value.as_ref())
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(field.name.clone(), value);
            }
            PropertySource::Callback => {
                if let Some(callback) = field.callback_for(WriteOperation::Create) {
                    let key = callbacks.add(
                        &callback.name,
                        &format!("{}_{}", path, field.name),
                        Value::Object(input.clone()),
                    );
                    registered.insert(field.name.clone(), Value::String(key));
                }
            }
            PropertySource::Generated | PropertySource::Timestamp => {}
        }
    }
    if !registered.is_empty() {
        row.insert(UNWIND_CALLBACKS_KEY.to_string(), Value::Object(registered));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::schema::{
        Auth, CallbackField, PrimitiveField, RelationField, RelationTarget, RelationshipDirection,
        Schema,
    };
    use serde_json::json;

    fn schema() -> Schema {
        let mut id = PrimitiveField::new("id", "ID");
        id.autogenerate = true;
        let mut slug = PrimitiveField::new("slug", "String");
        slug.callback = Some(CallbackField {
            name: "getSlug".into(),
            operations: vec![WriteOperation::Create],
        });
        Schema::new(
            vec![
                Node::new("Movie")
                    .with_primitive(id)
                    .with_primitive(PrimitiveField::new("title", "String"))
                    .with_relation(RelationField::new(
                        "actors",
                        "ACTED_IN",
                        RelationshipDirection::In,
                        RelationTarget::Node("Actor".into()),
                    )),
                Node::new("Actor").with_primitive(PrimitiveField::new("name", "String")),
                Node::new("Article").with_primitive(slug),
            ],
            vec![],
        )
        .unwrap()
    }

    fn tree(field: &str, plural: &str, selected: &str, input: Value) -> ResolveTree {
        ResolveTree::new(field)
            .with_args(json!({ "input": input }))
            .with_fields(vec![
                ResolveTree::new(plural).with_fields(vec![ResolveTree::new(selected)])
            ])
    }

    #[test]
    fn nested_create_in_one_statement() {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let result = translate_unwind_create(
            &tree(
                "createMovies",
                "movies",
                "title",
                json!([
                    { "title": "Heat", "actors": { "create": { "node": { "name": "Pacino" } } } },
                    { "title": "Ronin" }
                ]),
            ),
            schema.node("Movie").unwrap(),
            &mut translation,
        )
        .unwrap();

        insta::assert_snapshot!(result.cypher, @r###"
        UNWIND $create_param0 AS create_var0
        CALL {
            WITH create_var0
            CREATE (create_this1:Movie)
            SET
                create_this1.id = randomUUID(),
                create_this1.title = create_var0.title
            WITH create_this1, create_var0
            CALL {
                WITH create_this1, create_var0
                UNWIND create_var0.actors AS create_var2
                WITH create_this1, create_var2.node AS create_var3
                CREATE (create_this4:Actor)
                SET create_this4.name = create_var3.name
                MERGE (create_this1)<-[create_this5:ACTED_IN]-(create_this4)
                RETURN collect(NULL) AS create_var6
            }
            RETURN create_this1
        }
        RETURN collect(create_this1 { .title }) AS data
        "###);
        assert_eq!(
            result.params["create_param0"],
            json!([
                { "title": "Heat", "actors": [{ "node": { "name": "Pacino" } }] },
                { "title": "Ronin", "actors": [] }
            ])
        );
    }

    #[test]
    fn callbacks_are_keyed_per_row() {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let result = translate_unwind_create(
            &tree("createArticles", "articles", "slug", json!([{ "slug": "x" }, {}])),
            schema.node("Article").unwrap(),
            &mut translation,
        )
        .unwrap();

        assert!(result
            .cypher
            .contains("SET create_this1.slug = $resolvedCallbacks[create_var0._callbacks.slug]"));
        assert_eq!(
            result.params["create_param0"],
            json!([
                { "_callbacks": { "slug": "this0_slug_getSlug" } },
                { "_callbacks": { "slug": "this1_slug_getSlug" } }
            ])
        );
        assert_eq!(translation.callbacks.len(), 2);
    }

    #[test]
    fn bind_auth_params_are_namespaced_by_depth() {
        let bind = |claim: &str, property: &str| -> Auth {
            serde_json::from_value(json!({
                "rules": [{ "operations": ["CREATE"], "bind": { property: format!("$jwt.{}", claim) } }]
            }))
            .unwrap()
        };
        let schema = Schema::new(
            vec![
                Node::new("Movie")
                    .with_primitive(PrimitiveField::new("title", "String"))
                    .with_relation(RelationField::new(
                        "actors",
                        "ACTED_IN",
                        RelationshipDirection::In,
                        RelationTarget::Node("Actor".into()),
                    ))
                    .with_auth(bind("title", "title")),
                Node::new("Actor")
                    .with_primitive(PrimitiveField::new("name", "String"))
                    .with_auth(bind("name", "name")),
            ],
            vec![],
        )
        .unwrap();
        let context =
            Context::new(Config::default()).with_jwt(json!({ "title": "Heat", "name": "Pacino" }));
        let mut translation = Translation::new(&schema, &context);
        let result = translate_unwind_create(
            &tree(
                "createMovies",
                "movies",
                "title",
                json!([{ "title": "Heat", "actors": { "create": { "node": { "name": "Pacino" } } } }]),
            ),
            schema.node("Movie").unwrap(),
            &mut translation,
        )
        .unwrap();

        assert!(result.cypher.contains("= $create_thisauth_param0), 'FORBIDDEN', [0])"));
        assert!(result.cypher.contains("= $create_this_actorsauth_param0), 'FORBIDDEN', [0])"));
        assert_eq!(result.params["create_thisauth_param0"], json!("Heat"));
        assert_eq!(result.params["create_this_actorsauth_param0"], json!("Pacino"));
    }

    #[test]
    fn subscriptions_fail_before_any_work() {
        let schema = schema();
        let context = Context::new(Config {
            subscriptions_enabled: true,
            ..Config::default()
        });
        let mut translation = Translation::new(&schema, &context);
        let result = translate_unwind_create(
            &tree("createArticles", "articles", "slug", json!([{ "slug": "x" }])),
            schema.node("Article").unwrap(),
            &mut translation,
        );
        assert!(matches!(result, Err(Error::UnsupportedUnwindOptimization(_))));
        assert!(translation.callbacks.is_empty());
    }

    #[test]
    fn connect_falls_back_to_classic_create() {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let tree = tree(
            "createMovies",
            "movies",
            "title",
            json!([{ "title": "Heat", "actors": { "connect": [{ "where": { "node": { "name": "Pacino" } } }] } }]),
        );
        let node = schema.node("Movie").unwrap();
        assert!(matches!(
            translate_unwind_create(&tree, node, &mut translation),
            Err(Error::UnsupportedUnwindOptimization(_))
        ));
        let result = super::super::create::translate_create(&tree, node, &mut translation).unwrap();
        assert!(result.cypher.starts_with("CALL {\n    CREATE (this0:Movie)"));
    }
}
