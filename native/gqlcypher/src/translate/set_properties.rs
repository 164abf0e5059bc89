/// Property assignments for created and updated entities
use serde_json::{Map, Value};

use super::Translation;
use crate::cypher::{Expr, Param, SetItem, Variable};
use crate::error::{Error, Result};
use crate::schema::{Entity, WriteOperation};

/// `SET` items for `input` on `variable`.
///
/// Client values become parameters named `{path}_{field}`. On create,
/// autogenerated and defaulted fields missing from the input are filled in.
/// Timestamps and callbacks registered for `operation` are always applied,
/// callbacks overriding any client value. Relationship keys are left to the
/// caller.
pub fn create_set_items(
    entity: &dyn Entity,
    variable: &Variable,
    path: &str,
    input: &Map<String, Value>,
    operation: WriteOperation,
    translation: &mut Translation<'_>,
) -> Result<Vec<SetItem>> {
    create_set_items_except(entity, variable, path, input, operation, &[], translation)
}

/// Like [`create_set_items`], leaving the fields named in `keys` untouched.
/// Used when those properties are already fixed by a `MERGE` pattern.
pub fn create_set_items_except(
    entity: &dyn Entity,
    variable: &Variable,
    path: &str,
    input: &Map<String, Value>,
    operation: WriteOperation,
    keys: &[&str],
    translation: &mut Translation<'_>,
) -> Result<Vec<SetItem>> {
    let mut items = Vec::with_capacity(input.len());

    for (key, value) in input {
        if entity.relation_field(key).is_some() || keys.contains(&key.as_str()) {
            continue;
        }
        let field = entity.primitive_field(key).ok_or_else(|| Error::UnknownField {
            entity: entity.name().to_string(),
            field: key.clone(),
        })?;
        if field.callback_for(operation).is_some() {
            continue;
        }
        items.push(SetItem::property(
            variable.property(field.db_name()),
            Param::named(format!("{}_{}", path, field.name), value.clone()).expr(),
        ));
    }

    for field in entity.primitive_fields() {
        if keys.contains(&field.name.as_str()) {
            continue;
        }
        let provided = input.contains_key(&field.name);
        let value = if let Some(callback) = field.callback_for(operation) {
            Some(translation.callbacks.reference(
                &callback.name,
                &format!("{}_{}", path, field.name),
                Value::Object(input.clone()),
            ))
        } else if field.has_timestamp(operation) {
            Some(Expr::function(field.temporal_function(), vec![]))
        } else if operation == WriteOperation::Create && !provided {
            if field.autogenerate {
                Some(Expr::function("randomUUID", vec![]))
            } else {
                field.default_value.as_ref().map(|default| {
                    Param::named(format!("{}_{}", path, field.name), default.clone()).expr()
                })
            }
        } else {
            None
        };
        if let Some(value) = value {
            items.push(SetItem::property(variable.property(field.db_name()), value));
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::cypher::Clause;
    use crate::schema::{CallbackField, Node, PrimitiveField, Schema};
    use serde_json::json;

    fn movie() -> Node {
        let mut id = PrimitiveField::new("id", "ID");
        id.autogenerate = true;
        let mut created = PrimitiveField::new("createdAt", "DateTime");
        created.timestamps = vec![WriteOperation::Create];
        let mut updated = PrimitiveField::new("updatedAt", "DateTime");
        updated.timestamps = vec![WriteOperation::Update];
        let mut slug = PrimitiveField::new("slug", "String");
        slug.callback = Some(CallbackField {
            name: "getSlug".into(),
            operations: vec![WriteOperation::Create],
        });
        let mut rating = PrimitiveField::new("rating", "Int");
        rating.db_property_name = Some("db_rating".into());
        Node::new("Movie")
            .with_primitive(id)
            .with_primitive(PrimitiveField::new("title", "String"))
            .with_primitive(rating)
            .with_primitive(created)
            .with_primitive(updated)
            .with_primitive(slug)
    }

    #[test]
    fn create_fills_generated_fields() {
        let schema = Schema::new(vec![movie()], vec![]).unwrap();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let this = Variable::named("this0");
        let input = json!({ "title": "Heat", "rating": 5 });
        let items = create_set_items(
            schema.node("Movie").unwrap(),
            &this,
            "this0",
            input.as_object().unwrap(),
            WriteOperation::Create,
            &mut translation,
        )
        .unwrap();
        let result = Clause::Set(items).build("").unwrap();
        assert_eq!(
            result.cypher,
            "SET\n    this0.db_rating = $this0_rating,\n    this0.title = $this0_title,\n    this0.id = randomUUID(),\n    this0.createdAt = datetime(),\n    this0.slug = $resolvedCallbacks.this0_slug_getSlug"
        );
        assert_eq!(translation.callbacks.len(), 1);
        assert_eq!(result.params.len(), 2);
    }

    #[test]
    fn update_only_touches_update_fields() {
        let schema = Schema::new(vec![movie()], vec![]).unwrap();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let this = Variable::named("this");
        let input = json!({ "title": "Heat" });
        let items = create_set_items(
            schema.node("Movie").unwrap(),
            &this,
            "this_update",
            input.as_object().unwrap(),
            WriteOperation::Update,
            &mut translation,
        )
        .unwrap();
        let result = Clause::Set(items).build("").unwrap();
        assert_eq!(
            result.cypher,
            "SET\n    this.title = $this_update_title,\n    this.updatedAt = datetime()"
        );
        assert!(translation.callbacks.is_empty());
    }

    #[test]
    fn unknown_input_fields_fail() {
        let schema = Schema::new(vec![movie()], vec![]).unwrap();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let input = json!({ "budget": 1 });
        let result = create_set_items(
            schema.node("Movie").unwrap(),
            &Variable::named("this0"),
            "this0",
            input.as_object().unwrap(),
            WriteOperation::Create,
            &mut translation,
        );
        assert!(matches!(result, Err(Error::UnknownField { .. })));
    }
}
