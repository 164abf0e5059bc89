//! Read root fields

use serde_json::Value;

use super::auth::{create_auth_predicate, create_auth_validation, AuthKind};
use super::projection::create_projection;
use super::where_clause::create_where;
use super::Translation;
use crate::cypher::{Clause, CypherResult, Expr, Param, Pattern, Projection, Variable};
use crate::error::{Error, Result};
use crate::resolve_tree::ResolveTree;
use crate::schema::{AuthOperation, Entity, Node};

/// `MATCH (this:Label) WHERE ... RETURN this { ... } AS this`
pub fn translate_read(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    let this = Variable::named("this");
    let operations = [AuthOperation::Read];
    let mut clauses = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = tree.arg("where") {
        predicates.extend(create_where(node, &this, "this", filter, translation)?);
    }
    predicates.extend(create_auth_predicate(
        node,
        &this,
        "this",
        &operations,
        AuthKind::Where,
        translation,
    )?);
    clauses.push(Clause::matching(
        Pattern::node(translation.node_pattern(Some(&this), node)?),
        Expr::and_all(predicates),
    ));

    if let Some(validation) =
        create_auth_validation(node, &this, "this", &operations, AuthKind::Allow, translation)?
    {
        clauses.push(Clause::with_variables([&this]));
        clauses.push(validation);
    }

    if let Some(options) = tree.arg("options") {
        if let Some(paging) = create_options(node, &this, options)? {
            clauses.push(Clause::With(paging));
        }
    }

    let projection = create_projection(node, &this, "this", tree, translation)?;
    clauses.push(Clause::Return(Projection::default().aliased(projection, &this)));

    Clause::Sequence(clauses).build("")
}

/// `WITH this ORDER BY ... SKIP $this_offset LIMIT $this_limit` from `options`
fn create_options(node: &Node, this: &Variable, options: &Value) -> Result<Option<Projection>> {
    let options = super::input_object(options, "options")?;
    let mut projection = Projection::variables([this]);

    if let Some(sort) = options.get("sort").filter(|s| !s.is_null()) {
        for item in super::input_items(sort) {
            for (key, direction) in super::input_object(item, "options.sort")? {
                let field = node.primitive_field(key).ok_or_else(|| Error::UnknownField {
                    entity: node.name.clone(),
                    field: key.clone(),
                })?;
                let descending = match direction.as_str() {
                    Some("ASC") => false,
                    Some("DESC") => true,
                    _ => return Err(Error::invalid(format!("invalid sort direction for {}", key))),
                };
                projection
                    .order_by
                    .push((this.property(field.db_name()), descending));
            }
        }
    }
    if let Some(offset) = options.get("offset").filter(|o| !o.is_null()) {
        projection.skip = Some(Param::named("this_offset", paging_value(offset, "offset")?).expr());
    }
    if let Some(limit) = options.get("limit").filter(|l| !l.is_null()) {
        projection.limit = Some(Param::named("this_limit", paging_value(limit, "limit")?).expr());
    }

    let empty = projection.order_by.is_empty() && projection.skip.is_none() && projection.limit.is_none();
    Ok(if empty { None } else { Some(projection) })
}

fn paging_value(value: &Value, what: &str) -> Result<Value> {
    match value.as_u64() {
        Some(n) => Ok(Value::from(n)),
        None => Err(Error::invalid(format!("options.{} must be a non-negative integer", what))),
    }
}
