//! Selection set -> map projection
//!
//! Scalars are projected as `.field` (or `alias: var.dbName`), relationship
//! fields as pattern comprehensions. Abstract targets match an unlabelled
//! node and pick the concrete projection with a `CASE` on its labels, adding
//! `__resolveType`.

use super::auth::{create_auth_predicate, AuthKind};
use super::where_clause::create_where;
use super::{relationship_pattern, Translation};
use crate::constants::AUTH_FORBIDDEN_ERROR;
use crate::cypher::{Expr, MapProjectionItem, NodePattern, Pattern, Variable};
use crate::error::{Error, Result};
use crate::resolve_tree::ResolveTree;
use crate::schema::{AuthOperation, Entity, Node, RelationField, RelationTarget};

const TYPENAME: &str = "__typename";
const RESOLVE_TYPE: &str = "__resolveType";

/// Map projection of `selection` on `variable`, a node of type `node`.
///
/// `var_name` is the physical name child variables and parameters derive
/// from; it need not be the name `variable` compiles to.
pub fn create_projection(
    node: &Node,
    variable: &Variable,
    var_name: &str,
    selection: &ResolveTree,
    translation: &Translation<'_>,
) -> Result<Expr> {
    let mut items = Vec::new();
    for field in selection.fields_for(&node.name) {
        items.push(project_field(node, variable, var_name, field, translation)?);
    }
    Ok(Expr::MapProjection {
        subject: variable.clone(),
        items,
    })
}

fn project_field(
    node: &Node,
    variable: &Variable,
    var_name: &str,
    field: &ResolveTree,
    translation: &Translation<'_>,
) -> Result<MapProjectionItem> {
    if field.name == TYPENAME {
        return Ok(MapProjectionItem::Entry(
            field.alias.clone(),
            Expr::string(node.name.as_str()),
        ));
    }
    if let Some(primitive) = node.primitive_field(&field.name) {
        return Ok(
            if primitive.db_name() == field.alias && field.alias == field.name {
                MapProjectionItem::Property(field.name.clone())
            } else {
                MapProjectionItem::Entry(
                    field.alias.clone(),
                    variable.property(primitive.db_name()),
                )
            },
        );
    }
    if let Some(relation) = node.relation_field(&field.name) {
        let value = project_relation(variable, var_name, relation, field, translation)?;
        return Ok(MapProjectionItem::Entry(field.alias.clone(), value));
    }
    Err(Error::UnknownField {
        entity: node.name.clone(),
        field: field.name.clone(),
    })
}

fn project_relation(
    variable: &Variable,
    var_name: &str,
    relation: &RelationField,
    field: &ResolveTree,
    translation: &Translation<'_>,
) -> Result<Expr> {
    let related_name = format!("{}_{}", var_name, field.alias);
    let related = Variable::named(&related_name);
    let filter = field.arg("where");

    let list = match &relation.target {
        RelationTarget::Node(name) => {
            let target = translation.schema.require_node(name)?;
            let mut predicates = Vec::new();
            if let Some(filter) = filter {
                predicates.extend(create_where(target, &related, &related_name, filter, translation)?);
            }
            predicates.extend(read_auth(target, &related, &related_name, translation)?);
            Expr::PatternComprehension {
                pattern: Box::new(Pattern::node(NodePattern::new(variable)).related(
                    relationship_pattern(relation, None),
                    translation.node_pattern(Some(&related), target)?,
                )),
                predicate: Expr::and_all(predicates).map(Box::new),
                projection: Box::new(create_projection(
                    target,
                    &related,
                    &related_name,
                    field,
                    translation,
                )?),
            }
        }
        abstract_target => {
            let mut matches = Vec::new();
            let mut branches = Vec::new();
            for member in abstract_target.concrete_types() {
                let target = translation.schema.require_node(member)?;
                let is_member = Expr::HasLabels(related.clone(), target.labels(translation.context)?);
                let mut predicates = vec![is_member.clone()];
                let member_filter = match abstract_target {
                    RelationTarget::Union(_) => filter.and_then(|f| f.get(member)),
                    _ => filter,
                };
                if let Some(member_filter) = member_filter {
                    let scope = format!("{}_{}", related_name, member);
                    predicates.extend(create_where(target, &related, &scope, member_filter, translation)?);
                }
                predicates.extend(read_auth(
                    target,
                    &related,
                    &format!("{}_{}", related_name, member),
                    translation,
                )?);
                matches.extend(Expr::and_all(predicates));

                let projection = match create_projection(target, &related, &related_name, field, translation)? {
                    Expr::MapProjection { subject, mut items } => {
                        items.insert(
                            0,
                            MapProjectionItem::Entry(RESOLVE_TYPE.to_string(), Expr::string(member)),
                        );
                        Expr::MapProjection { subject, items }
                    }
                    other => other,
                };
                branches.push((is_member, projection));
            }
            Expr::PatternComprehension {
                pattern: Box::new(Pattern::node(NodePattern::new(variable)).related(
                    relationship_pattern(relation, None),
                    NodePattern::new(&related),
                )),
                predicate: Expr::or_all(matches).map(Box::new),
                projection: Box::new(Expr::Case {
                    branches,
                    otherwise: None,
                }),
            }
        }
    };

    Ok(if relation.array {
        list
    } else {
        Expr::function("head", vec![list])
    })
}

/// `where` rules as a filter plus `allow` rules as an inline validation
fn read_auth(
    target: &Node,
    related: &Variable,
    related_name: &str,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let operations = [AuthOperation::Read];
    let mut predicates = Vec::new();
    predicates.extend(create_auth_predicate(
        target,
        related,
        related_name,
        &operations,
        AuthKind::Where,
        translation,
    )?);
    if let Some(allow) = create_auth_predicate(
        target,
        related,
        related_name,
        &operations,
        AuthKind::Allow,
        translation,
    )? {
        let validate = Expr::function(
            "apoc.util.validatePredicate",
            vec![
                allow.not(),
                Expr::string(AUTH_FORBIDDEN_ERROR),
                Expr::List(vec![Expr::int(0)]),
            ],
        );
        predicates.push(validate.not());
    }
    Ok(Expr::and_all(predicates))
}
