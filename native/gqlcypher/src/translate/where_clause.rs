//! `where` input -> Cypher predicate
//!
//! Scalar filters are `field` or `field_<OPERATOR>`; relationship filters are
//! `field`, `field_SOME`, `field_NONE`, `field_ALL` and `field_SINGLE`.
//! Every compared value becomes a parameter named `{scope}_param{n}`.
use serde_json::{Map, Value};

use super::{relationship_pattern, Translation};
use crate::cypher::{BinaryOp, Expr, ListPredicate, NodePattern, Param, Pattern, Variable};
use crate::error::{Error, Result};
use crate::schema::{Entity, Node, RelationField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarOperator {
    Eq,
    Not,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    Includes,
    NotIncludes,
}

// Longer suffixes first so `_NOT_IN` is not read as `_IN`
const SCALAR_SUFFIXES: &[(&str, ScalarOperator)] = &[
    ("_NOT_STARTS_WITH", ScalarOperator::NotStartsWith),
    ("_NOT_ENDS_WITH", ScalarOperator::NotEndsWith),
    ("_NOT_CONTAINS", ScalarOperator::NotContains),
    ("_NOT_INCLUDES", ScalarOperator::NotIncludes),
    ("_NOT_IN", ScalarOperator::NotIn),
    ("_STARTS_WITH", ScalarOperator::StartsWith),
    ("_ENDS_WITH", ScalarOperator::EndsWith),
    ("_CONTAINS", ScalarOperator::Contains),
    ("_INCLUDES", ScalarOperator::Includes),
    ("_MATCHES", ScalarOperator::Matches),
    ("_NOT", ScalarOperator::Not),
    ("_LTE", ScalarOperator::Lte),
    ("_GTE", ScalarOperator::Gte),
    ("_LT", ScalarOperator::Lt),
    ("_GT", ScalarOperator::Gt),
    ("_IN", ScalarOperator::In),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationshipQuantifier {
    Some,
    None,
    All,
    Single,
}

const RELATIONSHIP_SUFFIXES: &[(&str, RelationshipQuantifier)] = &[
    ("_SOME", RelationshipQuantifier::Some),
    ("_NONE", RelationshipQuantifier::None),
    ("_ALL", RelationshipQuantifier::All),
    ("_SINGLE", RelationshipQuantifier::Single),
];

/// Compiles a `where` input against `variable`; `None` when it filters nothing
pub fn create_where(
    entity: &dyn Entity,
    variable: &Variable,
    scope: &str,
    filter: &Value,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let filter = match filter {
        Value::Null => return Ok(None),
        Value::Object(filter) => filter,
        _ => return Err(Error::invalid("where must be an input object")),
    };
    let param_scope = format!("{}_", scope);
    let mut predicates = Vec::with_capacity(filter.len());
    for (key, value) in filter {
        if let Some(predicate) =
            filter_entry(entity, variable, scope, &param_scope, key, value, translation)?
        {
            predicates.push(predicate);
        }
    }
    Ok(Expr::and_all(predicates))
}

fn filter_entry(
    entity: &dyn Entity,
    variable: &Variable,
    scope: &str,
    param_scope: &str,
    key: &str,
    value: &Value,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    match key {
        "AND" | "OR" => {
            let items = value
                .as_array()
                .ok_or_else(|| Error::invalid(format!("{} must be a list", key)))?;
            let mut predicates = Vec::with_capacity(items.len());
            for item in items {
                if let Some(predicate) = create_where(entity, variable, scope, item, translation)? {
                    predicates.push(predicate);
                }
            }
            return Ok(if key == "AND" {
                Expr::and_all(predicates)
            } else {
                Expr::or_all(predicates)
            });
        }
        "NOT" => {
            return Ok(create_where(entity, variable, scope, value, translation)?.map(Expr::not));
        }
        _ => {}
    }

    if let Some(field) = entity.primitive_field(key) {
        return Ok(Some(scalar_predicate(
            variable.property(field.db_name()),
            ScalarOperator::Eq,
            value,
            param_scope,
        )));
    }
    if let Some(field) = entity.relation_field(key) {
        return relationship_predicate(
            field,
            RelationshipQuantifier::Some,
            variable,
            scope,
            value,
            translation,
        )
        .map(Some);
    }
    for (suffix, operator) in SCALAR_SUFFIXES {
        if let Some(field) = key
            .strip_suffix(suffix)
            .and_then(|name| entity.primitive_field(name))
        {
            return Ok(Some(scalar_predicate(
                variable.property(field.db_name()),
                *operator,
                value,
                param_scope,
            )));
        }
    }
    for (suffix, quantifier) in RELATIONSHIP_SUFFIXES {
        if let Some(field) = key
            .strip_suffix(suffix)
            .and_then(|name| entity.relation_field(name))
        {
            return relationship_predicate(field, *quantifier, variable, scope, value, translation)
                .map(Some);
        }
    }
    Err(Error::UnknownField {
        entity: entity.name().to_string(),
        field: key.to_string(),
    })
}

fn scalar_predicate(
    property: Expr,
    operator: ScalarOperator,
    value: &Value,
    param_scope: &str,
) -> Expr {
    if value.is_null() {
        return match operator {
            ScalarOperator::Not => property.is_not_null(),
            _ => property.is_null(),
        };
    }
    let param = Param::scoped(param_scope, value.clone()).expr();
    match operator {
        ScalarOperator::Eq => property.eq(param),
        ScalarOperator::Not => property.eq(param).not(),
        ScalarOperator::In => property.binary(BinaryOp::In, param),
        ScalarOperator::NotIn => property.binary(BinaryOp::In, param).not(),
        ScalarOperator::Lt => property.binary(BinaryOp::Lt, param),
        ScalarOperator::Lte => property.binary(BinaryOp::Lte, param),
        ScalarOperator::Gt => property.binary(BinaryOp::Gt, param),
        ScalarOperator::Gte => property.binary(BinaryOp::Gte, param),
        ScalarOperator::Contains => property.binary(BinaryOp::Contains, param),
        ScalarOperator::NotContains => property.binary(BinaryOp::Contains, param).not(),
        ScalarOperator::StartsWith => property.binary(BinaryOp::StartsWith, param),
        ScalarOperator::NotStartsWith => property.binary(BinaryOp::StartsWith, param).not(),
        ScalarOperator::EndsWith => property.binary(BinaryOp::EndsWith, param),
        ScalarOperator::NotEndsWith => property.binary(BinaryOp::EndsWith, param).not(),
        ScalarOperator::Matches => property.binary(BinaryOp::Matches, param),
        ScalarOperator::Includes => param.binary(BinaryOp::In, property),
        ScalarOperator::NotIncludes => param.binary(BinaryOp::In, property).not(),
    }
}

fn relationship_predicate(
    field: &RelationField,
    quantifier: RelationshipQuantifier,
    variable: &Variable,
    scope: &str,
    value: &Value,
    translation: &Translation<'_>,
) -> Result<Expr> {
    let target = translation.target_node(field)?;
    let related = Variable::fresh("var");
    let pattern = Pattern::node(NodePattern::new(variable)).related(
        relationship_pattern(field, None),
        translation.node_pattern(Some(&related), target)?,
    );

    if value.is_null() {
        return Ok(Expr::Exists {
            pattern: Box::new(pattern),
            predicate: None,
        }
        .not());
    }

    let inner_scope = format!("{}_{}", scope, field.name);
    let inner = create_where(target, &related, &inner_scope, value, translation)?;
    Ok(quantified(quantifier, pattern, inner))
}

/// Quantifies `inner` over the nodes `pattern` reaches
fn quantified(quantifier: RelationshipQuantifier, pattern: Pattern, inner: Option<Expr>) -> Expr {
    match quantifier {
        RelationshipQuantifier::Some => Expr::Exists {
            pattern: Box::new(pattern),
            predicate: inner.map(Box::new),
        },
        RelationshipQuantifier::None => Expr::Exists {
            pattern: Box::new(pattern),
            predicate: inner.map(Box::new),
        }
        .not(),
        RelationshipQuantifier::All => match inner {
            Some(inner) => Expr::Exists {
                pattern: Box::new(pattern),
                predicate: Some(Box::new(inner.not())),
            }
            .not(),
            None => Expr::bool(true),
        },
        RelationshipQuantifier::Single => Expr::ListPredicate {
            kind: ListPredicate::Single,
            variable: Variable::fresh("var"),
            list: Box::new(Expr::PatternComprehension {
                pattern: Box::new(pattern),
                predicate: inner.map(Box::new),
                projection: Box::new(Expr::int(1)),
            }),
            predicate: Box::new(Expr::bool(true)),
        },
    }
}

/// Compiles a connection `where` (`node`, `edge`, `AND`, `OR`, `NOT`)
pub fn create_connection_where(
    node: &Node,
    node_variable: &Variable,
    edge: Option<&dyn Entity>,
    edge_variable: &Variable,
    scope: &str,
    filter: &Map<String, Value>,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let mut predicates = Vec::new();
    for (key, value) in filter {
        let predicate = match key.as_str() {
            "node" => create_where(node, node_variable, &format!("{}_node", scope), value, translation)?,
            "edge" => {
                let edge = edge.ok_or_else(|| {
                    Error::invalid(format!("relationship to {} has no properties", node.name))
                })?;
                create_where(edge, edge_variable, &format!("{}_edge", scope), value, translation)?
            }
            "AND" | "OR" | "NOT" => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let mut nested = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item = super::input_object(item, key)?;
                    let nested_scope = format!("{}_{}{}", scope, key.to_lowercase(), index);
                    if let Some(predicate) = create_connection_where(
                        node,
                        node_variable,
                        edge,
                        edge_variable,
                        &nested_scope,
                        item,
                        translation,
                    )? {
                        nested.push(predicate);
                    }
                }
                match key.as_str() {
                    "AND" => Expr::and_all(nested),
                    "OR" => Expr::or_all(nested),
                    _ => Expr::and_all(nested).map(Expr::not),
                }
            }
            other => {
                return Err(Error::UnknownField {
                    entity: format!("{}ConnectionWhere", node.name),
                    field: other.to_string(),
                })
            }
        };
        if let Some(predicate) = predicate {
            predicates.push(predicate);
        }
    }
    Ok(Expr::and_all(predicates))
}
