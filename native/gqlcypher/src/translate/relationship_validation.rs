//! Cardinality checks for singular relationship fields
//!
//! Cardinality can only be known after a write, so each singular field gets
//! a subquery counting its relationships and failing through
//! `apoc.util.validate` with a `RELATIONSHIP-REQUIRED` message.
use super::{relationship_pattern, Translation};
use crate::constants::RELATIONSHIP_REQUIREMENT_PREFIX;
use crate::cypher::{
    BinaryOp, Clause, Expr, Imports, NodePattern, Pattern, Projection, Variable,
};
use crate::error::Result;
use crate::schema::{Node, RelationTarget};

/// One `CALL { }` per singular relation field of `node`
pub fn create_relationship_validation(
    node: &Node,
    variable: &Variable,
    translation: &Translation<'_>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for field in node.relation_fields.iter().filter(|f| !f.array) {
        let relationship = Variable::fresh("var");
        let count = Variable::fresh("var");
        let ignored = Variable::fresh("var");

        let target = match &field.target {
            RelationTarget::Node(name) => {
                translation.node_pattern(None, translation.schema.require_node(name)?)?
            }
            _ => NodePattern::anonymous(),
        };
        let pattern = Pattern::node(NodePattern::new(variable))
            .related(relationship_pattern(field, Some(&relationship)), target);

        let (check, message) = if field.required {
            (
                count.expr().eq(Expr::int(1)),
                format!(
                    "{}: {}.{} required exactly once",
                    RELATIONSHIP_REQUIREMENT_PREFIX, node.name, field.name
                ),
            )
        } else {
            (
                count.expr().binary(BinaryOp::Lte, Expr::int(1)),
                format!(
                    "{}: {}.{} must be less than or equal to one",
                    RELATIONSHIP_REQUIREMENT_PREFIX, node.name, field.name
                ),
            )
        };

        let body = Clause::Sequence(vec![
            Clause::optional_match(pattern, None),
            Clause::With(
                Projection::variables([variable])
                    .aliased(Expr::function("count", vec![relationship.expr()]), &count),
            ),
            Clause::Procedure {
                name: "apoc.util.validate",
                args: vec![
                    Expr::And(vec![variable.expr().is_not_null(), check.not()]),
                    Expr::string(message),
                    Expr::List(vec![Expr::int(0)]),
                ],
            },
            Clause::Return(Projection::default().aliased(count.expr(), &ignored)),
        ]);
        clauses.push(Clause::call(Imports::Variables(vec![variable.clone()]), body));
    }
    Ok(clauses)
}
