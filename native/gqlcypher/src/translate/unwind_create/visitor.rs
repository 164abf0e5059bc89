//! Emits the Cypher of an unwind create
//!
//! One pass over the [`CreateAst`]. Every created node reads its values from
//! the current row variable. Nested creates unwind the row's list for their
//! field inside a subquery ending in `RETURN collect(NULL)`, so rows without
//! that field unwind nothing and the outer row survives.
use super::super::auth::{create_auth_validation, AuthKind};
use super::super::relationship_validation::create_relationship_validation;
use super::super::{relationship_pattern, Translation};
use super::ast::{CreateAst, PropertyAst, PropertySource, RelationAst};
use crate::constants::{RESOLVED_CALLBACKS_PARAM, UNWIND_CALLBACKS_KEY};
use crate::cypher::{
    Clause, Expr, Imports, NodePattern, Param, Pattern, Projection, SetItem, Variable,
};
use crate::error::Result;
use crate::schema::AuthOperation;

pub struct CreateVisitor<'t, 'a> {
    translation: &'t Translation<'a>,
}

impl<'t, 'a> CreateVisitor<'t, 'a> {
    pub fn new(translation: &'t Translation<'a>) -> Self {
        CreateVisitor { translation }
    }

    /// `UNWIND $rows AS row CALL { ... RETURN node }`, and the variable of
    /// the root node returned by the subquery
    pub fn visit(&self, ast: &CreateAst<'_>, rows: Param) -> Result<(Clause, Variable)> {
        let row = Variable::fresh("var");
        let node = Variable::fresh("this");

        let mut body = self.create_node(ast, &node, &row)?;
        body.extend(self.complete_node(ast, &node, &row, "this")?);
        body.push(Clause::Return(Projection::variables([&node])));

        let clause = Clause::Sequence(vec![
            Clause::Unwind {
                list: rows.expr(),
                alias: row.clone(),
            },
            Clause::call(Imports::Variables(vec![row]), Clause::Sequence(body)),
        ]);
        Ok((clause, node))
    }

    fn create_node(&self, ast: &CreateAst<'_>, node: &Variable, row: &Variable) -> Result<Vec<Clause>> {
        Ok(vec![
            Clause::Create(Pattern::node(
                self.translation.node_pattern(Some(node), ast.node)?,
            )),
            Clause::Set(set_items(&ast.properties, node, row)),
        ])
    }

    /// Nested creates and post-create validation of a node.
    ///
    /// `name` is the path of the node from the root (`this`, `this_actors`,
    /// ..) and namespaces its auth parameters.
    fn complete_node(
        &self,
        ast: &CreateAst<'_>,
        node: &Variable,
        row: &Variable,
        name: &str,
    ) -> Result<Vec<Clause>> {
        let mut clauses = Vec::new();
        for relation in &ast.relations {
            clauses.push(Clause::with_variables([node, row]));
            clauses.push(Clause::call(
                Imports::Variables(vec![node.clone(), row.clone()]),
                self.nested_create(relation, node, row, name)?,
            ));
        }

        let mut validation = Vec::new();
        validation.extend(create_auth_validation(
            ast.node,
            node,
            name,
            &[AuthOperation::Create],
            AuthKind::Bind,
            self.translation,
        )?);
        validation.extend(create_relationship_validation(ast.node, node, self.translation)?);
        if !validation.is_empty() {
            clauses.push(Clause::with_variables([node, row]));
            clauses.extend(validation);
        }
        Ok(clauses)
    }

    fn nested_create(
        &self,
        relation: &RelationAst<'_>,
        parent: &Variable,
        row: &Variable,
        parent_name: &str,
    ) -> Result<Clause> {
        let item = Variable::fresh("var");
        let node_row = Variable::fresh("var");
        let edge_row = Variable::fresh("var");
        let node = Variable::fresh("this");
        let relationship = Variable::fresh("this");
        let collected = Variable::fresh("var");

        let mut rows = Projection::variables([parent]).aliased(item.property("node"), &node_row);
        if relation.edge.is_some() {
            rows = rows.aliased(item.property("edge"), &edge_row);
        }

        let mut body = vec![
            Clause::Unwind {
                list: row.property(&relation.field.name),
                alias: item,
            },
            Clause::With(rows),
        ];
        body.extend(self.create_node(&relation.create, &node, &node_row)?);
        body.push(Clause::Merge {
            pattern: Pattern::node(NodePattern::new(parent)).related(
                relationship_pattern(relation.field, Some(&relationship)),
                NodePattern::new(&node),
            ),
            on_create: Vec::new(),
            on_match: Vec::new(),
        });
        if relation.edge.is_some() {
            body.push(Clause::Set(set_items(
                &relation.edge_properties,
                &relationship,
                &edge_row,
            )));
        }
        let name = format!("{}_{}", parent_name, relation.field.name);
        body.extend(self.complete_node(&relation.create, &node, &node_row, &name)?);
        body.push(Clause::Return(Projection::default().aliased(
            Expr::function("collect", vec![Expr::null()]),
            &collected,
        )));
        Ok(Clause::Sequence(body))
    }
}

fn set_items(properties: &[PropertyAst<'_>], target: &Variable, row: &Variable) -> Vec<SetItem> {
    properties
        .iter()
        .map(|property| {
            let field = property.field;
            let value = match property.source {
                PropertySource::Row => row.property(&field.name),
                PropertySource::RowOrGenerated => Expr::function(
                    "coalesce",
                    vec![row.property(&field.name), Expr::function("randomUUID", vec![])],
                ),
                PropertySource::Generated => Expr::function("randomUUID", vec![]),
                PropertySource::Timestamp => Expr::function(field.temporal_function(), vec![]),
                PropertySource::Callback => Param::deferred(RESOLVED_CALLBACKS_PARAM)
                    .expr()
                    .index(row.property(UNWIND_CALLBACKS_KEY).property(&field.name)),
            };
            SetItem::property(target.property(field.db_name()), value)
        })
        .collect()
}
