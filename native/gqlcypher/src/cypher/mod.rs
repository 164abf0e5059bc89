//! Cypher builder
//!
//! A small Cypher AST (expressions, patterns and clauses) compiled against an
//! [`Environment`] that assigns collision-free variable and parameter names.
//! Compiling the same tree twice yields the same text and parameters.

mod clause;
mod environment;
mod escape;
mod expr;
mod pattern;
mod variable;

pub use clause::{indent, Clause, Imports, Projection, ProjectionItem, SetItem};
pub use environment::{CypherResult, Environment};
pub use escape::{escape_identifier, escape_string};
pub use expr::{BinaryOp, Expr, ListPredicate, Literal, MapProjectionItem, RawCypher};
pub use pattern::{NodePattern, Pattern, PatternDirection, RelationshipPattern};
pub use variable::{Param, Variable};

/// `CASE WHEN <any null> THEN [] ELSE [1] END`, the list a `FOREACH` guard iterates
pub fn foreach_guard(variables: &[&Variable]) -> Expr {
    let null_checks = variables.iter().map(|v| v.expr().is_null()).collect();
    Expr::case_when(
        Expr::or_all(null_checks).unwrap_or_else(|| Expr::bool(false)),
        Expr::List(vec![]),
        Expr::List(vec![Expr::int(1)]),
    )
}

/// A `FOREACH` that runs `body` only when none of `variables` is null
pub fn guarded(variables: &[&Variable], body: Vec<Clause>) -> Clause {
    Clause::Foreach {
        variable: Variable::named("_"),
        list: foreach_guard(variables),
        body,
    }
}
