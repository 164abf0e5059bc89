/// Cypher clauses and statement compilation.
use super::environment::{CypherResult, Environment};
use super::expr::{Expr, RawCypher};
use super::pattern::Pattern;
use super::variable::Variable;
use crate::error::Result;

const INDENT: &str = "    ";

/// Indents every non-empty line of `text` by one level
pub fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `target = value`
#[derive(Debug, Clone)]
pub struct SetItem {
    target: Expr,
    value: Expr,
}

impl SetItem {
    pub fn property(target: Expr, value: Expr) -> Self {
        SetItem { target, value }
    }

    fn compile(&self, env: &mut Environment) -> Result<String> {
        Ok(format!(
            "{} = {}",
            self.target.compile(env)?,
            self.value.compile(env)?
        ))
    }
}

fn compile_set_items(keyword: &str, items: &[SetItem], env: &mut Environment) -> Result<String> {
    let compiled = items
        .iter()
        .map(|item| item.compile(env))
        .collect::<Result<Vec<_>>>()?;
    if compiled.len() == 1 {
        Ok(format!("{} {}", keyword, compiled[0]))
    } else {
        Ok(format!(
            "{}\n{}",
            keyword,
            indent(&compiled.join(",\n"))
        ))
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub expr: Expr,
    pub alias: Option<Variable>,
}

/// Items of a `WITH` or `RETURN`
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub distinct: bool,
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub predicate: Option<Expr>,
    pub order_by: Vec<(Expr, bool)>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

impl Projection {
    pub fn star() -> Self {
        Projection {
            star: true,
            ..Default::default()
        }
    }

    /// Projects the given variables under their own names
    pub fn variables<'a, I>(variables: I) -> Self
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        Projection {
            items: variables
                .into_iter()
                .map(|v| ProjectionItem {
                    expr: v.expr(),
                    alias: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn item(mut self, expr: Expr) -> Self {
        self.items.push(ProjectionItem { expr, alias: None });
        self
    }

    pub fn aliased(mut self, expr: Expr, alias: &Variable) -> Self {
        self.items.push(ProjectionItem {
            expr,
            alias: Some(alias.clone()),
        });
        self
    }

    pub fn filter(mut self, predicate: Option<Expr>) -> Self {
        self.predicate = predicate;
        self
    }

    fn compile(&self, keyword: &str, env: &mut Environment) -> Result<String> {
        let mut parts = Vec::with_capacity(self.items.len() + 1);
        if self.star {
            parts.push("*".to_string());
        }
        for item in &self.items {
            let expr = item.expr.compile(env)?;
            match &item.alias {
                Some(alias) => parts.push(format!("{} AS {}", expr, env.declare(alias)?)),
                None => parts.push(expr),
            }
        }
        let mut out = String::from(keyword);
        if self.distinct {
            out.push_str(" DISTINCT");
        }
        out.push(' ');
        out.push_str(&parts.join(", "));
        if let Some(predicate) = &self.predicate {
            out.push_str(&format!("\nWHERE {}", predicate.compile(env)?));
        }
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(expr, descending)| {
                    Ok(format!(
                        "{} {}",
                        expr.compile(env)?,
                        if *descending { "DESC" } else { "ASC" }
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            out.push_str(&format!("\nORDER BY {}", order.join(", ")));
        }
        if let Some(skip) = &self.skip {
            out.push_str(&format!("\nSKIP {}", skip.compile(env)?));
        }
        if let Some(limit) = &self.limit {
            out.push_str(&format!("\nLIMIT {}", limit.compile(env)?));
        }
        Ok(out)
    }
}

/// Variables imported into a `CALL { }` subquery
#[derive(Debug, Clone)]
pub enum Imports {
    None,
    Variables(Vec<Variable>),
}

#[derive(Debug, Clone)]
pub enum Clause {
    Match {
        optional: bool,
        pattern: Pattern,
        predicate: Option<Expr>,
    },
    Create(Pattern),
    Merge {
        pattern: Pattern,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    Set(Vec<SetItem>),
    Delete {
        detach: bool,
        targets: Vec<Expr>,
    },
    With(Projection),
    Unwind {
        list: Expr,
        alias: Variable,
    },
    Call {
        imports: Imports,
        body: Box<Clause>,
    },
    Procedure {
        name: &'static str,
        args: Vec<Expr>,
    },
    Foreach {
        variable: Variable,
        list: Expr,
        body: Vec<Clause>,
    },
    Return(Projection),
    Sequence(Vec<Clause>),
    Raw(RawCypher),
}

impl Clause {
    pub fn empty() -> Self {
        Clause::Sequence(Vec::new())
    }

    pub fn matching(pattern: Pattern, predicate: Option<Expr>) -> Self {
        Clause::Match {
            optional: false,
            pattern,
            predicate,
        }
    }

    pub fn optional_match(pattern: Pattern, predicate: Option<Expr>) -> Self {
        Clause::Match {
            optional: true,
            pattern,
            predicate,
        }
    }

    pub fn with_variables<'a, I>(variables: I) -> Self
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        Clause::With(Projection::variables(variables))
    }

    pub fn call(imports: Imports, body: Clause) -> Self {
        Clause::Call {
            imports,
            body: Box::new(body),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Sequence(clauses) => clauses.iter().all(Clause::is_empty),
            Clause::Set(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Compiles the clause tree with a fresh environment
    pub fn build(&self, prefix: &str) -> Result<CypherResult> {
        let mut env = Environment::new(prefix);
        let cypher = self.compile(&mut env)?;
        Ok(env.into_result(cypher))
    }

    pub fn compile(&self, env: &mut Environment) -> Result<String> {
        match self {
            Clause::Match {
                optional,
                pattern,
                predicate,
            } => {
                let mut out = format!(
                    "{}MATCH {}",
                    if *optional { "OPTIONAL " } else { "" },
                    pattern.compile(env)?
                );
                if let Some(predicate) = predicate {
                    out.push_str(&format!("\nWHERE {}", predicate.compile(env)?));
                }
                Ok(out)
            }
            Clause::Create(pattern) => Ok(format!("CREATE {}", pattern.compile(env)?)),
            Clause::Merge {
                pattern,
                on_create,
                on_match,
            } => {
                let mut out = format!("MERGE {}", pattern.compile(env)?);
                if !on_create.is_empty() {
                    out.push('\n');
                    out.push_str(&compile_set_items("ON CREATE SET", on_create, env)?);
                }
                if !on_match.is_empty() {
                    out.push('\n');
                    out.push_str(&compile_set_items("ON MATCH SET", on_match, env)?);
                }
                Ok(out)
            }
            Clause::Set(items) => {
                if items.is_empty() {
                    return Ok(String::new());
                }
                compile_set_items("SET", items, env)
            }
            Clause::Delete { detach, targets } => {
                let targets = targets
                    .iter()
                    .map(|t| t.compile(env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "{}DELETE {}",
                    if *detach { "DETACH " } else { "" },
                    targets.join(", ")
                ))
            }
            Clause::With(projection) => projection.compile("WITH", env),
            Clause::Unwind { list, alias } => {
                let list = list.compile(env)?;
                Ok(format!("UNWIND {} AS {}", list, env.declare(alias)?))
            }
            Clause::Call { imports, body } => {
                let import = match imports {
                    Imports::None => None,
                    Imports::Variables(vars) if vars.is_empty() => None,
                    Imports::Variables(vars) => {
                        let names = vars
                            .iter()
                            .map(|v| env.reference(v))
                            .collect::<Result<Vec<_>>>()?;
                        Some(format!("WITH {}", names.join(", ")))
                    }
                };
                let body = body.compile(env)?;
                let inner = match import {
                    Some(import) if body.is_empty() => import,
                    Some(import) => format!("{}\n{}", import, body),
                    None => body,
                };
                Ok(format!("CALL {{\n{}\n}}", indent(&inner)))
            }
            Clause::Procedure { name, args } => {
                let args = args
                    .iter()
                    .map(|a| a.compile(env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("CALL {}({})", name, args.join(", ")))
            }
            Clause::Foreach {
                variable,
                list,
                body,
            } => {
                let list = list.compile(env)?;
                let var = env.declare(variable)?;
                let body = Clause::Sequence(body.clone()).compile(env)?;
                Ok(format!(
                    "FOREACH ({} IN {} |\n{}\n)",
                    var,
                    list,
                    indent(&body)
                ))
            }
            Clause::Return(projection) => projection.compile("RETURN", env),
            Clause::Sequence(clauses) => {
                let mut parts = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let compiled = clause.compile(env)?;
                    if !compiled.is_empty() {
                        parts.push(compiled);
                    }
                }
                Ok(parts.join("\n"))
            }
            Clause::Raw(raw) => raw.compile(env),
        }
    }
}

impl From<Vec<Clause>> for Clause {
    fn from(clauses: Vec<Clause>) -> Self {
        Clause::Sequence(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{NodePattern, Param};
    use serde_json::json;

    #[test]
    fn call_subquery_indents_its_body() {
        let this = Variable::named("this0");
        let clause = Clause::Sequence(vec![
            Clause::Create(Pattern::node(NodePattern::new(&this).labels(["Movie"]))),
            Clause::call(
                Imports::Variables(vec![this.clone()]),
                Clause::Return(Projection::default().item(Expr::CountAll)),
            ),
        ]);
        let result = clause.build("").unwrap();
        assert_eq!(
            result.cypher,
            "CREATE (this0:Movie)\nCALL {\n    WITH this0\n    RETURN count(*)\n}"
        );
    }

    #[test]
    fn set_with_several_items_is_multiline() {
        let this = Variable::named("this0");
        let clause = Clause::Set(vec![
            SetItem::property(this.property("title"), Param::named("this0_title", json!("A")).expr()),
            SetItem::property(this.property("id"), Expr::function("randomUUID", vec![])),
        ]);
        let result = clause.build("").unwrap();
        assert_eq!(
            result.cypher,
            "SET\n    this0.title = $this0_title,\n    this0.id = randomUUID()"
        );
        assert_eq!(result.params["this0_title"], json!("A"));
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let make = || {
            let node = Variable::fresh("this");
            let row = Variable::fresh("var");
            Clause::Sequence(vec![
                Clause::Unwind {
                    list: Param::new(json!([{"title": "a"}])).expr(),
                    alias: row.clone(),
                },
                Clause::Create(Pattern::node(NodePattern::new(&node).labels(["Movie"]))),
                Clause::Set(vec![SetItem::property(
                    node.property("title"),
                    row.property("title"),
                )]),
            ])
        };
        let first = make().build("create_").unwrap();
        let second = make().build("create_").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.cypher,
            "UNWIND $create_param0 AS create_var0\nCREATE (create_this1:Movie)\nSET create_this1.title = create_var0.title"
        );
    }
}
