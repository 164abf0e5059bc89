/// Cypher expressions.
use std::fmt;
use std::sync::Arc;

use super::environment::Environment;
use super::escape::{escape_identifier, escape_string};
use super::pattern::Pattern;
use super::variable::{Param, Variable};
use crate::error::Result;

type RawFn = dyn Fn(&mut Environment) -> Result<String> + Send + Sync;

/// Escape hatch producing Cypher text from the environment.
///
/// The closure must only emit text derived from the schema or from names
/// obtained through the environment; values go through parameters.
#[derive(Clone)]
pub struct RawCypher(Arc<RawFn>);

impl RawCypher {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Environment) -> Result<String> + Send + Sync + 'static,
    {
        RawCypher(Arc::new(f))
    }

    pub fn compile(&self, env: &mut Environment) -> Result<String> {
        (self.0)(env)
    }
}

impl fmt::Debug for RawCypher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawCypher(..)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Plus,
}

impl BinaryOp {
    fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::In => "IN",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::StartsWith => "STARTS WITH",
            BinaryOp::EndsWith => "ENDS WITH",
            BinaryOp::Matches => "=~",
            BinaryOp::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPredicate {
    Any,
    All,
    Single,
    None,
}

#[derive(Debug, Clone)]
pub enum MapProjectionItem {
    /// `.key`
    Property(String),
    /// `.*`
    AllProperties,
    /// `key: expr`
    Entry(String, Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Var(Variable),
    Param(Param),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Literal(Literal),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Function(&'static str, Vec<Expr>),
    CountAll,
    /// `DISTINCT expr`, as the argument of an aggregation
    Distinct(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    HasLabels(Variable, Vec<String>),
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Exists {
        pattern: Box<Pattern>,
        predicate: Option<Box<Expr>>,
    },
    PatternComprehension {
        pattern: Box<Pattern>,
        predicate: Option<Box<Expr>>,
        projection: Box<Expr>,
    },
    ListPredicate {
        kind: ListPredicate,
        variable: Variable,
        list: Box<Expr>,
        predicate: Box<Expr>,
    },
    Reduce {
        accumulator: Variable,
        init: Box<Expr>,
        variable: Variable,
        list: Box<Expr>,
        body: Box<Expr>,
    },
    MapProjection {
        subject: Variable,
        items: Vec<MapProjectionItem>,
    },
    Raw(RawCypher),
}

impl Expr {
    pub fn null() -> Expr {
        Expr::Literal(Literal::Null)
    }

    pub fn bool(value: bool) -> Expr {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(Literal::Int(value))
    }

    /// A string literal. Only for schema-derived text, never for user input.
    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn function(name: &'static str, args: Vec<Expr>) -> Expr {
        Expr::Function(name, args)
    }

    pub fn property(self, key: impl Into<String>) -> Expr {
        Expr::Property(Box::new(self), key.into())
    }

    pub fn index(self, key: Expr) -> Expr {
        Expr::Index(Box::new(self), Box::new(key))
    }

    pub fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(self), op, Box::new(rhs))
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn plus(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Plus, rhs)
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Conjunction of the given predicates, `None` when there are none
    pub fn and_all(mut predicates: Vec<Expr>) -> Option<Expr> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Expr::And(predicates)),
        }
    }

    /// Disjunction of the given predicates, `None` when there are none
    pub fn or_all(mut predicates: Vec<Expr>) -> Option<Expr> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Expr::Or(predicates)),
        }
    }

    /// `CASE WHEN cond THEN then ELSE otherwise END`
    pub fn case_when(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Case {
            branches: vec![(cond, then)],
            otherwise: Some(Box::new(otherwise)),
        }
    }

    fn needs_parens(&self) -> bool {
        matches!(
            self,
            Expr::Binary(..) | Expr::IsNull(_) | Expr::IsNotNull(_) | Expr::Not(_)
        )
    }

    fn compile_operand(&self, env: &mut Environment) -> Result<String> {
        let compiled = self.compile(env)?;
        if self.needs_parens() {
            Ok(format!("({})", compiled))
        } else {
            Ok(compiled)
        }
    }

    pub fn compile(&self, env: &mut Environment) -> Result<String> {
        match self {
            Expr::Var(variable) => env.reference(variable),
            Expr::Param(param) => Ok(format!("${}", env.param(param)?)),
            Expr::Property(subject, key) => Ok(format!(
                "{}.{}",
                subject.compile_operand(env)?,
                escape_identifier(key)
            )),
            Expr::Index(subject, key) => Ok(format!(
                "{}[{}]",
                subject.compile_operand(env)?,
                key.compile(env)?
            )),
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => "NULL".to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::String(s) => escape_string(s),
            }),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| item.compile(env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("[{}]", items.join(", ")))
            }
            Expr::Map(entries) => compile_map(entries, env),
            Expr::Function(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.compile(env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", name, args.join(", ")))
            }
            Expr::CountAll => Ok("count(*)".to_string()),
            Expr::Distinct(inner) => Ok(format!("DISTINCT {}", inner.compile(env)?)),
            Expr::Binary(lhs, op, rhs) => Ok(format!(
                "{} {} {}",
                lhs.compile_operand(env)?,
                op.as_str(),
                rhs.compile_operand(env)?
            )),
            Expr::And(items) => compile_junction(items, "AND", env),
            Expr::Or(items) => compile_junction(items, "OR", env),
            Expr::Not(inner) => Ok(format!("NOT ({})", inner.compile(env)?)),
            Expr::IsNull(inner) => Ok(format!("{} IS NULL", inner.compile_operand(env)?)),
            Expr::IsNotNull(inner) => Ok(format!("{} IS NOT NULL", inner.compile_operand(env)?)),
            Expr::HasLabels(variable, labels) => {
                let mut out = env.reference(variable)?;
                for label in labels {
                    out.push(':');
                    out.push_str(&escape_identifier(label));
                }
                Ok(out)
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                let mut out = String::from("CASE");
                for (cond, then) in branches {
                    out.push_str(&format!(
                        " WHEN {} THEN {}",
                        cond.compile(env)?,
                        then.compile(env)?
                    ));
                }
                if let Some(otherwise) = otherwise {
                    out.push_str(&format!(" ELSE {}", otherwise.compile(env)?));
                }
                out.push_str(" END");
                Ok(out)
            }
            Expr::Exists { pattern, predicate } => {
                let mut out = format!("EXISTS {{ MATCH {}", pattern.compile(env)?);
                if let Some(predicate) = predicate {
                    out.push_str(&format!(" WHERE {}", predicate.compile(env)?));
                }
                out.push_str(" }");
                Ok(out)
            }
            Expr::PatternComprehension {
                pattern,
                predicate,
                projection,
            } => {
                let mut out = format!("[{}", pattern.compile(env)?);
                if let Some(predicate) = predicate {
                    out.push_str(&format!(" WHERE {}", predicate.compile(env)?));
                }
                out.push_str(&format!(" | {}]", projection.compile(env)?));
                Ok(out)
            }
            Expr::ListPredicate {
                kind,
                variable,
                list,
                predicate,
            } => {
                let name = match kind {
                    ListPredicate::Any => "any",
                    ListPredicate::All => "all",
                    ListPredicate::Single => "single",
                    ListPredicate::None => "none",
                };
                let var = env.declare(variable)?;
                Ok(format!(
                    "{}({} IN {} WHERE {})",
                    name,
                    var,
                    list.compile(env)?,
                    predicate.compile(env)?
                ))
            }
            Expr::Reduce {
                accumulator,
                init,
                variable,
                list,
                body,
            } => {
                let acc = env.declare(accumulator)?;
                let init = init.compile(env)?;
                let var = env.declare(variable)?;
                Ok(format!(
                    "reduce({} = {}, {} IN {} | {})",
                    acc,
                    init,
                    var,
                    list.compile(env)?,
                    body.compile(env)?
                ))
            }
            Expr::MapProjection { subject, items } => {
                let subject = env.reference(subject)?;
                let items = items
                    .iter()
                    .map(|item| match item {
                        MapProjectionItem::Property(key) => {
                            Ok(format!(".{}", escape_identifier(key)))
                        }
                        MapProjectionItem::AllProperties => Ok(".*".to_string()),
                        MapProjectionItem::Entry(key, value) => Ok(format!(
                            "{}: {}",
                            escape_identifier(key),
                            value.compile(env)?
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                if items.is_empty() {
                    Ok(format!("{} {{ }}", subject))
                } else {
                    Ok(format!("{} {{ {} }}", subject, items.join(", ")))
                }
            }
            Expr::Raw(raw) => raw.compile(env),
        }
    }
}

pub(crate) fn compile_map(entries: &[(String, Expr)], env: &mut Environment) -> Result<String> {
    if entries.is_empty() {
        return Ok("{ }".to_string());
    }
    let entries = entries
        .iter()
        .map(|(key, value)| Ok(format!("{}: {}", escape_identifier(key), value.compile(env)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{{ {} }}", entries.join(", ")))
}

fn compile_junction(items: &[Expr], op: &str, env: &mut Environment) -> Result<String> {
    match items {
        [] => Ok(if op == "AND" { "true" } else { "false" }.to_string()),
        [single] => single.compile(env),
        _ => {
            let parts = items
                .iter()
                .map(|item| item.compile(env))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(&format!(" {} ", op))))
        }
    }
}

impl From<&Variable> for Expr {
    fn from(variable: &Variable) -> Self {
        Expr::Var(variable.clone())
    }
}

impl From<Param> for Expr {
    fn from(param: Param) -> Self {
        Expr::Param(param)
    }
}
