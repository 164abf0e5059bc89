/// Variables and parameters of the Cypher AST.
///
/// Both carry a process-unique identity. Physical names are not decided here:
/// the [`Environment`](super::Environment) assigns them during compilation, so
/// the same tree always compiles to the same text.
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::expr::Expr;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[inline(always)]
fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VariableKind {
    /// Compiled verbatim; the caller guarantees uniqueness
    Named(Arc<str>),
    /// Named by the environment as `{prefix}{base}{counter}`
    Fresh(&'static str),
    /// Must be bound to another variable in the environment before compiling
    Placeholder,
}

/// A Cypher variable (node, relationship or value binding)
#[derive(Clone)]
pub struct Variable {
    id: u64,
    pub(crate) kind: VariableKind,
}

impl Variable {
    /// A variable compiled with exactly this name
    pub fn named(name: impl AsRef<str>) -> Self {
        Variable {
            id: next_id(),
            kind: VariableKind::Named(Arc::from(name.as_ref())),
        }
    }

    /// A variable whose name is generated at compile time from `base`
    pub fn fresh(base: &'static str) -> Self {
        Variable {
            id: next_id(),
            kind: VariableKind::Fresh(base),
        }
    }

    /// A symbolic variable that an environment resolves to another variable.
    ///
    /// Used to build a fragment (a projection, say) before the variable it
    /// will be applied to is known.
    pub fn placeholder() -> Self {
        Variable {
            id: next_id(),
            kind: VariableKind::Placeholder,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The literal name for named variables
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            VariableKind::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn expr(&self) -> Expr {
        Expr::Var(self.clone())
    }

    pub fn property(&self, key: impl Into<String>) -> Expr {
        Expr::Var(self.clone()).property(key)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VariableKind::Named(name) => write!(f, "Variable({})", name),
            VariableKind::Fresh(base) => write!(f, "Variable({}#{})", base, self.id),
            VariableKind::Placeholder => write!(f, "Variable(<placeholder>#{})", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParamKind {
    /// Bound under exactly this key
    Named(String),
    /// Bound as `{env prefix}{scope}param{counter}`
    Fresh { scope: String },
    /// A named key whose value is supplied after compilation
    Deferred(String),
}

/// A Cypher parameter together with its value
#[derive(Debug, Clone)]
pub struct Param {
    id: u64,
    pub(crate) kind: ParamKind,
    pub(crate) value: Value,
}

impl Param {
    /// A parameter named by the environment
    pub fn new(value: impl Into<Value>) -> Self {
        Param::scoped("", value)
    }

    /// A parameter named `{scope}param{n}`, with `n` counted per scope
    pub fn scoped(scope: impl Into<String>, value: impl Into<Value>) -> Self {
        Param {
            id: next_id(),
            kind: ParamKind::Fresh {
                scope: scope.into(),
            },
            value: value.into(),
        }
    }

    /// A parameter bound under exactly `name`
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Param {
            id: next_id(),
            kind: ParamKind::Named(name.into()),
            value: value.into(),
        }
    }

    /// A reference to a parameter whose value is merged in after compilation
    pub fn deferred(name: impl Into<String>) -> Self {
        Param {
            id: next_id(),
            kind: ParamKind::Deferred(name.into()),
            value: Value::Null,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn expr(&self) -> Expr {
        Expr::Param(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct() {
        let a = Variable::named("this");
        let b = Variable::named("this");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn named_variables_expose_their_name() {
        assert_eq!(Variable::named("this0").name(), Some("this0"));
        assert_eq!(Variable::fresh("var").name(), None);
    }
}
