/// Variables carried between clauses
///
/// A `Scope` is the explicit `WITH` list of the statement being built. It is
/// never mutated: entering a nested block returns an extended copy, so
/// sibling branches cannot see each other's variables.
use smallvec::SmallVec;

use crate::constants::META_VARIABLE;
use crate::cypher::{Clause, Expr, Imports, Projection, Variable};

#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: SmallVec<[Variable; 4]>,
    meta: Option<Variable>,
}

impl Scope {
    pub fn new(variable: &Variable) -> Self {
        let mut variables = SmallVec::new();
        variables.push(variable.clone());
        Scope {
            variables,
            meta: None,
        }
    }

    /// A copy of this scope that also carries `variable`
    pub fn with(&self, variable: &Variable) -> Self {
        let mut scope = self.clone();
        if !scope.variables.contains(variable) {
            scope.variables.push(variable.clone());
        }
        scope
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }

    /// Imports for a `CALL { }` opened in this scope; meta stays outside
    pub fn imports(&self) -> Imports {
        Imports::Variables(self.variables.to_vec())
    }

    /// `WITH <variables>[, meta]`
    pub fn project(&self) -> Clause {
        let mut projection = Projection::variables(self.variables.iter());
        if let Some(meta) = &self.meta {
            projection = projection.item(meta.expr());
        }
        Clause::With(projection)
    }

    /// `WITH <variables>, <events> AS meta`, starting a meta accumulator
    pub fn start_meta(&self, events: Expr) -> (Clause, Scope) {
        let meta = Variable::named(META_VARIABLE);
        let clause = Clause::With(Projection::variables(self.variables.iter()).aliased(events, &meta));
        let scope = Scope {
            variables: self.variables.clone(),
            meta: Some(meta),
        };
        (clause, scope)
    }

    /// `WITH <variables>, meta + <events> AS meta`
    ///
    /// Without an accumulator in scope this only projects the variables.
    pub fn append_meta(&self, events: Expr) -> Clause {
        match &self.meta {
            Some(meta) => Clause::With(
                Projection::variables(self.variables.iter()).aliased(meta.expr().plus(events), meta),
            ),
            None => self.project(),
        }
    }
}
