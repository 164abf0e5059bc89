/// Compile-time naming authority.
///
/// An `Environment` lives for exactly one compile pass. It maps variable and
/// parameter identities to physical names, collects parameter values, and
/// checks that fresh variables are declared before they are referenced.
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::variable::{Param, ParamKind, Variable, VariableKind};
use crate::error::{Error, Result};

/// Compiled Cypher text and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CypherResult {
    pub cypher: String,
    pub params: Map<String, Value>,
    /// Parameters referenced by `cypher` whose values are supplied after
    /// compilation, such as resolved callbacks
    pub deferred: BTreeSet<String>,
}

impl CypherResult {
    pub fn new(cypher: impl Into<String>, params: Map<String, Value>) -> Self {
        CypherResult {
            cypher: cypher.into(),
            params,
            deferred: BTreeSet::new(),
        }
    }

    pub fn references(&self, param: &str) -> bool {
        self.deferred.contains(param)
    }
}

pub struct Environment {
    prefix: String,
    variables: HashMap<u64, String>,
    aliases: HashMap<u64, Variable>,
    declared: HashSet<u64>,
    used_names: HashSet<String>,
    variable_counter: usize,
    params: HashMap<u64, String>,
    param_counters: HashMap<String, usize>,
    param_values: Map<String, Value>,
    deferred: HashSet<String>,
}

impl Environment {
    /// Creates an environment whose generated names all start with `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Environment {
            prefix: prefix.into(),
            variables: HashMap::new(),
            aliases: HashMap::new(),
            declared: HashSet::new(),
            used_names: HashSet::new(),
            variable_counter: 0,
            params: HashMap::new(),
            param_counters: HashMap::new(),
            param_values: Map::new(),
            deferred: HashSet::new(),
        }
    }

    /// Resolves `placeholder` to `target` for the rest of this compile
    pub fn bind(&mut self, placeholder: &Variable, target: &Variable) {
        self.aliases.insert(placeholder.id(), target.clone());
    }

    fn resolve_alias<'a>(&'a self, variable: &'a Variable) -> Result<&'a Variable> {
        let mut current = variable;
        // Aliases may chain but never loop: bind() is only called with fresh placeholders
        while let Some(target) = self.aliases.get(&current.id()) {
            current = target;
        }
        if current.kind == VariableKind::Placeholder {
            return Err(Error::compile("placeholder variable was never bound"));
        }
        Ok(current)
    }

    fn assign(&mut self, variable: &Variable) -> Result<String> {
        if let Some(name) = self.variables.get(&variable.id()) {
            return Ok(name.clone());
        }

        let name = match &variable.kind {
            VariableKind::Named(name) => {
                let name = name.to_string();
                // Named variables are chosen by the caller; two identities may
                // legitimately share a name (the same binding seen from two
                // scopes), so the name is recorded but not uniquified
                self.used_names.insert(name.clone());
                name
            }
            VariableKind::Fresh(base) => loop {
                let candidate = format!("{}{}{}", self.prefix, base, self.variable_counter);
                self.variable_counter += 1;
                if self.used_names.insert(candidate.clone()) {
                    break candidate;
                }
            },
            VariableKind::Placeholder => {
                return Err(Error::compile("placeholder variable was never bound"));
            }
        };

        self.variables.insert(variable.id(), name.clone());
        Ok(name)
    }

    /// Declares a variable in the current compile and returns its name
    pub fn declare(&mut self, variable: &Variable) -> Result<String> {
        let target = self.resolve_alias(variable)?.clone();
        self.declared.insert(target.id());
        self.assign(&target)
    }

    /// Returns the name of a referenced variable.
    ///
    /// Fresh variables must have been declared by an enclosing clause.
    pub fn reference(&mut self, variable: &Variable) -> Result<String> {
        let target = self.resolve_alias(variable)?.clone();
        if let VariableKind::Fresh(base) = target.kind {
            if !self.declared.contains(&target.id()) {
                return Err(Error::compile(format!(
                    "variable `{}` is referenced before it is declared",
                    base
                )));
            }
        }
        self.assign(&target)
    }

    /// Returns the name of a parameter, recording its value
    pub fn param(&mut self, param: &Param) -> Result<String> {
        if let Some(name) = self.params.get(&param.id()) {
            return Ok(name.clone());
        }

        let name = match &param.kind {
            ParamKind::Named(name) => {
                if let Some(existing) = self.param_values.get(name) {
                    if existing != &param.value {
                        return Err(Error::compile(format!(
                            "parameter `{}` is bound to two different values",
                            name
                        )));
                    }
                }
                self.param_values.insert(name.clone(), param.value.clone());
                name.clone()
            }
            ParamKind::Fresh { scope } => loop {
                let counter = self.param_counters.entry(scope.clone()).or_insert(0);
                let candidate = format!("{}{}param{}", self.prefix, scope, counter);
                *counter += 1;
                if !self.param_values.contains_key(&candidate) {
                    self.param_values
                        .insert(candidate.clone(), param.value.clone());
                    break candidate;
                }
            },
            ParamKind::Deferred(name) => {
                self.deferred.insert(name.clone());
                name.clone()
            }
        };

        self.params.insert(param.id(), name.clone());
        Ok(name)
    }

    /// Names of parameters that were referenced but must be supplied later
    pub fn deferred_params(&self) -> impl Iterator<Item = &str> {
        self.deferred.iter().map(String::as_str)
    }

    /// Consumes the environment, returning the collected parameters
    pub fn into_params(self) -> Map<String, Value> {
        self.param_values
    }

    /// Consumes the environment into the result of compiling `cypher`
    pub fn into_result(self, cypher: impl Into<String>) -> CypherResult {
        let deferred = self.deferred_params().map(str::to_string).collect();
        CypherResult {
            cypher: cypher.into(),
            params: self.param_values,
            deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_variables_use_prefix_and_counter() {
        let mut env = Environment::new("create_");
        let a = Variable::fresh("var");
        let b = Variable::fresh("this");
        assert_eq!(env.declare(&a).unwrap(), "create_var0");
        assert_eq!(env.declare(&b).unwrap(), "create_this1");
        assert_eq!(env.reference(&a).unwrap(), "create_var0");
    }

    #[test]
    fn fresh_variables_skip_named_ones() {
        let mut env = Environment::new("");
        env.declare(&Variable::named("var0")).unwrap();
        assert_eq!(env.declare(&Variable::fresh("var")).unwrap(), "var1");
    }

    #[test]
    fn undeclared_fresh_variable_fails() {
        let mut env = Environment::new("");
        assert!(matches!(
            env.reference(&Variable::fresh("var")),
            Err(Error::Compile(_))
        ));
    }

    #[test]
    fn scoped_params_count_per_scope() {
        let mut env = Environment::new("");
        let a = Param::scoped("thisauth_", "a");
        let b = Param::scoped("thisauth_", "b");
        let c = Param::scoped("this0_", "c");
        assert_eq!(env.param(&a).unwrap(), "thisauth_param0");
        assert_eq!(env.param(&b).unwrap(), "thisauth_param1");
        assert_eq!(env.param(&c).unwrap(), "this0_param0");
        // The same identity always resolves to the same name
        assert_eq!(env.param(&a).unwrap(), "thisauth_param0");
        let params = env.into_params();
        assert_eq!(params["thisauth_param1"], json!("b"));
    }

    #[test]
    fn named_params_must_agree() {
        let mut env = Environment::new("");
        env.param(&Param::named("auth", json!({"roles": []}))).unwrap();
        env.param(&Param::named("auth", json!({"roles": []}))).unwrap();
        assert!(env.param(&Param::named("auth", json!(1))).is_err());
    }

    #[test]
    fn placeholders_resolve_through_bindings() {
        let mut env = Environment::new("");
        let placeholder = Variable::placeholder();
        let target = Variable::named("this0");
        assert!(env.reference(&placeholder).is_err());
        env.bind(&placeholder, &target);
        assert_eq!(env.reference(&placeholder).unwrap(), "this0");
    }

    #[test]
    fn deferred_params_carry_no_value() {
        let mut env = Environment::new("");
        let name = env.param(&Param::deferred("resolvedCallbacks")).unwrap();
        assert_eq!(name, "resolvedCallbacks");
        assert_eq!(env.deferred_params().collect::<Vec<_>>(), vec!["resolvedCallbacks"]);
        let result = env.into_result("RETURN $resolvedCallbacks");
        assert!(result.params.is_empty());
        assert!(result.references("resolvedCallbacks"));
    }
}
