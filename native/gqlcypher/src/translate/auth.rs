//! Auth predicate compiler
//!
//! Rules participating in the current operations are compiled one by one and
//! combined with `OR`. Inside a rule every present key is `AND`ed, in the
//! order roles, isAuthenticated, the property map of the requested kind,
//! `AND`, `OR`. Claim and context references are resolved while compiling;
//! an undefined reference fails the whole translation with
//! [`Error::Unauthenticated`] unless its rule sets `allowUnauthenticated`, in
//! which case that comparison is `false`.

use serde_json::Value;

use super::{relationship_pattern, Translation};
use crate::constants::{AUTH_FORBIDDEN_ERROR, AUTH_PARAM};
use crate::cypher::{
    BinaryOp, Clause, CypherResult, Environment, Expr, ListPredicate, NodePattern, Param, Pattern,
    Variable,
};
use crate::error::{Error, Result};
use crate::schema::{AuthOperation, AuthRule, Entity, Node};

/// Which property map of a rule is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// Checked with a validation call before the operation
    Allow,
    /// Added to the match predicate
    Where,
    /// Checked with a validation call after the operation
    Bind,
}

struct RuleCompiler<'t, 'a> {
    kind: AuthKind,
    param_scope: String,
    translation: &'t Translation<'a>,
}

/// Compiles the rules of `node` for `operations` against `variable`.
///
/// `var_name` namespaces the generated parameters as `{var_name}auth_param{n}`.
/// Returns `None` when no participating rule yields a predicate.
pub fn create_auth_predicate(
    node: &Node,
    variable: &Variable,
    var_name: &str,
    operations: &[AuthOperation],
    kind: AuthKind,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let auth = match &node.auth {
        Some(auth) => auth,
        None => return Ok(None),
    };
    let compiler = RuleCompiler {
        kind,
        param_scope: format!("{}auth_", var_name),
        translation,
    };
    let mut predicates = Vec::new();
    for rule in auth.rules_for(operations) {
        if let Some(predicate) = compiler.rule(node, variable, rule, false)? {
            predicates.push(predicate);
        }
    }
    Ok(Expr::or_all(predicates))
}

/// Standalone compile of an auth predicate into text and parameters
pub fn create_auth_and_params(
    node: &Node,
    var_name: &str,
    operations: &[AuthOperation],
    kind: AuthKind,
    translation: &Translation<'_>,
) -> Result<Option<CypherResult>> {
    let variable = Variable::named(var_name);
    let predicate =
        match create_auth_predicate(node, &variable, var_name, operations, kind, translation)? {
            Some(predicate) => predicate,
            None => return Ok(None),
        };
    let mut env = Environment::new("");
    let cypher = predicate.compile(&mut env)?;
    Ok(Some(env.into_result(cypher)))
}

/// `CALL apoc.util.validate(NOT (predicate), 'FORBIDDEN', [0])`
pub fn validation_clause(predicate: Expr) -> Clause {
    Clause::Procedure {
        name: "apoc.util.validate",
        args: vec![
            predicate.not(),
            Expr::string(AUTH_FORBIDDEN_ERROR),
            Expr::List(vec![Expr::int(0)]),
        ],
    }
}

/// Validation call for the `allow` or `bind` rules of `node`, if any apply
pub fn create_auth_validation(
    node: &Node,
    variable: &Variable,
    var_name: &str,
    operations: &[AuthOperation],
    kind: AuthKind,
    translation: &Translation<'_>,
) -> Result<Option<Clause>> {
    Ok(
        create_auth_predicate(node, variable, var_name, operations, kind, translation)?
            .map(validation_clause),
    )
}

/// The `$auth` parameter
pub fn auth_param(translation: &Translation<'_>) -> Param {
    Param::named(AUTH_PARAM, translation.context.auth_param_value())
}

/// Predicates collected from a rule and its `AND` sub-rules
#[derive(Default)]
struct RulePredicates {
    /// Role and authentication checks
    checks: Vec<Expr>,
    /// Property conditions and `OR` groups
    conditions: Vec<Expr>,
}

impl RuleCompiler<'_, '_> {
    /// A rule's predicate: every role and authentication check of the rule
    /// and its `AND` sub-rules, then their property conditions, in rule order
    fn rule(
        &self,
        node: &Node,
        variable: &Variable,
        rule: &AuthRule,
        inherited_unauthenticated: bool,
    ) -> Result<Option<Expr>> {
        let mut predicates = RulePredicates::default();
        self.collect(node, variable, rule, inherited_unauthenticated, &mut predicates)?;
        let RulePredicates {
            mut checks,
            conditions,
        } = predicates;
        checks.extend(conditions);
        Ok(Expr::and_all(checks))
    }

    fn collect(
        &self,
        node: &Node,
        variable: &Variable,
        rule: &AuthRule,
        inherited_unauthenticated: bool,
        out: &mut RulePredicates,
    ) -> Result<()> {
        let allow_unauthenticated = inherited_unauthenticated || rule.allow_unauthenticated;

        if self.kind == AuthKind::Allow {
            if let Some(roles) = &rule.roles {
                out.checks.push(self.roles(roles));
            }
            if let Some(is_authenticated) = rule.is_authenticated {
                out.checks.push(
                    auth_param(self.translation)
                        .expr()
                        .property("isAuthenticated")
                        .eq(Expr::bool(is_authenticated)),
                );
            }
        }

        let map = match self.kind {
            AuthKind::Allow => rule.allow.as_ref(),
            AuthKind::Where => rule.where_.as_ref(),
            AuthKind::Bind => rule.bind.as_ref(),
        };
        if let Some(map) = map {
            if let Some(predicate) = self.property_map(node, variable, map, allow_unauthenticated)? {
                out.conditions.push(predicate);
            }
        }

        // `AND` sub-rules merge into this rule's groups
        for sub in rule.and.iter().flatten() {
            self.collect(node, variable, sub, allow_unauthenticated, out)?;
        }
        if let Some(rules) = &rule.or {
            let mut nested = Vec::with_capacity(rules.len());
            for sub in rules {
                if let Some(predicate) = self.rule(node, variable, sub, allow_unauthenticated)? {
                    nested.push(predicate);
                }
            }
            out.conditions.extend(Expr::or_all(nested));
        }
        Ok(())
    }

    /// `any(var IN ['role'] WHERE var IN $auth.roles)`
    fn roles(&self, roles: &[String]) -> Expr {
        let role = Variable::fresh("var");
        Expr::ListPredicate {
            kind: ListPredicate::Any,
            variable: role.clone(),
            list: Box::new(Expr::List(roles.iter().map(|r| Expr::string(r.as_str())).collect())),
            predicate: Box::new(role.expr().binary(
                BinaryOp::In,
                auth_param(self.translation).expr().property("roles"),
            )),
        }
    }

    fn property_map(
        &self,
        node: &Node,
        variable: &Variable,
        map: &Value,
        allow_unauthenticated: bool,
    ) -> Result<Option<Expr>> {
        let map = match map {
            Value::String(star) if star == "*" => return Ok(Some(Expr::bool(true))),
            Value::Object(map) => map,
            _ => {
                return Err(Error::invalid(format!(
                    "auth rule on {} must be \"*\" or an object",
                    node.name
                )))
            }
        };

        let mut predicates = Vec::with_capacity(map.len());
        for (key, value) in map {
            let predicate = match key.as_str() {
                "AND" | "OR" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| Error::invalid(format!("auth {} must be a list", key)))?;
                    let mut nested = Vec::with_capacity(items.len());
                    for item in items {
                        if let Some(predicate) =
                            self.property_map(node, variable, item, allow_unauthenticated)?
                        {
                            nested.push(predicate);
                        }
                    }
                    if key == "AND" {
                        Expr::and_all(nested)
                    } else {
                        Expr::or_all(nested)
                    }
                }
                _ => {
                    if let Some(field) = node.primitive_field(key) {
                        Some(self.equality(
                            variable.property(field.db_name()),
                            value,
                            allow_unauthenticated,
                        )?)
                    } else if let Some(field) = node.relation_field(key) {
                        let target = self.translation.target_node(field)?;
                        let related = Variable::fresh("var");
                        let pattern = Pattern::node(NodePattern::new(variable)).related(
                            relationship_pattern(field, None),
                            self.translation.node_pattern(Some(&related), target)?,
                        );
                        if self.kind == AuthKind::Bind {
                            let each = Variable::fresh("var");
                            let inner =
                                self.property_map(target, &each, value, allow_unauthenticated)?;
                            inner.map(|inner| Expr::ListPredicate {
                                kind: ListPredicate::All,
                                variable: each,
                                list: Box::new(Expr::PatternComprehension {
                                    pattern: Box::new(pattern),
                                    predicate: None,
                                    projection: Box::new(related.expr()),
                                }),
                                predicate: Box::new(inner),
                            })
                        } else {
                            let inner =
                                self.property_map(target, &related, value, allow_unauthenticated)?;
                            Some(Expr::Exists {
                                pattern: Box::new(pattern),
                                predicate: inner.map(Box::new),
                            })
                        }
                    } else {
                        return Err(Error::UnknownField {
                            entity: node.name.clone(),
                            field: key.clone(),
                        });
                    }
                }
            };
            predicates.extend(predicate);
        }
        Ok(Expr::and_all(predicates))
    }

    fn equality(&self, property: Expr, value: &Value, allow_unauthenticated: bool) -> Result<Expr> {
        let value = match value {
            Value::String(path) if path.starts_with("$jwt.") || path.starts_with("$context.") => {
                match self.translation.context.resolve_path(path) {
                    Some(resolved) => resolved,
                    None if allow_unauthenticated => return Ok(Expr::bool(false)),
                    None => return Err(Error::Unauthenticated),
                }
            }
            literal => literal,
        };
        if value.is_null() {
            return Ok(property.is_null());
        }
        Ok(property.eq(Param::scoped(self.param_scope.as_str(), value.clone()).expr()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::schema::{Auth, PrimitiveField, Schema};
    use serde_json::json;

    fn schema(rules: Value) -> Schema {
        let auth: Auth = serde_json::from_value(json!({ "rules": rules })).unwrap();
        Schema::new(
            vec![Node::new("Post")
                .with_primitive(PrimitiveField::new("id", "ID"))
                .with_primitive(PrimitiveField::new("title", "String"))
                .with_auth(auth)],
            vec![],
        )
        .unwrap()
    }

    fn compile(rules: Value, context: &Context, kind: AuthKind) -> Result<Option<CypherResult>> {
        let schema = schema(rules);
        let translation = Translation::new(&schema, context);
        let node = schema.node("Post").unwrap();
        create_auth_and_params(node, "this", &[AuthOperation::Read], kind, &translation)
    }

    fn jwt(claims: Value) -> Context {
        Context::new(Config::default()).with_jwt(claims)
    }

    #[test]
    fn rules_combine_with_or() {
        let result = compile(
            json!([{ "allow": { "id": "$jwt.sub" } }, { "roles": ["admin"] }]),
            &jwt(json!({ "sub": "abc" })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            result.cypher,
            "(this.id = $thisauth_param0 OR any(var0 IN ['admin'] WHERE var0 IN $auth.roles))"
        );
        assert_eq!(result.params["thisauth_param0"], json!("abc"));
        assert_eq!(
            result.params["auth"],
            json!({ "isAuthenticated": true, "roles": [] })
        );
    }

    #[test]
    fn keys_within_a_rule_combine_with_and() {
        let result = compile(
            json!([{ "allow": { "id": "$jwt.sub" }, "roles": ["admin"] }]),
            &jwt(json!({ "sub": "abc" })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            result.cypher,
            "(any(var0 IN ['admin'] WHERE var0 IN $auth.roles) AND this.id = $thisauth_param0)"
        );
    }

    #[test]
    fn and_key_puts_role_checks_first() {
        let result = compile(
            json!([{ "AND": [{ "allow": { "id": "$jwt.sub" } }, { "roles": ["admin"] }] }]),
            &jwt(json!({ "sub": "abc" })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            result.cypher,
            "(any(var0 IN ['admin'] WHERE var0 IN $auth.roles) AND this.id = $thisauth_param0)"
        );
        assert_eq!(result.params["thisauth_param0"], json!("abc"));
    }

    #[test]
    fn and_key_keeps_condition_order() {
        let result = compile(
            json!([{
                "allow": { "id": "$jwt.sub" },
                "AND": [{ "allow": { "title": "$jwt.title" } }, { "isAuthenticated": true }]
            }]),
            &jwt(json!({ "sub": "abc", "title": "t" })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            result.cypher,
            "($auth.isAuthenticated = true AND this.id = $thisauth_param0 AND this.title = $thisauth_param1)"
        );
    }

    #[test]
    fn nested_allow_junctions() {
        let result = compile(
            json!([{ "allow": { "OR": [{ "id": "$jwt.sub" }, { "title": "$jwt.title" }] } }]),
            &jwt(json!({ "sub": "abc", "title": "t" })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            result.cypher,
            "(this.id = $thisauth_param0 OR this.title = $thisauth_param1)"
        );
    }

    #[test]
    fn undefined_claim_is_unauthenticated() {
        let err = compile(
            json!([{ "allow": { "id": "$jwt.sub" } }]),
            &jwt(json!({})),
            AuthKind::Allow,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unauthenticated");
    }

    #[test]
    fn allow_unauthenticated_compiles_to_false() {
        let result = compile(
            json!([{ "allow": { "id": "$jwt.sub" }, "allowUnauthenticated": true }]),
            &jwt(json!({})),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.cypher, "false");
        assert!(result.params.is_empty());
    }

    #[test]
    fn operations_exclude_rules() {
        let result = compile(
            json!([{ "operations": ["UPDATE"], "allow": { "id": "$jwt.sub" } }]),
            &jwt(json!({})),
            AuthKind::Allow,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn roles_only_apply_to_allow() {
        let result = compile(
            json!([{ "roles": ["admin"], "where": { "id": "$jwt.sub" } }]),
            &jwt(json!({ "sub": "abc" })),
            AuthKind::Where,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.cypher, "this.id = $thisauth_param0");
    }

    #[test]
    fn null_claims_compare_with_is_null() {
        let result = compile(
            json!([{ "allow": { "id": "$jwt.sub" } }]),
            &jwt(json!({ "sub": null })),
            AuthKind::Allow,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.cypher, "this.id IS NULL");
    }
}
