/// Declarative auth rules attached to node entities
use serde::Deserialize;
use serde_json::Value;

/// Operations an auth rule can be restricted to
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOperation {
    Read,
    Create,
    Update,
    Delete,
    Connect,
    Disconnect,
}

/// One auth rule.
///
/// `allow`, `where` and `bind` hold either `"*"` or a property map whose
/// values are literals or `$jwt.*` / `$context.*` references. Property maps
/// may nest `AND` / `OR` arrays and relationship fields.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRule {
    #[serde(default)]
    pub operations: Option<Vec<AuthOperation>>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub is_authenticated: Option<bool>,
    #[serde(default)]
    pub allow_unauthenticated: bool,
    #[serde(default)]
    pub allow: Option<Value>,
    #[serde(default, rename = "where")]
    pub where_: Option<Value>,
    #[serde(default)]
    pub bind: Option<Value>,
    #[serde(default, rename = "AND")]
    pub and: Option<Vec<AuthRule>>,
    #[serde(default, rename = "OR")]
    pub or: Option<Vec<AuthRule>>,
}

impl AuthRule {
    /// Whether this rule takes part in checks for any of `operations`
    pub fn applies_to(&self, operations: &[AuthOperation]) -> bool {
        match &self.operations {
            None => true,
            Some(own) => own.iter().any(|op| operations.contains(op)),
        }
    }
}

/// The `@auth` rules of a node
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Auth {
    pub rules: Vec<AuthRule>,
}

impl Auth {
    pub fn new(rules: Vec<AuthRule>) -> Self {
        Auth { rules }
    }

    /// Rules participating in `operations`, in declaration order
    pub fn rules_for<'a>(
        &'a self,
        operations: &'a [AuthOperation],
    ) -> impl Iterator<Item = &'a AuthRule> + 'a {
        self.rules.iter().filter(move |rule| rule.applies_to(operations))
    }
}
