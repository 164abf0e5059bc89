/// Node and relationship patterns.
use super::environment::Environment;
use super::escape::escape_identifier;
use super::expr::{compile_map, Expr};
use super::variable::Variable;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct NodePattern {
    pub variable: Option<Variable>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    pub fn new(variable: &Variable) -> Self {
        NodePattern {
            variable: Some(variable.clone()),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        NodePattern::default()
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn properties(mut self, properties: Vec<(String, Expr)>) -> Self {
        self.properties = properties;
        self
    }

    fn compile(&self, env: &mut Environment) -> Result<String> {
        let mut out = String::from("(");
        if let Some(variable) = &self.variable {
            out.push_str(&env.declare(variable)?);
        }
        for label in &self.labels {
            out.push(':');
            out.push_str(&escape_identifier(label));
        }
        if !self.properties.is_empty() {
            out.push(' ');
            out.push_str(&compile_map(&self.properties, env)?);
        }
        out.push(')');
        Ok(out)
    }
}

/// Direction of a relationship as seen from the pattern's left-hand node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    Outgoing,
    Incoming,
    Undirected,
}

#[derive(Debug, Clone)]
pub struct RelationshipPattern {
    pub variable: Option<Variable>,
    pub types: Vec<String>,
    pub direction: PatternDirection,
    pub properties: Vec<(String, Expr)>,
}

impl RelationshipPattern {
    pub fn new(rel_type: impl Into<String>, direction: PatternDirection) -> Self {
        RelationshipPattern {
            variable: None,
            types: vec![rel_type.into()],
            direction,
            properties: Vec::new(),
        }
    }

    pub fn variable(mut self, variable: &Variable) -> Self {
        self.variable = Some(variable.clone());
        self
    }

    fn compile(&self, env: &mut Environment) -> Result<String> {
        let mut inner = String::new();
        if let Some(variable) = &self.variable {
            inner.push_str(&env.declare(variable)?);
        }
        if !self.types.is_empty() {
            inner.push(':');
            inner.push_str(
                &self
                    .types
                    .iter()
                    .map(|t| escape_identifier(t))
                    .collect::<Vec<_>>()
                    .join("|"),
            );
        }
        if !self.properties.is_empty() {
            inner.push(' ');
            inner.push_str(&compile_map(&self.properties, env)?);
        }
        Ok(match self.direction {
            PatternDirection::Outgoing => format!("-[{}]->", inner),
            PatternDirection::Incoming => format!("<-[{}]-", inner),
            PatternDirection::Undirected => format!("-[{}]-", inner),
        })
    }
}

/// A path pattern: a start node followed by relationship/node hops
#[derive(Debug, Clone)]
pub struct Pattern {
    pub start: NodePattern,
    pub hops: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    pub fn node(start: NodePattern) -> Self {
        Pattern {
            start,
            hops: Vec::new(),
        }
    }

    pub fn related(mut self, relationship: RelationshipPattern, node: NodePattern) -> Self {
        self.hops.push((relationship, node));
        self
    }

    /// Compiles the pattern, declaring every variable it binds
    pub fn compile(&self, env: &mut Environment) -> Result<String> {
        let mut out = self.start.compile(env)?;
        for (relationship, node) in &self.hops {
            out.push_str(&relationship.compile(env)?);
            out.push_str(&node.compile(env)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::Param;
    use serde_json::json;

    #[test]
    fn compiles_relationship_patterns() {
        let mut env = Environment::new("");
        let this = Variable::named("this0");
        let rel = Variable::named("this0_actors0_relationship");
        let pattern = Pattern::node(NodePattern::new(&this)).related(
            RelationshipPattern::new("ACTED_IN", PatternDirection::Incoming).variable(&rel),
            NodePattern::anonymous().labels(["Actor"]),
        );
        assert_eq!(
            pattern.compile(&mut env).unwrap(),
            "(this0)<-[this0_actors0_relationship:ACTED_IN]-(:Actor)"
        );
    }

    #[test]
    fn node_properties_are_parameters() {
        let mut env = Environment::new("");
        let node = Variable::named("n");
        let pattern = Pattern::node(NodePattern::new(&node).labels(["Genre"]).properties(vec![(
            "name".to_string(),
            Param::scoped("n_", json!("Drama")).expr(),
        )]));
        assert_eq!(
            pattern.compile(&mut env).unwrap(),
            "(n:Genre { name: $n_param0 })"
        );
    }
}
