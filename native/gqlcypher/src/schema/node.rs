/// Node and relationship-properties entities
use serde::Deserialize;
use std::collections::HashSet;

use super::auth::Auth;
use super::field::{PrimitiveField, RelationField};
use crate::context::Context;
use crate::error::{Error, Result};

/// Shared view over entities that carry primitive fields
pub trait Entity {
    fn name(&self) -> &str;
    fn primitive_fields(&self) -> &[PrimitiveField];

    fn relation_fields(&self) -> &[RelationField] {
        &[]
    }

    fn primitive_field(&self, name: &str) -> Option<&PrimitiveField> {
        self.primitive_fields().iter().find(|f| f.name == name)
    }

    fn relation_field(&self, name: &str) -> Option<&RelationField> {
        self.relation_fields().iter().find(|f| f.name == name)
    }
}

/// A node type of the schema
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    /// Physical labels; entries may be `$jwt.*` / `$context.*` templates
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub primitive_fields: Vec<PrimitiveField>,
    #[serde(default)]
    pub relation_fields: Vec<RelationField>,
    #[serde(default)]
    pub auth: Option<Auth>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            labels: Vec::new(),
            plural: None,
            primitive_fields: Vec::new(),
            relation_fields: Vec::new(),
            auth: None,
        }
    }

    pub fn with_primitive(mut self, field: PrimitiveField) -> Self {
        self.primitive_fields.push(field);
        self
    }

    pub fn with_relation(mut self, field: RelationField) -> Self {
        self.relation_fields.push(field);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Plural used in root field names, `Movie` -> `movies`
    pub fn plural(&self) -> String {
        match &self.plural {
            Some(plural) => plural.clone(),
            None => {
                let mut chars = self.name.chars();
                match chars.next() {
                    Some(first) => {
                        format!("{}{}s", first.to_lowercase(), chars.as_str())
                    }
                    None => String::new(),
                }
            }
        }
    }

    /// Whether any label is resolved from the request
    pub fn has_dynamic_labels(&self) -> bool {
        self.labels.iter().any(|l| l.starts_with('$'))
    }

    /// Physical labels for this request, with templates resolved
    pub fn labels(&self, context: &Context) -> Result<Vec<String>> {
        if self.labels.is_empty() {
            return Ok(vec![self.name.clone()]);
        }
        self.labels
            .iter()
            .map(|label| {
                if !label.starts_with('$') {
                    return Ok(label.clone());
                }
                match context.resolve_path(label) {
                    Some(serde_json::Value::String(resolved)) => Ok(resolved.clone()),
                    Some(other) if !other.is_null() => Ok(other.to_string()),
                    _ if label.starts_with("$jwt.") => Err(Error::Unauthenticated),
                    _ => Err(Error::invalid(format!(
                        "label template {} on {} could not be resolved",
                        label, self.name
                    ))),
                }
            })
            .collect()
    }

    /// Rejects models whose physical property names clash
    pub fn validate(&self) -> Result<()> {
        check_unique_properties(&self.name, &self.primitive_fields)?;
        let mut seen = HashSet::new();
        for field in &self.relation_fields {
            if self.primitive_field(&field.name).is_some() || !seen.insert(field.name.as_str()) {
                return Err(Error::invalid(format!(
                    "duplicate field {} on {}",
                    field.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn primitive_fields(&self) -> &[PrimitiveField] {
        &self.primitive_fields
    }

    fn relation_fields(&self) -> &[RelationField] {
        &self.relation_fields
    }
}

/// Properties carried by a relationship type
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Relationship {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<PrimitiveField>,
}

impl Relationship {
    pub fn new(name: impl Into<String>, fields: Vec<PrimitiveField>) -> Self {
        Relationship {
            name: name.into(),
            fields,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_unique_properties(&self.name, &self.fields)
    }
}

impl Entity for Relationship {
    fn name(&self) -> &str {
        &self.name
    }

    fn primitive_fields(&self) -> &[PrimitiveField] {
        &self.fields
    }
}

fn check_unique_properties(entity: &str, fields: &[PrimitiveField]) -> Result<()> {
    let mut properties = HashSet::with_capacity(fields.len());
    for field in fields {
        if !properties.insert(field.db_name()) {
            return Err(Error::invalid(format!(
                "property {} is mapped twice on {}",
                field.db_name(),
                entity
            )));
        }
    }
    Ok(())
}
