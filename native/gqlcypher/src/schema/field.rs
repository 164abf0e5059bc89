/// Field descriptors of schema entities
use serde::Deserialize;
use serde_json::Value;

/// Operations a timestamp or callback field reacts to
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteOperation {
    Create,
    Update,
}

/// Externally resolved value for a field
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct CallbackField {
    /// Name of the function in the context's callback registry
    pub name: String,
    #[serde(default = "all_write_operations")]
    pub operations: Vec<WriteOperation>,
}

fn all_write_operations() -> Vec<WriteOperation> {
    vec![WriteOperation::Create, WriteOperation::Update]
}

/// A scalar field stored as a node or relationship property
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveField {
    pub name: String,
    /// Physical property name when it differs from the GraphQL field name
    #[serde(default)]
    pub db_property_name: Option<String>,
    #[serde(rename = "type", default = "default_type_name")]
    pub type_name: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub required: bool,
    /// Generate a UUID on create
    #[serde(default)]
    pub autogenerate: bool,
    #[serde(default)]
    pub timestamps: Vec<WriteOperation>,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub callback: Option<CallbackField>,
}

fn default_type_name() -> String {
    "String".to_string()
}

impl PrimitiveField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        PrimitiveField {
            name: name.into(),
            db_property_name: None,
            type_name: type_name.into(),
            array: false,
            required: false,
            autogenerate: false,
            timestamps: Vec::new(),
            default_value: None,
            callback: None,
        }
    }

    /// Property name used in Cypher
    #[inline]
    pub fn db_name(&self) -> &str {
        self.db_property_name.as_deref().unwrap_or(&self.name)
    }

    /// Cypher function producing the current temporal value for this field's type
    pub fn temporal_function(&self) -> &'static str {
        match self.type_name.as_str() {
            "Date" => "date",
            "Time" => "time",
            "LocalTime" => "localtime",
            "LocalDateTime" => "localdatetime",
            _ => "datetime",
        }
    }

    pub fn has_timestamp(&self, operation: WriteOperation) -> bool {
        self.timestamps.contains(&operation)
    }

    /// The callback registered for `operation`, if any
    pub fn callback_for(&self, operation: WriteOperation) -> Option<&CallbackField> {
        self.callback
            .as_ref()
            .filter(|callback| callback.operations.contains(&operation))
    }
}

/// Direction of a relationship as declared on the owning node
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipDirection {
    In,
    Out,
}

/// The node type(s) a relationship field points to
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum RelationTarget {
    Node(String),
    Union(Vec<String>),
    Interface {
        name: String,
        implementations: Vec<String>,
    },
}

impl RelationTarget {
    /// Concrete node types this target may resolve to
    pub fn concrete_types(&self) -> Vec<&str> {
        match self {
            RelationTarget::Node(name) => vec![name.as_str()],
            RelationTarget::Union(members) => members.iter().map(String::as_str).collect(),
            RelationTarget::Interface {
                implementations, ..
            } => implementations.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_abstract(&self) -> bool {
        !matches!(self, RelationTarget::Node(_))
    }
}

/// Nested operations a relationship field accepts in mutation input
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NestedOperation {
    Create,
    Connect,
    Disconnect,
    ConnectOrCreate,
    Update,
    Delete,
}

impl NestedOperation {
    /// Key of this operation in GraphQL input objects
    pub fn input_key(self) -> &'static str {
        match self {
            NestedOperation::Create => "create",
            NestedOperation::Connect => "connect",
            NestedOperation::Disconnect => "disconnect",
            NestedOperation::ConnectOrCreate => "connectOrCreate",
            NestedOperation::Update => "update",
            NestedOperation::Delete => "delete",
        }
    }
}

fn all_nested_operations() -> Vec<NestedOperation> {
    vec![
        NestedOperation::Create,
        NestedOperation::Connect,
        NestedOperation::Disconnect,
        NestedOperation::ConnectOrCreate,
        NestedOperation::Update,
        NestedOperation::Delete,
    ]
}

/// A field backed by a graph relationship
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationField {
    pub name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: RelationshipDirection,
    pub target: RelationTarget,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "all_nested_operations")]
    pub nested_operations: Vec<NestedOperation>,
    /// Relationship-properties entity, if the relationship carries properties
    #[serde(default)]
    pub properties: Option<String>,
}

impl RelationField {
    pub fn new(
        name: impl Into<String>,
        rel_type: impl Into<String>,
        direction: RelationshipDirection,
        target: RelationTarget,
    ) -> Self {
        RelationField {
            name: name.into(),
            rel_type: rel_type.into(),
            direction,
            target,
            array: true,
            required: false,
            nested_operations: all_nested_operations(),
            properties: None,
        }
    }

    pub fn allows(&self, operation: NestedOperation) -> bool {
        self.nested_operations.contains(&operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_field_defaults() {
        let field: PrimitiveField = serde_json::from_value(json!({ "name": "title" })).unwrap();
        assert_eq!(field.db_name(), "title");
        assert_eq!(field.type_name, "String");
        assert!(!field.autogenerate);
    }

    #[test]
    fn relation_field_from_json() {
        let field: RelationField = serde_json::from_value(json!({
            "name": "search",
            "type": "SEARCH",
            "direction": "OUT",
            "target": { "union": ["Genre", "Movie"] },
            "nestedOperations": ["CONNECT"]
        }))
        .unwrap();
        assert!(field.target.is_abstract());
        assert_eq!(field.target.concrete_types(), vec!["Genre", "Movie"]);
        assert!(field.allows(NestedOperation::Connect));
        assert!(!field.allows(NestedOperation::Create));
    }

    #[test]
    fn callback_applies_per_operation() {
        let mut field = PrimitiveField::new("slug", "String");
        field.callback = Some(CallbackField {
            name: "getSlug".into(),
            operations: vec![WriteOperation::Create],
        });
        assert!(field.callback_for(WriteOperation::Create).is_some());
        assert!(field.callback_for(WriteOperation::Update).is_none());
    }
}
