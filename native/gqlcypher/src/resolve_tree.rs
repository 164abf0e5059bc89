/// Resolved GraphQL selection tree
///
/// One `ResolveTree` per selected field, with arguments already bound to
/// JSON values. Selections under an inline fragment with a type condition are
/// kept per type name so abstract fields can be projected per concrete type.
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolveTree {
    pub name: String,
    pub alias: String,
    pub args: Map<String, Value>,
    /// Selections valid for every concrete type
    pub fields: Vec<ResolveTree>,
    /// Selections under `... on Type`
    pub fields_by_type: BTreeMap<String, Vec<ResolveTree>>,
}

impl ResolveTree {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        ResolveTree {
            alias: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        if let Value::Object(map) = args {
            self.args = map;
        }
        self
    }

    pub fn with_fields(mut self, fields: Vec<ResolveTree>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_type_fields(mut self, type_name: impl Into<String>, fields: Vec<ResolveTree>) -> Self {
        self.fields_by_type.insert(type_name.into(), fields);
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name).filter(|v| !v.is_null())
    }

    /// First selected field named `name`
    pub fn field(&self, name: &str) -> Option<&ResolveTree> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Selections that apply to `type_name`, shared ones first
    pub fn fields_for(&self, type_name: &str) -> impl Iterator<Item = &ResolveTree> {
        self.fields.iter().chain(
            self.fields_by_type
                .get(type_name)
                .into_iter()
                .flat_map(|fields| fields.iter()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_type_specific_selections() {
        let tree = ResolveTree::new("search")
            .with_fields(vec![ResolveTree::new("__typename")])
            .with_type_fields("Movie", vec![ResolveTree::new("title")])
            .with_type_fields("Genre", vec![ResolveTree::new("name")]);
        let movie: Vec<_> = tree.fields_for("Movie").map(|f| f.name.as_str()).collect();
        assert_eq!(movie, vec!["__typename", "title"]);
    }

    #[test]
    fn null_arguments_are_absent() {
        let tree = ResolveTree::new("movies").with_args(json!({ "where": null, "options": {} }));
        assert!(tree.arg("where").is_none());
        assert!(tree.arg("options").is_some());
    }
}
