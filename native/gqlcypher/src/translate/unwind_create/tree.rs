//! Shape of nested create input
//!
//! A [`TreeDescriptor`] records which properties and which nested operations
//! appear in an input object. Descriptors of sibling inputs are merged, so a
//! list of differently shaped creates is described by one tree.
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::super::{input_items, input_object, operations_of};
use crate::error::{Error, Result};
use crate::schema::{Entity, RelationTarget, Schema};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeDescriptor {
    /// Scalar input keys present in at least one merged input
    pub properties: BTreeSet<String>,
    /// Relationship fields present, by field name
    pub children: BTreeMap<String, RelationDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationDescriptor {
    /// Nested operation keys, e.g. `create` or `connect`
    pub operations: BTreeSet<String>,
    /// Merged shape of every `create.node`
    pub node: TreeDescriptor,
    /// Merged shape of every `create.edge`
    pub edge: TreeDescriptor,
}

impl TreeDescriptor {
    /// Describes one input object of `entity`
    pub fn describe(
        entity: &dyn Entity,
        input: &Map<String, Value>,
        schema: &Schema,
    ) -> Result<TreeDescriptor> {
        let mut descriptor = TreeDescriptor::default();
        for (key, value) in input {
            if let Some(field) = entity.relation_field(key) {
                let mut relation = RelationDescriptor::default();
                for (operation, operation_input) in operations_of(field, value)? {
                    if let ("create", RelationTarget::Node(target)) =
                        (operation.as_str(), &field.target)
                    {
                        let target = schema.require_node(target)?;
                        let edge = schema.edge_entity(field)?;
                        for item in input_items(&operation_input) {
                            let item = input_object(item, "create")?;
                            if let Some(node) = item.get("node") {
                                relation.node.merge(TreeDescriptor::describe(
                                    target,
                                    input_object(node, "create.node")?,
                                    schema,
                                )?);
                            }
                            match (item.get("edge"), edge) {
                                (Some(input), Some(edge)) => relation.edge.merge(
                                    TreeDescriptor::describe(
                                        edge,
                                        input_object(input, "create.edge")?,
                                        schema,
                                    )?,
                                ),
                                (Some(_), None) => {
                                    return Err(Error::invalid(format!(
                                        "relationship {} has no properties",
                                        field.name
                                    )))
                                }
                                (None, _) => {}
                            }
                        }
                    }
                    relation.operations.insert(operation);
                }
                descriptor.merge_child(key.clone(), relation);
            } else if entity.primitive_field(key).is_some() {
                descriptor.properties.insert(key.clone());
            } else {
                return Err(Error::UnknownField {
                    entity: entity.name().to_string(),
                    field: key.clone(),
                });
            }
        }
        Ok(descriptor)
    }

    /// Describes a list of sibling inputs as one merged tree
    pub fn describe_all<'v, I>(entity: &dyn Entity, inputs: I, schema: &Schema) -> Result<TreeDescriptor>
    where
        I: IntoIterator<Item = &'v Map<String, Value>>,
    {
        let mut merged = TreeDescriptor::default();
        for input in inputs {
            merged.merge(TreeDescriptor::describe(entity, input, schema)?);
        }
        Ok(merged)
    }

    /// Unions `other` into `self`, recursively for shared relationship fields
    pub fn merge(&mut self, other: TreeDescriptor) {
        self.properties.extend(other.properties);
        for (name, child) in other.children {
            self.merge_child(name, child);
        }
    }

    fn merge_child(&mut self, name: String, child: RelationDescriptor) {
        match self.children.get_mut(&name) {
            Some(existing) => {
                existing.operations.extend(child.operations);
                existing.node.merge(child.node);
                existing.edge.merge(child.edge);
            }
            None => {
                self.children.insert(name, child);
            }
        }
    }
}
