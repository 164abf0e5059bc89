//! Intermediate form of an unwind create
//!
//! Built from a merged [`TreeDescriptor`]; any input the unwind program
//! cannot express is rejected here with
//! [`Error::UnsupportedUnwindOptimization`], before rows are normalized or
//! callbacks registered.
use super::tree::{RelationDescriptor, TreeDescriptor};
use crate::error::{Error, Result};
use crate::schema::{
    Entity, NestedOperation, Node, PrimitiveField, RelationField, RelationTarget, Relationship,
    Schema, WriteOperation,
};

/// Where the value of a property comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySource {
    /// `row.field`
    Row,
    /// `row.field`, or a UUID when the row has none
    RowOrGenerated,
    /// `randomUUID()`
    Generated,
    /// The temporal function of the field
    Timestamp,
    /// `$resolvedCallbacks[row._callbacks.field]`
    Callback,
}

#[derive(Debug)]
pub struct PropertyAst<'a> {
    pub field: &'a PrimitiveField,
    pub source: PropertySource,
}

/// Creation of one node per row, with its nested creates
#[derive(Debug)]
pub struct CreateAst<'a> {
    pub node: &'a Node,
    pub properties: Vec<PropertyAst<'a>>,
    pub relations: Vec<RelationAst<'a>>,
}

/// Nested creates through one relationship field
#[derive(Debug)]
pub struct RelationAst<'a> {
    pub field: &'a RelationField,
    pub edge: Option<&'a Relationship>,
    pub edge_properties: Vec<PropertyAst<'a>>,
    pub create: CreateAst<'a>,
}

impl<'a> CreateAst<'a> {
    /// Builds the AST for creating `node` from rows shaped like `descriptor`
    pub fn build(node: &'a Node, descriptor: &TreeDescriptor, schema: &'a Schema) -> Result<Self> {
        let mut relations = Vec::with_capacity(descriptor.children.len());
        for (name, child) in &descriptor.children {
            let field = node.relation_field(name).ok_or_else(|| Error::UnknownField {
                entity: node.name.clone(),
                field: name.clone(),
            })?;
            relations.push(RelationAst::build(field, child, schema)?);
        }
        Ok(CreateAst {
            node,
            properties: properties(node, descriptor),
            relations,
        })
    }
}

impl<'a> RelationAst<'a> {
    fn build(
        field: &'a RelationField,
        descriptor: &RelationDescriptor,
        schema: &'a Schema,
    ) -> Result<Self> {
        for operation in &descriptor.operations {
            match operation.as_str() {
                "create" => {}
                "connect" => return Err(unsupported("connect", field)),
                "connectOrCreate" => return Err(unsupported("connectOrCreate", field)),
                other => {
                    return Err(Error::invalid(format!(
                        "{} is not a valid nested operation here for field {}",
                        other, field.name
                    )))
                }
            }
        }
        if !field.allows(NestedOperation::Create) {
            return Err(Error::invalid(format!(
                "nested create is not allowed on field {}",
                field.name
            )));
        }
        let target = match &field.target {
            RelationTarget::Node(name) => schema.require_node(name)?,
            _ => return Err(unsupported("abstract relationship targets", field)),
        };
        let edge = schema.edge_entity(field)?;
        Ok(RelationAst {
            field,
            edge,
            edge_properties: edge
                .map(|edge| properties(edge, &descriptor.edge))
                .unwrap_or_default(),
            create: CreateAst::build(target, &descriptor.node, schema)?,
        })
    }
}

fn unsupported(what: &str, field: &RelationField) -> Error {
    Error::UnsupportedUnwindOptimization(format!("{} (field {})", what, field.name))
}

/// Properties set on create, in schema field order.
///
/// Every row of a merged shape gets the same assignments; rows missing a
/// present key set it to `null`, which leaves a new entity without it.
fn properties<'a>(entity: &'a dyn Entity, descriptor: &TreeDescriptor) -> Vec<PropertyAst<'a>> {
    entity
        .primitive_fields()
        .iter()
        .filter_map(|field| {
            let present = descriptor.properties.contains(&field.name);
            let source = if field.callback_for(WriteOperation::Create).is_some() {
                PropertySource::Callback
            } else if field.has_timestamp(WriteOperation::Create) {
                PropertySource::Timestamp
            } else if field.autogenerate {
                if present {
                    PropertySource::RowOrGenerated
                } else {
                    PropertySource::Generated
                }
            } else if present || field.default_value.is_some() {
                PropertySource::Row
            } else {
                return None;
            };
            Some(PropertyAst { field, source })
        })
        .collect()
}
