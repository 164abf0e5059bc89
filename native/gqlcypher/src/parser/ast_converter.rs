//! Converts the arena-allocated graphql-query AST into an owned
//! [`ParsedOperation`].
//!
//! Named fragments are inlined at their spread. A fragment or inline fragment
//! with a type condition keeps its selections under that type, so abstract
//! fields can be projected per member; an inline fragment without one merges
//! into the enclosing selection.

use graphql_query::ast::{
    Definition, Document, FragmentDefinition, OperationKind as GraphQLOperationKind, PrintNode,
    Selection as GraphQLSelection, SelectionSet, Value as GraphQLValue,
};
use serde_json::{Number, Value};
use std::collections::HashMap;

use super::error::{Error, Result};
use super::{InputValue, OperationKind, ParsedOperation, Selection, VariableDefinition};

/// Owned selections of one selection set, split by type condition
#[derive(Default)]
struct Selections {
    fields: Vec<Selection>,
    by_type: Vec<(String, Vec<Selection>)>,
}

impl Selections {
    fn push_typed(&mut self, type_name: &str, fields: Vec<Selection>) {
        match self.by_type.iter_mut().find(|(name, _)| name == type_name) {
            Some((_, existing)) => existing.extend(fields),
            None => self.by_type.push((type_name.to_string(), fields)),
        }
    }
}

pub struct ASTConverter<'a> {
    fragments: HashMap<&'a str, &'a FragmentDefinition<'a>>,
    max_depth: usize,
    /// Fragments being inlined, to reject cycles
    active: Vec<&'a str>,
}

impl<'a> ASTConverter<'a> {
    pub fn new(document: &'a Document<'a>, max_depth: usize) -> Self {
        let fragments = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.name, fragment)),
                _ => None,
            })
            .collect();
        ASTConverter {
            fragments,
            max_depth,
            active: Vec::new(),
        }
    }

    pub fn convert_document(&mut self, document: &'a Document<'a>) -> Result<ParsedOperation> {
        let operation = document.operation(None)?;
        if !operation.directives.children.is_empty() {
            return Err(Error::UnsupportedOperation("directives".to_string()));
        }

        let kind = match operation.operation {
            GraphQLOperationKind::Query => OperationKind::Query,
            GraphQLOperationKind::Mutation => OperationKind::Mutation,
            GraphQLOperationKind::Subscription => OperationKind::Subscription,
        };

        let mut variables = Vec::with_capacity(operation.variable_definitions.children.len());
        for definition in operation.variable_definitions.children.iter() {
            let default = match &definition.default_value {
                GraphQLValue::Null => None,
                value => Some(const_value(value)?),
            };
            variables.push(VariableDefinition {
                name: definition.variable.name.to_string(),
                required: definition.of_type.print().ends_with('!'),
                default,
            });
        }

        let selections = self.convert_selection_set(&operation.selection_set, 1)?;
        if !selections.by_type.is_empty() {
            return Err(Error::UnsupportedOperation(
                "type conditions on the root selection".to_string(),
            ));
        }

        Ok(ParsedOperation {
            kind,
            name: operation.name.as_ref().map(|name| name.name.to_string()),
            variables,
            selections: selections.fields,
        })
    }

    fn convert_selection_set(
        &mut self,
        selection_set: &'a SelectionSet<'a>,
        depth: usize,
    ) -> Result<Selections> {
        if depth > self.max_depth {
            return Err(Error::MaxDepthExceeded(self.max_depth));
        }
        let mut selections = Selections::default();

        for selection in selection_set.selections.iter() {
            match selection {
                GraphQLSelection::Field(field) => {
                    if !field.directives.children.is_empty() {
                        return Err(Error::UnsupportedOperation("directives".to_string()));
                    }
                    let mut arguments = Vec::with_capacity(field.arguments.children.len());
                    for argument in field.arguments.children.iter() {
                        arguments.push((argument.name.to_string(), input_value(&argument.value)?));
                    }
                    let nested = if field.selection_set.selections.is_empty() {
                        Selections::default()
                    } else {
                        self.convert_selection_set(&field.selection_set, depth + 1)?
                    };
                    selections.fields.push(Selection {
                        name: field.name.to_string(),
                        alias: field.alias.map(str::to_string),
                        arguments,
                        fields: nested.fields,
                        fields_by_type: nested.by_type.into_iter().collect(),
                    });
                }
                GraphQLSelection::FragmentSpread(spread) => {
                    if !spread.directives.children.is_empty() {
                        return Err(Error::UnsupportedOperation("directives".to_string()));
                    }
                    let name = spread.name.name;
                    let fragment = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| Error::UnknownFragment(name.to_string()))?;
                    if self.active.contains(&name) {
                        return Err(Error::UnsupportedOperation(format!(
                            "fragment \"{}\" spreads itself",
                            name
                        )));
                    }
                    self.active.push(name);
                    let inlined = self.convert_selection_set(&fragment.selection_set, depth);
                    self.active.pop();
                    self.merge_typed(&mut selections, Some(fragment.type_condition.name), inlined?);
                }
                GraphQLSelection::InlineFragment(inline) => {
                    if !inline.directives.children.is_empty() {
                        return Err(Error::UnsupportedOperation("directives".to_string()));
                    }
                    let inlined = self.convert_selection_set(&inline.selection_set, depth)?;
                    let type_name = inline.type_condition.as_ref().map(|condition| condition.name);
                    self.merge_typed(&mut selections, type_name, inlined);
                }
            }
        }

        Ok(selections)
    }

    fn merge_typed(&self, into: &mut Selections, type_name: Option<&str>, from: Selections) {
        match type_name {
            Some(type_name) => into.push_typed(type_name, from.fields),
            None => into.fields.extend(from.fields),
        }
        // Nested conditions narrow to their own type
        for (name, fields) in from.by_type {
            into.push_typed(&name, fields);
        }
    }
}

fn input_value(value: &GraphQLValue<'_>) -> Result<InputValue> {
    Ok(match value {
        GraphQLValue::Variable(variable) => InputValue::Variable(variable.name.to_string()),
        GraphQLValue::List(list) => InputValue::List(
            list.children
                .iter()
                .map(input_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        GraphQLValue::Object(object) => InputValue::Object(
            object
                .children
                .iter()
                .map(|field| Ok((field.name.to_string(), input_value(&field.value)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => InputValue::Const(const_value(other)?),
    })
}

/// JSON value of a literal without variables
fn const_value(value: &GraphQLValue<'_>) -> Result<Value> {
    Ok(match value {
        GraphQLValue::Null => Value::Null,
        GraphQLValue::Boolean(boolean) => Value::Bool(boolean.value),
        GraphQLValue::String(string) => Value::String(string.value.to_string()),
        GraphQLValue::Enum(value) => Value::String(value.value.to_string()),
        GraphQLValue::Int(int) => int
            .value
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::InvalidValue(int.value.to_string()))?,
        GraphQLValue::Float(float) => float
            .value
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::InvalidValue(float.value.to_string()))?,
        GraphQLValue::List(list) => Value::Array(
            list.children
                .iter()
                .map(const_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        GraphQLValue::Object(object) => Value::Object(
            object
                .children
                .iter()
                .map(|field| Ok((field.name.to_string(), const_value(&field.value)?)))
                .collect::<Result<serde_json::Map<_, _>>>()?,
        ),
        GraphQLValue::Variable(variable) => {
            return Err(Error::InvalidValue(format!(
                "variable ${} in a constant value",
                variable.name
            )))
        }
    })
}
