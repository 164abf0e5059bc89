//! Variable processor for handling GraphQL variables
//!
//! Resolves the operation's variable definitions against the request's
//! variables and substitutes them into argument values.

use serde_json::{Map, Value};

use super::error::{Error, Result};
use super::{InputValue, VariableDefinition};

/// Values of the declared variables.
///
/// A provided value wins over the default. A variable that is neither
/// provided nor defaulted is absent, which is an error for non-null types.
pub fn resolve_variables(
    definitions: &[VariableDefinition],
    provided: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut values = Map::new();
    for definition in definitions {
        let value = match provided.get(&definition.name) {
            Some(Value::Null) if definition.required => None,
            Some(value) => Some(value.clone()),
            None => definition.default.clone(),
        };
        match value {
            Some(value) => {
                values.insert(definition.name.clone(), value);
            }
            None if definition.required => {
                return Err(Error::MissingVariable(definition.name.clone()))
            }
            None => {}
        }
    }
    Ok(values)
}

/// Substitutes variables into `value`.
///
/// `None` means the value is an absent variable: the argument or object
/// field holding it is left out, while a list item becomes `null`.
pub fn bind_value(
    value: &InputValue,
    definitions: &[VariableDefinition],
    variables: &Map<String, Value>,
) -> Result<Option<Value>> {
    Ok(match value {
        InputValue::Const(value) => Some(value.clone()),
        InputValue::Variable(name) => {
            if !definitions.iter().any(|definition| &definition.name == name) {
                return Err(Error::UndefinedVariable(name.clone()));
            }
            variables.get(name).cloned()
        }
        InputValue::List(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| Ok(bind_value(item, definitions, variables)?.unwrap_or(Value::Null)))
                .collect::<Result<Vec<_>>>()?,
        )),
        InputValue::Object(fields) => {
            let mut object = Map::new();
            for (key, field) in fields {
                if let Some(value) = bind_value(field, definitions, variables)? {
                    object.insert(key.clone(), value);
                }
            }
            Some(Value::Object(object))
        }
    })
}
