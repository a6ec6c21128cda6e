//! Partial-update operators
//!
//! A field in an `update` patch is either a plain value (set) or an operator
//! object such as `{"__op": "Increment", "amount": 1}`.

use serde_json::{Number, Value};

use crate::error::ModelError;

const OP_TAG: &str = "__op";

/// Decoded change to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Unset,
    Increment(Number),
    Add(Vec<Value>),
    AddUnique(Vec<Value>),
    Remove(Vec<Value>),
}

impl FieldOp {
    pub fn decode(field: &str, value: &Value) -> Result<Self, ModelError> {
        let Some(op) = value.get(OP_TAG).and_then(Value::as_str) else {
            return Ok(FieldOp::Set(value.clone()));
        };

        match op {
            "Delete" => Ok(FieldOp::Unset),
            "Increment" => value
                .get("amount")
                .and_then(Value::as_number)
                .cloned()
                .map(FieldOp::Increment)
                .ok_or_else(|| ModelError::invalid_operand(field, op, "amount must be a number")),
            "Add" => objects(field, op, value).map(FieldOp::Add),
            "AddUnique" => objects(field, op, value).map(FieldOp::AddUnique),
            "Remove" => objects(field, op, value).map(FieldOp::Remove),
            other => Err(ModelError::UnsupportedOperation {
                field: field.to_string(),
                op: other.to_string(),
            }),
        }
    }
}

fn objects(field: &str, op: &str, value: &Value) -> Result<Vec<Value>, ModelError> {
    value
        .get("objects")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ModelError::invalid_operand(field, op, "objects must be an array"))
}
