//! Class-tagged domain objects and their wire form

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use super::update::FieldOp;
use crate::error::ModelError;

const CLASS_NAME: &str = "className";
const OBJECT_ID: &str = "objectId";
const TYPE_TAG: &str = "__type";

/// A structured object identified by class name and optional id
#[derive(Debug, Clone, PartialEq)]
pub struct DomainObject {
    class_name: String,
    object_id: Option<String>,
    attributes: Map<String, Value>,
}

impl DomainObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            attributes: Map::new(),
        }
    }

    pub fn with_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Reconstruct an object from its serialized wire form
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let map = value
            .as_object()
            .ok_or(ModelError::NotAnObject { what: "object" })?;

        let class_name = map
            .get(CLASS_NAME)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(ModelError::MissingClassName)?
            .to_string();

        let object_id = match map.get(OBJECT_ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(ModelError::InvalidObjectId),
        };

        let attributes = map
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), CLASS_NAME | OBJECT_ID | TYPE_TAG))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            class_name,
            object_id,
            attributes,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Apply a partial update, decoding operators field by field
    pub fn apply_update(&mut self, update: &Map<String, Value>) -> Result<(), ModelError> {
        for (field, value) in update {
            match field.as_str() {
                CLASS_NAME | TYPE_TAG => {}
                OBJECT_ID => match value {
                    Value::String(id) => self.object_id = Some(id.clone()),
                    Value::Null => self.object_id = None,
                    _ => return Err(ModelError::InvalidObjectId),
                },
                _ => {
                    let op = FieldOp::decode(field, value)?;
                    self.apply(field, op)?;
                }
            }
        }
        Ok(())
    }

    /// Apply a single decoded operation to a field
    pub fn apply(&mut self, field: &str, op: FieldOp) -> Result<(), ModelError> {
        match op {
            FieldOp::Set(value) => {
                self.attributes.insert(field.to_string(), value);
            }
            FieldOp::Unset => {
                self.attributes.remove(field);
            }
            FieldOp::Increment(amount) => {
                let current = match self.attributes.get(field) {
                    None | Some(Value::Null) => serde_json::Number::from(0),
                    Some(Value::Number(n)) => n.clone(),
                    Some(_) => {
                        return Err(ModelError::invalid_operand(
                            field,
                            "Increment",
                            "field is not a number",
                        ))
                    }
                };
                let sum = add_numbers(&current, &amount).ok_or_else(|| {
                    ModelError::invalid_operand(field, "Increment", "result is not a finite number")
                })?;
                self.attributes.insert(field.to_string(), Value::Number(sum));
            }
            FieldOp::Add(items) => {
                self.array_mut(field, "Add")?.extend(items);
            }
            FieldOp::AddUnique(items) => {
                let array = self.array_mut(field, "AddUnique")?;
                for item in items {
                    if !array.contains(&item) {
                        array.push(item);
                    }
                }
            }
            FieldOp::Remove(items) => {
                self.array_mut(field, "Remove")?.retain(|existing| !items.contains(existing));
            }
        }
        Ok(())
    }

    fn array_mut(&mut self, field: &str, op: &str) -> Result<&mut Vec<Value>, ModelError> {
        let slot = self
            .attributes
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        slot.as_array_mut()
            .ok_or_else(|| ModelError::invalid_operand(field, op, "field is not an array"))
    }

    /// Wire form: `{"className": .., "objectId": .., <attributes>}`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(CLASS_NAME.to_string(), Value::String(self.class_name.clone()));
        if let Some(id) = &self.object_id {
            map.insert(OBJECT_ID.to_string(), Value::String(id.clone()));
        }
        for (key, value) in &self.attributes {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Structural encoding used for function results, tagged with `__type: "Object"`
    pub fn encode(&self) -> Value {
        let mut value = self.to_json();
        if let Some(map) = value.as_object_mut() {
            map.insert(TYPE_TAG.to_string(), Value::String("Object".to_string()));
        }
        value
    }
}

fn add_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Option<serde_json::Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(sum.into());
        }
    }
    serde_json::Number::from_f64(a.as_f64()? + b.as_f64()?)
}

/// Request-scoped handle to the inflated object
///
/// The handler and the beforeSave echo both see the same object, so edits
/// made by the handler are what gets echoed back. The echo is serialized
/// only once the handler has released its guard.
#[derive(Debug, Clone)]
pub struct SharedObject(Arc<Mutex<DomainObject>>);

impl SharedObject {
    pub fn new(object: DomainObject) -> Self {
        Self(Arc::new(Mutex::new(object)))
    }

    /// Lock for reading or editing
    pub async fn lock(&self) -> MutexGuard<'_, DomainObject> {
        self.0.lock().await
    }

    pub async fn snapshot(&self) -> DomainObject {
        self.0.lock().await.clone()
    }

    pub async fn to_json(&self) -> Value {
        self.0.lock().await.to_json()
    }
}

impl From<DomainObject> for SharedObject {
    fn from(object: DomainObject) -> Self {
        Self::new(object)
    }
}
