//! Values a handler hands back on success

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::object::DomainObject;

/// Handler result before it is written into an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Object(DomainObject),
    Date(DateTime<Utc>),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// Plain wire form; objects become their `{className, objectId, ..}` JSON
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Object(object) => object.to_json(),
            Payload::Date(date) => encode_date(&date),
            Payload::List(items) => {
                Value::Array(items.into_iter().map(Payload::into_json).collect())
            }
            Payload::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Structural encoding for function results
    pub fn encode(&self) -> Value {
        match self {
            Payload::Json(value) => value.clone(),
            Payload::Object(object) => object.encode(),
            Payload::Date(date) => encode_date(date),
            Payload::List(items) => Value::Array(items.iter().map(Payload::encode).collect()),
            Payload::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.encode()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

fn encode_date(date: &DateTime<Utc>) -> Value {
    json!({
        "__type": "Date",
        "iso": date.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Json(Value::String(value.to_string()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Json(Value::String(value))
    }
}

impl From<DomainObject> for Payload {
    fn from(object: DomainObject) -> Self {
        Payload::Object(object)
    }
}

impl From<DateTime<Utc>> for Payload {
    fn from(date: DateTime<Utc>) -> Self {
        Payload::Date(date)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(items: Vec<T>) -> Self {
        Payload::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Payload>> From<BTreeMap<String, T>> for Payload {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Payload::Map(entries.into_iter().map(|(key, value)| (key, value.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_object_and_date() {
        let post = DomainObject::new("Post").with_id("1");
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let mut entries = BTreeMap::new();
        entries.insert("post".to_string(), Payload::from(post.clone()));
        entries.insert("at".to_string(), Payload::from(date));
        let payload = Payload::Map(entries);

        assert_eq!(
            payload.encode(),
            json!({
                "post": {"__type": "Object", "className": "Post", "objectId": "1"},
                "at": {"__type": "Date", "iso": "2024-03-01T12:00:00.000Z"}
            })
        );
        assert_eq!(payload.into_json()["post"], json!({"className": "Post", "objectId": "1"}));
    }

    #[test]
    fn test_plain_json_is_unchanged() {
        let value = json!({"count": 3, "names": ["a"]});
        assert_eq!(Payload::from(value.clone()).encode(), value);
    }

    #[test]
    fn test_list_of_objects() {
        let payload = Payload::from(vec![DomainObject::new("A"), DomainObject::new("B")]);
        let encoded = payload.encode();
        assert_eq!(encoded[0]["className"], "A");
        assert_eq!(encoded[1]["__type"], "Object");
    }
}
