//! Registration table
//!
//! Records, per hook kind, the identifiers registered at startup. Filled in
//! by `WebhookRouter` and read-only once the router is serving.

use cw_common::HookKind;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

use crate::domain::DomainObject;
use crate::error::WebhookError;

/// Something a hook can be registered for
///
/// Values that carry a class name register under that class name; bare
/// strings are used as the identifier directly.
pub trait HookTarget {
    fn identifier(&self) -> String;
}

/// Class descriptor, for registering a hook by class without an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassName<'a>(pub &'a str);

impl HookTarget for ClassName<'_> {
    fn identifier(&self) -> String {
        self.0.to_string()
    }
}

impl HookTarget for str {
    fn identifier(&self) -> String {
        self.to_string()
    }
}

impl HookTarget for String {
    fn identifier(&self) -> String {
        self.clone()
    }
}

impl HookTarget for DomainObject {
    fn identifier(&self) -> String {
        self.class_name().to_string()
    }
}

impl<T: HookTarget + ?Sized> HookTarget for &T {
    fn identifier(&self) -> String {
        (**self).identifier()
    }
}

/// Identifiers must be usable as a single path segment
pub(crate) fn validate_identifier(identifier: &str) -> Result<(), WebhookError> {
    let valid = !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(WebhookError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Hook kind → identifiers, in registration order
#[derive(Debug, Clone, Default)]
pub struct Registrations {
    entries: BTreeMap<HookKind, Vec<String>>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an identifier; a repeated (kind, identifier) pair is rejected
    pub(crate) fn record(&mut self, kind: HookKind, identifier: &str) -> Result<(), WebhookError> {
        if self.contains(kind, identifier) {
            return Err(WebhookError::duplicate(kind, identifier));
        }
        self.entries.entry(kind).or_default().push(identifier.to_string());
        Ok(())
    }

    pub fn get(&self, kind: HookKind) -> &[String] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, kind: HookKind, identifier: &str) -> bool {
        self.get(kind).iter().any(|existing| existing == identifier)
    }

    /// All kinds, including those with no registrations
    pub fn iter(&self) -> impl Iterator<Item = (HookKind, &[String])> + '_ {
        HookKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Registrations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(HookKind::ALL.len()))?;
        for (kind, identifiers) in self.iter() {
            map.serialize_entry(kind.as_str(), identifiers)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_and_lookup() {
        let mut registrations = Registrations::new();
        registrations.record(HookKind::BeforeSave, "Post").unwrap();
        registrations.record(HookKind::BeforeSave, "Comment").unwrap();
        registrations.record(HookKind::Function, "hello").unwrap();

        assert_eq!(registrations.get(HookKind::BeforeSave), ["Post", "Comment"]);
        assert!(registrations.contains(HookKind::Function, "hello"));
        assert!(!registrations.contains(HookKind::AfterSave, "Post"));
        assert!(registrations.get(HookKind::AfterDelete).is_empty());
        assert_eq!(registrations.len(), 3);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registrations = Registrations::new();
        registrations.record(HookKind::AfterSave, "Post").unwrap();
        let err = registrations.record(HookKind::AfterSave, "Post").unwrap_err();
        assert!(matches!(
            err,
            WebhookError::DuplicateRegistration { kind: HookKind::AfterSave, .. }
        ));
        // Same identifier under another kind is fine
        registrations.record(HookKind::AfterDelete, "Post").unwrap();
    }

    #[test]
    fn test_hook_target_identifier() {
        let post = DomainObject::new("Post").with_id("1");
        assert_eq!(post.identifier(), "Post");
        assert_eq!((&post).identifier(), "Post");
        assert_eq!("Post".identifier(), "Post");
        assert_eq!(String::from("sendEmail").identifier(), "sendEmail");
        assert_eq!(ClassName("Post").identifier(), post.identifier());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("_User").is_ok());
        assert!(validate_identifier("send-email.v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(validate_identifier("a b").is_err());
        assert!(validate_identifier(":id").is_err());
    }

    #[test]
    fn test_serialize_lists_every_kind() {
        let mut registrations = Registrations::new();
        registrations.record(HookKind::Function, "hello").unwrap();
        assert_eq!(
            serde_json::to_value(&registrations).unwrap(),
            json!({
                "beforeSave": [],
                "afterSave": [],
                "beforeDelete": [],
                "afterDelete": [],
                "function": ["hello"]
            })
        );
    }
}
