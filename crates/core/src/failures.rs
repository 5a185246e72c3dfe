use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-field error messages from one validation run, in the order the
/// failures occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBag {
    messages: IndexMap<String, Vec<String>>,
}

impl MessageBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.messages
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Messages for `field`; empty when it passed.
    pub fn get(&self, field: &str) -> &[String] {
        self.messages.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    /// Every message, field by field.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.messages.values().flatten().map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &IndexMap<String, Vec<String>> {
        &self.messages
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_in_order() {
        let mut bag = MessageBag::new();
        bag.add("email", "first");
        bag.add("name", "other");
        bag.add("email", "second");

        assert_eq!(bag.get("email"), ["first", "second"]);
        assert_eq!(bag.first("email"), Some("first"));
        assert_eq!(bag.len(), 3);
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["email", "name"]);
        assert_eq!(bag.all().collect::<Vec<_>>(), vec!["first", "second", "other"]);
    }

    #[test]
    fn missing_field_is_empty() {
        let bag = MessageBag::new();
        assert!(bag.get("nope").is_empty());
        assert!(!bag.has("nope"));
        assert!(bag.is_empty());
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut bag = MessageBag::new();
        bag.add("email", "bad");
        assert_eq!(
            serde_json::to_string(&bag).unwrap(),
            r#"{"email":["bad"]}"#
        );
    }
}
