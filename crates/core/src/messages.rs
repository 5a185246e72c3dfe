//! Message catalog: message keys to templates with `:placeholder` markers.
//!
//! Catalogs are JSON documents. Nested objects flatten into dotted keys, so
//! `{"min": {"string": "..."}}` is looked up as `min.string` and
//! `{"attributes": {"email": "email address"}}` as `attributes.email`.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::CoreError;

const DEFAULT_MESSAGES: &str = include_str!("../resources/messages.json");

/// Message used when nothing more specific is registered for a rule.
pub const GENERIC_MESSAGE: &str = "The :attribute field is invalid.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCatalog {
    lines: HashMap<String, String>,
}

impl MessageCatalog {
    /// An empty catalog; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in English catalog.
    pub fn builtin() -> Self {
        match Self::from_json_str(DEFAULT_MESSAGES) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(error = %e, "Built-in message catalog failed to parse");
                Self::empty()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let root: Value = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid message catalog: {e}")))?;
        let Value::Object(map) = root else {
            return Err(CoreError::Configuration(
                "message catalog must be a JSON object".into(),
            ));
        };

        let mut lines = HashMap::new();
        flatten(None, &Value::Object(map), &mut lines);
        Ok(Self { lines })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!(
                "cannot read message catalog {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Build a catalog from flat `key -> template` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            lines: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.get(key).map(String::as_str)
    }

    /// Display label declared under `attributes.<field>`, if any.
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.get(&format!("attributes.{field}"))
    }

    /// Overlay another catalog; its entries win.
    pub fn merge(&mut self, other: MessageCatalog) {
        self.lines.extend(other.lines);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn flatten(prefix: Option<&str>, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let full = match prefix {
                    Some(p) => format!("{p}.{key}"),
                    None => key.clone(),
                };
                flatten(Some(&full), child, out);
            }
        }
        Value::String(s) => {
            if let Some(key) = prefix {
                out.insert(key.to_string(), s.clone());
            }
        }
        // Non-string leaves carry no template.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = MessageCatalog::builtin();
        assert!(!catalog.is_empty());
        assert_eq!(
            catalog.get("required"),
            Some("The :attribute field is required.")
        );
        assert_eq!(
            catalog.get("min.string"),
            Some("The :attribute must be at least :min characters.")
        );
    }

    #[test]
    fn nested_keys_flatten() {
        let catalog = MessageCatalog::from_json_str(
            r#"{
                "custom": {"email": {"required": "Email please"}},
                "attributes": {"dob": "date of birth"}
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.get("custom.email.required"), Some("Email please"));
        assert_eq!(catalog.attribute("dob"), Some("date of birth"));
    }

    #[test]
    fn non_object_catalog_is_rejected() {
        assert_matches!(
            MessageCatalog::from_json_str("[1, 2]"),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"required": "Fill in :attribute"}}"#).unwrap();
        let catalog = MessageCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.get("required"), Some("Fill in :attribute"));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        assert_matches!(
            MessageCatalog::from_json_file("/nonexistent/messages.json"),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn merge_overrides() {
        let mut catalog = MessageCatalog::builtin();
        catalog.merge(MessageCatalog::from_pairs([("required", "Needed.")]));
        assert_eq!(catalog.get("required"), Some("Needed."));
        assert!(catalog.get("email").is_some());
    }
}
