//! Registry of caller-supplied rules, replacers and fallback messages.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::rules::snake_case;
use crate::types::Record;

/// A custom rule: `(field, value, parameters, record) -> passed`.
///
/// Absent fields are passed as `Value::Null`.
pub type ExtensionFn = Arc<dyn Fn(&str, &Value, &[String], &Record) -> bool + Send + Sync>;

/// A message replacer: `(message, attribute, rule, parameters) -> message`.
pub type ReplacerFn = Arc<dyn Fn(&str, &str, &str, &[String]) -> String + Send + Sync>;

/// Custom extensions keyed by snake_case rule name.
///
/// Cloning is cheap (callables are reference counted) and yields an
/// independent snapshot: later registrations on the original are not seen.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    pub(crate) extensions: HashMap<String, ExtensionFn>,
    pub(crate) implicit_extensions: HashMap<String, ExtensionFn>,
    pub(crate) replacers: HashMap<String, ReplacerFn>,
    pub(crate) fallback_messages: HashMap<String, String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_extension(&mut self, rule: &str, extension: ExtensionFn) {
        self.extensions.insert(snake_case(rule), extension);
    }

    pub fn add_implicit_extension(&mut self, rule: &str, extension: ExtensionFn) {
        self.implicit_extensions.insert(snake_case(rule), extension);
    }

    pub fn add_replacer(&mut self, rule: &str, replacer: ReplacerFn) {
        self.replacers.insert(snake_case(rule), replacer);
    }

    pub fn add_fallback_message(&mut self, rule: &str, message: impl Into<String>) {
        self.fallback_messages.insert(snake_case(rule), message.into());
    }

    pub fn extension(&self, rule: &str) -> Option<&ExtensionFn> {
        self.extensions.get(rule)
    }

    pub fn implicit_extension(&self, rule: &str) -> Option<&ExtensionFn> {
        self.implicit_extensions.get(rule)
    }

    pub fn replacer(&self, rule: &str) -> Option<&ReplacerFn> {
        self.replacers.get(rule)
    }

    pub fn fallback_message(&self, rule: &str) -> Option<&str> {
        self.fallback_messages.get(rule).map(String::as_str)
    }

    fn sorted(keys: impl Iterator<Item = String>) -> Vec<String> {
        let mut names: Vec<_> = keys.collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &Self::sorted(self.extensions.keys().cloned()))
            .field(
                "implicit_extensions",
                &Self::sorted(self.implicit_extensions.keys().cloned()),
            )
            .field("replacers", &Self::sorted(self.replacers.keys().cloned()))
            .field("fallback_messages", &self.fallback_messages)
            .finish()
    }
}
