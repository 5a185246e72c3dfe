//! Long-lived validator factory.
//!
//! Holds the message catalog, the shared presence verifier and the registry
//! of custom extensions. Registration takes `&mut self`; once configured, a
//! factory can be shared (e.g. behind an `Arc`) and `make` called from any
//! number of tasks. Each validator receives its own snapshot of the registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::extensions::ExtensionRegistry;
use crate::messages::MessageCatalog;
use crate::presence::PresenceVerifier;
use crate::rules::RuleSet;
use crate::types::Record;
use crate::validator::Validator;

pub struct Factory {
    messages: Arc<MessageCatalog>,
    verifier: Option<Arc<dyn PresenceVerifier>>,
    registry: ExtensionRegistry,
}

impl Factory {
    /// Create a factory. Without a catalog the built-in English messages are
    /// used.
    pub fn new(
        messages: Option<MessageCatalog>,
        verifier: Option<Arc<dyn PresenceVerifier>>,
    ) -> Self {
        Self {
            messages: Arc::new(messages.unwrap_or_else(MessageCatalog::builtin)),
            verifier,
            registry: ExtensionRegistry::new(),
        }
    }

    /// Build a validator for one record. Never touches the store.
    pub fn make<'a>(
        &self,
        data: &'a Record,
        rules: RuleSet,
        custom_attributes: HashMap<String, String>,
    ) -> Validator<'a> {
        let mut validator =
            Validator::new(Arc::clone(&self.messages), data, rules, custom_attributes);

        if let Some(verifier) = &self.verifier {
            validator.set_presence_verifier(Arc::clone(verifier));
        }

        self.add_extensions(&mut validator);
        validator
    }

    fn add_extensions(&self, validator: &mut Validator<'_>) {
        validator.add_extensions(self.registry.extensions.clone());
        // Implicit extensions run even when the field is absent from the data.
        validator.add_implicit_extensions(self.registry.implicit_extensions.clone());
        validator.add_replacers(self.registry.replacers.clone());
        validator.set_fallback_messages(self.registry.fallback_messages.clone());
    }

    /// Register (or replace) a custom rule. A registered rule takes precedence
    /// over a built-in of the same name.
    pub fn extend<F>(&mut self, rule: &str, extension: F, message: Option<&str>)
    where
        F: Fn(&str, &Value, &[String], &Record) -> bool + Send + Sync + 'static,
    {
        self.registry.add_extension(rule, Arc::new(extension));
        if let Some(message) = message {
            self.registry.add_fallback_message(rule, message);
        }
    }

    /// Register a custom rule that runs even when the field is empty.
    pub fn extend_implicit<F>(&mut self, rule: &str, extension: F, message: Option<&str>)
    where
        F: Fn(&str, &Value, &[String], &Record) -> bool + Send + Sync + 'static,
    {
        self.registry.add_implicit_extension(rule, Arc::new(extension));
        if let Some(message) = message {
            self.registry.add_fallback_message(rule, message);
        }
    }

    /// Register a message replacer for `rule`.
    pub fn replacer<F>(&mut self, rule: &str, replacer: F)
    where
        F: Fn(&str, &str, &str, &[String]) -> String + Send + Sync + 'static,
    {
        self.registry.add_replacer(rule, Arc::new(replacer));
    }

    pub fn presence_verifier(&self) -> Option<&Arc<dyn PresenceVerifier>> {
        self.verifier.as_ref()
    }

    /// Replace the verifier handed to validators made from now on.
    pub fn set_presence_verifier(&mut self, verifier: Arc<dyn PresenceVerifier>) {
        self.verifier = Some(verifier);
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("messages", &self.messages.len())
            .field("has_verifier", &self.verifier.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}
