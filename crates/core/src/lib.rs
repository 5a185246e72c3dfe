//! Rule-based record validation.
//!
//! A [`Factory`] holds the message catalog, an optional [`PresenceVerifier`]
//! and any custom rule extensions; [`Factory::make`] produces a [`Validator`]
//! for one record and rule set. No database dependencies live here; the
//! Postgres presence verifier is in `verity-db`.

pub mod builtin;
pub mod error;
mod evaluator;
pub mod extensions;
pub mod factory;
pub mod failures;
pub mod messages;
pub mod presence;
pub mod rules;
pub mod types;
pub mod validator;

pub use builtin::BuiltinRule;
pub use error::{CoreError, StoreError};
pub use extensions::{ExtensionFn, ExtensionRegistry, ReplacerFn};
pub use factory::Factory;
pub use failures::MessageBag;
pub use messages::MessageCatalog;
pub use presence::{InMemoryPresenceVerifier, MemoryStore, PresenceVerifier};
pub use rules::{parse_rules, Rule, RuleSet};
pub use types::Record;
pub use validator::Validator;
