/// Failure raised by a presence verifier's backing store.
///
/// Wraps whatever the store client produced (`sqlx::Error` for the database
/// verifier) so the core crate stays free of storage dependencies.
#[derive(Debug, thiserror::Error)]
#[error("Presence store error: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl StoreError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Build a store error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown validation rule: {rule}")]
    UnknownRule { rule: String },

    #[error("Rule `{rule}` needs a presence verifier but none is configured")]
    MissingPresenceVerifier { rule: String },

    #[error("Rule `{rule}` requires at least {expected} parameter(s)")]
    MissingParameters { rule: String, expected: usize },

    #[error("Invalid parameter for rule `{rule}`: {message}")]
    InvalidParameter { rule: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// True for every variant caused by a bad rule set or engine setup,
    /// as opposed to a failing backing store.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, CoreError::Store(_))
    }

    pub(crate) fn invalid_parameter(rule: &str, message: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_not_configuration_errors() {
        let err = CoreError::from(StoreError::msg("connection refused"));
        assert!(!err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Presence store error: connection refused"
        );
    }

    #[test]
    fn unknown_rule_is_configuration_error() {
        let err = CoreError::UnknownRule {
            rule: "frobnicate".into(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Unknown validation rule: frobnicate");
    }
}
