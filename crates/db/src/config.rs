/// Default pool size when `DATABASE_MAX_CONNECTIONS` is unset.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got `{value}`")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Database connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Upper bound on pooled connections (default: `5`).
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default    |
    /// |----------------------------|------------|
    /// | `DATABASE_URL`             | (required) |
    /// | `DATABASE_MAX_CONNECTIONS` | `5`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => parse_max_connections(&raw)?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            url,
            max_connections,
        })
    }
}

fn parse_max_connections(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::Invalid {
            name: "DATABASE_MAX_CONNECTIONS",
            expected: "positive integer",
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn new_uses_default_pool_size() {
        let config = DatabaseConfig::new("postgres://localhost/verity");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn max_connections_parses_trimmed_value() {
        assert_eq!(parse_max_connections(" 12 ").unwrap(), 12);
    }

    #[test]
    fn max_connections_rejects_zero_and_garbage() {
        assert_matches!(
            parse_max_connections("0"),
            Err(ConfigError::Invalid { name: "DATABASE_MAX_CONNECTIONS", .. })
        );
        assert_matches!(parse_max_connections("many"), Err(ConfigError::Invalid { .. }));
    }
}
