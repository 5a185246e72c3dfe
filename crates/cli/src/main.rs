//! `verity`: validate a JSON record against a JSON rule set.
//!
//! Prints `{"passes": .., "errors": {..}}` on stdout. Exits 0 when the record
//! passes, 1 when it fails validation and 2 on any other error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verity_core::{Factory, MessageBag, MessageCatalog, Record, RuleSet};
use verity_db::{ConfigError, DatabaseConfig, DatabasePresenceVerifier};

#[derive(Parser, Debug)]
#[command(name = "verity", version, about = "Validate a JSON record against a rule set")]
struct Args {
    /// JSON object holding the record to validate.
    #[arg(long, env = "VERITY_DATA")]
    data: PathBuf,

    /// JSON object mapping fields to rules (piped string, list or structured).
    #[arg(long, env = "VERITY_RULES")]
    rules: PathBuf,

    /// Message catalog overlaid on the built-in English messages.
    #[arg(long, env = "VERITY_MESSAGES")]
    messages: Option<PathBuf>,

    /// JSON object mapping fields to display names.
    #[arg(long, env = "VERITY_ATTRIBUTES")]
    attributes: Option<PathBuf>,

    /// Postgres URL for `unique` / `exists` rules. Falls back to
    /// `DATABASE_URL` / `DATABASE_MAX_CONNECTIONS`.
    #[arg(long)]
    database_url: Option<String>,

    /// Pool size when a database is used.
    #[arg(long)]
    max_connections: Option<u32>,
}

#[derive(Serialize)]
struct Report<'a> {
    passes: bool,
    errors: &'a MessageBag,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verity_cli=info,verity_core=info,verity_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let result = run(args, DatabaseConfig::from_env).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Validation aborted");
        eprintln!("error: {e:#}");
    }
    ExitCode::from(exit_status(&result))
}

/// 0 when the record passes, 1 when it fails validation, 2 on any other error.
fn exit_status(result: &Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

async fn run(
    args: Args,
    from_env: impl FnOnce() -> Result<DatabaseConfig, ConfigError>,
) -> Result<bool> {
    let data: Record = read_json(&args.data).context("failed to load record")?;
    let rules: RuleSet = read_json(&args.rules).context("failed to load rules")?;

    let attributes: HashMap<String, String> = match &args.attributes {
        Some(path) => read_json(path).context("failed to load attribute names")?,
        None => HashMap::new(),
    };

    let mut catalog = MessageCatalog::builtin();
    if let Some(path) = &args.messages {
        catalog.merge(MessageCatalog::from_json_file(path)?);
    }

    let mut factory = Factory::new(Some(catalog), None);

    if let Some(config) = database_config(&args, from_env)? {
        let pool = verity_db::create_pool(&config)
            .await
            .context("failed to connect to database")?;
        verity_db::health_check(&pool)
            .await
            .context("database health check failed")?;
        factory.set_presence_verifier(Arc::new(DatabasePresenceVerifier::new(pool)));
    }

    tracing::info!(fields = rules.len(), "Validating record");

    let mut validator = factory.make(&data, rules, attributes);
    let passes = validator.validate().await?;

    let report = Report {
        passes,
        errors: validator.failures(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(passes)
}

/// Flags win over the environment. No URL anywhere means no presence verifier.
fn database_config(
    args: &Args,
    from_env: impl FnOnce() -> Result<DatabaseConfig, ConfigError>,
) -> Result<Option<DatabaseConfig>> {
    let mut config = match &args.database_url {
        Some(url) => DatabaseConfig::new(url.clone()),
        None => match from_env() {
            Ok(config) => config,
            Err(ConfigError::Missing(_)) => return Ok(None),
            Err(e) => return Err(e).context("invalid database configuration"),
        },
    };
    if let Some(max) = args.max_connections {
        config.max_connections = max;
    }
    Ok(Some(config))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}
