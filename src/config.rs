use crate::models::request::EventDefaults;
use crate::services::invocation::{InvocationKind, RelaySettings};
use crate::services::lister::ListerConfig;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Ten years.
pub const MAX_RECENT_WINDOW_HOURS: i64 = 87_600;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub recent_window_hours: i64,
    /// Fallback bucket and prefix names for events that omit them.
    pub defaults: EventDefaults,
}

/// What the process should do once the store is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    Invoke { kind: InvocationKind, event: PathBuf },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Resilient object relay: list, move, merge, plan and aggregate"
)]
pub struct Args {
    /// Host to bind to (overrides OBJECT_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides OBJECT_RELAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Look-back window of the recent-objects listing strategy, in hours
    /// (overrides OBJECT_RELAY_RECENT_WINDOW_HOURS)
    #[arg(long)]
    pub recent_window_hours: Option<i64>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "invoke")]
    pub migrate: bool,

    /// Run a single invocation instead of serving HTTP
    #[arg(long, value_enum, requires = "event")]
    pub invoke: Option<InvocationKind>,

    /// JSON event file for --invoke (`-` reads stdin)
    #[arg(long)]
    pub event: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("OBJECT_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("OBJECT_RELAY_PORT", 3000u16)?;
        let env_storage =
            env::var("OBJECT_RELAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("OBJECT_RELAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_relay.db".into());
        let env_window = env_parse("OBJECT_RELAY_RECENT_WINDOW_HOURS", 24i64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            recent_window_hours: args.recent_window_hours.unwrap_or(env_window),
            defaults: EventDefaults {
                source_bucket: env_non_empty("SOURCE_BUCKET"),
                dest_bucket: env_non_empty("DEST_BUCKET"),
                source_prefix: env_non_empty("SOURCE_PREFIX"),
                dest_prefix: env_non_empty("DEST_PREFIX"),
            },
        };

        if !(1..=MAX_RECENT_WINDOW_HOURS).contains(&cfg.recent_window_hours) {
            bail!(
                "recent window must be between 1 and {} hours, got {}",
                MAX_RECENT_WINDOW_HOURS,
                cfg.recent_window_hours
            );
        }

        let mode = match (args.invoke, args.event) {
            (Some(kind), Some(event)) => RunMode::Invoke { kind, event },
            (Some(_), None) => bail!("--invoke requires --event"),
            _ if args.migrate => RunMode::Migrate,
            _ => RunMode::Serve,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to every invocation.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            defaults: self.defaults.clone(),
            lister: ListerConfig::default().with_recent_window_hours(self.recent_window_hours),
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
