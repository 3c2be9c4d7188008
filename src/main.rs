use anyhow::{Context, Result};
use axum::Router;
use object_relay::{
    config::{AppConfig, RunMode},
    routes::routes::routes,
    services::{
        invocation::{InvocationKind, RelaySettings, invoke},
        local_store::LocalStore,
    },
    state::AppState,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{
    fs,
    io::{ErrorKind, Read},
    path::Path,
    process::ExitCode,
    str::FromStr,
    sync::Arc,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    // Logs go to stderr so --invoke output on stdout stays pure JSON.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-relay with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let store = LocalStore::new(db, cfg.storage_dir.clone());
    let applied = store.migrate().await?;
    tracing::debug!("Applied {} schema statements", applied);

    match mode {
        RunMode::Migrate => {
            tracing::info!("Database migration complete.");
            Ok(ExitCode::SUCCESS)
        }
        RunMode::Invoke { kind, event } => {
            run_once(&store, &cfg.relay_settings(), kind, &event).await
        }
        RunMode::Serve => {
            serve(&cfg, store).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs one invocation, prints the response on stdout and exits non-zero
/// when it failed.
async fn run_once(
    store: &LocalStore,
    settings: &RelaySettings,
    kind: InvocationKind,
    event_path: &Path,
) -> Result<ExitCode> {
    let raw = if event_path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(event_path)
            .with_context(|| format!("reading event file {}", event_path.display()))?
    };
    let event: Value = serde_json::from_str(&raw).context("event is not valid JSON")?;

    let response = invoke(kind, store, settings, event).await;
    println!("{}", serde_json::to_string_pretty(&response.payload)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(cfg: &AppConfig, store: LocalStore) -> Result<()> {
    let state = AppState::new(store, cfg.relay_settings());
    let app: Router = routes().with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
