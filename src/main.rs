//! Forms Admin server binary.

use clap::Parser;
use forms_admin::config::DATA_PATH_DEFAULT;
use forms_admin::{http, FormStore, OnLoadFailure, StoreConfig};
use forms_admin::{APP_NAME, APP_VERSION, HTTP_BIND_ADDRESS_DEFAULT};
use std::sync::Arc;

// =============================================================================
// CLI
// =============================================================================

/// Role-gated forms administration service
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Forms administration API backed by a JSON record store")]
#[command(version)]
struct Cli {
    /// HTTP API bind address
    #[arg(short, long, default_value = HTTP_BIND_ADDRESS_DEFAULT)]
    bind: String,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON document holding the forms
    #[arg(long, default_value = DATA_PATH_DEFAULT)]
    data_path: String,

    /// What to do if the forms document cannot be loaded or repaired
    #[arg(long, value_enum, default_value_t = OnLoadFailure::UseEmpty)]
    on_load_failure: OnLoadFailure,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("{} v{}", APP_NAME, APP_VERSION);

    let config = StoreConfig::from_raw_path(&cli.data_path, cli.on_load_failure)?;
    tracing::info!(
        data_path = %config.data_path.display(),
        on_load_failure = ?config.on_load_failure,
        "Opening form store"
    );
    let store = Arc::new(FormStore::open(&config));

    // Load eagerly so a bad document shows up in the logs at startup
    match store.load().await {
        Ok(forms) => tracing::info!(count = forms.len(), "Form store ready"),
        Err(e) => tracing::error!(error = %e, "Form store not loaded, will retry on first request"),
    }

    tracing::info!("Starting HTTP server on {}", cli.bind);
    let addr: std::net::SocketAddr = cli.bind.parse()?;
    let app = http::router(store);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
