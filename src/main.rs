//! Feed snapshot job: binary entrypoint.
//!
//! `feed-snapshot [run]` performs one run and exits 0 on full success, 1 otherwise.
//! `feed-snapshot serve` exposes `POST /run`, `/health` and `/metrics` over HTTP.

use anyhow::Context;
use feed_snapshot::api::{create_router, AppState};
use feed_snapshot::ingest::config::load_config_default;
use feed_snapshot::metrics::Metrics;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` controls verbosity (default `info`); `LOG_FORMAT=json` for
/// machine-readable output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = load_config_default().context("loading pipeline config")?;
    tracing::info!(
        storage = %config.storage_target,
        categories = config.categories.len(),
        item_limit = config.item_limit,
        "config loaded"
    );

    match std::env::args().nth(1).as_deref() {
        None | Some("run") => {
            let resp = feed_snapshot::invoke(&config).await;
            println!("{}", serde_json::to_string(&resp)?);
            if !resp.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Some("serve") => {
            let metrics = Metrics::init()?;
            let app = create_router(AppState::from_config(config)).merge(metrics.router());
            let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(%addr, "listening");
            axum::serve(listener, app).await?;
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown command {other:?} (expected `run` or `serve`)"),
    }
}
