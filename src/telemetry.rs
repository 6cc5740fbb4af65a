use std::{fs::OpenOptions, sync::Mutex};

use anyhow::Context;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// `RUST_LOG` sets the filter, `LOG_FORMAT=json` switches stdout to JSON lines,
/// and `LOG_ERROR_FILE` additionally appends error events as JSON to that file.
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("userhub=debug,axum=info,tower_http=info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if json_logs {
        layers.push(fmt::layer().with_target(false).json().boxed());
    } else {
        layers.push(fmt::layer().boxed());
    }

    if let Some(path) = std::env::var("LOG_ERROR_FILE").ok().filter(|p| !p.is_empty()) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open error log {path}"))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
