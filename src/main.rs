mod app;
mod auth;
mod config;
mod error;
mod state;
mod telemetry;
mod users;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init()?;

    let app_state = AppState::init().await?;
    if app_state.config.is_production() {
        tracing::info!("running in production mode");
    }

    let config = app_state.config.clone();
    let app = app::build_app(app_state);
    app::serve(app, &config).await
}
