// src/main.rs
mod allocator;
mod api;
mod catalog;
mod config;
mod logging;
mod model;
mod strategy;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};

use api::ApiState;
use catalog::InMemoryCatalog;
use config::AppConfig;
use logging::LogFormat;

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();
    logging::init(LogFormat::from_env());

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!(error = %err, "could not load .env");
        }
    }

    let app_config = AppConfig::from_env();
    let limits = app_config.engine.limits();
    info!(
        max_items = limits.max_items,
        max_containers = limits.max_containers,
        max_total_units = limits.max_total_units,
        "allocation service starting"
    );

    let catalog = Arc::new(InMemoryCatalog::new());
    if app_config.seed.demo() {
        match catalog.seed_demo().await {
            Ok(seed) => info!(
                admin = %seed.admin,
                user = %seed.user,
                containers = ?seed.containers,
                "demo data loaded; send x-actor-id with one of the listed users"
            ),
            Err(err) => warn!(error = %err, "demo data could not be loaded"),
        }
    }

    let state = ApiState::new(catalog, limits);
    if let Err(err) = api::start_api_server(app_config.api.clone(), state).await {
        error!(error = %err, "API server terminated with an error");
        std::process::exit(1);
    }
}
