use actix_web::{web, App, HttpServer};
use log::{error, info, warn};

use binkeeper::api;
use binkeeper::app_state::AppState;
use binkeeper::config::{AppConfig, LoggingConfig};

/// Log config read before `config.yaml`, so loading the config is logged too
fn init_logging(config_file: &str) -> Option<log4rs::Handle> {
    let loaded = log4rs::config::load_config_file(config_file, Default::default())
        .map_err(|e| e.to_string())
        .and_then(|config| log4rs::init_config(config).map_err(|e| e.to_string()));
    match loaded {
        Ok(handle) => Some(handle),
        Err(e) => {
            env_logger::init();
            warn!("Could not load log config {}: {}. Using env_logger.", config_file, e);
            None
        }
    }
}

/// Switch to the log config named in `config.yaml` when it differs from the bootstrap one
fn apply_logging_config(handle: Option<&log4rs::Handle>, bootstrap: &str, wanted: &str) {
    let Some(handle) = handle else { return };
    if wanted == bootstrap {
        return;
    }
    match log4rs::config::load_config_file(wanted, Default::default()) {
        Ok(config) => {
            handle.set_config(config);
            info!("Log config switched to {}", wanted);
        }
        Err(e) => warn!("Could not load log config {}: {}. Keeping {}.", wanted, e, bootstrap),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let bootstrap = LoggingConfig::default().config_file;
    let log_handle = init_logging(&bootstrap);

    let config = AppConfig::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    apply_logging_config(log_handle.as_ref(), &bootstrap, &config.logging.config_file);

    let state = AppState::from_config(config.clone()).map_err(|e| {
        error!("Failed to initialize application state: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    info!("Starting server on {}:{}", config.server.host, config.server.port);
    let data = web::Data::new(state.clone());

    // Upload bodies are streamed; their size limit is enforced by the upload handler.
    let result = HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(data.clone())
            .configure(api::configure)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await;

    state.shutdown().await;
    result
}
