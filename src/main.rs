// Entry point for fluxim-server: an image generation relay in front of Replicate.
// Loads configuration, opens the log file, wires the request pipeline and
// serves the HTTP API next to the static web client.

mod artifact;
mod config;
mod dispatch;
mod file_name;
mod logging;
mod materialize;
mod metadata;
mod purge;
mod registry;
mod shutdown_signal;
mod timestamp;
mod upstream;
mod web;

use artifact::ArtifactWriter;
use clap::Parser;
use config::{AppConfig, ConfigError, RelayConfig};
use dispatch::Dispatcher;
use file_name::FileNameGenerator;
use materialize::Materializer;
use registry::ModelRegistry;
use shutdown_signal::shutdown_signal;
use std::{net::SocketAddr, sync::Arc};
use upstream::ReplicateClient;

fn fatal(err: ConfigError) -> ! {
    tracing::error!("FATAL: {}", err);
    eprintln!("FATAL: {}. Exiting.", err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let app_config = AppConfig::parse();

    // Validated before the log file exists, so failures here only reach stderr.
    let config = Arc::new(RelayConfig::try_from(app_config).unwrap_or_else(|e| fatal(e)));

    if let Err(e) = logging::init(&config.log_file, &config.locale, config.debug) {
        eprintln!(
            "FATAL: Cannot open log file {}: {}. Exiting.",
            config.log_file.display(),
            e
        );
        std::process::exit(1);
    }

    tracing::info!("Starting {} {}...", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.prepare_output_dir() {
        fatal(e);
    }
    tracing::info!("Writing images to {}", config.output_dir.display());
    if config.passwords.is_empty() {
        tracing::warn!("No passwords configured. Every generation request will be rejected.");
    }

    let generator = ReplicateClient::from_config(&config)
        .unwrap_or_else(|e| fatal(ConfigError::UpstreamClient(e.to_string())));

    let materializer = Materializer::new(
        config.output_dir.clone(),
        FileNameGenerator::new(config.file_prefix.clone()),
        ArtifactWriter::new(config.embed_metadata),
    );
    let registry = ModelRegistry::builtin();
    tracing::info!("{} model(s) available", registry.list().count());

    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        registry,
        Arc::new(generator),
        materializer,
    ));

    let purge_task = purge::spawn_purge_task(
        config.output_dir.clone(),
        config.purge_older_than_hours,
        config.purge_interval,
    );

    let app = web::create_app(dispatcher, &config.public_dir);
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    // Peer addresses feed the client address logged for each request.
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    if let Some(task) = purge_task {
        task.abort();
    }

    tracing::info!("{} has shut down.", env!("CARGO_PKG_NAME"));
}
