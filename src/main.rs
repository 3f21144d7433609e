//! supportroute HTTP server

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use supportroute::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Arc::new(Config::from_file(&cli.config)?);

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting supportroute server on {}:{}",
        config.server.host,
        config.server.port
    );

    let state = AppState::from_config(config.clone()).await?;
    state.executor().health().clone().start_background_checks();

    let app = handlers::app(state);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Operations accepted at http://{}/v1/operations", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
