use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{Server, ServerMessage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    info!(
        "Starting maze defense server on {} at {} Hz",
        config.address(),
        config.tick_rate
    );

    let mut server = Server::new(config).await?;

    let control = server.control();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = control.send(ServerMessage::Shutdown);
    });

    server.run().await?;

    Ok(())
}
