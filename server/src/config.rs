//! Command line configuration for the server binary

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Authoritative maze defense game server")]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Session tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    pub tick_rate: u32,
    /// Maximum number of connected clients
    #[clap(long, default_value = "64")]
    pub max_clients: usize,
    /// Maximum number of concurrent sessions
    #[clap(long, default_value = "16")]
    pub max_sessions: usize,
    /// Seconds of silence before a client is dropped
    #[clap(long, default_value = "5")]
    pub client_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 60,
            max_clients: 64,
            max_sessions: 16,
            client_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}
