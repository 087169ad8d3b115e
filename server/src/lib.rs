//! # Maze Defense Server Library
//!
//! Authoritative server for a multiplayer maze-defense game. Players build a
//! maze out of tetromino pieces, place towers on or beside it, and defend
//! against waves of enemies that follow the shortest route through the maze.
//! Two modes are supported: a competitive mode where each player defends a
//! private board, and a cooperative mode where two players take turns on one
//! shared board with a pooled economy.
//!
//! ## Architecture
//!
//! ### Network Loop
//! A single UDP socket is served by three background tasks (receiver,
//! sender, liveness checker) and a main loop that owns the client registry,
//! the matchmaking queue, and a handle for every running session.
//!
//! ### Session Actors
//! Every session runs in its own tokio task. The actor owns the session
//! outright and serializes player commands with simulation ticks, so no game
//! state is ever shared between tasks.
//!
//! ### Snapshots
//! Joining players receive a full snapshot. After that every tick flushes the
//! entities that changed into a versioned delta snapshot.
//!
//! ## Module Organization
//!
//! - `pathfinder`: A* over the build grid
//! - `rate_limiter`: sliding-window limits per player and action
//! - `gateway`: action parsing, rate limiting and dispatch
//! - `simulation`: world state plus the competitive and cooperative rules
//! - `session`: lifecycle, membership and snapshots for one game
//! - `scheduler`: the tokio actor that drives a session
//! - `matchmaker`: the queue that groups compatible players
//! - `client_manager`: connected clients and their liveness
//! - `network`: UDP transport and request routing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         ..Default::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod error;
pub mod gateway;
pub mod matchmaker;
pub mod network;
pub mod pathfinder;
pub mod rate_limiter;
pub mod scheduler;
pub mod session;
pub mod simulation;
