//! Headless bot that connects to a server, queues for a match and plays
//! random actions. Useful for load testing and for filling a session while
//! developing a real client.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use shared::rules::{self, BOARD_SIZE};
use shared::{
    GameMode, GridCell, MatchPreferences, Packet, PlayerId, SessionStatus, SkillTier,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Random-play bot for the maze defense server")]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Display name
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Play cooperative instead of competitive
    #[clap(long)]
    cooperative: bool,
    /// Players per match
    #[clap(long, default_value = "2")]
    party_size: u8,
    /// Seconds to play before disconnecting
    #[clap(short, long, default_value = "60")]
    duration: u64,
    /// Milliseconds between actions
    #[clap(long, default_value = "250")]
    action_interval: u64,
}

const SHAPES: [&str; 7] = ["I", "O", "T", "L", "J", "S", "Z"];
const TOWERS: [&str; 4] = ["basic", "sniper", "cannon", "missile"];

struct Bot {
    socket: UdpSocket,
    server: SocketAddr,
    id: PlayerId,
    board: GridCell,
    active: bool,
    next_request: u32,
    towers: Vec<u32>,
}

impl Bot {
    async fn send(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(&serialize(packet)?, self.server).await?;
        Ok(())
    }

    fn handle(&mut self, packet: Packet, mode: GameMode) {
        match packet {
            Packet::Queued { position } => info!("Queued at position {}", position),
            Packet::MatchFound {
                session_id,
                players,
                ..
            } => {
                info!("Matched into session {} with {:?}", session_id, players);
                let slot = players.iter().position(|p| *p == self.id).unwrap_or(0);
                if mode == GameMode::Competitive {
                    self.board = rules::board_origin(slot);
                }
            }
            Packet::SessionStatusChanged { status, .. } => {
                info!("Session is now {}", status);
                self.active = status == SessionStatus::Active;
            }
            Packet::FullSnapshot(snapshot) => {
                self.active = snapshot.status == SessionStatus::Active;
                self.towers = snapshot
                    .towers
                    .iter()
                    .filter(|t| t.owner == self.id)
                    .map(|t| t.id)
                    .collect();
            }
            Packet::DeltaSnapshot(delta) => {
                for (id, tower) in delta.towers {
                    match tower {
                        Some(tower) if tower.owner == self.id => {
                            if !self.towers.contains(&id) {
                                self.towers.push(id);
                            }
                        }
                        None => self.towers.retain(|t| *t != id),
                        _ => {}
                    }
                }
            }
            Packet::ActionResult { request_id, result } => {
                debug!("Request {} accepted={} {:?}", request_id, result.accepted, result.reason);
            }
            Packet::SessionError { reason } => warn!("Session error: {}", reason),
            Packet::Disconnected { reason } => warn!("Disconnected: {}", reason),
            _ => {}
        }
    }

    fn random_action(&mut self) -> Packet {
        let mut rng = rand::thread_rng();
        let x = self.board.x + rng.gen_range(0..BOARD_SIZE);
        let y = self.board.y + rng.gen_range(0..BOARD_SIZE);

        let (action_type, payload) = match rng.gen_range(0..10) {
            0..=3 => (
                "place_maze_piece",
                json!({
                    "shape": SHAPES.choose(&mut rng).copied().unwrap_or("O"),
                    "x": x,
                    "y": y,
                    "rotation": rng.gen_range(0..4),
                }),
            ),
            4..=6 => (
                "place_tower",
                json!({
                    "tower_type": TOWERS.choose(&mut rng).copied().unwrap_or("basic"),
                    "x": x,
                    "y": y,
                }),
            ),
            7 if !self.towers.is_empty() => (
                "upgrade_tower",
                json!({ "tower_id": self.towers.choose(&mut rng).copied().unwrap_or(0) }),
            ),
            8 if !self.towers.is_empty() => (
                "sell_tower",
                json!({ "tower_id": self.towers.choose(&mut rng).copied().unwrap_or(0) }),
            ),
            _ => ("player_ready", json!({})),
        };

        self.next_request += 1;
        Packet::Action {
            request_id: self.next_request,
            action_type: action_type.to_string(),
            payload: payload.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server = args.server.parse::<SocketAddr>()?;
    info!("Bot socket bound to {}", socket.local_addr()?);

    let mut bot = Bot {
        socket,
        server,
        id: 0,
        board: rules::board_origin(0),
        active: false,
        next_request: 0,
        towers: Vec::new(),
    };

    bot.send(&Packet::Connect {
        client_version: PROTOCOL_VERSION,
        name: args.name.clone(),
    })
    .await?;

    let mut buf = vec![0u8; 65_536];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), bot.socket.recv_from(&mut buf)).await??;
    match deserialize::<Packet>(&buf[..len])? {
        Packet::Connected { client_id } => {
            info!("Connected with client ID {}", client_id);
            bot.id = client_id;
        }
        other => return Err(format!("expected Connected, got {:?}", other).into()),
    }

    let mode = if args.cooperative {
        GameMode::Cooperative
    } else {
        GameMode::Competitive
    };
    bot.send(&Packet::QueueForMatch {
        preferences: MatchPreferences {
            party_size: args.party_size,
            skill: SkillTier::Gold,
            mode,
            region: "any".to_string(),
        },
    })
    .await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut heartbeat = interval(Duration::from_secs(1));
    let mut actions = interval(Duration::from_millis(args.action_interval.max(1)));

    while Instant::now() < deadline {
        tokio::select! {
            received = bot.socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => bot.handle(packet, mode),
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            },
            _ = heartbeat.tick() => bot.send(&Packet::Heartbeat).await?,
            _ = actions.tick() => {
                if bot.active {
                    let action = bot.random_action();
                    bot.send(&action).await?;
                }
            },
        }
    }

    bot.send(&Packet::Disconnect).await?;
    info!("Bot finished after {} actions", bot.next_request);
    Ok(())
}
