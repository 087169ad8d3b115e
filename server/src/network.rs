//! Server network layer: UDP transport, client registry and request routing
//!
//! The server owns three background tasks (receiver, sender, liveness
//! checker) and a main loop that routes decoded packets to the matchmaker or
//! to the session actors. Game state never lives here; sessions own it.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::{ServerError, SessionError};
use crate::matchmaker::{MatchDescriptor, MatchRequest, Matchmaker};
use crate::scheduler::{SessionCommand, SessionHandle};
use crate::session::Session;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ActionResult, GameMode, Packet, PlayerId, Reason, SessionId, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Largest datagram the receiver accepts.
pub const RECV_BUFFER_SIZE: usize = 65_536;
pub const MATCHMAKING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from network tasks and session actors to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientStale {
        client_id: PlayerId,
        session_id: Option<SessionId>,
    },
    ClientTimeout {
        client_id: PlayerId,
        session_id: Option<SessionId>,
    },
    MembershipChanged {
        session_id: SessionId,
        player_id: PlayerId,
        joined: bool,
    },
    SessionClosed {
        session_id: SessionId,
    },
    Shutdown,
}

/// Messages queued for the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    SendToPlayers {
        packet: Packet,
        players: Vec<PlayerId>,
    },
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    sessions: HashMap<SessionId, SessionHandle>,
    matchmaker: Matchmaker,
    config: ServerConfig,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(config.address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            sessions: HashMap::new(),
            matchmaker: Matchmaker::new(),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that can stop `run` from another task.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_to(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToPlayers { packet, players } => {
                        let addrs: Vec<(PlayerId, SocketAddr)> = {
                            let clients = clients.read().await;
                            players
                                .iter()
                                .filter_map(|id| clients.addr_of(*id).map(|addr| (*id, addr)))
                                .collect()
                        };
                        for (client_id, addr) in addrs {
                            if let Err(e) = send_packet_to(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(500));

            loop {
                ticker.tick().await;

                let liveness = {
                    let mut clients = clients.write().await;
                    clients.check_liveness(timeout, Instant::now())
                };

                let stale = liveness
                    .stale
                    .into_iter()
                    .map(|(client_id, session_id)| ServerMessage::ClientStale {
                        client_id,
                        session_id,
                    });
                let expired = liveness
                    .expired
                    .into_iter()
                    .map(|client| ServerMessage::ClientTimeout {
                        client_id: client.id,
                        session_id: client.session_id,
                    });
                for message in stale.chain(expired) {
                    if server_tx.send(message).is_err() {
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_player(&self, player: PlayerId, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::SendToPlayers {
            packet,
            players: vec![player],
        }) {
            error!("Failed to queue packet for player {}: {}", player, e);
        }
    }

    fn send_error(&self, player: PlayerId, reason: SessionError) {
        self.send_to_player(
            player,
            Packet::SessionError {
                reason: reason.to_string(),
            },
        );
    }

    fn route(&self, session_id: SessionId, command: SessionCommand) -> bool {
        match self.sessions.get(&session_id) {
            Some(handle) => handle.send(command),
            None => false,
        }
    }

    fn route_for_member(
        &self,
        client_id: PlayerId,
        session_id: Option<SessionId>,
        command: SessionCommand,
    ) {
        match session_id {
            Some(session_id) => {
                self.route(session_id, command);
            }
            None => self.send_error(client_id, SessionError::NotInSession),
        }
    }

    fn create_session(&mut self, mode: GameMode) -> Result<SessionId, SessionError> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::ServerAtCapacity);
        }
        let mut session_id: SessionId = rand::random();
        while self.sessions.contains_key(&session_id) {
            session_id = rand::random();
        }

        let session = Session::new(session_id, mode, Instant::now());
        let handle = SessionHandle::spawn(
            session,
            self.config.tick_interval(),
            self.game_tx.clone(),
            self.server_tx.clone(),
        );
        self.sessions.insert(session_id, handle);
        Ok(session_id)
    }

    fn start_match(&mut self, found: MatchDescriptor) {
        let players = found.player_ids();
        let session_id = match self.create_session(found.mode) {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not create session for match: {}", e);
                for player in players {
                    self.send_error(player, e);
                }
                return;
            }
        };

        for (player, name) in &found.players {
            self.send_to_player(
                *player,
                Packet::MatchFound {
                    session_id,
                    mode: found.mode,
                    players: players.clone(),
                },
            );
            self.route(
                session_id,
                SessionCommand::Join {
                    player: *player,
                    name: name.clone(),
                },
            );
        }
    }

    /// Takes a player out of the queue and their session.
    fn release_player(&mut self, client_id: PlayerId, session_id: Option<SessionId>) {
        self.matchmaker.cancel(client_id);
        if let Some(session_id) = session_id {
            self.route(session_id, SessionCommand::Leave { player: client_id });
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            name,
        } = &packet
        {
            self.handle_connect(*client_version, name, addr).await;
            return;
        }

        let client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        let Some(client_id) = client_id else {
            debug!("Packet from unknown address {}", addr);
            return;
        };

        let (recovered, session_id, name) = {
            let mut clients = self.clients.write().await;
            let recovered = clients.touch(client_id, Instant::now());
            let name = clients
                .get(client_id)
                .map(|client| client.name.clone())
                .unwrap_or_default();
            (recovered, clients.session_of(client_id), name)
        };
        if recovered {
            if let Some(session_id) = session_id {
                self.route(
                    session_id,
                    SessionCommand::SetConnected {
                        player: client_id,
                        connected: true,
                    },
                );
                // Deltas sent while it was unresponsive were not delivered.
                self.route(session_id, SessionCommand::SendSnapshot { player: client_id });
            }
        }

        match packet {
            Packet::Heartbeat => {}

            Packet::QueueForMatch { preferences } => {
                if session_id.is_some() {
                    return self.send_error(client_id, SessionError::AlreadyInSession);
                }
                let now = Instant::now();
                for player in self.matchmaker.prune(now) {
                    self.send_error(player, SessionError::QueueTimeout);
                }
                let request = MatchRequest::new(client_id, name, preferences, now);
                match self.matchmaker.enqueue(request) {
                    Some(position) => {
                        self.send_to_player(client_id, Packet::Queued { position });
                        if let Some(found) = self.matchmaker.find_match() {
                            self.start_match(found);
                        }
                    }
                    None => self.send_error(client_id, SessionError::AlreadyQueued),
                }
            }

            Packet::CancelQueue => {
                self.matchmaker.cancel(client_id);
            }

            Packet::CreateSession { mode } => {
                if session_id.is_some() {
                    return self.send_error(client_id, SessionError::AlreadyInSession);
                }
                match self.create_session(mode) {
                    Ok(new_id) => {
                        self.matchmaker.cancel(client_id);
                        self.route(
                            new_id,
                            SessionCommand::Join {
                                player: client_id,
                                name,
                            },
                        );
                    }
                    Err(e) => self.send_error(client_id, e),
                }
            }

            Packet::JoinSession {
                session_id: target,
            } => {
                if session_id.is_some_and(|current| current != target) {
                    return self.send_error(client_id, SessionError::AlreadyInSession);
                }
                if !self.sessions.contains_key(&target) {
                    return self.send_error(client_id, SessionError::SessionNotFound);
                }
                self.matchmaker.cancel(client_id);
                self.route(
                    target,
                    SessionCommand::Join {
                        player: client_id,
                        name,
                    },
                );
            }

            Packet::LeaveSession => {
                self.route_for_member(client_id, session_id, SessionCommand::Leave { player: client_id });
            }

            Packet::StartSession => {
                self.route_for_member(client_id, session_id, SessionCommand::Start { player: client_id });
            }
            Packet::PauseSession => {
                self.route_for_member(client_id, session_id, SessionCommand::Pause { player: client_id });
            }
            Packet::ResumeSession => {
                self.route_for_member(client_id, session_id, SessionCommand::Resume { player: client_id });
            }
            Packet::EndSession => {
                self.route_for_member(client_id, session_id, SessionCommand::End { player: client_id });
            }

            Packet::Action {
                request_id,
                action_type,
                payload,
            } => {
                let routed = session_id.is_some_and(|session_id| {
                    self.route(
                        session_id,
                        SessionCommand::Action {
                            player: client_id,
                            request_id,
                            action_type,
                            payload,
                        },
                    )
                });
                if !routed {
                    self.send_to_player(
                        client_id,
                        Packet::ActionResult {
                            request_id,
                            result: ActionResult::rejected(Reason::PlayerNotFound),
                        },
                    );
                }
            }

            Packet::Disconnect => {
                self.release_player(client_id, session_id);
                let mut clients = self.clients.write().await;
                clients.remove_client(client_id);
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, name: &str, addr: SocketAddr) {
        info!(
            "Client {} connecting from {} (version: {})",
            name, addr, client_version
        );
        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A reconnect from the same address replaces the old client.
        let existing = {
            let mut clients = self.clients.write().await;
            clients
                .find_client_by_addr(addr)
                .and_then(|id| clients.remove_client(id))
        };
        if let Some(old) = existing {
            info!("Replacing client {} from {}", old.id, addr);
            self.release_player(old.id, old.session_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, name)
        };
        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(response, addr);
    }

    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
            }
            ServerMessage::ClientStale {
                client_id,
                session_id,
            } => {
                debug!("Client {} is unresponsive", client_id);
                if let Some(session_id) = session_id {
                    self.route(
                        session_id,
                        SessionCommand::SetConnected {
                            player: client_id,
                            connected: false,
                        },
                    );
                }
            }
            ServerMessage::ClientTimeout {
                client_id,
                session_id,
            } => {
                info!("Client {} timed out", client_id);
                self.release_player(client_id, session_id);
            }
            ServerMessage::MembershipChanged {
                session_id,
                player_id,
                joined,
            } => {
                let mut clients = self.clients.write().await;
                if joined {
                    clients.set_session(player_id, Some(session_id));
                } else if clients.session_of(player_id) == Some(session_id) {
                    clients.set_session(player_id, None);
                }
            }
            ServerMessage::SessionClosed { session_id } => {
                if let Some(handle) = self.sessions.remove(&session_id) {
                    handle.shutdown().await;
                }
                let mut clients = self.clients.write().await;
                let detached = clients.clear_session(session_id);
                info!(
                    "Session {} closed, {} clients detached",
                    session_id,
                    detached.len()
                );
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    fn sweep_matchmaker(&mut self) {
        let outcome = self.matchmaker.sweep(Instant::now());
        for player in outcome.evicted {
            self.send_error(player, SessionError::QueueTimeout);
        }
        for found in outcome.matches {
            self.start_match(found);
        }
    }

    /// Main server loop. Returns after a `Shutdown` message, once every
    /// session actor has stopped.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut sweep = interval(MATCHMAKING_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message).await,
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                _ = sweep.tick() => {
                    self.sweep_matchmaker();
                    self.sessions.retain(|id, handle| {
                        if handle.is_finished() {
                            debug!("Dropping finished session {}", id);
                        }
                        !handle.is_finished()
                    });
                },
            }
        }

        for (_, handle) in self.sessions.drain() {
            handle.shutdown().await;
        }
        Ok(())
    }
}

async fn send_packet_to(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MatchPreferences, SessionStatus, SkillTier};

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..Default::default()
        }
    }

    async fn start_server() -> (SocketAddr, mpsc::UnboundedSender<ServerMessage>) {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let control = server.control();
        tokio::spawn(async move {
            server.run().await.unwrap();
        });
        (addr, control)
    }

    async fn connect(server: SocketAddr, name: &str) -> (UdpSocket, PlayerId) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(&socket, server, &Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
        })
        .await;
        match recv(&socket).await {
            Packet::Connected { client_id } => (socket, client_id),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) {
        socket
            .send_to(&serialize(packet).unwrap(), server)
            .await
            .unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    async fn recv_until(socket: &UdpSocket, matches: impl Fn(&Packet) -> bool) -> Packet {
        loop {
            let packet = recv(socket).await;
            if matches(&packet) {
                return packet;
            }
        }
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let packet = Packet::QueueForMatch {
            preferences: MatchPreferences {
                party_size: 2,
                skill: SkillTier::Gold,
                mode: GameMode::Cooperative,
                region: "eu".to_string(),
            },
        };
        let bytes = serialize(&packet).unwrap();
        assert!(bytes.len() < RECV_BUFFER_SIZE);
        match deserialize::<Packet>(&bytes).unwrap() {
            Packet::QueueForMatch { preferences } => assert_eq!(preferences.region, "eu"),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_bind_reports_ephemeral_port() {
        tokio_test::block_on(async {
            let server = Server::new(test_config()).await.unwrap();
            let addr = server.local_addr().unwrap();
            assert_ne!(addr.port(), 0);
            assert!(addr.ip().is_loopback());
        });
    }

    #[tokio::test]
    async fn test_connect_assigns_ids() {
        let (addr, control) = start_server().await;
        let (_a, first) = connect(addr, "ada").await;
        let (_b, second) = connect(addr, "bo").await;
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let (addr, control) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(&socket, addr, &Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            name: "old".to_string(),
        })
        .await;
        match recv(&socket).await {
            Packet::Disconnected { reason } => assert!(reason.contains("version")),
            other => panic!("unexpected packet {:?}", other),
        }
        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_session_requests_without_session_are_refused() {
        let (addr, control) = start_server().await;
        let (socket, _) = connect(addr, "ada").await;

        send(&socket, addr, &Packet::StartSession).await;
        match recv(&socket).await {
            Packet::SessionError { reason } => assert_eq!(reason, "not_in_session"),
            other => panic!("unexpected packet {:?}", other),
        }

        send(&socket, addr, &Packet::EndSession).await;
        match recv(&socket).await {
            Packet::SessionError { reason } => assert_eq!(reason, "not_in_session"),
            other => panic!("unexpected packet {:?}", other),
        }

        send(&socket, addr, &Packet::JoinSession { session_id: 12345 }).await;
        match recv(&socket).await {
            Packet::SessionError { reason } => assert_eq!(reason, "session_not_found"),
            other => panic!("unexpected packet {:?}", other),
        }
        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_create_and_join_session() {
        let (addr, control) = start_server().await;
        let (host, host_id) = connect(addr, "ada").await;
        let (guest, guest_id) = connect(addr, "bo").await;

        send(&host, addr, &Packet::CreateSession {
            mode: GameMode::Competitive,
        })
        .await;
        let session_id = match recv_until(&host, |p| matches!(p, Packet::SessionJoined { .. })).await {
            Packet::SessionJoined {
                session_id,
                player_id,
            } => {
                assert_eq!(player_id, host_id);
                session_id
            }
            other => panic!("unexpected packet {:?}", other),
        };

        send(&guest, addr, &Packet::JoinSession { session_id }).await;
        match recv_until(&guest, |p| matches!(p, Packet::FullSnapshot(_))).await {
            Packet::FullSnapshot(snapshot) => {
                assert_eq!(snapshot.session_id, session_id);
                assert_eq!(snapshot.players.len(), 2);
                assert!(snapshot.players.iter().any(|p| p.id == guest_id));
            }
            other => panic!("unexpected packet {:?}", other),
        }
        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_end_session_reaches_every_member() {
        let (addr, control) = start_server().await;
        let (host, _) = connect(addr, "ada").await;
        let (guest, _) = connect(addr, "bo").await;

        send(&host, addr, &Packet::CreateSession {
            mode: GameMode::Competitive,
        })
        .await;
        let session_id = match recv_until(&host, |p| matches!(p, Packet::SessionJoined { .. })).await {
            Packet::SessionJoined { session_id, .. } => session_id,
            other => panic!("unexpected packet {:?}", other),
        };
        send(&guest, addr, &Packet::JoinSession { session_id }).await;
        recv_until(&guest, |p| matches!(p, Packet::FullSnapshot(_))).await;

        send(&host, addr, &Packet::StartSession).await;
        recv_until(&guest, |p| {
            matches!(p, Packet::SessionStatusChanged { status: SessionStatus::Active, .. })
        })
        .await;

        send(&guest, addr, &Packet::EndSession).await;
        for socket in [&host, &guest] {
            match recv_until(socket, |p| {
                matches!(p, Packet::SessionStatusChanged { status: SessionStatus::Ended, .. })
            })
            .await
            {
                Packet::SessionStatusChanged { session_id: ended, .. } => assert_eq!(ended, session_id),
                other => panic!("unexpected packet {:?}", other),
            }
        }
        control.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_matchmaking_pairs_two_players() {
        let (addr, control) = start_server().await;
        let (a, _) = connect(addr, "ada").await;
        let (b, _) = connect(addr, "bo").await;
        let preferences = MatchPreferences {
            party_size: 2,
            skill: SkillTier::Silver,
            mode: GameMode::Cooperative,
            region: "any".to_string(),
        };

        send(&a, addr, &Packet::QueueForMatch {
            preferences: preferences.clone(),
        })
        .await;
        match recv(&a).await {
            Packet::Queued { position } => assert_eq!(position, 1),
            other => panic!("unexpected packet {:?}", other),
        }
        send(&b, addr, &Packet::QueueForMatch { preferences }).await;

        for socket in [&a, &b] {
            match recv_until(socket, |p| matches!(p, Packet::MatchFound { .. })).await {
                Packet::MatchFound { mode, players, .. } => {
                    assert_eq!(mode, GameMode::Cooperative);
                    assert_eq!(players.len(), 2);
                }
                other => panic!("unexpected packet {:?}", other),
            }
        }
        control.send(ServerMessage::Shutdown).unwrap();
    }
}
