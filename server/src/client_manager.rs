//! Registry of connected clients
//!
//! Tracks each client's address, display name, the session they currently
//! belong to, and when we last heard from them. Liveness has two stages: a
//! client silent for half the timeout is flagged unresponsive so its session
//! can mark the player disconnected, and a client silent for the full timeout
//! is removed.

use log::info;
use shared::{PlayerId, SessionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Client {
    pub id: PlayerId,
    pub addr: SocketAddr,
    pub name: String,
    pub last_seen: Instant,
    pub session_id: Option<SessionId>,
    /// Cleared once the client has been silent for half the timeout.
    pub responsive: bool,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            id,
            addr,
            name: name.into(),
            last_seen: Instant::now(),
            session_id: None,
            responsive: true,
        }
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        self.silent_for(now) > timeout
    }
}

/// Result of one liveness pass.
#[derive(Debug, Default)]
pub struct Liveness {
    /// Clients that just became unresponsive, with their session.
    pub stale: Vec<(PlayerId, Option<SessionId>)>,
    /// Clients removed for exceeding the timeout.
    pub expired: Vec<Client>,
}

pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    next_client_id: PlayerId,
    max_clients: usize,
}

impl ClientManager {
    /// Client ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns `None` when the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, name: &str) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, name, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, name));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: PlayerId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn addr_of(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    pub fn session_of(&self, client_id: PlayerId) -> Option<SessionId> {
        self.clients.get(&client_id).and_then(|client| client.session_id)
    }

    pub fn set_session(&mut self, client_id: PlayerId, session_id: Option<SessionId>) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.session_id = session_id;
        }
    }

    /// Detaches every client still pointing at `session_id`.
    pub fn clear_session(&mut self, session_id: SessionId) -> Vec<PlayerId> {
        self.clients
            .values_mut()
            .filter(|client| client.session_id == Some(session_id))
            .map(|client| {
                client.session_id = None;
                client.id
            })
            .collect()
    }

    /// Records activity. Returns true if the client had been flagged
    /// unresponsive and just came back.
    pub fn touch(&mut self, client_id: PlayerId, now: Instant) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = now;
                let recovered = !client.responsive;
                client.responsive = true;
                recovered
            }
            None => false,
        }
    }

    pub fn check_liveness(&mut self, timeout: Duration, now: Instant) -> Liveness {
        let mut liveness = Liveness::default();

        for client in self.clients.values_mut() {
            if client.responsive && client.silent_for(now) > timeout / 2 {
                client.responsive = false;
                liveness.stale.push((client.id, client.session_id));
            }
        }

        let timed_out: Vec<PlayerId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout, now))
            .map(|client| client.id)
            .collect();
        for client_id in timed_out {
            if let Some(client) = self.remove_client(client_id) {
                liveness.expired.push(client);
            }
        }

        liveness
    }

    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
