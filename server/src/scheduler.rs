//! Per-session actor
//!
//! Each session runs in its own tokio task which exclusively owns the
//! [`Session`]. Commands from the network loop arrive on an unbounded channel
//! and ticks come from an interval timer; both are polled from a single
//! `select!` loop so a command can never interleave with a tick. Outbound
//! packets go to the network sender queue without waiting for delivery.

use crate::error::SessionError;
use crate::network::{GameMessage, ServerMessage};
use crate::session::{Session, SessionEvent};
use log::{debug, error, info, warn};
use shared::{GameMode, Packet, PlayerId, SessionId, SessionStatus};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Longest step fed to the simulation after a stall.
pub const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

#[derive(Debug)]
pub enum SessionCommand {
    Join {
        player: PlayerId,
        name: String,
    },
    Leave {
        player: PlayerId,
    },
    SetConnected {
        player: PlayerId,
        connected: bool,
    },
    Start {
        player: PlayerId,
    },
    Pause {
        player: PlayerId,
    },
    Resume {
        player: PlayerId,
    },
    End {
        player: PlayerId,
    },
    Action {
        player: PlayerId,
        request_id: u32,
        action_type: String,
        payload: String,
    },
    SendSnapshot {
        player: PlayerId,
    },
    Shutdown,
}

pub struct SessionHandle {
    id: SessionId,
    mode: GameMode,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(
        session: Session,
        tick_interval: Duration,
        outbound: mpsc::UnboundedSender<GameMessage>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let id = session.id();
        let mode = session.mode();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            session,
            outbound,
            server_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, tick_interval));
        info!("Spawned session {} ({:?})", id, mode);

        Self {
            id,
            mode,
            commands,
            task,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Returns false if the actor has already stopped.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the actor and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            error!("Session {} task failed: {}", self.id, e);
        }
    }
}

struct SessionActor {
    session: Session,
    outbound: mpsc::UnboundedSender<GameMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        tick_interval: Duration,
    ) {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                },

                _ = ticker.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    if dt > MAX_DELTA_TIME {
                        debug!(
                            "Session {} delta {:.3}s capped to {:.3}s",
                            self.session.id(), dt, MAX_DELTA_TIME
                        );
                        dt = MAX_DELTA_TIME;
                    }

                    let events = self.session.tick(dt, now.into_std());
                    self.publish(events);

                    if self.session.should_destroy(now.into_std()) {
                        info!("Session {} expired", self.session.id());
                        break;
                    }
                },
            }
        }

        let _ = self.server_tx.send(ServerMessage::SessionClosed {
            session_id: self.session.id(),
        });
        debug!("Session {} actor stopped", self.session.id());
    }

    fn handle_command(&mut self, command: SessionCommand) {
        let now = std::time::Instant::now();
        let session_id = self.session.id();

        match command {
            SessionCommand::Join { player, name } => {
                match self.session.add_member(player, &name, now) {
                    Ok(events) => {
                        let _ = self.server_tx.send(ServerMessage::MembershipChanged {
                            session_id,
                            player_id: player,
                            joined: true,
                        });
                        self.send_to(
                            vec![player],
                            Packet::SessionJoined {
                                session_id,
                                player_id: player,
                            },
                        );
                        self.send_to(
                            vec![player],
                            Packet::FullSnapshot(self.session.full_snapshot()),
                        );
                        self.publish(events);
                    }
                    Err(e) => self.refuse(player, e),
                }
            }

            SessionCommand::Leave { player } => match self.session.remove_member(player, now) {
                Ok(events) => {
                    let _ = self.server_tx.send(ServerMessage::MembershipChanged {
                        session_id,
                        player_id: player,
                        joined: false,
                    });
                    self.publish(events);
                }
                Err(e) => self.refuse(player, e),
            },

            SessionCommand::SetConnected { player, connected } => {
                if self.session.set_connected(player, connected).is_err() {
                    debug!("Ignoring liveness change for non-member {}", player);
                }
            }

            SessionCommand::Start { player } => {
                if !self.session.is_member(player) {
                    return self.refuse(player, SessionError::NotInSession);
                }
                match self.session.start(now) {
                    Ok(snapshot) => self.publish(vec![SessionEvent::Started(snapshot)]),
                    Err(e) => self.refuse(player, e),
                }
            }

            SessionCommand::Pause { player } | SessionCommand::Resume { player } => {
                if !self.session.is_member(player) {
                    return self.refuse(player, SessionError::NotInSession);
                }
                let result = match command {
                    SessionCommand::Pause { .. } => self.session.pause(),
                    _ => self.session.resume(),
                };
                match result {
                    Ok(()) => self.publish(vec![SessionEvent::StatusChanged(self.session.status())]),
                    Err(e) => self.refuse(player, e),
                }
            }

            SessionCommand::End { player } => {
                if !self.session.is_member(player) {
                    return self.refuse(player, SessionError::NotInSession);
                }
                match self.session.end_explicitly(now) {
                    Ok(events) => self.publish(events),
                    Err(e) => self.refuse(player, e),
                }
            }

            SessionCommand::Action {
                player,
                request_id,
                action_type,
                payload,
            } => {
                let result = self.session.submit_action(player, &action_type, &payload);
                self.send_to(vec![player], Packet::ActionResult { request_id, result });
            }

            SessionCommand::SendSnapshot { player } => {
                if self.session.is_member(player) {
                    self.send_to(
                        vec![player],
                        Packet::FullSnapshot(self.session.full_snapshot()),
                    );
                }
            }

            SessionCommand::Shutdown => {}
        }
    }

    fn refuse(&self, player: PlayerId, reason: SessionError) {
        debug!(
            "Session {} refused player {}: {}",
            self.session.id(),
            player,
            reason
        );
        self.send_to(
            vec![player],
            Packet::SessionError {
                reason: reason.to_string(),
            },
        );
    }

    fn publish(&self, events: Vec<SessionEvent>) {
        if events.is_empty() {
            return;
        }
        let session_id = self.session.id();
        let members = self.connected_members();

        for event in events {
            match event {
                SessionEvent::Started(snapshot) => {
                    self.send_to(
                        members.clone(),
                        Packet::SessionStatusChanged {
                            session_id,
                            status: SessionStatus::Active,
                        },
                    );
                    self.send_to(members.clone(), Packet::FullSnapshot(snapshot));
                }
                SessionEvent::StatusChanged(status) => {
                    self.send_to(
                        members.clone(),
                        Packet::SessionStatusChanged { session_id, status },
                    );
                }
                SessionEvent::Delta(delta) => {
                    self.send_to(members.clone(), Packet::DeltaSnapshot(delta));
                }
                SessionEvent::Ended { reason, winner } => {
                    info!(
                        "Session {} over ({}), winner {:?}",
                        session_id,
                        reason.as_str(),
                        winner
                    );
                    self.send_to(
                        members.clone(),
                        Packet::SessionStatusChanged {
                            session_id,
                            status: SessionStatus::Ended,
                        },
                    );
                    self.send_to(
                        members.clone(),
                        Packet::FullSnapshot(self.session.full_snapshot()),
                    );
                }
            }
        }
    }

    fn connected_members(&self) -> Vec<PlayerId> {
        self.session
            .simulation()
            .world()
            .players
            .values()
            .filter(|player| player.connected)
            .map(|player| player.id)
            .collect()
    }

    fn send_to(&self, players: Vec<PlayerId>, packet: Packet) {
        if players.is_empty() {
            return;
        }
        if self
            .outbound
            .send(GameMessage::SendToPlayers { packet, players })
            .is_err()
        {
            warn!("Outbound queue closed for session {}", self.session.id());
        }
    }
}
