//! One game session: membership, status lifecycle and snapshot production
//!
//! A `Session` is plain data driven from outside. The scheduler actor calls
//! [`Session::tick`] at a fixed rate and routes member commands to the other
//! methods; nothing in here touches the network or the clock on its own,
//! which keeps every transition testable with synthetic instants.
//!
//! Status moves `waiting -> ready -> active <-> paused -> ended`. Ready is
//! reached when enough members have joined; cooperative sessions start by
//! themselves after a short grace delay, competitive ones wait for an
//! explicit start.

use crate::error::SessionError;
use crate::gateway::ActionGateway;
use crate::simulation::changes::ChangeLog;
use crate::simulation::{new_simulation, Simulation};
use log::{debug, info};
use shared::{
    ActionResult, DeltaSnapshot, FullSnapshot, GameMode, Phase, PlayerId, Reason, SessionId,
    SessionStatus,
};
use std::time::{Duration, Instant};

pub const MIN_PLAYERS: usize = 2;
pub const AUTO_START_DELAY: Duration = Duration::from_secs(3);
pub const EMPTY_RETENTION: Duration = Duration::from_secs(60);
pub const ENDED_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Explicit,
    HealthDepleted,
    InsufficientPlayers,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Explicit => "explicit",
            EndReason::HealthDepleted => "health_depleted",
            EndReason::InsufficientPlayers => "insufficient_players",
        }
    }
}

/// Things members need to hear about, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started(FullSnapshot),
    StatusChanged(SessionStatus),
    Delta(DeltaSnapshot),
    Ended {
        reason: EndReason,
        winner: Option<PlayerId>,
    },
}

pub struct Session {
    id: SessionId,
    mode: GameMode,
    status: SessionStatus,
    sim: Box<dyn Simulation>,
    gateway: ActionGateway,
    changes: ChangeLog,
    version: u64,
    elapsed: Duration,
    created_at: Instant,
    ready_since: Option<Instant>,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    empty_since: Option<Instant>,
    end_reason: Option<EndReason>,
}

impl Session {
    pub fn new(id: SessionId, mode: GameMode, now: Instant) -> Self {
        Self {
            id,
            mode,
            status: SessionStatus::Waiting,
            sim: new_simulation(mode),
            gateway: ActionGateway::new(),
            changes: ChangeLog::new(),
            version: 0,
            elapsed: Duration::ZERO,
            created_at: now,
            ready_since: None,
            started_at: None,
            ended_at: None,
            empty_since: Some(now),
            end_reason: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn simulation(&self) -> &dyn Simulation {
        self.sim.as_ref()
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.sim.world().players.contains_key(&player)
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.sim.world().players.keys().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.sim.world().players.len()
    }

    pub fn add_member(
        &mut self,
        player: PlayerId,
        name: &str,
        now: Instant,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.status == SessionStatus::Ended {
            return Err(SessionError::SessionEnded);
        }
        if self.is_member(player) {
            self.sim.set_connected(player, true, &mut self.changes);
            return Ok(Vec::new());
        }
        if matches!(self.status, SessionStatus::Active | SessionStatus::Paused) {
            return Err(SessionError::SessionInProgress);
        }

        let slot = self
            .sim
            .add_player(player, name, &mut self.changes)
            .ok_or(SessionError::SessionFull)?;
        self.empty_since = None;
        info!(
            "Player {} joined session {} in slot {} ({} members)",
            player,
            self.id,
            slot,
            self.member_count()
        );

        let mut events = Vec::new();
        if self.status == SessionStatus::Waiting && self.member_count() >= MIN_PLAYERS {
            self.status = SessionStatus::Ready;
            self.ready_since = Some(now);
            events.push(SessionEvent::StatusChanged(SessionStatus::Ready));
        }
        Ok(events)
    }

    pub fn remove_member(
        &mut self,
        player: PlayerId,
        now: Instant,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.sim.remove_player(player, &mut self.changes) {
            return Err(SessionError::NotInSession);
        }
        self.gateway.forget_player(player);
        info!("Player {} left session {}", player, self.id);

        if self.member_count() == 0 {
            self.empty_since = Some(now);
        }

        let mut events = Vec::new();
        if self.member_count() < MIN_PLAYERS {
            match self.status {
                SessionStatus::Ready => {
                    self.status = SessionStatus::Waiting;
                    self.ready_since = None;
                    events.push(SessionEvent::StatusChanged(SessionStatus::Waiting));
                }
                SessionStatus::Active | SessionStatus::Paused => {
                    events.extend(self.end(EndReason::InsufficientPlayers, now));
                }
                SessionStatus::Waiting | SessionStatus::Ended => {}
            }
        }
        Ok(events)
    }

    pub fn set_connected(&mut self, player: PlayerId, connected: bool) -> Result<(), SessionError> {
        if self.sim.set_connected(player, connected, &mut self.changes) {
            Ok(())
        } else {
            Err(SessionError::NotInSession)
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<FullSnapshot, SessionError> {
        match self.status {
            SessionStatus::Ready => {}
            SessionStatus::Ended => return Err(SessionError::SessionEnded),
            SessionStatus::Active | SessionStatus::Paused => {
                return Err(SessionError::SessionInProgress)
            }
            SessionStatus::Waiting => return Err(SessionError::SessionNotReady),
        }
        self.status = SessionStatus::Active;
        self.started_at = Some(now);
        info!("Session {} started ({:?})", self.id, self.mode);
        Ok(self.full_snapshot())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::SessionNotActive);
        }
        self.status = SessionStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Paused {
            return Err(SessionError::SessionNotActive);
        }
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Ends a running or paused session on a member's request.
    pub fn end_explicitly(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionError> {
        match self.status {
            SessionStatus::Active | SessionStatus::Paused => Ok(self.end(EndReason::Explicit, now)),
            SessionStatus::Ended => Err(SessionError::SessionEnded),
            SessionStatus::Waiting | SessionStatus::Ready => Err(SessionError::SessionNotActive),
        }
    }

    /// Moves to `ended`. Ending twice is a no-op.
    pub fn end(&mut self, reason: EndReason, now: Instant) -> Vec<SessionEvent> {
        if self.status == SessionStatus::Ended {
            return Vec::new();
        }
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        info!("Session {} ended: {}", self.id, reason.as_str());
        vec![SessionEvent::Ended {
            reason,
            winner: self.sim.winner(),
        }]
    }

    pub fn submit_action(&mut self, player: PlayerId, action_type: &str, payload: &str) -> ActionResult {
        self.submit_action_at(Instant::now(), player, action_type, payload)
    }

    pub fn submit_action_at(
        &mut self,
        now: Instant,
        player: PlayerId,
        action_type: &str,
        payload: &str,
    ) -> ActionResult {
        // Strangers and closed sessions still count against the limiter.
        let result = match self.gateway.admit(now, player, action_type) {
            Err(reason) => Err(reason),
            Ok(_) if self.status != SessionStatus::Active => Err(Reason::WrongPhase),
            Ok(kind) => ActionGateway::apply(player, kind, payload, self.sim.as_mut(), &mut self.changes),
        };
        if result.is_ok() && self.sim.all_ready() {
            self.sim.begin_defense(&mut self.changes);
        }
        result.into()
    }

    /// Advances the session by `dt` seconds and returns the events to broadcast.
    pub fn tick(&mut self, dt: f32, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if self.status == SessionStatus::Ready && self.mode == GameMode::Cooperative {
            let waited = self
                .ready_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default();
            if waited >= AUTO_START_DELAY {
                if let Ok(snapshot) = self.start(now) {
                    events.push(SessionEvent::Started(snapshot));
                }
            }
        }

        if self.status != SessionStatus::Active {
            return events;
        }

        self.elapsed += Duration::from_secs_f32(dt.max(0.0));
        self.gateway.housekeeping(now);
        if self.sim.phase() == Phase::Building && self.sim.all_ready() {
            self.sim.begin_defense(&mut self.changes);
        }
        self.sim.update(dt, &mut self.changes);

        self.version += 1;
        let delta = self.flush_delta_snapshot();
        if !delta.is_empty() {
            events.push(SessionEvent::Delta(delta));
        }

        if self.sim.phase() == Phase::Ended {
            debug!("Session {} simulation reached its end", self.id);
            events.extend(self.end(EndReason::HealthDepleted, now));
        }
        events
    }

    pub fn full_snapshot(&self) -> FullSnapshot {
        let world = self.sim.world();
        FullSnapshot {
            session_id: self.id,
            mode: self.mode,
            status: self.status,
            version: self.version,
            world: self.sim.world_state(),
            players: world.players.values().cloned().collect(),
            towers: world.towers.values().cloned().collect(),
            enemies: world.enemies.values().cloned().collect(),
            maze_pieces: world.maze_pieces.values().cloned().collect(),
            projectiles: world.projectiles.values().cloned().collect(),
        }
    }

    pub fn flush_delta_snapshot(&mut self) -> DeltaSnapshot {
        self.changes.flush(self.id, self.version, self.sim.as_ref())
    }

    /// True once the session has been empty past the retention window, or
    /// ended past the grace window.
    pub fn should_destroy(&self, now: Instant) -> bool {
        if let Some(ended_at) = self.ended_at {
            if now.saturating_duration_since(ended_at) >= ENDED_GRACE {
                return true;
            }
        }
        match self.empty_since {
            Some(since) if self.member_count() == 0 => {
                now.saturating_duration_since(since) >= EMPTY_RETENTION
            }
            _ => false,
        }
    }
}
