//! Inbound command validation
//!
//! Commands arrive as an action name plus a JSON payload. The gateway
//! rate-limits per player and action, turns the payload into a typed
//! [`Action`], and only then hands it to the simulation. Every refusal is a
//! [`Reason`] and leaves the simulation untouched.

use crate::rate_limiter::{RateLimit, RateLimiter};
use crate::simulation::changes::ChangeLog;
use crate::simulation::Simulation;
use log::debug;
use serde_json::{Map, Value};
use shared::{ActionResult, EntityId, GridCell, PlayerId, Reason, ShapeKind, TowerType};
use std::str::FromStr;
use std::time::Instant;

/// Limit applied to action names the gateway does not recognise.
pub const UNKNOWN_ACTION_LIMIT: RateLimit = RateLimit::per_second(10);
const UNKNOWN_ACTION_KEY: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    PlaceMazePiece,
    PlaceTower,
    UpgradeTower,
    SellTower,
    PlayerReady,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PlaceMazePiece => "place_maze_piece",
            ActionKind::PlaceTower => "place_tower",
            ActionKind::UpgradeTower => "upgrade_tower",
            ActionKind::SellTower => "sell_tower",
            ActionKind::PlayerReady => "player_ready",
        }
    }

    pub fn limit(&self) -> RateLimit {
        match self {
            ActionKind::PlaceMazePiece => RateLimit::per_second(5),
            ActionKind::PlaceTower => RateLimit::per_second(2),
            ActionKind::UpgradeTower => RateLimit::per_second(3),
            ActionKind::SellTower => RateLimit::per_second(3),
            ActionKind::PlayerReady => RateLimit::per_second(2),
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ActionKind::PlaceMazePiece => &["shape", "x", "y"],
            ActionKind::PlaceTower => &["tower_type", "x", "y"],
            ActionKind::UpgradeTower | ActionKind::SellTower => &["tower_id"],
            ActionKind::PlayerReady => &[],
        }
    }
}

impl FromStr for ActionKind {
    type Err = Reason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "place_maze_piece" => Ok(ActionKind::PlaceMazePiece),
            "place_tower" => Ok(ActionKind::PlaceTower),
            "upgrade_tower" => Ok(ActionKind::UpgradeTower),
            "sell_tower" => Ok(ActionKind::SellTower),
            "player_ready" => Ok(ActionKind::PlayerReady),
            _ => Err(Reason::UnknownAction),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlaceMazePiece {
        shape: ShapeKind,
        cell: GridCell,
        rotation: u8,
    },
    PlaceTower {
        tower_type: TowerType,
        cell: GridCell,
    },
    UpgradeTower {
        tower_id: EntityId,
    },
    SellTower {
        tower_id: EntityId,
    },
    PlayerReady,
}

impl Action {
    /// Validates `payload` for `kind`. Missing fields are reported before
    /// bad enum values, and bad enum values before bad coordinates.
    pub fn parse(kind: ActionKind, payload: &str) -> Result<Self, Reason> {
        if kind == ActionKind::PlayerReady {
            return Ok(Action::PlayerReady);
        }

        let value: Value =
            serde_json::from_str(payload).map_err(|_| Reason::MissingRequiredFields)?;
        let fields = value.as_object().ok_or(Reason::MissingRequiredFields)?;
        if kind
            .required_fields()
            .iter()
            .any(|name| fields.get(*name).map_or(true, Value::is_null))
        {
            return Err(Reason::MissingRequiredFields);
        }

        match kind {
            ActionKind::PlaceMazePiece => {
                let shape = fields["shape"]
                    .as_str()
                    .ok_or(Reason::InvalidShape)?
                    .parse::<ShapeKind>()?;
                let rotation = match fields.get("rotation") {
                    None | Some(Value::Null) => 0,
                    Some(value) => value
                        .as_u64()
                        .filter(|r| *r <= 3)
                        .ok_or(Reason::InvalidShape)? as u8,
                };
                let cell = grid_cell(fields)?;
                Ok(Action::PlaceMazePiece {
                    shape,
                    cell,
                    rotation,
                })
            }
            ActionKind::PlaceTower => {
                let tower_type = fields["tower_type"]
                    .as_str()
                    .ok_or(Reason::InvalidTowerType)?
                    .parse::<TowerType>()?;
                let cell = grid_cell(fields)?;
                Ok(Action::PlaceTower { tower_type, cell })
            }
            ActionKind::UpgradeTower => Ok(Action::UpgradeTower {
                tower_id: tower_id(fields)?,
            }),
            ActionKind::SellTower => Ok(Action::SellTower {
                tower_id: tower_id(fields)?,
            }),
            ActionKind::PlayerReady => Ok(Action::PlayerReady),
        }
    }
}

fn coordinate(fields: &Map<String, Value>, name: &str) -> Result<f64, Reason> {
    fields
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or(Reason::InvalidPosition)
}

/// Snaps the payload's `x`/`y` to the nearest cell center.
fn grid_cell(fields: &Map<String, Value>) -> Result<GridCell, Reason> {
    let x = coordinate(fields, "x")?;
    let y = coordinate(fields, "y")?;
    if x.abs() > i32::MAX as f64 || y.abs() > i32::MAX as f64 {
        return Err(Reason::InvalidPosition);
    }
    Ok(GridCell::new(x.round() as i32, y.round() as i32))
}

fn tower_id(fields: &Map<String, Value>) -> Result<EntityId, Reason> {
    fields
        .get("tower_id")
        .and_then(Value::as_u64)
        .and_then(|id| EntityId::try_from(id).ok())
        .ok_or(Reason::MissingRequiredFields)
}

#[derive(Debug, Default)]
pub struct ActionGateway {
    limiter: RateLimiter,
}

impl ActionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(
        &mut self,
        now: Instant,
        player: PlayerId,
        action_type: &str,
        payload: &str,
        sim: &mut dyn Simulation,
        changes: &mut ChangeLog,
    ) -> ActionResult {
        self.admit(now, player, action_type)
            .and_then(|kind| Self::apply(player, kind, payload, sim, changes))
            .into()
    }

    /// Charges the action against the player's limit, then resolves its kind.
    /// Unknown names share one limit so they cannot flood the log.
    pub fn admit(&mut self, now: Instant, player: PlayerId, action_type: &str) -> Result<ActionKind, Reason> {
        let kind = action_type.parse::<ActionKind>();
        let (key, limit) = match &kind {
            Ok(kind) => (kind.as_str(), kind.limit()),
            Err(_) => (UNKNOWN_ACTION_KEY, UNKNOWN_ACTION_LIMIT),
        };
        if !self.limiter.check(player, key, limit, now) {
            debug!("Rate limited {} from player {}", action_type, player);
            return Err(Reason::RateLimited);
        }
        if let Err(reason) = &kind {
            debug!("Rejected {} from player {}: {}", action_type, player, reason);
        }
        kind
    }

    /// Parses the payload of an admitted action and applies it.
    pub fn apply(
        player: PlayerId,
        kind: ActionKind,
        payload: &str,
        sim: &mut dyn Simulation,
        changes: &mut ChangeLog,
    ) -> Result<shared::ActionData, Reason> {
        let result = Action::parse(kind, payload).and_then(|action| {
            if !sim.world().players.contains_key(&player) {
                return Err(Reason::PlayerNotFound);
            }
            Self::dispatch(player, action, sim, changes)
        });
        if let Err(reason) = &result {
            debug!("Rejected {} from player {}: {}", kind.as_str(), player, reason);
        }
        result
    }

    fn dispatch(
        player: PlayerId,
        action: Action,
        sim: &mut dyn Simulation,
        changes: &mut ChangeLog,
    ) -> Result<shared::ActionData, Reason> {
        match action {
            Action::PlaceMazePiece {
                shape,
                cell,
                rotation,
            } => sim.place_maze_piece(player, shape, cell, rotation, changes),
            Action::PlaceTower { tower_type, cell } => {
                sim.place_tower(player, tower_type, cell, changes)
            }
            Action::UpgradeTower { tower_id } => sim.upgrade_tower(player, tower_id, changes),
            Action::SellTower { tower_id } => sim.sell_tower(player, tower_id, changes),
            Action::PlayerReady => sim.mark_ready(player, changes),
        }
    }

    /// Drops rate-limit history that can no longer affect a decision.
    pub fn housekeeping(&mut self, now: Instant) {
        self.limiter.prune(now);
    }

    pub fn forget_player(&mut self, player: PlayerId) {
        self.limiter.forget_player(player);
    }
}
