use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod rules;

pub const PROTOCOL_VERSION: u32 = 1;

pub type PlayerId = u32;
pub type EntityId = u32;
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: Vec2, t: f32) -> Vec2 {
        Vec2::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Moves toward `target` by at most `step`, landing exactly on it when close enough.
    pub fn move_toward(&self, target: Vec2, step: f32) -> Vec2 {
        let distance = self.distance(target);
        if distance <= step || distance < 0.0001 {
            return target;
        }
        self.lerp(target, step / distance)
    }
}

/// Integer cell key. Cell centers sit on integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Snaps a world point to the cell whose center is nearest.
    pub fn from_point(point: Vec2) -> Self {
        Self {
            x: point.x.round() as i32,
            y: point.y.round() as i32,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Competitive,
    Cooperative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Ready,
    Active,
    Paused,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Ready => "ready",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Building,
    Defense,
    Ended,
}

/// Which of the two cooperative players may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    Player1,
    Player2,
}

impl Turn {
    pub fn other(&self) -> Turn {
        match self {
            Turn::Player1 => Turn::Player2,
            Turn::Player2 => Turn::Player1,
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            Turn::Player1 => 0,
            Turn::Player2 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerType {
    Basic,
    Sniper,
    Cannon,
    Missile,
}

impl FromStr for TowerType {
    type Err = Reason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(TowerType::Basic),
            "sniper" => Ok(TowerType::Sniper),
            "cannon" => Ok(TowerType::Cannon),
            "missile" => Ok(TowerType::Missile),
            _ => Err(Reason::InvalidTowerType),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Grunt,
    Runner,
    Tank,
    Boss,
}

/// Tetromino tags accepted for maze pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    I,
    O,
    T,
    L,
    J,
    S,
    Z,
}

impl FromStr for ShapeKind {
    type Err = Reason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ShapeKind::I),
            "O" => Ok(ShapeKind::O),
            "T" => Ok(ShapeKind::T),
            "L" => Ok(ShapeKind::L),
            "J" => Ok(ShapeKind::J),
            "S" => Ok(ShapeKind::S),
            "Z" => Ok(ShapeKind::Z),
            _ => Err(Reason::InvalidShape),
        }
    }
}

/// Rejection codes. The snake_case names are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NotYourTurn,
    WrongPhase,
    MaxShapesReached,
    OutOfBounds,
    PositionOccupied,
    InsufficientFunds,
    MustPlaceOnMazeBlock,
    TooCloseToTower,
    TowerNotFound,
    NotYourTower,
    PlayerNotFound,
    RateLimited,
    UnknownAction,
    MissingRequiredFields,
    InvalidTowerType,
    InvalidPosition,
    InvalidShape,
    PathBlocked,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NotYourTurn => "not_your_turn",
            Reason::WrongPhase => "wrong_phase",
            Reason::MaxShapesReached => "max_shapes_reached",
            Reason::OutOfBounds => "out_of_bounds",
            Reason::PositionOccupied => "position_occupied",
            Reason::InsufficientFunds => "insufficient_funds",
            Reason::MustPlaceOnMazeBlock => "must_place_on_maze_block",
            Reason::TooCloseToTower => "too_close_to_tower",
            Reason::TowerNotFound => "tower_not_found",
            Reason::NotYourTower => "not_your_tower",
            Reason::PlayerNotFound => "player_not_found",
            Reason::RateLimited => "rate_limited",
            Reason::UnknownAction => "unknown_action",
            Reason::MissingRequiredFields => "missing_required_fields",
            Reason::InvalidTowerType => "invalid_tower_type",
            Reason::InvalidPosition => "invalid_position",
            Reason::InvalidShape => "invalid_shape",
            Reason::PathBlocked => "path_blocked",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health, money, score and wave. Owned per player in competitive mode,
/// pooled for the session in cooperative mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economy {
    pub health: u32,
    pub money: u32,
    pub score: u32,
    pub wave: u32,
}

impl Economy {
    pub fn new(money: u32) -> Self {
        Self {
            health: rules::STARTING_HEALTH,
            money,
            score: 0,
            wave: 1,
        }
    }

    /// Debits `amount`, refusing rather than clamping when funds are short.
    pub fn spend(&mut self, amount: u32) -> Result<(), Reason> {
        self.money = self
            .money
            .checked_sub(amount)
            .ok_or(Reason::InsufficientFunds)?;
        Ok(())
    }

    pub fn credit(&mut self, amount: u32) {
        self.money = self.money.saturating_add(amount);
    }

    /// Applies leak damage and reports whether health is depleted.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub connected: bool,
    pub ready: bool,
    /// Present in competitive mode only.
    pub economy: Option<Economy>,
    pub structures: Vec<EntityId>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, economy: Option<Economy>) -> Self {
        Self {
            id,
            name: name.into(),
            connected: true,
            ready: false,
            economy,
            structures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub id: EntityId,
    pub owner: PlayerId,
    pub tower_type: TowerType,
    pub cell: GridCell,
    pub level: u32,
    /// Simulation time in milliseconds of the last shot.
    pub last_fired: Option<f64>,
    /// Purchase price plus every upgrade paid so far.
    pub total_invested: u32,
}

impl Tower {
    pub fn position(&self) -> Vec2 {
        self.cell.center()
    }

    pub fn stats(&self) -> rules::TowerStats {
        rules::tower_stats_at_level(self.tower_type, self.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub id: EntityId,
    pub owner: Option<PlayerId>,
    pub kind: EnemyKind,
    pub health: f32,
    pub max_health: f32,
    pub speed: f32,
    pub path: Vec<Vec2>,
    pub progress: f32,
    pub position: Vec2,
    pub reward: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MazePiece {
    pub id: EntityId,
    pub owner: PlayerId,
    pub shape: ShapeKind,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: EntityId,
    pub tower_id: EntityId,
    pub owner: PlayerId,
    pub target_id: EntityId,
    pub position: Vec2,
    pub speed: f32,
    pub damage: f32,
    pub splash_radius: f32,
}

/// Session-wide simulation fields that are not entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub phase: Phase,
    pub turn: Option<Turn>,
    pub shared_resources: Option<Economy>,
    pub shapes_placed: Vec<(PlayerId, u32)>,
    pub winner: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSnapshot {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub status: SessionStatus,
    pub version: u64,
    pub world: WorldState,
    pub players: Vec<Player>,
    pub towers: Vec<Tower>,
    pub enemies: Vec<Enemy>,
    pub maze_pieces: Vec<MazePiece>,
    pub projectiles: Vec<Projectile>,
}

/// Values changed since the previous flush. `None` marks a removal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeltaSnapshot {
    pub session_id: SessionId,
    pub version: u64,
    pub world: Option<WorldState>,
    pub players: Vec<(PlayerId, Option<Player>)>,
    pub towers: Vec<(EntityId, Option<Tower>)>,
    pub enemies: Vec<(EntityId, Option<Enemy>)>,
    pub maze_pieces: Vec<(EntityId, Option<MazePiece>)>,
    pub projectiles: Vec<(EntityId, Option<Projectile>)>,
}

impl DeltaSnapshot {
    pub fn is_empty(&self) -> bool {
        self.world.is_none()
            && self.players.is_empty()
            && self.towers.is_empty()
            && self.enemies.is_empty()
            && self.maze_pieces.is_empty()
            && self.projectiles.is_empty()
    }
}

/// Acknowledgement payload returned to the acting player only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionData {
    PiecePlaced {
        piece: MazePiece,
        shapes_placed: u32,
    },
    TowerPlaced {
        tower: Tower,
        economy: Economy,
    },
    TowerUpgraded {
        tower: Tower,
        cost: u32,
        economy: Economy,
    },
    TowerSold {
        tower_id: EntityId,
        refund: u32,
        economy: Economy,
    },
    ReadyAcknowledged {
        all_ready: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub accepted: bool,
    pub reason: Option<Reason>,
    pub data: Option<ActionData>,
}

impl ActionResult {
    pub fn accepted(data: ActionData) -> Self {
        Self {
            accepted: true,
            reason: None,
            data: Some(data),
        }
    }

    pub fn rejected(reason: Reason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            data: None,
        }
    }
}

impl From<Result<ActionData, Reason>> for ActionResult {
    fn from(result: Result<ActionData, Reason>) -> Self {
        match result {
            Ok(data) => ActionResult::accepted(data),
            Err(reason) => ActionResult::rejected(reason),
        }
    }
}

/// Ordered skill scale used by the matchmaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl SkillTier {
    pub fn rank(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPreferences {
    pub party_size: u8,
    pub skill: SkillTier,
    pub mode: GameMode,
    pub region: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
    },
    Heartbeat,
    QueueForMatch {
        preferences: MatchPreferences,
    },
    CancelQueue,
    CreateSession {
        mode: GameMode,
    },
    JoinSession {
        session_id: SessionId,
    },
    LeaveSession,
    StartSession,
    PauseSession,
    ResumeSession,
    EndSession,
    Action {
        request_id: u32,
        action_type: String,
        payload: String,
    },
    Disconnect,

    Connected {
        client_id: PlayerId,
    },
    Queued {
        position: usize,
    },
    MatchFound {
        session_id: SessionId,
        mode: GameMode,
        players: Vec<PlayerId>,
    },
    SessionJoined {
        session_id: SessionId,
        player_id: PlayerId,
    },
    SessionStatusChanged {
        session_id: SessionId,
        status: SessionStatus,
    },
    FullSnapshot(FullSnapshot),
    DeltaSnapshot(DeltaSnapshot),
    ActionResult {
        request_id: u32,
        result: ActionResult,
    },
    SessionError {
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec2_distance_and_lerp() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(3.0, 4.0);
        assert_approx_eq!(a.distance(b), 5.0, 0.0001);

        let mid = a.lerp(b, 0.5);
        assert_approx_eq!(mid.x, 1.5, 0.0001);
        assert_approx_eq!(mid.y, 2.0, 0.0001);
    }

    #[test]
    fn test_vec2_move_toward_does_not_overshoot() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);

        let partial = a.move_toward(b, 0.25);
        assert_approx_eq!(partial.x, 0.25, 0.0001);

        let arrived = a.move_toward(b, 5.0);
        assert_eq!(arrived, b);
    }

    #[test]
    fn test_grid_cell_snaps_to_nearest_center() {
        assert_eq!(GridCell::from_point(Vec2::new(2.4, 3.6)), GridCell::new(2, 4));
        assert_eq!(GridCell::from_point(Vec2::new(-0.2, 0.49)), GridCell::new(0, 0));
        assert_eq!(GridCell::new(5, 7).center(), Vec2::new(5.0, 7.0));
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(Reason::NotYourTurn.as_str(), "not_your_turn");
        assert_eq!(Reason::MustPlaceOnMazeBlock.as_str(), "must_place_on_maze_block");
        assert_eq!(Reason::RateLimited.to_string(), "rate_limited");
        assert_eq!(Reason::PathBlocked.as_str(), "path_blocked");
    }

    #[test]
    fn test_session_status_codes() {
        let codes: Vec<&str> = [
            SessionStatus::Waiting,
            SessionStatus::Ready,
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Ended,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect();
        assert_eq!(codes, vec!["waiting", "ready", "active", "paused", "ended"]);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("sniper".parse::<TowerType>(), Ok(TowerType::Sniper));
        assert_eq!("laser".parse::<TowerType>(), Err(Reason::InvalidTowerType));
        assert_eq!("T".parse::<ShapeKind>(), Ok(ShapeKind::T));
        assert_eq!("X".parse::<ShapeKind>(), Err(Reason::InvalidShape));
    }

    #[test]
    fn test_turn_alternates() {
        assert_eq!(Turn::Player1.other(), Turn::Player2);
        assert_eq!(Turn::Player2.other(), Turn::Player1);
        assert_eq!(Turn::Player2.slot(), 1);
    }

    #[test]
    fn test_economy_rejects_overspend() {
        let mut economy = Economy::new(100);
        assert_eq!(economy.spend(60), Ok(()));
        assert_eq!(economy.money, 40);
        assert_eq!(economy.spend(41), Err(Reason::InsufficientFunds));
        assert_eq!(economy.money, 40);
        economy.credit(10);
        assert_eq!(economy.money, 50);
    }

    #[test]
    fn test_economy_damage_saturates() {
        let mut economy = Economy::new(0);
        economy.health = 2;
        assert!(!economy.take_damage(1));
        assert!(economy.take_damage(5));
        assert_eq!(economy.health, 0);
    }

    #[test]
    fn test_skill_tiers_are_ordered() {
        assert!(SkillTier::Bronze < SkillTier::Silver);
        assert!(SkillTier::Platinum < SkillTier::Diamond);
        assert_eq!(SkillTier::Gold.rank() - SkillTier::Silver.rank(), 1);
    }

    #[test]
    fn test_action_result_from_result() {
        let rejected: ActionResult = Err(Reason::WrongPhase).into();
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason, Some(Reason::WrongPhase));
        assert!(rejected.data.is_none());

        let accepted: ActionResult = Ok(ActionData::ReadyAcknowledged { all_ready: true }).into();
        assert!(accepted.accepted);
        assert!(accepted.reason.is_none());
    }

    #[test]
    fn test_packet_serialization_action() {
        let packet = Packet::Action {
            request_id: 7,
            action_type: "place_tower".to_string(),
            payload: r#"{"tower_type":"basic","x":3,"y":4}"#.to_string(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Action {
                request_id,
                action_type,
                payload,
            } => {
                assert_eq!(request_id, 7);
                assert_eq!(action_type, "place_tower");
                assert!(payload.contains("basic"));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_delta_snapshot() {
        let tower = Tower {
            id: 3,
            owner: 1,
            tower_type: TowerType::Cannon,
            cell: GridCell::new(4, 5),
            level: 2,
            last_fired: Some(1500.0),
            total_invested: 300,
        };
        let delta = DeltaSnapshot {
            session_id: 99,
            version: 12,
            towers: vec![(3, Some(tower)), (4, None)],
            ..Default::default()
        };

        let serialized = bincode::serialize(&Packet::DeltaSnapshot(delta)).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::DeltaSnapshot(delta) => {
                assert_eq!(delta.version, 12);
                assert_eq!(delta.towers.len(), 2);
                assert_eq!(delta.towers[0].1.as_ref().map(|t| t.level), Some(2));
                assert!(delta.towers[1].1.is_none());
                assert!(delta.world.is_none());
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_delta_snapshot_is_empty() {
        let mut delta = DeltaSnapshot::default();
        assert!(delta.is_empty());
        delta.enemies.push((1, None));
        assert!(!delta.is_empty());
    }
}
