//! Authoritative world model
//!
//! Both game variants implement [`Simulation`]. Mutators validate first and
//! return a symbolic [`Reason`] without touching state when a command is
//! refused. Accepted mutations record what they touched in the caller's
//! [`ChangeLog`](changes::ChangeLog), which the session flushes into delta
//! snapshots.

pub mod changes;
pub mod competitive;
pub mod cooperative;
pub mod world;

use changes::{ChangeLog, EntityKind};
use shared::rules;
use shared::{
    ActionData, Economy, EntityId, GameMode, GridCell, Phase, PlayerId, Reason, ShapeKind,
    TowerType, WorldState,
};
use world::World;

pub use competitive::CompetitiveSimulation;
pub use cooperative::CooperativeSimulation;

pub trait Simulation: Send {
    fn mode(&self) -> GameMode;

    fn world(&self) -> &World;

    fn world_mut(&mut self) -> &mut World;

    /// Session-wide fields that travel in snapshots next to the entity maps.
    fn world_state(&self) -> WorldState;

    fn max_players(&self) -> usize;

    /// Adds a player and returns the board slot assigned to them.
    fn add_player(&mut self, id: PlayerId, name: &str, changes: &mut ChangeLog) -> Option<usize>;

    fn remove_player(&mut self, id: PlayerId, changes: &mut ChangeLog) -> bool;

    fn place_maze_piece(
        &mut self,
        player: PlayerId,
        shape: ShapeKind,
        anchor: GridCell,
        rotation: u8,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason>;

    fn place_tower(
        &mut self,
        player: PlayerId,
        tower_type: TowerType,
        cell: GridCell,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason>;

    fn mark_ready(&mut self, player: PlayerId, changes: &mut ChangeLog) -> Result<ActionData, Reason>;

    /// True when every connected player has signalled readiness.
    fn all_ready(&self) -> bool;

    /// Leaves the building phase. Returns false if defense was already entered.
    fn begin_defense(&mut self, changes: &mut ChangeLog) -> bool;

    fn update(&mut self, dt: f32, changes: &mut ChangeLog);

    /// The economy that pays for `player`'s actions.
    fn economy_mut(&mut self, player: PlayerId) -> Option<&mut Economy>;

    /// Marks whatever entity carries `player`'s economy as changed.
    fn mark_economy(&self, player: PlayerId, changes: &mut ChangeLog);

    fn winner(&self) -> Option<PlayerId> {
        None
    }

    fn phase(&self) -> Phase {
        self.world().phase
    }

    fn set_connected(&mut self, player: PlayerId, connected: bool, changes: &mut ChangeLog) -> bool {
        match self.world_mut().players.get_mut(&player) {
            Some(entry) => {
                entry.connected = connected;
                changes.mark(EntityKind::Player, player);
                true
            }
            None => false,
        }
    }

    fn upgrade_tower(
        &mut self,
        player: PlayerId,
        tower_id: EntityId,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason> {
        if self.phase() == Phase::Ended {
            return Err(Reason::WrongPhase);
        }
        let cost = {
            let tower = self.world().owned_tower(player, tower_id)?;
            rules::upgrade_cost(tower.tower_type, tower.level)
        };

        let economy = self.economy_mut(player).ok_or(Reason::PlayerNotFound)?;
        economy.spend(cost)?;
        let economy = *economy;

        let tower = match self.world_mut().towers.get_mut(&tower_id) {
            Some(tower) => {
                tower.level += 1;
                tower.total_invested += cost;
                tower.clone()
            }
            None => return Err(Reason::TowerNotFound),
        };
        changes.mark(EntityKind::Tower, tower_id);
        self.mark_economy(player, changes);

        Ok(ActionData::TowerUpgraded {
            tower,
            cost,
            economy,
        })
    }

    fn sell_tower(
        &mut self,
        player: PlayerId,
        tower_id: EntityId,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason> {
        if self.phase() == Phase::Ended {
            return Err(Reason::WrongPhase);
        }
        let refund = rules::sell_refund(self.world().owned_tower(player, tower_id)?.total_invested);
        if self.economy_mut(player).is_none() {
            return Err(Reason::PlayerNotFound);
        }

        self.world_mut().remove_tower(tower_id, changes);
        let economy = self.economy_mut(player).ok_or(Reason::PlayerNotFound)?;
        economy.credit(refund);
        let economy = *economy;
        self.mark_economy(player, changes);

        Ok(ActionData::TowerSold {
            tower_id,
            refund,
            economy,
        })
    }
}

pub fn new_simulation(mode: GameMode) -> Box<dyn Simulation> {
    match mode {
        GameMode::Competitive => Box::new(CompetitiveSimulation::new()),
        GameMode::Cooperative => Box::new(CooperativeSimulation::new()),
    }
}
