//! Cooperative variant: two players share one board and one pool of
//! resources, taking turns for every building and tower placement.

use super::changes::{ChangeLog, EntityKind};
use super::world::World;
use super::Simulation;
use crate::pathfinder::GridBounds;
use log::{debug, info};
use shared::rules::{self, COOPERATIVE_SHAPES_PER_PLAYER};
use shared::{
    ActionData, Economy, Enemy, GameMode, GridCell, MazePiece, Phase, PlayerId, Reason, ShapeKind,
    TowerType, Turn, Vec2, WorldState,
};

pub const MAX_PLAYERS: usize = 2;

pub struct CooperativeSimulation {
    world: World,
    turn: Turn,
    resources: Economy,
    shapes_placed: [u32; MAX_PLAYERS],
    path: Option<Vec<Vec2>>,
    kills_this_wave: u32,
}

impl Default for CooperativeSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl CooperativeSimulation {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            turn: Turn::Player1,
            resources: Economy::new(rules::COOPERATIVE_STARTING_MONEY),
            shapes_placed: [0; MAX_PLAYERS],
            path: None,
            kills_this_wave: 0,
        }
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn resources(&self) -> Economy {
        self.resources
    }

    pub fn shapes_placed(&self) -> [u32; MAX_PLAYERS] {
        self.shapes_placed
    }

    pub fn enemy_path(&self) -> Option<&[Vec2]> {
        self.path.as_deref()
    }

    fn bounds(&self) -> GridBounds {
        World::board_bounds(0)
    }

    fn turn_slot(&self, player: PlayerId) -> Result<usize, Reason> {
        let slot = self.world.slot_of(player).ok_or(Reason::PlayerNotFound)?;
        if slot != self.turn.slot() {
            return Err(Reason::NotYourTurn);
        }
        Ok(slot)
    }

    fn building_complete(&self) -> bool {
        self.shapes_placed
            .iter()
            .all(|placed| *placed >= COOPERATIVE_SHAPES_PER_PLAYER)
    }

    fn credit_kill(&mut self, enemy: &Enemy, changes: &mut ChangeLog) {
        self.resources.credit(enemy.reward);
        self.resources.score += enemy.reward * rules::SCORE_PER_REWARD;
        self.kills_this_wave += 1;
        if self.kills_this_wave >= rules::kill_threshold(self.resources.wave) {
            self.resources.wave += 1;
            self.kills_this_wave = 0;
            info!("Cooperative wave advanced to {}", self.resources.wave);
        }
        changes.mark_world();
    }

    fn fire_towers(&mut self, changes: &mut ChangeLog) {
        for (tower, target) in self.world.ready_shots(false, changes) {
            let Some(impact) = self.world.enemies.get(&target).map(|enemy| enemy.position) else {
                continue;
            };
            let stats = tower.stats();
            let killed = self
                .world
                .apply_hit(target, impact, stats.damage, stats.splash_radius, changes);
            for enemy in killed {
                self.credit_kill(&enemy, changes);
            }
        }
    }
}

impl Simulation for CooperativeSimulation {
    fn mode(&self) -> GameMode {
        GameMode::Cooperative
    }

    fn world(&self) -> &World {
        &self.world
    }

    fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn world_state(&self) -> WorldState {
        let shapes_placed = (0..MAX_PLAYERS)
            .filter_map(|slot| {
                self.world
                    .player_in_slot(slot)
                    .map(|id| (id, self.shapes_placed[slot]))
            })
            .collect();
        WorldState {
            phase: self.world.phase,
            turn: Some(self.turn),
            shared_resources: Some(self.resources),
            shapes_placed,
            winner: None,
        }
    }

    fn max_players(&self) -> usize {
        MAX_PLAYERS
    }

    fn add_player(&mut self, id: PlayerId, name: &str, changes: &mut ChangeLog) -> Option<usize> {
        let slot = self.world.add_player(id, name, None, MAX_PLAYERS, changes)?;
        changes.mark_world();
        Some(slot)
    }

    fn remove_player(&mut self, id: PlayerId, changes: &mut ChangeLog) -> bool {
        let removed = self.world.remove_player(id, changes);
        if removed {
            changes.mark_world();
        }
        removed
    }

    fn place_maze_piece(
        &mut self,
        player: PlayerId,
        shape: ShapeKind,
        anchor: GridCell,
        rotation: u8,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason> {
        if self.world.phase != Phase::Building {
            return Err(Reason::WrongPhase);
        }
        let slot = self.turn_slot(player)?;
        if self.shapes_placed[slot] >= COOPERATIVE_SHAPES_PER_PLAYER {
            return Err(Reason::MaxShapesReached);
        }

        let bounds = self.bounds();
        let cells = rules::shape_cells(shape, anchor, rotation);
        self.world.validate_piece_cells(&cells, bounds)?;

        let previous_turn = self.turn;
        let id = self.world.commit_piece(player, shape, cells.clone());
        self.shapes_placed[slot] += 1;
        self.turn = self.turn.other();

        if self.world.route(bounds).is_none() {
            self.world.remove_piece(id);
            self.shapes_placed[slot] -= 1;
            self.turn = previous_turn;
            debug!("Rejected piece from player {} at {:?}: no route remains", player, anchor);
            return Err(Reason::PathBlocked);
        }

        changes.mark(EntityKind::MazePiece, id);
        changes.mark(EntityKind::Player, player);
        changes.mark_world();

        let shapes_placed = self.shapes_placed[slot];
        if self.building_complete() {
            self.begin_defense(changes);
        }

        Ok(ActionData::PiecePlaced {
            piece: MazePiece {
                id,
                owner: player,
                shape,
                cells,
            },
            shapes_placed,
        })
    }

    fn place_tower(
        &mut self,
        player: PlayerId,
        tower_type: TowerType,
        cell: GridCell,
        changes: &mut ChangeLog,
    ) -> Result<ActionData, Reason> {
        if self.world.phase != Phase::Defense {
            return Err(Reason::WrongPhase);
        }
        self.turn_slot(player)?;
        if !self.bounds().contains_cell(cell) {
            return Err(Reason::OutOfBounds);
        }
        if !self.world.occupied.contains_key(&cell) {
            return Err(Reason::MustPlaceOnMazeBlock);
        }
        if self.world.too_close_to_tower(cell) {
            return Err(Reason::TooCloseToTower);
        }
        self.resources.spend(rules::tower_stats(tower_type).cost)?;

        let tower = self.world.insert_tower(player, tower_type, cell, changes);
        self.turn = self.turn.other();
        changes.mark_world();

        Ok(ActionData::TowerPlaced {
            tower,
            economy: self.resources,
        })
    }

    fn mark_ready(&mut self, _player: PlayerId, _changes: &mut ChangeLog) -> Result<ActionData, Reason> {
        // Defense starts from the shape quota, not from readiness.
        Err(Reason::WrongPhase)
    }

    fn all_ready(&self) -> bool {
        false
    }

    fn begin_defense(&mut self, changes: &mut ChangeLog) -> bool {
        if self.world.phase != Phase::Building {
            return false;
        }
        self.world.phase = Phase::Defense;
        self.turn = Turn::Player1;
        self.path = self.world.route(self.bounds());
        self.world.reset_spawn_timer();
        changes.mark_world();
        info!(
            "Cooperative building complete after {:?} shapes, entering defense",
            self.shapes_placed
        );
        true
    }

    fn update(&mut self, dt: f32, changes: &mut ChangeLog) {
        if self.world.phase != Phase::Defense {
            return;
        }
        self.world.elapsed_ms += dt as f64 * 1000.0;

        let leaked = self.world.advance_enemies(dt, changes);
        if !leaked.is_empty() {
            changes.mark_world();
        }
        for _ in &leaked {
            if self.resources.take_damage(rules::LEAK_DAMAGE) {
                self.world.phase = Phase::Ended;
                info!("Cooperative defense lost at wave {}", self.resources.wave);
                return;
            }
        }

        self.fire_towers(changes);

        if self.world.spawn_due(dt) {
            let bounds = self.bounds();
            let path = self
                .path
                .clone()
                .unwrap_or_else(|| vec![World::spawn_point(bounds), World::exit_point(bounds)]);
            self.world.spawn_enemy(None, self.resources.wave, path, changes);
        }
    }

    fn economy_mut(&mut self, player: PlayerId) -> Option<&mut Economy> {
        if self.world.players.contains_key(&player) {
            Some(&mut self.resources)
        } else {
            None
        }
    }

    fn mark_economy(&self, _player: PlayerId, changes: &mut ChangeLog) {
        changes.mark_world();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn two_player_sim() -> (CooperativeSimulation, ChangeLog) {
        let mut sim = CooperativeSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);
        sim.add_player(2, "bo", &mut changes);
        changes.drain();
        (sim, changes)
    }

    /// Six pieces along the top rows, well clear of the spawn-exit row.
    fn build_out(sim: &mut CooperativeSimulation, changes: &mut ChangeLog) {
        let anchors = [(0, 17), (0, 15), (5, 17), (5, 15), (10, 17), (10, 15)];
        for (i, (x, y)) in anchors.iter().enumerate() {
            let player = if i % 2 == 0 { 1 } else { 2 };
            sim.place_maze_piece(player, ShapeKind::O, GridCell::new(*x, *y), 0, changes)
                .unwrap();
        }
    }

    #[test]
    fn test_turn_alternates_on_accepted_placement_only() {
        let (mut sim, mut changes) = two_player_sim();
        assert_eq!(sim.turn(), Turn::Player1);

        let result = sim.place_maze_piece(2, ShapeKind::O, GridCell::new(2, 2), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::NotYourTurn));
        assert_eq!(sim.turn(), Turn::Player1);

        let result = sim.place_maze_piece(1, ShapeKind::O, GridCell::new(-1, 2), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::OutOfBounds));
        assert_eq!(sim.turn(), Turn::Player1);

        sim.place_maze_piece(1, ShapeKind::O, GridCell::new(2, 2), 0, &mut changes)
            .unwrap();
        assert_eq!(sim.turn(), Turn::Player2);

        let result = sim.place_maze_piece(2, ShapeKind::O, GridCell::new(3, 3), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::PositionOccupied));
        assert_eq!(sim.turn(), Turn::Player2);
    }

    #[test]
    fn test_blocking_piece_is_rolled_back() {
        let (mut sim, mut changes) = two_player_sim();

        // Vertical wall at x = 10 covering rows 0..=15, leaving 16..=19 open.
        let wall = [(1, 0), (2, 4), (1, 8), (2, 12)];
        for (player, y) in wall {
            sim.place_maze_piece(player, ShapeKind::I, GridCell::new(10, y), 1, &mut changes)
                .unwrap();
        }
        assert_eq!(sim.turn(), Turn::Player1);
        assert_eq!(sim.shapes_placed(), [2, 2]);

        // Closing the remaining gap must fail and restore everything.
        changes.drain();
        let result = sim.place_maze_piece(1, ShapeKind::I, GridCell::new(10, 16), 1, &mut changes);
        assert_eq!(result.err(), Some(Reason::PathBlocked));
        assert_eq!(sim.turn(), Turn::Player1);
        assert_eq!(sim.shapes_placed(), [2, 2]);
        assert_eq!(sim.world().maze_pieces.len(), 4);
        assert!(!sim.world().occupied.contains_key(&GridCell::new(10, 17)));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_defense_starts_once_both_quotas_are_met() {
        let (mut sim, mut changes) = two_player_sim();
        build_out(&mut sim, &mut changes);

        assert_eq!(sim.phase(), Phase::Defense);
        assert_eq!(sim.turn(), Turn::Player1);
        assert_eq!(sim.shapes_placed(), [3, 3]);
        assert!(sim.enemy_path().is_some());
        assert!(!sim.begin_defense(&mut changes));

        let result = sim.place_maze_piece(1, ShapeKind::O, GridCell::new(15, 2), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::WrongPhase));
    }

    #[test]
    fn test_defense_not_entered_before_last_piece() {
        let (mut sim, mut changes) = two_player_sim();
        let anchors = [(0, 17), (0, 15), (5, 17), (5, 15), (10, 17)];
        for (i, (x, y)) in anchors.iter().enumerate() {
            let player = if i % 2 == 0 { 1 } else { 2 };
            sim.place_maze_piece(player, ShapeKind::O, GridCell::new(*x, *y), 0, &mut changes)
                .unwrap();
            assert_eq!(sim.phase(), Phase::Building);
            let expected = if i % 2 == 0 { Turn::Player2 } else { Turn::Player1 };
            assert_eq!(sim.turn(), expected);
        }
        assert_eq!(sim.shapes_placed(), [3, 2]);

        // Player 1 is done; only player 2 may place the last piece.
        let result = sim.place_maze_piece(1, ShapeKind::O, GridCell::new(10, 15), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::NotYourTurn));
        assert_eq!(sim.phase(), Phase::Building);

        sim.place_maze_piece(2, ShapeKind::O, GridCell::new(10, 15), 0, &mut changes)
            .unwrap();
        assert_eq!(sim.phase(), Phase::Defense);
    }

    #[test]
    fn test_tower_rules_and_shared_funds() {
        let (mut sim, mut changes) = two_player_sim();

        let early = sim.place_tower(1, TowerType::Basic, GridCell::new(0, 17), &mut changes);
        assert_eq!(early.err(), Some(Reason::WrongPhase));

        build_out(&mut sim, &mut changes);

        let off_maze = sim.place_tower(1, TowerType::Basic, GridCell::new(3, 3), &mut changes);
        assert_eq!(off_maze.err(), Some(Reason::MustPlaceOnMazeBlock));

        let placed = sim
            .place_tower(1, TowerType::Basic, GridCell::new(0, 17), &mut changes)
            .unwrap();
        match placed {
            ActionData::TowerPlaced { economy, .. } => assert_eq!(economy.money, 150),
            other => panic!("unexpected data {:?}", other),
        }
        assert_eq!(sim.turn(), Turn::Player2);

        let crowded = sim.place_tower(2, TowerType::Basic, GridCell::new(1, 17), &mut changes);
        assert_eq!(crowded.err(), Some(Reason::TooCloseToTower));

        sim.place_tower(2, TowerType::Sniper, GridCell::new(5, 17), &mut changes)
            .unwrap();
        assert_eq!(sim.resources().money, 50);
        assert_eq!(sim.turn(), Turn::Player1);

        let broke = sim.place_tower(1, TowerType::Cannon, GridCell::new(10, 17), &mut changes);
        assert_eq!(broke.err(), Some(Reason::InsufficientFunds));
        assert_eq!(sim.resources().money, 50);
        assert_eq!(sim.turn(), Turn::Player1);
    }

    #[test]
    fn test_ready_is_not_a_cooperative_action() {
        let (mut sim, mut changes) = two_player_sim();
        assert_eq!(sim.mark_ready(1, &mut changes).err(), Some(Reason::WrongPhase));
        assert!(!sim.all_ready());
    }

    #[test]
    fn test_upgrade_and_sell_use_shared_pool() {
        let (mut sim, mut changes) = two_player_sim();
        build_out(&mut sim, &mut changes);
        let tower_id = match sim
            .place_tower(1, TowerType::Basic, GridCell::new(0, 17), &mut changes)
            .unwrap()
        {
            ActionData::TowerPlaced { tower, .. } => tower.id,
            other => panic!("unexpected data {:?}", other),
        };

        assert_eq!(
            sim.upgrade_tower(2, tower_id, &mut changes).err(),
            Some(Reason::NotYourTower)
        );
        sim.upgrade_tower(1, tower_id, &mut changes).unwrap();
        assert_eq!(sim.resources().money, 75);
        assert_eq!(sim.world().towers[&tower_id].level, 2);

        match sim.sell_tower(1, tower_id, &mut changes).unwrap() {
            ActionData::TowerSold { refund, economy, .. } => {
                assert_eq!(refund, 87);
                assert_eq!(economy.money, 162);
            }
            other => panic!("unexpected data {:?}", other),
        }
        assert!(sim.world().towers.is_empty());
        assert_eq!(
            sim.sell_tower(1, tower_id, &mut changes).err(),
            Some(Reason::TowerNotFound)
        );
    }

    #[test]
    fn test_enemies_spawn_and_leak_into_shared_health() {
        let (mut sim, mut changes) = two_player_sim();
        build_out(&mut sim, &mut changes);

        sim.update(2.0, &mut changes);
        assert_eq!(sim.world().enemies.len(), 1);
        let enemy = sim.world().enemies.values().next().unwrap();
        assert_eq!(enemy.owner, None);
        assert_approx_eq!(enemy.position.x, 0.0, 0.001);
        assert_approx_eq!(enemy.position.y, 10.0, 0.001);

        // The route is the straight row, 19 cells long at 1 cell/s.
        sim.update(19.5, &mut changes);
        assert_eq!(sim.resources().health, rules::STARTING_HEALTH - 1);
    }

    #[test]
    fn test_towers_hit_instantly_and_credit_pool() {
        let (mut sim, mut changes) = two_player_sim();
        build_out(&mut sim, &mut changes);

        let id = sim.world_mut().next_id();
        sim.world_mut().enemies.insert(
            id,
            Enemy {
                id,
                owner: None,
                kind: shared::EnemyKind::Grunt,
                health: 20.0,
                max_health: 50.0,
                speed: 0.0,
                path: vec![Vec2::new(1.0, 15.0), Vec2::new(1.0, 10.0)],
                progress: 0.0,
                position: Vec2::new(1.0, 15.0),
                reward: 10,
            },
        );
        sim.place_tower(1, TowerType::Basic, GridCell::new(0, 17), &mut changes)
            .unwrap();

        sim.update(0.1, &mut changes);
        assert!(sim.world().enemies.is_empty());
        assert_eq!(sim.resources().money, 160);
        assert_eq!(sim.resources().score, 100);
    }
}
