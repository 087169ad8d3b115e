//! Competitive variant: every player builds and defends a private board laid
//! out side by side with the others, with their own health, money and wave.
//! Towers launch projectiles that only chase enemies of the same owner.

use super::changes::{ChangeLog, EntityKind};
use super::world::World;
use super::Simulation;
use crate::pathfinder::GridBounds;
use log::{debug, info};
use shared::rules::{self, COMPETITIVE_SHAPES_PER_PLAYER};
use shared::{
    ActionData, Economy, EntityId, GameMode, GridCell, MazePiece, Phase, PlayerId, Projectile,
    Reason, ShapeKind, TowerType, Vec2, WorldState,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;

pub const MAX_PLAYERS: usize = 4;

pub struct CompetitiveSimulation {
    world: World,
    shapes_placed: BTreeMap<PlayerId, u32>,
    kills_this_wave: BTreeMap<PlayerId, u32>,
    paths: BTreeMap<PlayerId, Vec<Vec2>>,
    winner: Option<PlayerId>,
}

impl Default for CompetitiveSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl CompetitiveSimulation {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            shapes_placed: BTreeMap::new(),
            kills_this_wave: BTreeMap::new(),
            paths: BTreeMap::new(),
            winner: None,
        }
    }

    pub fn economy(&self, player: PlayerId) -> Option<Economy> {
        self.world.players.get(&player).and_then(|p| p.economy)
    }

    pub fn enemy_path(&self, player: PlayerId) -> Option<&[Vec2]> {
        self.paths.get(&player).map(|path| path.as_slice())
    }

    fn bounds_for(&self, player: PlayerId) -> Result<GridBounds, Reason> {
        self.world
            .slot_of(player)
            .map(World::board_bounds)
            .ok_or(Reason::PlayerNotFound)
    }

    fn credit_kill(&mut self, killer: PlayerId, reward: u32, changes: &mut ChangeLog) {
        let Some(economy) = self.economy_mut(killer) else {
            return;
        };
        economy.credit(reward);
        economy.score += reward * rules::SCORE_PER_REWARD;
        let wave = economy.wave;

        let kills = self.kills_this_wave.entry(killer).or_insert(0);
        *kills += 1;
        if *kills >= rules::kill_threshold(wave) {
            *kills = 0;
            if let Some(economy) = self.economy_mut(killer) {
                economy.wave += 1;
                info!("Player {} advanced to wave {}", killer, economy.wave);
            }
        }
        changes.mark(EntityKind::Player, killer);
    }

    /// Ends the game when `loser` runs out of health. The remaining player
    /// with the best score wins, ties going to the lower id.
    fn finish(&mut self, loser: PlayerId, changes: &mut ChangeLog) {
        self.world.phase = Phase::Ended;
        self.winner = self
            .world
            .players
            .values()
            .filter(|player| player.id != loser)
            .max_by_key(|player| {
                (
                    player.economy.map(|e| e.score).unwrap_or(0),
                    Reverse(player.id),
                )
            })
            .map(|player| player.id);
        changes.mark_world();
        info!(
            "Player {} eliminated, winner is {:?}",
            loser, self.winner
        );
    }

    fn apply_leaks(&mut self, dt: f32, changes: &mut ChangeLog) -> bool {
        for enemy in self.world.advance_enemies(dt, changes) {
            let Some(owner) = enemy.owner else {
                continue;
            };
            let depleted = match self.economy_mut(owner) {
                Some(economy) => economy.take_damage(rules::LEAK_DAMAGE),
                None => false,
            };
            changes.mark(EntityKind::Player, owner);
            if depleted {
                self.finish(owner, changes);
                return true;
            }
        }
        false
    }

    fn launch_projectiles(&mut self, changes: &mut ChangeLog) {
        for (tower, target_id) in self.world.ready_shots(true, changes) {
            let stats = tower.stats();
            let id = self.world.next_id();
            self.world.projectiles.insert(
                id,
                Projectile {
                    id,
                    tower_id: tower.id,
                    owner: tower.owner,
                    target_id,
                    position: tower.position(),
                    speed: rules::PROJECTILE_SPEED,
                    damage: stats.damage,
                    splash_radius: stats.splash_radius,
                },
            );
            changes.mark(EntityKind::Projectile, id);
        }
    }

    fn advance_projectiles(&mut self, dt: f32, changes: &mut ChangeLog) {
        let ids: Vec<EntityId> = self.world.projectiles.keys().copied().collect();
        for id in ids {
            changes.mark(EntityKind::Projectile, id);
            let Some(projectile) = self.world.projectiles.get(&id).cloned() else {
                continue;
            };
            let Some(target) = self
                .world
                .enemies
                .get(&projectile.target_id)
                .map(|enemy| enemy.position)
            else {
                self.world.projectiles.remove(&id);
                continue;
            };

            let position = projectile
                .position
                .move_toward(target, projectile.speed * dt);
            if position.distance(target) > rules::PROJECTILE_HIT_RADIUS {
                if let Some(entry) = self.world.projectiles.get_mut(&id) {
                    entry.position = position;
                }
                continue;
            }

            self.world.projectiles.remove(&id);
            let killed = self.world.apply_hit(
                projectile.target_id,
                target,
                projectile.damage,
                projectile.splash_radius,
                changes,
            );
            for enemy in killed {
                debug!("Enemy {} killed by tower {}", enemy.id, projectile.tower_id);
                self.credit_kill(projectile.owner, enemy.reward, changes);
            }
        }
    }

    fn spawn_wave_enemies(&mut self, changes: &mut ChangeLog) {
        let roster: Vec<(PlayerId, u32)> = self
            .world
            .players
            .values()
            .filter_map(|player| player.economy.map(|economy| (player.id, economy.wave)))
            .collect();
        for (player, wave) in roster {
            let path = match self.paths.get(&player) {
                Some(path) => path.clone(),
                None => continue,
            };
            self.world.spawn_enemy(Some(player), wave, path, changes);
        }
    }
}

impl Simulation for CompetitiveSimulation {
    fn mode(&self) -> GameMode {
        GameMode::Competitive
    }

    fn world(&self) -> &World {
        &self.world
    }

    fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn world_state(&self) -> WorldState {
        WorldState {
            phase: self.world.phase,
            turn: None,
            shared_resources: None,
            shapes_placed: self
                .shapes_placed
                .iter()
                .map(|(id, count)| (*id, *count))
                .collect(),
            winner: self.winner,
        }
    }

    fn max_players(&self) -> usize {
        MAX_PLAYERS
    }

    fn add_player(&mut self, id: PlayerId, name: &str, changes: &mut ChangeLog) -> Option<usize> {
        let economy = Economy::new(rules::COMPETITIVE_STARTING_MONEY);
        let slot = self
            .world
            .add_player(id, name, Some(economy), MAX_PLAYERS, changes)?;
        self.shapes_placed.entry(id).or_insert(0);
        changes.mark_world();
        Some(slot)
    }

    fn remove_player(&mut self, id: PlayerId, changes: &mut ChangeLog) -> bool {
        let removed = self.world.remove_player(id, changes);
        if removed {
            self.shapes_placed.remove(&id);
            self.kills_this_wave.remove(&id);
            self.paths.remove(&id);
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
        let bounds = self.bounds_for(player)?;
        let placed = self.shapes_placed.get(&player).copied().unwrap_or(0);
        if placed >= COMPETITIVE_SHAPES_PER_PLAYER {
            return Err(Reason::MaxShapesReached);
        }

        let cells = rules::shape_cells(shape, anchor, rotation);
        self.world.validate_piece_cells(&cells, bounds)?;

        let id = self.world.commit_piece(player, shape, cells.clone());
        if self.world.route(bounds).is_none() {
            self.world.remove_piece(id);
            debug!("Rejected piece from player {} at {:?}: no route remains", player, anchor);
            return Err(Reason::PathBlocked);
        }

        let shapes_placed = placed + 1;
        self.shapes_placed.insert(player, shapes_placed);
        changes.mark(EntityKind::MazePiece, id);
        changes.mark(EntityKind::Player, player);
        changes.mark_world();

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
        let bounds = self.bounds_for(player)?;
        if !bounds.contains_cell(cell) {
            return Err(Reason::OutOfBounds);
        }
        if self.world.occupied.contains_key(&cell) {
            return Err(Reason::PositionOccupied);
        }
        if self.world.too_close_to_tower(cell) {
            return Err(Reason::TooCloseToTower);
        }

        let economy = self.economy_mut(player).ok_or(Reason::PlayerNotFound)?;
        economy.spend(rules::tower_stats(tower_type).cost)?;
        let economy = *economy;

        let tower = self.world.insert_tower(player, tower_type, cell, changes);
        Ok(ActionData::TowerPlaced { tower, economy })
    }

    fn mark_ready(&mut self, player: PlayerId, changes: &mut ChangeLog) -> Result<ActionData, Reason> {
        if self.world.phase != Phase::Building {
            return Err(Reason::WrongPhase);
        }
        let entry = self
            .world
            .players
            .get_mut(&player)
            .ok_or(Reason::PlayerNotFound)?;
        entry.ready = true;
        changes.mark(EntityKind::Player, player);

        Ok(ActionData::ReadyAcknowledged {
            all_ready: self.all_ready(),
        })
    }

    fn all_ready(&self) -> bool {
        let mut connected = self
            .world
            .players
            .values()
            .filter(|player| player.connected)
            .peekable();
        connected.peek().is_some() && connected.all(|player| player.ready)
    }

    fn begin_defense(&mut self, changes: &mut ChangeLog) -> bool {
        if self.world.phase != Phase::Building {
            return false;
        }
        self.world.phase = Phase::Defense;

        let players: Vec<PlayerId> = self.world.players.keys().copied().collect();
        for player in players {
            let Ok(bounds) = self.bounds_for(player) else {
                continue;
            };
            let path = self
                .world
                .route(bounds)
                .unwrap_or_else(|| vec![World::spawn_point(bounds), World::exit_point(bounds)]);
            self.paths.insert(player, path);
        }
        self.world.reset_spawn_timer();
        changes.mark_world();
        info!("All players ready, entering defense");
        true
    }

    fn update(&mut self, dt: f32, changes: &mut ChangeLog) {
        if self.world.phase != Phase::Defense {
            return;
        }
        self.world.elapsed_ms += dt as f64 * 1000.0;

        if self.apply_leaks(dt, changes) {
            return;
        }
        self.launch_projectiles(changes);
        self.advance_projectiles(dt, changes);

        if self.world.spawn_due(dt) {
            self.spawn_wave_enemies(changes);
        }
    }

    fn economy_mut(&mut self, player: PlayerId) -> Option<&mut Economy> {
        self.world
            .players
            .get_mut(&player)
            .and_then(|p| p.economy.as_mut())
    }

    fn mark_economy(&self, player: PlayerId, changes: &mut ChangeLog) {
        changes.mark(EntityKind::Player, player);
    }

    fn winner(&self) -> Option<PlayerId> {
        self.winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Enemy, EnemyKind};

    const TICK: f32 = 1.0 / 60.0;

    fn sim_in_defense() -> (CompetitiveSimulation, ChangeLog) {
        let mut sim = CompetitiveSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);
        sim.add_player(2, "bo", &mut changes);
        sim.mark_ready(1, &mut changes).unwrap();
        sim.mark_ready(2, &mut changes).unwrap();
        assert!(sim.begin_defense(&mut changes));
        changes.drain();
        (sim, changes)
    }

    fn stationary_enemy(sim: &mut CompetitiveSimulation, owner: PlayerId, at: Vec2) -> EntityId {
        let id = sim.world_mut().next_id();
        sim.world_mut().enemies.insert(
            id,
            Enemy {
                id,
                owner: Some(owner),
                kind: EnemyKind::Grunt,
                health: 50.0,
                max_health: 50.0,
                speed: 0.0,
                path: vec![at, Vec2::new(at.x, 0.0)],
                progress: 0.0,
                position: at,
                reward: 10,
            },
        );
        id
    }

    #[test]
    fn test_players_get_separate_boards() {
        let mut sim = CompetitiveSimulation::new();
        let mut changes = ChangeLog::new();
        assert_eq!(sim.add_player(1, "ada", &mut changes), Some(0));
        assert_eq!(sim.add_player(2, "bo", &mut changes), Some(1));

        sim.place_maze_piece(1, ShapeKind::O, GridCell::new(3, 3), 0, &mut changes)
            .unwrap();
        let on_other_board =
            sim.place_maze_piece(1, ShapeKind::O, GridCell::new(27, 3), 0, &mut changes);
        assert_eq!(on_other_board.err(), Some(Reason::OutOfBounds));

        sim.place_maze_piece(2, ShapeKind::O, GridCell::new(27, 3), 0, &mut changes)
            .unwrap();
        assert_eq!(sim.world_state().shapes_placed, vec![(1, 1), (2, 1)]);
        assert_eq!(sim.economy(1).map(|e| e.money), Some(150));
    }

    #[test]
    fn test_shape_quota() {
        let mut sim = CompetitiveSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);

        for i in 0..COMPETITIVE_SHAPES_PER_PLAYER as i32 {
            let anchor = GridCell::new((i % 4) * 4, 14 + (i / 4) * 3);
            sim.place_maze_piece(1, ShapeKind::O, anchor, 0, &mut changes)
                .unwrap();
        }
        let result = sim.place_maze_piece(1, ShapeKind::O, GridCell::new(2, 2), 0, &mut changes);
        assert_eq!(result.err(), Some(Reason::MaxShapesReached));
    }

    #[test]
    fn test_defense_waits_for_every_connected_player() {
        let mut sim = CompetitiveSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);
        sim.add_player(2, "bo", &mut changes);

        match sim.mark_ready(1, &mut changes).unwrap() {
            ActionData::ReadyAcknowledged { all_ready } => assert!(!all_ready),
            other => panic!("unexpected data {:?}", other),
        }
        assert!(!sim.all_ready());

        sim.set_connected(2, false, &mut changes);
        assert!(sim.all_ready());
        assert!(sim.begin_defense(&mut changes));
        assert!(!sim.begin_defense(&mut changes));
        assert_eq!(sim.mark_ready(2, &mut changes).err(), Some(Reason::WrongPhase));
        assert!(sim.enemy_path(1).is_some());
    }

    #[test]
    fn test_tower_placement_rules() {
        let mut sim = CompetitiveSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);
        sim.add_player(2, "bo", &mut changes);
        sim.place_maze_piece(1, ShapeKind::O, GridCell::new(3, 3), 0, &mut changes)
            .unwrap();
        sim.begin_defense(&mut changes);

        let on_maze = sim.place_tower(1, TowerType::Basic, GridCell::new(3, 3), &mut changes);
        assert_eq!(on_maze.err(), Some(Reason::PositionOccupied));
        let foreign = sim.place_tower(1, TowerType::Basic, GridCell::new(30, 5), &mut changes);
        assert_eq!(foreign.err(), Some(Reason::OutOfBounds));

        sim.place_tower(1, TowerType::Sniper, GridCell::new(8, 8), &mut changes)
            .unwrap();
        let close = sim.place_tower(1, TowerType::Basic, GridCell::new(9, 9), &mut changes);
        assert_eq!(close.err(), Some(Reason::TooCloseToTower));

        let broke = sim.place_tower(1, TowerType::Cannon, GridCell::new(12, 8), &mut changes);
        assert_eq!(broke.err(), Some(Reason::InsufficientFunds));
        assert_eq!(sim.economy(1).map(|e| e.money), Some(50));
        assert_eq!(sim.economy(2).map(|e| e.money), Some(150));
    }

    #[test]
    fn test_tower_needs_two_hits_for_grunt_and_credits_killer() {
        let (mut sim, mut changes) = sim_in_defense();
        sim.place_tower(1, TowerType::Basic, GridCell::new(5, 7), &mut changes)
            .unwrap();
        let enemy = stationary_enemy(&mut sim, 1, Vec2::new(5.0, 5.0));

        // First shot lands within the first second.
        for _ in 0..30 {
            sim.update(TICK, &mut changes);
        }
        assert!(sim.world().enemies.contains_key(&enemy));
        assert_eq!(sim.world().enemies[&enemy].health, 25.0);
        assert_eq!(sim.economy(1).map(|e| e.money), Some(100));

        // Cooldown elapses after a second and the second shot kills.
        for _ in 0..60 {
            sim.update(TICK, &mut changes);
        }
        assert!(!sim.world().enemies.contains_key(&enemy));
        assert!(sim.world().projectiles.is_empty());
        let economy = sim.economy(1).unwrap();
        assert_eq!(economy.money, 110);
        assert_eq!(economy.score, 100);
    }

    #[test]
    fn test_towers_ignore_other_players_enemies() {
        let (mut sim, mut changes) = sim_in_defense();
        sim.place_tower(1, TowerType::Basic, GridCell::new(5, 7), &mut changes)
            .unwrap();
        let foreign = stationary_enemy(&mut sim, 2, Vec2::new(5.0, 5.0));

        for _ in 0..30 {
            sim.update(TICK, &mut changes);
        }
        assert!(sim.world().projectiles.is_empty());
        assert_eq!(sim.world().enemies[&foreign].health, 50.0);
    }

    #[test]
    fn test_health_depletion_ends_game_and_names_winner() {
        let (mut sim, mut changes) = sim_in_defense();
        if let Some(economy) = sim.economy_mut(1) {
            economy.health = 1;
        }
        if let Some(economy) = sim.economy_mut(2) {
            economy.score = 40;
        }

        sim.update(2.0, &mut changes);
        assert_eq!(sim.world().enemies.len(), 2);

        sim.update(30.0, &mut changes);
        assert_eq!(sim.phase(), Phase::Ended);
        assert_eq!(sim.winner(), Some(2));
        assert_eq!(sim.world_state().winner, Some(2));
        assert_eq!(
            sim.place_tower(2, TowerType::Basic, GridCell::new(30, 5), &mut changes)
                .err(),
            Some(Reason::WrongPhase)
        );
    }
}
