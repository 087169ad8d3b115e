//! Entity arena shared by both simulation variants
//!
//! `World` owns every entity of one session in id-keyed maps, the cell
//! occupancy index, the simulation clock and the spawn timer. Variant code
//! decides *who* pays and *who* gets credited; the world does the movement,
//! targeting and damage bookkeeping that both variants have in common.

use super::changes::{ChangeLog, EntityKind};
use crate::pathfinder::{GridBounds, Pathfinder};
use shared::rules::{self, BOARD_SIZE, EXIT_CELL, SPAWN_CELL};
use shared::{
    Economy, Enemy, EntityId, GridCell, MazePiece, Phase, Player, PlayerId, Reason, ShapeKind,
    Tower, TowerType, Vec2,
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct World {
    pub phase: Phase,
    pub players: BTreeMap<PlayerId, Player>,
    pub towers: BTreeMap<EntityId, Tower>,
    pub enemies: BTreeMap<EntityId, Enemy>,
    pub maze_pieces: BTreeMap<EntityId, MazePiece>,
    pub projectiles: BTreeMap<EntityId, shared::Projectile>,
    /// Cell -> maze piece occupying it.
    pub occupied: HashMap<GridCell, EntityId>,
    /// Simulation clock in milliseconds, advanced only during defense.
    pub elapsed_ms: f64,
    slots: BTreeMap<PlayerId, usize>,
    next_entity_id: EntityId,
    spawn_timer: f32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            phase: Phase::Building,
            players: BTreeMap::new(),
            towers: BTreeMap::new(),
            enemies: BTreeMap::new(),
            maze_pieces: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            occupied: HashMap::new(),
            elapsed_ms: 0.0,
            slots: BTreeMap::new(),
            next_entity_id: 1,
            spawn_timer: 0.0,
        }
    }

    pub fn next_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Adds a player in the lowest free slot below `max_slots`.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        name: &str,
        economy: Option<Economy>,
        max_slots: usize,
        changes: &mut ChangeLog,
    ) -> Option<usize> {
        if let Some(slot) = self.slots.get(&id) {
            return Some(*slot);
        }
        let slot = (0..max_slots).find(|slot| !self.slots.values().any(|s| s == slot))?;
        self.slots.insert(id, slot);
        self.players.insert(id, Player::new(id, name, economy));
        changes.mark(EntityKind::Player, id);
        Some(slot)
    }

    pub fn remove_player(&mut self, id: PlayerId, changes: &mut ChangeLog) -> bool {
        self.slots.remove(&id);
        let removed = self.players.remove(&id).is_some();
        if removed {
            changes.mark(EntityKind::Player, id);
        }
        removed
    }

    pub fn slot_of(&self, id: PlayerId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn player_in_slot(&self, slot: usize) -> Option<PlayerId> {
        self.slots
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(id, _)| *id)
    }

    pub fn board_bounds(slot: usize) -> GridBounds {
        GridBounds::new(rules::board_origin(slot), BOARD_SIZE)
    }

    pub fn spawn_point(bounds: GridBounds) -> Vec2 {
        bounds.cell_at(SPAWN_CELL.x, SPAWN_CELL.y).center()
    }

    pub fn exit_point(bounds: GridBounds) -> Vec2 {
        bounds.cell_at(EXIT_CELL.x, EXIT_CELL.y).center()
    }

    /// Maze cells inside `bounds`, as pathfinding obstacles.
    pub fn obstacles_in(&self, bounds: GridBounds) -> HashSet<GridCell> {
        self.occupied
            .keys()
            .filter(|cell| bounds.contains_cell(**cell))
            .copied()
            .collect()
    }

    pub fn route(&self, bounds: GridBounds) -> Option<Vec<Vec2>> {
        Pathfinder::new(bounds).find_path(
            Self::spawn_point(bounds),
            Self::exit_point(bounds),
            &self.obstacles_in(bounds),
        )
    }

    /// Checks bounds and occupancy of a prospective piece.
    pub fn validate_piece_cells(&self, cells: &[GridCell], bounds: GridBounds) -> Result<(), Reason> {
        if cells.iter().any(|cell| !bounds.contains_cell(*cell)) {
            return Err(Reason::OutOfBounds);
        }
        if cells.iter().any(|cell| self.occupied.contains_key(cell)) {
            return Err(Reason::PositionOccupied);
        }
        Ok(())
    }

    /// Inserts a piece without marking it changed. Pair with `remove_piece`
    /// when a provisional placement has to be rolled back.
    pub fn commit_piece(&mut self, owner: PlayerId, shape: ShapeKind, cells: Vec<GridCell>) -> EntityId {
        let id = self.next_id();
        for cell in &cells {
            self.occupied.insert(*cell, id);
        }
        if let Some(player) = self.players.get_mut(&owner) {
            player.structures.push(id);
        }
        self.maze_pieces.insert(id, MazePiece { id, owner, shape, cells });
        id
    }

    pub fn remove_piece(&mut self, id: EntityId) -> Option<MazePiece> {
        let piece = self.maze_pieces.remove(&id)?;
        for cell in &piece.cells {
            self.occupied.remove(cell);
        }
        if let Some(player) = self.players.get_mut(&piece.owner) {
            player.structures.retain(|s| *s != id);
        }
        Some(piece)
    }

    pub fn too_close_to_tower(&self, cell: GridCell) -> bool {
        let position = cell.center();
        self.towers
            .values()
            .any(|tower| tower.position().distance(position) < rules::MIN_TOWER_SPACING)
    }

    pub fn insert_tower(
        &mut self,
        owner: PlayerId,
        tower_type: TowerType,
        cell: GridCell,
        changes: &mut ChangeLog,
    ) -> Tower {
        let id = self.next_id();
        let tower = Tower {
            id,
            owner,
            tower_type,
            cell,
            level: 1,
            last_fired: None,
            total_invested: rules::tower_stats(tower_type).cost,
        };
        self.towers.insert(id, tower.clone());
        if let Some(player) = self.players.get_mut(&owner) {
            player.structures.push(id);
            changes.mark(EntityKind::Player, owner);
        }
        changes.mark(EntityKind::Tower, id);
        tower
    }

    pub fn remove_tower(&mut self, id: EntityId, changes: &mut ChangeLog) -> Option<Tower> {
        let tower = self.towers.remove(&id)?;
        if let Some(player) = self.players.get_mut(&tower.owner) {
            player.structures.retain(|s| *s != id);
            changes.mark(EntityKind::Player, tower.owner);
        }
        changes.mark(EntityKind::Tower, id);
        Some(tower)
    }

    /// Looks up a tower and checks that `player` owns it.
    pub fn owned_tower(&self, player: PlayerId, tower_id: EntityId) -> Result<&Tower, Reason> {
        let tower = self.towers.get(&tower_id).ok_or(Reason::TowerNotFound)?;
        if tower.owner != player {
            return Err(Reason::NotYourTower);
        }
        Ok(tower)
    }

    /// Advances the spawn timer and reports whether a spawn is due.
    pub fn spawn_due(&mut self, dt: f32) -> bool {
        self.spawn_timer += dt;
        if self.spawn_timer >= rules::SPAWN_INTERVAL_SECS {
            self.spawn_timer -= rules::SPAWN_INTERVAL_SECS;
            true
        } else {
            false
        }
    }

    pub fn reset_spawn_timer(&mut self) {
        self.spawn_timer = 0.0;
    }

    pub fn spawn_enemy(
        &mut self,
        owner: Option<PlayerId>,
        wave: u32,
        path: Vec<Vec2>,
        changes: &mut ChangeLog,
    ) -> EntityId {
        let stats = rules::enemy_stats_for_wave(wave);
        let id = self.next_id();
        let position = path.first().copied().unwrap_or_default();
        self.enemies.insert(
            id,
            Enemy {
                id,
                owner,
                kind: stats.kind,
                health: stats.health,
                max_health: stats.health,
                speed: stats.speed,
                path,
                progress: 0.0,
                position,
                reward: stats.reward,
            },
        );
        changes.mark(EntityKind::Enemy, id);
        id
    }

    /// Moves every enemy along its path. Enemies that reach the end are
    /// removed and returned so the caller can apply leak damage.
    pub fn advance_enemies(&mut self, dt: f32, changes: &mut ChangeLog) -> Vec<Enemy> {
        let mut leaked = Vec::new();

        for enemy in self.enemies.values_mut() {
            let length = path_length(&enemy.path);
            if length > f32::EPSILON {
                enemy.progress = (enemy.progress + enemy.speed * dt / length).min(1.0);
            } else {
                enemy.progress = 1.0;
            }
            if enemy.progress < 1.0 {
                enemy.position = position_along(&enemy.path, enemy.progress);
            }
            changes.mark(EntityKind::Enemy, enemy.id);
        }

        let finished: Vec<EntityId> = self
            .enemies
            .values()
            .filter(|enemy| enemy.progress >= 1.0)
            .map(|enemy| enemy.id)
            .collect();
        for id in finished {
            if let Some(enemy) = self.enemies.remove(&id) {
                leaked.push(enemy);
            }
        }

        leaked
    }

    /// Nearest enemy within `range` of `from`, restricted to `owner` when given.
    pub fn nearest_enemy(&self, from: Vec2, range: f32, owner: Option<PlayerId>) -> Option<EntityId> {
        self.enemies
            .values()
            .filter(|enemy| owner.is_none() || enemy.owner == owner)
            .map(|enemy| (enemy.id, enemy.position.distance(from)))
            .filter(|(_, distance)| *distance <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Towers whose cooldown has elapsed, paired with a target, with their
    /// fire time recorded. Targets are limited to the tower owner's enemies
    /// when `same_owner` is set.
    pub fn ready_shots(&mut self, same_owner: bool, changes: &mut ChangeLog) -> Vec<(Tower, EntityId)> {
        let now = self.elapsed_ms;
        let candidates: Vec<(EntityId, Vec2, f32, Option<PlayerId>)> = self
            .towers
            .values()
            .filter(|tower| match tower.last_fired {
                Some(last) => now - last >= tower.stats().fire_rate_ms,
                None => true,
            })
            .map(|tower| {
                let owner = if same_owner { Some(tower.owner) } else { None };
                (tower.id, tower.position(), tower.stats().range, owner)
            })
            .collect();

        let mut shots = Vec::new();
        for (tower_id, position, range, owner) in candidates {
            let Some(target) = self.nearest_enemy(position, range, owner) else {
                continue;
            };
            if let Some(tower) = self.towers.get_mut(&tower_id) {
                tower.last_fired = Some(now);
                changes.mark(EntityKind::Tower, tower_id);
                shots.push((tower.clone(), target));
            }
        }
        shots
    }

    /// Applies damage to `target` and, with a splash radius, to other enemies
    /// of the same owner around `impact`. Returns the enemies killed.
    pub fn apply_hit(
        &mut self,
        target: EntityId,
        impact: Vec2,
        damage: f32,
        splash_radius: f32,
        changes: &mut ChangeLog,
    ) -> Vec<Enemy> {
        let Some(owner) = self.enemies.get(&target).map(|enemy| enemy.owner) else {
            return Vec::new();
        };

        let mut victims = vec![target];
        if splash_radius > 0.0 {
            victims.extend(
                self.enemies
                    .values()
                    .filter(|enemy| enemy.id != target && enemy.owner == owner)
                    .filter(|enemy| enemy.position.distance(impact) <= splash_radius)
                    .map(|enemy| enemy.id),
            );
        }

        let mut killed = Vec::new();
        for id in victims {
            let dead = match self.enemies.get_mut(&id) {
                Some(enemy) => {
                    enemy.health -= damage;
                    changes.mark(EntityKind::Enemy, id);
                    enemy.health <= 0.0
                }
                None => false,
            };
            if dead {
                if let Some(enemy) = self.enemies.remove(&id) {
                    killed.push(enemy);
                }
            }
        }
        killed
    }
}

pub fn path_length(path: &[Vec2]) -> f32 {
    path.windows(2).map(|pair| pair[0].distance(pair[1])).sum()
}

/// Linear interpolation along the segments of `path` at normalized `progress`.
pub fn position_along(path: &[Vec2], progress: f32) -> Vec2 {
    match path {
        [] => Vec2::default(),
        [only] => *only,
        _ => {
            let mut remaining = path_length(path) * progress.clamp(0.0, 1.0);
            for pair in path.windows(2) {
                let segment = pair[0].distance(pair[1]);
                if remaining <= segment {
                    if segment <= f32::EPSILON {
                        return pair[1];
                    }
                    return pair[0].lerp(pair[1], remaining / segment);
                }
                remaining -= segment;
            }
            path[path.len() - 1]
        }
    }
}
