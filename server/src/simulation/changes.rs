//! Pending-change tracking for delta snapshots
//!
//! Every simulation mutator receives the session's `ChangeLog` and appends
//! the entities it touched. The session flushes the log once per tick,
//! looking up each pending id in the current world: present entities are
//! sent by value, missing ones as tombstones.

use super::Simulation;
use shared::{DeltaSnapshot, EntityId, SessionId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    World,
    Player,
    Tower,
    Enemy,
    MazePiece,
    Projectile,
}

#[derive(Debug, Default)]
pub struct ChangeLog {
    pending: Vec<(EntityKind, EntityId)>,
    seen: HashSet<(EntityKind, EntityId)>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change. Repeated marks of the same entity keep the first position.
    pub fn mark(&mut self, kind: EntityKind, id: EntityId) {
        if self.seen.insert((kind, id)) {
            self.pending.push((kind, id));
        }
    }

    pub fn mark_world(&mut self) {
        self.mark(EntityKind::World, 0);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, kind: EntityKind, id: EntityId) -> bool {
        self.seen.contains(&(kind, id))
    }

    pub fn drain(&mut self) -> Vec<(EntityKind, EntityId)> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }

    /// Resolves every pending entry against `sim` and clears the log.
    pub fn flush(
        &mut self,
        session_id: SessionId,
        version: u64,
        sim: &dyn Simulation,
    ) -> DeltaSnapshot {
        let world = sim.world();
        let mut delta = DeltaSnapshot {
            session_id,
            version,
            ..Default::default()
        };

        for (kind, id) in self.drain() {
            match kind {
                EntityKind::World => delta.world = Some(sim.world_state()),
                EntityKind::Player => delta.players.push((id, world.players.get(&id).cloned())),
                EntityKind::Tower => delta.towers.push((id, world.towers.get(&id).cloned())),
                EntityKind::Enemy => delta.enemies.push((id, world.enemies.get(&id).cloned())),
                EntityKind::MazePiece => {
                    delta.maze_pieces.push((id, world.maze_pieces.get(&id).cloned()))
                }
                EntityKind::Projectile => {
                    delta.projectiles.push((id, world.projectiles.get(&id).cloned()))
                }
            }
        }

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::cooperative::CooperativeSimulation;
    use shared::{ShapeKind, GridCell};

    #[test]
    fn test_mark_deduplicates_in_order() {
        let mut changes = ChangeLog::new();
        changes.mark(EntityKind::Tower, 4);
        changes.mark(EntityKind::Enemy, 2);
        changes.mark(EntityKind::Tower, 4);

        assert_eq!(changes.len(), 2);
        assert!(changes.contains(EntityKind::Enemy, 2));
        assert_eq!(
            changes.drain(),
            vec![(EntityKind::Tower, 4), (EntityKind::Enemy, 2)]
        );
        assert!(changes.is_empty());
        assert!(!changes.contains(EntityKind::Tower, 4));
    }

    #[test]
    fn test_flush_emits_values_and_tombstones() {
        let mut sim = CooperativeSimulation::new();
        let mut changes = ChangeLog::new();
        sim.add_player(1, "ada", &mut changes);
        sim.add_player(2, "bo", &mut changes);
        changes.drain();

        sim.place_maze_piece(1, ShapeKind::O, GridCell::new(5, 2), 0, &mut changes)
            .unwrap();
        changes.mark(EntityKind::Enemy, 999);

        let delta = changes.flush(7, 3, &sim);

        assert_eq!(delta.session_id, 7);
        assert_eq!(delta.version, 3);
        assert_eq!(delta.maze_pieces.len(), 1);
        assert!(delta.maze_pieces[0].1.is_some());
        assert_eq!(delta.enemies, vec![(999, None)]);
        assert!(delta.world.is_some());
        assert!(changes.is_empty());
    }
}
