//! Fixed game balance tables shared by server and clients.

use crate::{EnemyKind, GridCell, ShapeKind, TowerType};

pub const BOARD_SIZE: i32 = 20;
pub const BOARD_GAP: i32 = 4;
pub const SPAWN_CELL: GridCell = GridCell::new(0, 10);
pub const EXIT_CELL: GridCell = GridCell::new(19, 10);

pub const STARTING_HEALTH: u32 = 20;
pub const COOPERATIVE_STARTING_MONEY: u32 = 200;
pub const COMPETITIVE_STARTING_MONEY: u32 = 150;
pub const LEAK_DAMAGE: u32 = 1;

pub const COOPERATIVE_SHAPES_PER_PLAYER: u32 = 3;
pub const COMPETITIVE_SHAPES_PER_PLAYER: u32 = 8;

pub const MIN_TOWER_SPACING: f32 = 1.5;
pub const UPGRADE_COST_GROWTH: f32 = 1.5;
pub const SELL_REFUND_PERCENT: u32 = 70;

pub const SPAWN_INTERVAL_SECS: f32 = 2.0;
pub const PROJECTILE_SPEED: f32 = 15.0;
pub const PROJECTILE_HIT_RADIUS: f32 = 0.2;
pub const SCORE_PER_REWARD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowerStats {
    pub cost: u32,
    pub damage: f32,
    pub range: f32,
    pub fire_rate_ms: f64,
    pub splash_radius: f32,
}

pub fn tower_stats(tower_type: TowerType) -> TowerStats {
    match tower_type {
        TowerType::Basic => TowerStats {
            cost: 50,
            damage: 25.0,
            range: 3.0,
            fire_rate_ms: 1000.0,
            splash_radius: 0.0,
        },
        TowerType::Sniper => TowerStats {
            cost: 100,
            damage: 80.0,
            range: 7.0,
            fire_rate_ms: 2000.0,
            splash_radius: 0.0,
        },
        TowerType::Cannon => TowerStats {
            cost: 120,
            damage: 40.0,
            range: 3.5,
            fire_rate_ms: 1500.0,
            splash_radius: 1.0,
        },
        TowerType::Missile => TowerStats {
            cost: 150,
            damage: 60.0,
            range: 5.0,
            fire_rate_ms: 2500.0,
            splash_radius: 1.5,
        },
    }
}

/// Stats after applying level scaling. Level 1 is the base table.
pub fn tower_stats_at_level(tower_type: TowerType, level: u32) -> TowerStats {
    let base = tower_stats(tower_type);
    let extra_levels = level.saturating_sub(1) as f32;
    TowerStats {
        damage: base.damage * (1.0 + 0.5 * extra_levels),
        range: base.range + 0.25 * extra_levels,
        ..base
    }
}

/// Cost of going from `level` to `level + 1`.
pub fn upgrade_cost(tower_type: TowerType, level: u32) -> u32 {
    let base = tower_stats(tower_type).cost as f32;
    (base * UPGRADE_COST_GROWTH.powi(level as i32)).round() as u32
}

pub fn sell_refund(total_invested: u32) -> u32 {
    total_invested * SELL_REFUND_PERCENT / 100
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyStats {
    pub kind: EnemyKind,
    pub health: f32,
    pub speed: f32,
    pub reward: u32,
}

pub fn enemy_kind_for_wave(wave: u32) -> EnemyKind {
    if wave > 0 && wave % 10 == 0 {
        EnemyKind::Boss
    } else if wave > 0 && wave % 5 == 0 {
        EnemyKind::Tank
    } else if wave > 0 && wave % 3 == 0 {
        EnemyKind::Runner
    } else {
        EnemyKind::Grunt
    }
}

pub fn enemy_stats_for_wave(wave: u32) -> EnemyStats {
    let kind = enemy_kind_for_wave(wave);
    let (health, speed, reward) = match kind {
        EnemyKind::Grunt => (50.0, 1.0, 10),
        EnemyKind::Runner => (35.0, 1.8, 12),
        EnemyKind::Tank => (150.0, 0.6, 25),
        EnemyKind::Boss => (600.0, 0.5, 100),
    };
    let scale = 1.0 + 0.15 * wave.saturating_sub(1) as f32;
    EnemyStats {
        kind,
        health: health * scale,
        speed,
        reward,
    }
}

/// Kills needed during `wave` before the next wave starts.
pub fn kill_threshold(wave: u32) -> u32 {
    10 + 5 * wave.saturating_sub(1)
}

/// Cell offsets of a shape after `rotation` quarter turns counter-clockwise.
pub fn shape_offsets(shape: ShapeKind, rotation: u8) -> [(i32, i32); 4] {
    let base = match shape {
        ShapeKind::I => [(0, 0), (1, 0), (2, 0), (3, 0)],
        ShapeKind::O => [(0, 0), (1, 0), (0, 1), (1, 1)],
        ShapeKind::T => [(0, 0), (1, 0), (2, 0), (1, 1)],
        ShapeKind::L => [(0, 0), (0, 1), (0, 2), (1, 2)],
        ShapeKind::J => [(1, 0), (1, 1), (1, 2), (0, 2)],
        ShapeKind::S => [(1, 0), (2, 0), (0, 1), (1, 1)],
        ShapeKind::Z => [(0, 0), (1, 0), (1, 1), (2, 1)],
    };
    base.map(|(mut x, mut y)| {
        for _ in 0..rotation % 4 {
            (x, y) = (-y, x);
        }
        (x, y)
    })
}

pub fn shape_cells(shape: ShapeKind, anchor: GridCell, rotation: u8) -> Vec<GridCell> {
    shape_offsets(shape, rotation)
        .iter()
        .map(|(dx, dy)| anchor.offset(*dx, *dy))
        .collect()
}

/// Bottom-left cell of the board assigned to `slot`.
pub fn board_origin(slot: usize) -> GridCell {
    GridCell::new(slot as i32 * (BOARD_SIZE + BOARD_GAP), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_upgrade_cost_grows_geometrically() {
        assert_eq!(upgrade_cost(TowerType::Basic, 1), 75);
        assert_eq!(upgrade_cost(TowerType::Basic, 2), 113);
        assert_eq!(upgrade_cost(TowerType::Sniper, 1), 150);
        assert!(upgrade_cost(TowerType::Missile, 3) > upgrade_cost(TowerType::Missile, 2));
    }

    #[test]
    fn test_sell_refund_is_fraction_of_investment() {
        assert_eq!(sell_refund(50), 35);
        assert_eq!(sell_refund(125), 87);
        assert_eq!(sell_refund(0), 0);
    }

    #[test]
    fn test_level_scaling() {
        let base = tower_stats_at_level(TowerType::Basic, 1);
        assert_approx_eq!(base.damage, 25.0, 0.001);
        let upgraded = tower_stats_at_level(TowerType::Basic, 3);
        assert_approx_eq!(upgraded.damage, 50.0, 0.001);
        assert_approx_eq!(upgraded.range, 3.5, 0.001);
        assert_eq!(upgraded.cost, base.cost);
    }

    #[test]
    fn test_enemy_kind_by_wave() {
        assert_eq!(enemy_kind_for_wave(1), EnemyKind::Grunt);
        assert_eq!(enemy_kind_for_wave(3), EnemyKind::Runner);
        assert_eq!(enemy_kind_for_wave(5), EnemyKind::Tank);
        assert_eq!(enemy_kind_for_wave(10), EnemyKind::Boss);
        assert_eq!(enemy_kind_for_wave(15), EnemyKind::Tank);
    }

    #[test]
    fn test_first_wave_grunt_stats() {
        let stats = enemy_stats_for_wave(1);
        assert_eq!(stats.kind, EnemyKind::Grunt);
        assert_approx_eq!(stats.health, 50.0, 0.001);
        assert_eq!(stats.reward, 10);

        let later = enemy_stats_for_wave(2);
        assert_approx_eq!(later.health, 57.5, 0.001);
    }

    #[test]
    fn test_kill_threshold() {
        assert_eq!(kill_threshold(1), 10);
        assert_eq!(kill_threshold(3), 20);
    }

    #[test]
    fn test_shapes_have_four_distinct_cells_in_every_rotation() {
        for shape in [
            ShapeKind::I,
            ShapeKind::O,
            ShapeKind::T,
            ShapeKind::L,
            ShapeKind::J,
            ShapeKind::S,
            ShapeKind::Z,
        ] {
            for rotation in 0..4 {
                let mut cells = shape_cells(shape, GridCell::new(5, 5), rotation);
                cells.sort();
                cells.dedup();
                assert_eq!(cells.len(), 4, "{:?} rotation {}", shape, rotation);
            }
        }
    }

    #[test]
    fn test_rotation_turns_i_piece_vertical() {
        let cells = shape_cells(ShapeKind::I, GridCell::new(0, 0), 1);
        assert_eq!(
            cells,
            vec![
                GridCell::new(0, 0),
                GridCell::new(0, 1),
                GridCell::new(0, 2),
                GridCell::new(0, 3)
            ]
        );
    }

    #[test]
    fn test_board_origins_do_not_overlap() {
        assert_eq!(board_origin(0), GridCell::new(0, 0));
        assert_eq!(board_origin(1), GridCell::new(24, 0));
        assert!(board_origin(2).x >= board_origin(1).x + BOARD_SIZE);
    }
}
