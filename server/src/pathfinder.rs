//! Grid pathfinding for enemy routing and maze validation
//!
//! Searches a bounded square grid with 8-directional movement. Orthogonal
//! steps cost 1.0 and diagonal steps 1.4, so Chebyshev distance is an
//! admissible heuristic. Obstacles are inflated by a small margin so routes
//! keep clear of structure edges, and diagonal moves may never cut a blocked
//! corner.
//!
//! Raw cell-by-cell routes are simplified with a line-of-sight pass: each
//! retained waypoint is joined to the farthest later waypoint that can be
//! reached in a straight line without clipping an obstacle.
//!
//! A search that fails returns `None`. Callers must treat that as an
//! unsolvable maze and never substitute a straight line.

use log::warn;
use shared::{GridCell, Vec2};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

pub const ORTHOGONAL_COST: f32 = 1.0;
pub const DIAGONAL_COST: f32 = 1.4;
/// Extra clearance around each obstacle cell, in cells.
pub const OBSTACLE_MARGIN: f32 = 0.1;
/// Distance between samples along a line-of-sight segment.
pub const SIGHT_SAMPLE_STEP: f32 = 0.25;
/// Perpendicular offset checked on both sides of a sight line.
pub const SIGHT_SAFETY_OFFSET: f32 = 0.1;

const NEIGHBORS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Square region of cells `[origin, origin + size)` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub origin: GridCell,
    pub size: i32,
}

impl GridBounds {
    pub fn new(origin: GridCell, size: i32) -> Self {
        Self { origin, size }
    }

    pub fn contains_cell(&self, cell: GridCell) -> bool {
        cell.x >= self.origin.x
            && cell.x < self.origin.x + self.size
            && cell.y >= self.origin.y
            && cell.y < self.origin.y + self.size
    }

    /// Points are in bounds anywhere inside the outer edge of the border cells.
    pub fn contains_point(&self, point: Vec2) -> bool {
        let min_x = self.origin.x as f32 - 0.5;
        let min_y = self.origin.y as f32 - 0.5;
        let max_x = (self.origin.x + self.size) as f32 - 0.5;
        let max_y = (self.origin.y + self.size) as f32 - 0.5;
        point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y
    }

    pub fn cell_at(&self, dx: i32, dy: i32) -> GridCell {
        self.origin.offset(dx, dy)
    }
}

/// Open-set entry. Ordered so the max-heap pops the lowest total cost first,
/// and among equal costs the earliest inserted.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    total_cost: f32,
    order: u64,
    cell: GridCell,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .total_cost
            .total_cmp(&self.total_cost)
            .then_with(|| other.order.cmp(&self.order))
    }
}

fn chebyshev(a: GridCell, b: GridCell) -> f32 {
    (a.x - b.x).abs().max((a.y - b.y).abs()) as f32
}

#[derive(Debug, Clone, Copy)]
pub struct Pathfinder {
    bounds: GridBounds,
}

impl Pathfinder {
    pub fn new(bounds: GridBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    /// Finds a simplified route from `start` to `goal`, both snapped to cells.
    ///
    /// Returns `None` if either endpoint is outside the grid or blocked, or
    /// if the obstacles fully separate them.
    pub fn find_path(
        &self,
        start: Vec2,
        goal: Vec2,
        obstacles: &HashSet<GridCell>,
    ) -> Option<Vec<Vec2>> {
        let start_cell = GridCell::from_point(start);
        let goal_cell = GridCell::from_point(goal);

        if !self.is_cell_walkable(start_cell, obstacles)
            || !self.is_cell_walkable(goal_cell, obstacles)
        {
            return None;
        }

        if start_cell == goal_cell {
            return Some(vec![start_cell.center()]);
        }

        let cells = self.search(start_cell, goal_cell, obstacles)?;
        let waypoints: Vec<Vec2> = cells.iter().map(|cell| cell.center()).collect();
        Some(self.simplify(&waypoints, obstacles))
    }

    fn search(
        &self,
        start: GridCell,
        goal: GridCell,
        obstacles: &HashSet<GridCell>,
    ) -> Option<Vec<GridCell>> {
        let max_iterations = (self.bounds.size * self.bounds.size * 8).max(64) as usize;
        let mut iterations = 0;
        let mut insertion_order = 0u64;

        let mut open_set = BinaryHeap::new();
        let mut closed_set: HashSet<GridCell> = HashSet::new();
        let mut came_from: HashMap<GridCell, GridCell> = HashMap::new();
        let mut g_score: HashMap<GridCell, f32> = HashMap::new();

        g_score.insert(start, 0.0);
        open_set.push(OpenNode {
            total_cost: chebyshev(start, goal),
            order: insertion_order,
            cell: start,
        });

        while let Some(OpenNode { cell: current, .. }) = open_set.pop() {
            if closed_set.contains(&current) {
                continue;
            }

            iterations += 1;
            if iterations > max_iterations {
                warn!(
                    "Path search from {:?} to {:?} exceeded {} iterations",
                    start, goal, max_iterations
                );
                return None;
            }

            if current == goal {
                return Some(Self::reconstruct(&came_from, current));
            }

            closed_set.insert(current);
            let current_g = g_score.get(&current).copied().unwrap_or(f32::INFINITY);

            for (dx, dy) in NEIGHBORS {
                let next = current.offset(dx, dy);
                if closed_set.contains(&next) || !self.is_cell_walkable(next, obstacles) {
                    continue;
                }

                let diagonal = dx != 0 && dy != 0;
                if diagonal && !self.can_step_diagonally(current, dx, dy, obstacles) {
                    continue;
                }

                let step = if diagonal { DIAGONAL_COST } else { ORTHOGONAL_COST };
                let tentative = current_g + step;

                if tentative < g_score.get(&next).copied().unwrap_or(f32::INFINITY) {
                    came_from.insert(next, current);
                    g_score.insert(next, tentative);
                    insertion_order += 1;
                    open_set.push(OpenNode {
                        total_cost: tentative + chebyshev(next, goal),
                        order: insertion_order,
                        cell: next,
                    });
                }
            }
        }

        None
    }

    fn reconstruct(came_from: &HashMap<GridCell, GridCell>, mut current: GridCell) -> Vec<GridCell> {
        let mut path = vec![current];
        while let Some(previous) = came_from.get(&current) {
            current = *previous;
            path.push(current);
        }
        path.reverse();
        path
    }

    /// Rejects corner cutting and diagonals whose half-step clips an obstacle.
    fn can_step_diagonally(
        &self,
        from: GridCell,
        dx: i32,
        dy: i32,
        obstacles: &HashSet<GridCell>,
    ) -> bool {
        if obstacles.contains(&from.offset(dx, 0)) || obstacles.contains(&from.offset(0, dy)) {
            return false;
        }
        let half_step = Vec2::new(from.x as f32 + dx as f32 * 0.5, from.y as f32 + dy as f32 * 0.5);
        !self.is_point_blocked(half_step, obstacles)
    }

    fn is_cell_walkable(&self, cell: GridCell, obstacles: &HashSet<GridCell>) -> bool {
        self.bounds.contains_cell(cell) && !obstacles.contains(&cell)
    }

    /// True when `point` lies inside an obstacle's inflated footprint.
    pub fn is_point_blocked(&self, point: Vec2, obstacles: &HashSet<GridCell>) -> bool {
        let reach = 0.5 + OBSTACLE_MARGIN;
        // Only centres strictly within `reach` matter: at most two per axis.
        let min_x = (point.x - reach).floor() as i32 + 1;
        let max_x = (point.x + reach).ceil() as i32 - 1;
        let min_y = (point.y - reach).floor() as i32 + 1;
        let max_y = (point.y + reach).ceil() as i32 - 1;

        for x in min_x..=max_x {
            for y in min_y..=max_y {
                let cell = GridCell::new(x, y);
                if obstacles.contains(&cell)
                    && (point.x - x as f32).abs() < reach
                    && (point.y - y as f32).abs() < reach
                {
                    return true;
                }
            }
        }
        false
    }

    /// Samples the segment and two parallel offsets; every sample must be
    /// in bounds and clear of obstacles.
    pub fn has_line_of_sight(&self, from: Vec2, to: Vec2, obstacles: &HashSet<GridCell>) -> bool {
        let length = from.distance(to);
        let samples = ((length / SIGHT_SAMPLE_STEP).ceil() as usize).max(1);
        let (perp_x, perp_y) = if length > f32::EPSILON {
            (-(to.y - from.y) / length, (to.x - from.x) / length)
        } else {
            (0.0, 0.0)
        };

        for i in 0..=samples {
            let point = from.lerp(to, i as f32 / samples as f32);
            for offset in [0.0, SIGHT_SAFETY_OFFSET, -SIGHT_SAFETY_OFFSET] {
                let sample = Vec2::new(point.x + perp_x * offset, point.y + perp_y * offset);
                if !self.bounds.contains_point(sample) || self.is_point_blocked(sample, obstacles) {
                    return false;
                }
            }
        }
        true
    }

    /// Greedy string-pulling over the raw route.
    pub fn simplify(&self, points: &[Vec2], obstacles: &HashSet<GridCell>) -> Vec<Vec2> {
        if points.len() <= 2 {
            return points.to_vec();
        }

        let mut simplified = vec![points[0]];
        let mut anchor = 0;

        while anchor < points.len() - 1 {
            let mut farthest = anchor + 1;
            for candidate in (anchor + 2)..points.len() {
                if self.has_line_of_sight(points[anchor], points[candidate], obstacles) {
                    farthest = candidate;
                } else {
                    break;
                }
            }
            simplified.push(points[farthest]);
            anchor = farthest;
        }

        simplified
    }
}
