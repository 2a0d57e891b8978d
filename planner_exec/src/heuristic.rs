//! # Heuristic wavefront
//!
//! A 2-D cost-to-go field over the rough (yaw-collapsed) grid, computed by a
//! batched parallel Dijkstra expansion from the goal. The field is the
//! admissible heuristic consumed by the main search. On a local costmap
//! update it is repaired rather than rebuilt: the affected component is
//! erased and the expansion resumes from its rim.
//!
//! The parallel pattern is fixed: a single-threaded phase pops a batch of
//! frontier nodes, workers evaluate outgoing edges against read-only grids
//! into per-node buffers, and a single-threaded merge re-checks each
//! proposed relaxation before committing. Committed values are therefore
//! monotone decreasing and the fixpoint equals the sequential Dijkstra
//! result.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rayon::prelude::*;

use crate::euclid::EuclidCost;
use crate::grid::queue::{BoundedHeap, PriorityVec};
use crate::grid::{GridVec, Gridmap};
use crate::motion::line_sweep;
use crate::remembered::RememberedMap;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Radius of the wavefront neighbourhood disc, in cells.
const ROUGH_RANGE: i32 = 4;

const NEG_COST_WARN_PERIOD: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Weights and ranges consumed by the wavefront, all in grid units.
#[derive(Debug, Clone, Copy)]
pub struct EstimConfig {
    pub linear_resolution: f32,
    pub weight_costmap: f32,
    pub weight_remembered: f32,
    pub range: i32,
    pub local_range: i32,
    pub longcut_range: i32,
    pub num_tasks: usize,
}

/// The cost-to-go field and its expansion state.
#[derive(Debug, Clone)]
pub struct HeuristicField {
    g: Gridmap<f32>,

    /// Cutoff recorded at the end of a fill; cells above it were pruned by
    /// the overshoot gate and must be re-opened by a repair.
    rough_cost_max: f32,

    search_diffs: Vec<SearchDiff>,
    last_neg_warn: Option<Instant>,
}

/// One precomputed wavefront edge: the offset, its straight-line sweep and
/// the rasterisation-to-length factor.
#[derive(Debug, Clone)]
struct SearchDiff {
    d: GridVec,
    swept: Vec<GridVec>,
    grid_to_len: f32,
}

#[derive(Debug, Clone, Copy)]
struct Relax {
    pos: GridVec,
    cost: f32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HeuristicField {
    pub fn new() -> Self {
        let mut search_diffs = Vec::new();
        for dx in -ROUGH_RANGE..=ROUGH_RANGE {
            for dy in -ROUGH_RANGE..=ROUGH_RANGE {
                let d = GridVec::new(dx, dy, 0);
                if (dx == 0 && dy == 0) || d.sqlen() > ROUGH_RANGE * ROUGH_RANGE {
                    continue;
                }
                search_diffs.push(SearchDiff {
                    d,
                    swept: line_sweep(d),
                    grid_to_len: d.grid_to_len_factor(),
                });
            }
        }

        Self {
            g: Gridmap::new(GridVec::new(1, 1, 1), f32::INFINITY).unwrap(),
            rough_cost_max: f32::INFINITY,
            search_diffs,
            last_neg_warn: None,
        }
    }

    /// Reallocate for a map of the given rough size. Invalidates the field.
    pub fn reset(&mut self, width: i32, height: i32) {
        self.g = Gridmap::new(GridVec::new(width, height, 1), f32::INFINITY).unwrap();
        self.rough_cost_max = f32::INFINITY;
    }

    /// Invalidate the whole field.
    pub fn clear(&mut self) {
        self.g.clear(f32::INFINITY);
    }

    /// Cost-to-go lower bound at a rough cell; +inf means unreachable.
    pub fn value(&self, p: GridVec) -> f32 {
        self.g[p.rough()]
    }

    pub fn size(&self) -> GridVec {
        self.g.size()
    }

    /// Rebuild the field from scratch for a new goal.
    pub fn rebuild(
        &mut self,
        pool: &rayon::ThreadPool,
        cm_rough: &Gridmap<u8>,
        remembered: &RememberedMap,
        euclid: &EuclidCost,
        cfg: &EstimConfig,
        goal_rough: GridVec,
        start_rough: GridVec,
    ) {
        let ts = Instant::now();
        self.g.clear(f32::INFINITY);

        let mut open = BoundedHeap::new();
        open.reserve((self.g.size().x * self.g.size().y) as usize / 2);

        // Seed just below zero to avoid a numerical tie at the source
        let seed = -euclid.lin * 0.5;
        self.g[goal_rough.rough()] = seed;
        open.push(PriorityVec::new(seed, seed, goal_rough.rough()));

        self.fill(pool, &mut open, cm_rough, remembered, euclid, cfg, start_rough);
        self.g[goal_rough.rough()] = 0.0;

        debug!(
            "Cost-to-go field generated ({:.4} sec.)",
            ts.elapsed().as_secs_f64()
        );
    }

    /// Repair the field after a local update patch at `(x, y, w, h)`.
    ///
    /// Erases the component of cells whose value is at or above the patch
    /// minimum, reseeds the expansion from the erased region's rim and from
    /// every previously pruned cell, then resumes the fill. The fixpoint
    /// matches a full rebuild.
    pub fn repair(
        &mut self,
        pool: &rayon::ThreadPool,
        patch: (i32, i32, i32, i32),
        cm_rough: &Gridmap<u8>,
        remembered: &RememberedMap,
        euclid: &EuclidCost,
        cfg: &EstimConfig,
        goal_rough: GridVec,
        start_rough: GridVec,
    ) {
        let ts = Instant::now();
        let (px, py, pw, ph) = patch;
        let size = self.g.size();

        // Min-heuristic cell inside the patch
        let mut cost_min = f32::INFINITY;
        let mut p_cost_min = GridVec::new(0, 0, 0);
        for y in py..(py + ph).min(size.y) {
            for x in px..(px + pw).min(size.x) {
                let p = GridVec::new(x.max(0), y.max(0), 0);
                if self.g[p] < cost_min {
                    cost_min = self.g[p];
                    p_cost_min = p;
                }
            }
        }

        let mut open = BoundedHeap::new();
        let mut erase = BoundedHeap::new();
        open.reserve((size.x * size.y) as usize / 2);

        if cost_min.is_finite() {
            erase.push(PriorityVec::new(cost_min, cost_min, p_cost_min));
        }

        // Erase outward in 4-connected steps; cells below the patch minimum
        // become reseeds instead
        while let Some(center) = erase.pop() {
            let p = center.vec;
            if self.g[p].is_infinite() {
                continue;
            }
            self.g[p] = f32::INFINITY;

            for d in [
                GridVec::new(1, 0, 0),
                GridVec::new(-1, 0, 0),
                GridVec::new(0, 1, 0),
                GridVec::new(0, -1, 0),
            ] {
                let next = p + d;
                if !self.g.in_bounds(next) {
                    continue;
                }
                let gn = self.g[next];
                if gn.is_infinite() {
                    continue;
                }
                if gn < cost_min {
                    open.push(PriorityVec::new(gn, gn, next));
                } else {
                    erase.push(PriorityVec::new(gn, gn, next));
                }
            }
        }

        if open.is_empty() {
            // The whole component went; restart from the goal
            let seed = -euclid.lin * 0.5;
            self.g[goal_rough.rough()] = seed;
            open.push(PriorityVec::new(seed, seed, goal_rough.rough()));
        }

        // Re-open everything the previous fill pruned with the overshoot gate
        for x in 0..size.x {
            for y in 0..size.y {
                let p = GridVec::new(x, y, 0);
                let gp = self.g[p];
                if gp.is_finite() && gp > self.rough_cost_max {
                    open.push(PriorityVec::new(gp, gp, p));
                }
            }
        }

        self.fill(pool, &mut open, cm_rough, remembered, euclid, cfg, start_rough);

        debug!(
            "Cost-to-go field repaired ({:.4} sec.)",
            ts.elapsed().as_secs_f64()
        );
    }

    /// Batched parallel Dijkstra expansion.
    fn fill(
        &mut self,
        pool: &rayon::ThreadPool,
        open: &mut BoundedHeap,
        cm_rough: &Gridmap<u8>,
        remembered: &RememberedMap,
        euclid: &EuclidCost,
        cfg: &EstimConfig,
        start_rough: GridVec,
    ) {
        let start_rough = start_rough.rough();
        let range_overshoot =
            euclid.lin * (cfg.range + cfg.local_range + cfg.longcut_range) as f32;
        let num_tasks = cfg.num_tasks.max(1);
        let negative_cost = AtomicBool::new(false);

        let g = &mut self.g;
        let search_diffs = &self.search_diffs;
        let mut centers: Vec<PriorityVec> = Vec::with_capacity(num_tasks);

        pool.install(|| {
            loop {
                // Single-threaded pop phase with lazy deletion and the
                // overshoot gate
                centers.clear();
                while centers.len() < num_tasks {
                    let center = match open.pop() {
                        Some(c) => c,
                        None => break,
                    };
                    if center.tiebreak > g[center.vec] {
                        continue;
                    }
                    if center.tiebreak - range_overshoot > g[start_rough] {
                        continue;
                    }
                    centers.push(center);
                }
                if centers.is_empty() {
                    break;
                }

                // Parallel edge evaluation over read-only grids
                let g_read: &Gridmap<f32> = g;
                let batches: Vec<Vec<Relax>> = centers
                    .par_iter()
                    .map(|center| {
                        let p = center.vec;
                        let mut updates = Vec::with_capacity(search_diffs.len());

                        for ds in search_diffs {
                            let next = p + ds.d;
                            if !g_read.in_bounds(next) {
                                continue;
                            }

                            let mut cost = euclid.rough(ds.d);
                            let gnext = g_read[next];
                            if gnext < g_read[p] + cost {
                                // No chance to find a better way
                                continue;
                            }

                            let mut sum = 0u32;
                            let mut sum_hist = 0u32;
                            let mut collision = false;
                            for sd in &ds.swept {
                                let pos = p + *sd;
                                let c = cm_rough[pos];
                                if c > 99 {
                                    collision = true;
                                    break;
                                }
                                sum += c as u32;
                                sum_hist += remembered.cost(pos) as u32;
                            }
                            if collision {
                                continue;
                            }

                            cost += (cfg.linear_resolution * ds.grid_to_len / 100.0)
                                * (sum as f32 * cfg.weight_costmap
                                    + sum_hist as f32 * cfg.weight_remembered);
                            if cost < 0.0 {
                                cost = 0.0;
                                negative_cost.store(true, Ordering::Relaxed);
                            }

                            let cost_next = center.tiebreak + cost;
                            if gnext > cost_next {
                                updates.push(Relax {
                                    pos: next,
                                    cost: cost_next,
                                });
                            }
                        }
                        updates
                    })
                    .collect();

                // Merge under exclusive access, re-checking each relaxation
                for batch in batches {
                    for u in batch {
                        if g[u.pos] > u.cost {
                            g[u.pos] = u.cost;
                            open.push(PriorityVec::new(u.cost, u.cost, u.pos));
                        }
                    }
                }
            }
        });

        if negative_cost.load(Ordering::Relaxed) {
            let now = Instant::now();
            let stale = self
                .last_neg_warn
                .map(|t| now.duration_since(t) > NEG_COST_WARN_PERIOD)
                .unwrap_or(true);
            if stale {
                warn!("Negative cost value is detected. Limited to zero.");
                self.last_neg_warn = Some(now);
            }
        }

        self.rough_cost_max =
            self.g[start_rough] + euclid.lin * (cfg.range + cfg.local_range) as f32;
    }
}

impl Default for HeuristicField {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn free_map(w: i32, h: i32) -> Gridmap<u8> {
        Gridmap::new(GridVec::new(w, h, 1), 0u8).unwrap()
    }

    fn config() -> EstimConfig {
        EstimConfig {
            linear_resolution: 0.1,
            weight_costmap: 50.0,
            weight_remembered: 0.0,
            range: 4,
            local_range: 25,
            longcut_range: 0,
            num_tasks: 8,
        }
    }

    fn euclid() -> EuclidCost {
        EuclidCost::new(0.3, 0.6, 1.0)
    }

    #[test]
    fn test_fill_free_space() {
        let cm = free_map(24, 24);
        let remembered = RememberedMap::new(24, 24);
        let ec = euclid();
        let cfg = config();

        let mut field = HeuristicField::new();
        field.reset(24, 24);
        let goal = GridVec::new(4, 4, 0);
        let start = GridVec::new(20, 20, 0);
        field.rebuild(&pool(), &cm, &remembered, &ec, &cfg, goal, start);

        assert_eq!(field.value(goal), 0.0);

        // Monotone from the goal and bounded below by straight-line cost
        let p = GridVec::new(10, 4, 0);
        assert!(field.value(p) > 0.0);
        assert!(field.value(p) >= ec.rough(p - goal) - ec.lin);
        assert!(field.value(start) >= field.value(p));
    }

    #[test]
    fn test_wall_blocks() {
        let mut cm = free_map(20, 20);
        // Vertical lethal wall at x = 10, fully separating the map
        for y in 0..20 {
            cm[GridVec::new(10, y, 0)] = 100;
        }
        let remembered = RememberedMap::new(20, 20);
        let ec = euclid();
        let cfg = config();

        let mut field = HeuristicField::new();
        field.reset(20, 20);
        field.rebuild(
            &pool(),
            &cm,
            &remembered,
            &ec,
            &cfg,
            GridVec::new(2, 10, 0),
            GridVec::new(17, 10, 0),
        );

        assert!(field.value(GridVec::new(4, 10, 0)).is_finite());
        assert!(field.value(GridVec::new(17, 10, 0)).is_infinite());
    }

    #[test]
    fn test_repair_matches_rebuild() {
        let mut cm = free_map(30, 30);
        let goal = GridVec::new(3, 15, 0);
        let start = GridVec::new(27, 15, 0);
        let remembered = RememberedMap::new(30, 30);
        let ec = euclid();
        let mut cfg = config();
        cfg.local_range = 60;
        let p = pool();

        let mut field = HeuristicField::new();
        field.reset(30, 30);
        field.rebuild(&p, &cm, &remembered, &ec, &cfg, goal, start);

        // Drop a lethal block in the middle and repair
        for x in 13..18 {
            for y in 12..19 {
                cm[GridVec::new(x, y, 0)] = 100;
            }
        }
        field.repair(&p, (13, 12, 5, 7), &cm, &remembered, &ec, &cfg, goal, start);

        // Reference: full rebuild on the patched map
        let mut reference = HeuristicField::new();
        reference.reset(30, 30);
        reference.rebuild(&p, &cm, &remembered, &ec, &cfg, goal, start);

        for x in 0..30 {
            for y in 0..30 {
                let p = GridVec::new(x, y, 0);
                let a = field.value(p);
                let b = reference.value(p);
                if a.is_finite() || b.is_finite() {
                    assert!(
                        (a - b).abs() < 1e-3,
                        "repair/rebuild mismatch at ({}, {}): {} vs {}",
                        x,
                        y,
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn test_repair_freeing_space_reopens() {
        let mut cm = free_map(20, 20);
        for y in 0..20 {
            cm[GridVec::new(10, y, 0)] = 100;
        }
        let goal = GridVec::new(2, 10, 0);
        let start = GridVec::new(17, 10, 0);
        let remembered = RememberedMap::new(20, 20);
        let ec = euclid();
        let mut cfg = config();
        cfg.local_range = 60;
        let p = pool();

        let mut field = HeuristicField::new();
        field.reset(20, 20);
        field.rebuild(&p, &cm, &remembered, &ec, &cfg, goal, start);
        assert!(field.value(start).is_infinite());

        // Open a gap in the wall. The patch rectangle is the sensor window,
        // which always covers ground on both sides of the change.
        for y in 8..13 {
            cm[GridVec::new(10, y, 0)] = 0;
        }
        field.repair(&p, (6, 5, 9, 11), &cm, &remembered, &ec, &cfg, goal, start);

        assert!(field.value(start).is_finite());
    }
}
