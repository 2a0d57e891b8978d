//! # A* search engine
//!
//! Best-first search over the configuration-space grid, with the domain
//! supplied through the [`SearchModel`] trait: edge cost, admissible
//! heuristic, neighbourhood and a progress observer. The engine owns the
//! frontier, the g-value grid and the parent links, and reuses their
//! allocations across searches.
//!
//! Expansion follows the same batched fork-join pattern as the heuristic
//! wavefront: a single-threaded pop phase, parallel edge evaluation into
//! per-node buffers, and a merge that re-checks every relaxation, so results
//! match a sequential expansion.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::grid::queue::{BoundedHeap, PriorityVec};
use crate::grid::{GridVec, Gridmap};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A start coordinate with its seed cost, used to antialias sub-cell start
/// positions over several neighbouring cells.
#[derive(Debug, Clone, Copy)]
pub struct VecWithCost {
    pub v: GridVec,
    pub c: f32,
}

/// The search engine and its reusable buffers.
#[derive(Debug)]
pub struct GridAstar {
    g: Gridmap<f32>,
    parents: HashMap<GridVec, GridVec>,
    open: BoundedHeap,
    num_task: usize,
}

#[derive(Debug, Clone, Copy)]
struct Relax {
    pos: GridVec,
    parent: GridVec,
    g: f32,
    f: f32,
    h: f32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of a search.
#[derive(Debug, Clone)]
pub enum SearchResult {
    /// A path reaching the goal tolerance (or leaving at the local horizon)
    Found(Vec<GridVec>),

    /// The goal was not reached; this is the path to the node closest to it
    Best(Vec<GridVec>),

    /// No path at all
    NotFound,
}

impl SearchResult {
    pub fn path(&self) -> Option<&[GridVec]> {
        match self {
            SearchResult::Found(p) | SearchResult::Best(p) => Some(p),
            SearchResult::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SearchResult::Found(_))
    }
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The pluggable parts of a search.
pub trait SearchModel: Sync {
    /// Edge cost from `s` to its neighbour `e`, or `None` when the
    /// transition is infeasible.
    fn cost(&self, s: GridVec, e: GridVec, starts: &[VecWithCost], goal: GridVec) -> Option<f32>;

    /// Admissible lower bound on the remaining cost from `p` to the goal.
    /// +inf marks `p` unreachable.
    fn heuristic(&self, p: GridVec, goal: GridVec) -> f32;

    /// Offsets to try from `p`.
    fn neighborhood(&self, p: GridVec, starts: &[VecWithCost], goal: GridVec) -> &[GridVec];

    /// Whether `p` satisfies the goal tolerance.
    fn is_goal(&self, p: GridVec, goal: GridVec) -> bool;

    /// Called when the time budget expires with the best partial path so
    /// far. Return true to abort the search, false to grant another slice.
    fn progress(&self, best_so_far: &[GridVec]) -> bool {
        let _ = best_so_far;
        true
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VecWithCost {
    pub fn new(v: GridVec) -> Self {
        Self { v, c: 0.0 }
    }
}

impl GridAstar {
    pub fn new() -> Self {
        Self {
            g: Gridmap::new(GridVec::new(1, 1, 1), f32::INFINITY).unwrap(),
            parents: HashMap::new(),
            open: BoundedHeap::new(),
            num_task: 1,
        }
    }

    /// Reallocate for a map of the given size.
    pub fn reset(&mut self, size: GridVec) {
        self.g = Gridmap::new(size, f32::INFINITY).unwrap();
        self.parents.clear();
    }

    /// Cap the frontier size, 0 meaning unbounded.
    pub fn set_queue_size_limit(&mut self, limit: usize) {
        self.open.set_limit(limit);
    }

    /// Number of frontier nodes expanded per parallel batch.
    pub fn set_search_task_num(&mut self, num: usize) {
        self.num_task = num.max(1);
    }

    /// Search from the seeded starts towards `goal`.
    ///
    /// `cost_leave` ends the search early once a node's remaining heuristic
    /// drops below it, producing the partial path a local planner hands to
    /// its follower; pass a negative value to disable. On timeout the model
    /// is notified and, with `find_best`, the best partial path found so far
    /// is returned.
    pub fn search<M: SearchModel>(
        &mut self,
        pool: &rayon::ThreadPool,
        starts: &[VecWithCost],
        goal: GridVec,
        model: &M,
        cost_leave: f32,
        time_limit: Duration,
        find_best: bool,
    ) -> SearchResult {
        let timer = Instant::now();
        let mut deadline = time_limit;

        let angles = self.g.angles();
        let goal = goal.cycle_unsigned(angles);

        self.g.clear(f32::INFINITY);
        self.parents.clear();
        self.open.clear();

        // Track the node closest to the goal by heuristic for best-effort
        // returns
        let mut best: Option<GridVec> = None;
        let mut best_h = f32::INFINITY;

        for s in starts {
            let v = s.v.cycle_unsigned(angles);
            if !self.g.in_bounds(v) {
                continue;
            }
            let h = model.heuristic(v, goal);
            if !h.is_finite() {
                continue;
            }
            self.g[v] = s.c;
            self.open.push(PriorityVec::new(s.c + h, s.c, v));
            if h < best_h {
                best_h = h;
                best = Some(v);
            }
        }
        if self.open.is_empty() {
            return SearchResult::NotFound;
        }

        let mut found: Option<GridVec> = None;
        let mut centers: Vec<PriorityVec> = Vec::with_capacity(self.num_task);

        let g = &mut self.g;
        let open = &mut self.open;
        let parents = &mut self.parents;
        let num_task = self.num_task;

        pool.install(|| {
            'search: loop {
                if timer.elapsed() > deadline {
                    let path = Self::reconstruct(parents, best);
                    if model.progress(&path) {
                        break 'search;
                    }
                    deadline += time_limit;
                }

                // Pop phase: skip stale entries, check termination conditions
                centers.clear();
                while centers.len() < num_task {
                    let center = match open.pop() {
                        Some(c) => c,
                        None => break,
                    };
                    if center.tiebreak > g[center.vec] {
                        continue;
                    }
                    if model.is_goal(center.vec, goal)
                        || model.heuristic(center.vec, goal) < cost_leave
                    {
                        found = Some(center.vec);
                        break 'search;
                    }
                    centers.push(center);
                }
                if centers.is_empty() {
                    break;
                }

                // Parallel edge evaluation over read-only state
                let g_read: &Gridmap<f32> = g;
                let batches: Vec<Vec<Relax>> = centers
                    .par_iter()
                    .map(|center| {
                        let p = center.vec;
                        let mut updates = Vec::new();

                        for d in model.neighborhood(p, starts, goal) {
                            let next = (p + *d).cycle_unsigned(angles);
                            if !g_read.in_bounds(next) {
                                continue;
                            }

                            let cost = match model.cost(p, next, starts, goal) {
                                Some(c) => c,
                                None => continue,
                            };
                            let cost_next = center.tiebreak + cost;
                            if g_read[next] <= cost_next {
                                continue;
                            }

                            let h = model.heuristic(next, goal);
                            if !h.is_finite() {
                                continue;
                            }

                            updates.push(Relax {
                                pos: next,
                                parent: p,
                                g: cost_next,
                                f: cost_next + h,
                                h,
                            });
                        }
                        updates
                    })
                    .collect();

                // Merge phase: commit improvements, stop on the first
                // goal-satisfying successor
                for batch in batches {
                    for u in batch {
                        if g[u.pos] > u.g {
                            g[u.pos] = u.g;
                            parents.insert(u.pos, u.parent);

                            if u.h < best_h {
                                best_h = u.h;
                                best = Some(u.pos);
                            }
                            if model.is_goal(u.pos, goal) || u.h < cost_leave {
                                found = Some(u.pos);
                                break 'search;
                            }
                            open.push(PriorityVec::new(u.f, u.g, u.pos));
                        }
                    }
                }
            }
        });

        match found {
            Some(f) => SearchResult::Found(Self::reconstruct(&self.parents, Some(f))),
            None => {
                if find_best {
                    let path = Self::reconstruct(&self.parents, best);
                    if path.is_empty() {
                        SearchResult::NotFound
                    } else {
                        SearchResult::Best(path)
                    }
                } else {
                    SearchResult::NotFound
                }
            }
        }
    }

    fn reconstruct(parents: &HashMap<GridVec, GridVec>, end: Option<GridVec>) -> Vec<GridVec> {
        let mut path = Vec::new();
        let mut cursor = match end {
            Some(e) => e,
            None => return path,
        };
        path.push(cursor);
        while let Some(prev) = parents.get(&cursor) {
            cursor = *prev;
            path.push(cursor);
        }
        path.reverse();
        path
    }
}

impl Default for GridAstar {
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

    /// A plain 4-connected planar model over a lethal mask, for exercising
    /// the engine in isolation.
    struct PlanarModel {
        lethal: Gridmap<u8>,
        offsets: Vec<GridVec>,
    }

    impl PlanarModel {
        fn new(lethal: Gridmap<u8>) -> Self {
            Self {
                lethal,
                offsets: vec![
                    GridVec::new(1, 0, 0),
                    GridVec::new(-1, 0, 0),
                    GridVec::new(0, 1, 0),
                    GridVec::new(0, -1, 0),
                ],
            }
        }
    }

    impl SearchModel for PlanarModel {
        fn cost(
            &self,
            _s: GridVec,
            e: GridVec,
            _starts: &[VecWithCost],
            _goal: GridVec,
        ) -> Option<f32> {
            if self.lethal[e] > 99 {
                None
            } else {
                Some(1.0 + self.lethal[e] as f32 / 100.0)
            }
        }

        fn heuristic(&self, p: GridVec, goal: GridVec) -> f32 {
            ((p.x - goal.x).abs() + (p.y - goal.y).abs()) as f32
        }

        fn neighborhood(&self, _p: GridVec, _starts: &[VecWithCost], _goal: GridVec) -> &[GridVec] {
            &self.offsets
        }

        fn is_goal(&self, p: GridVec, goal: GridVec) -> bool {
            p == goal
        }
    }

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn search_on(model: &PlanarModel, start: GridVec, goal: GridVec) -> Option<Vec<GridVec>> {
        let mut astar = GridAstar::new();
        astar.reset(model.lethal.size());
        astar.set_search_task_num(4);
        match astar.search(
            &pool(),
            &[VecWithCost::new(start)],
            goal,
            model,
            -1.0,
            Duration::from_secs(5),
            false,
        ) {
            SearchResult::Found(p) => Some(p),
            _ => None,
        }
    }

    #[test]
    fn test_direct_path() {
        let lethal = Gridmap::new(GridVec::new(10, 10, 1), 0u8).unwrap();
        let model = PlanarModel::new(lethal);

        let path = search_on(&model, GridVec::new(1, 1, 0), GridVec::new(7, 1, 0)).unwrap();
        assert_eq!(path.first(), Some(&GridVec::new(1, 1, 0)));
        assert_eq!(path.last(), Some(&GridVec::new(7, 1, 0)));
        assert_eq!(path.len(), 7);
    }

    #[test]
    fn test_detours_around_wall() {
        let mut lethal = Gridmap::new(GridVec::new(12, 12, 1), 0u8).unwrap();
        for y in 0..10 {
            lethal[GridVec::new(6, y, 0)] = 100;
        }
        let model = PlanarModel::new(lethal);

        let path = search_on(&model, GridVec::new(2, 2, 0), GridVec::new(10, 2, 0)).unwrap();
        assert_eq!(path.last(), Some(&GridVec::new(10, 2, 0)));
        // Path must route above the wall
        assert!(path.iter().any(|p| p.y >= 10));
        assert!(path.iter().all(|p| model.lethal[*p] < 100));
    }

    #[test]
    fn test_unreachable_returns_none() {
        let mut lethal = Gridmap::new(GridVec::new(10, 10, 1), 0u8).unwrap();
        for y in 0..10 {
            lethal[GridVec::new(5, y, 0)] = 100;
        }
        let model = PlanarModel::new(lethal);

        assert!(search_on(&model, GridVec::new(2, 2, 0), GridVec::new(8, 2, 0)).is_none());
    }

    #[test]
    fn test_find_best_returns_partial() {
        let mut lethal = Gridmap::new(GridVec::new(10, 10, 1), 0u8).unwrap();
        for y in 0..10 {
            lethal[GridVec::new(5, y, 0)] = 100;
        }
        let model = PlanarModel::new(lethal);

        let mut astar = GridAstar::new();
        astar.reset(model.lethal.size());
        let result = astar.search(
            &pool(),
            &[VecWithCost::new(GridVec::new(2, 2, 0))],
            GridVec::new(8, 2, 0),
            &model,
            -1.0,
            Duration::from_secs(5),
            true,
        );
        assert!(!result.is_found());
        // The best-effort path ends as close to the goal as the wall allows
        let best = result.path().unwrap();
        assert_eq!(best.last().unwrap().x, 4);
    }

    #[test]
    fn test_multi_start_uses_cheapest() {
        let lethal = Gridmap::new(GridVec::new(10, 10, 1), 0u8).unwrap();
        let model = PlanarModel::new(lethal);

        let mut astar = GridAstar::new();
        astar.reset(model.lethal.size());
        let starts = [
            VecWithCost {
                v: GridVec::new(1, 1, 0),
                c: 100.0,
            },
            VecWithCost {
                v: GridVec::new(1, 5, 0),
                c: 0.0,
            },
        ];
        let result = astar.search(
            &pool(),
            &starts,
            GridVec::new(8, 5, 0),
            &model,
            -1.0,
            Duration::from_secs(5),
            false,
        );
        let path = match result {
            SearchResult::Found(p) => p,
            other => panic!("expected a path, got {:?}", other),
        };
        assert_eq!(path.first(), Some(&GridVec::new(1, 5, 0)));
    }
}
