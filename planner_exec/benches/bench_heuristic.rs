//! # Heuristic Wavefront Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use planner_lib::euclid::EuclidCost;
use planner_lib::grid::{GridVec, Gridmap};
use planner_lib::heuristic::{EstimConfig, HeuristicField};
use planner_lib::remembered::RememberedMap;

fn heuristic_benchmark(c: &mut Criterion) {
    // ---- Build a map with scattered obstacles ----

    let width = 200;
    let height = 200;
    let mut cm_rough = Gridmap::new(GridVec::new(width, height, 1), 0u8).unwrap();

    // Deterministic obstacle pattern: lethal blocks on a staggered lattice
    for bx in 0..10 {
        for by in 0..10 {
            let ox = 10 + bx * 18 + (by % 2) * 7;
            let oy = 10 + by * 18;
            for x in ox..(ox + 4).min(width) {
                for y in oy..(oy + 4).min(height) {
                    cm_rough[GridVec::new(x, y, 0)] = 100;
                }
            }
        }
    }

    let remembered = RememberedMap::new(width, height);
    let euclid = EuclidCost::new(0.3, 0.6, 1.0);
    let cfg = EstimConfig {
        linear_resolution: 0.05,
        weight_costmap: 50.0,
        weight_remembered: 0.0,
        range: 8,
        local_range: 400,
        longcut_range: 0,
        num_tasks: 64,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap();

    let goal = GridVec::new(10, 100, 0);
    let start = GridVec::new(190, 100, 0);

    c.bench_function("HeuristicField::rebuild", |b| {
        let mut field = HeuristicField::new();
        field.reset(width, height);
        b.iter(|| field.rebuild(&pool, &cm_rough, &remembered, &euclid, &cfg, goal, start))
    });

    c.bench_function("HeuristicField::repair", |b| {
        let mut field = HeuristicField::new();
        field.reset(width, height);
        field.rebuild(&pool, &cm_rough, &remembered, &euclid, &cfg, goal, start);

        let mut patched = cm_rough.clone();
        for x in 95..105 {
            for y in 95..105 {
                patched[GridVec::new(x, y, 0)] = 100;
            }
        }

        b.iter(|| {
            field.repair(
                &pool,
                (90, 90, 20, 20),
                &patched,
                &remembered,
                &euclid,
                &cfg,
                goal,
                start,
            )
        })
    });
}

criterion_group!(benches, heuristic_benchmark);
criterion_main!(benches);
