use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use duel_2048::agent::{Agent, AgentParallel};
use duel_2048::engine::{Direction, Grid, GridEngine};
use rand::{rngs::StdRng, SeedableRng};
use rayon::ThreadPoolBuilder;

fn corpus(engine: &GridEngine) -> Vec<Grid> {
    let mut rng = StdRng::seed_from_u64(7777);
    let mut grids = Vec::new();
    let mut state = engine.new_game(&mut rng);
    for i in 0..32 {
        state = engine.apply_move(state, Direction::ALL[i % 4], &mut rng);
        if state.is_over() {
            state = engine.new_game(&mut rng);
        }
        grids.push(state.grid.clone());
    }
    grids
}

fn bench_best_move(c: &mut Criterion) {
    let engine = GridEngine::classic();
    let grids = corpus(&engine);
    let mut rng = StdRng::seed_from_u64(3);

    let mut seq = Agent::new(engine.clone());
    c.bench_function("agent_seq/best_move", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for g in &grids {
                acc ^= seq.best_move(g, &mut rng) as usize;
            }
            black_box(acc)
        })
    });

    // Pin a small pool for stability
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let mut par = AgentParallel::new(engine);
    c.bench_function("agent_par/branch_evals", |bch| {
        bch.iter(|| {
            pool.install(|| {
                let mut acc = 0.0;
                for g in &grids {
                    for be in par.branch_evals(g, &mut rng) {
                        if be.legal {
                            acc += be.score;
                        }
                    }
                }
                black_box(acc)
            })
        })
    });
}

criterion_group!(agent, bench_best_move);
criterion_main!(agent);
