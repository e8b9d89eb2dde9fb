use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use puzzle_grid::puzzle::{tick, Grid, GridConfig, GridIndex, GridSize, SwapRequest};
use puzzle_grid::sim::PaletteHooks;

const DT: f32 = 1.0 / 60.0;

fn settled_grid(seed: u64) -> Grid {
    let config = GridConfig {
        grid_size: GridSize::new(8, 8),
        ..Default::default()
    };
    let mut grid = Grid::new(config, PaletteHooks::new(seed, 5)).unwrap();
    for _ in 0..120 {
        tick(&mut grid, &SwapRequest::NONE, DT);
    }
    grid
}

fn random_request(grid: &Grid, rng: &mut StdRng) -> SwapRequest {
    let from = GridIndex::new(rng.gen_range(0..8), rng.gen_range(0..8));
    let to = if rng.gen_bool(0.5) {
        GridIndex::new((from.x + 1) % 8, from.y)
    } else {
        GridIndex::new(from.x, (from.y + 1) % 8)
    };
    SwapRequest {
        first: grid.gem_at(from),
        second: grid.gem_at(to),
        user_made: true,
    }
}

fn bench_idle_tick(c: &mut Criterion) {
    let mut grid = settled_grid(12345);

    c.bench_function("grid_tick_idle_8x8", |b| {
        b.iter(|| {
            tick(&mut grid, black_box(&SwapRequest::NONE), black_box(DT));
        })
    });
}

fn bench_swapping_tick(c: &mut Criterion) {
    let mut grid = settled_grid(12345);
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("grid_tick_random_swaps_8x8", |b| {
        b.iter(|| {
            let request = if rng.gen_bool(0.1) {
                random_request(&grid, &mut rng)
            } else {
                SwapRequest::NONE
            };
            tick(&mut grid, black_box(&request), black_box(DT));
        })
    });
}

fn bench_find_matches(c: &mut Criterion) {
    let grid = settled_grid(99);

    c.bench_function("find_grid_matches_8x8", |b| {
        b.iter(|| black_box(grid.find_grid_matches()))
    });
}

criterion_group!(benches, bench_idle_tick, bench_swapping_tick, bench_find_matches);
criterion_main!(benches);
