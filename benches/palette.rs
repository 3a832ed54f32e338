use criterion::{criterion_group, criterion_main, Criterion, black_box};

use chiselgrid::math::PositionMutator;
use chiselgrid::voxel::{
    AreaAccessor, ContentDescriptor, GridGeometry, Palette, StateId, StateVariant, VoxelGrid,
    compress_grid, decompress_grid,
};

use glam::IVec3;

/// 16³ grid striped with `states` materials plus some fluid levels.
fn striped_grid(states: u32) -> VoxelGrid {
    let mut grid = VoxelGrid::new(GridGeometry::DEFAULT);
    for x in 0..16 {
        for y in 0..16 {
            for z in 0..16 {
                let descriptor = if y < 4 {
                    ContentDescriptor::with_variant(StateId(500), StateVariant::new().with("level", (x % 8) as i64))
                } else {
                    ContentDescriptor::new(StateId(1 + (x + z) as u32 % states))
                };
                let _ = grid.set(IVec3::new(x, y, z), &descriptor);
            }
        }
    }
    grid
}

fn bench_palette_lookup_hit(c: &mut Criterion) {
    let palette = Palette::new();
    let descriptors: Vec<_> = (0..64).map(|i| ContentDescriptor::new(StateId(i))).collect();
    for d in &descriptors {
        palette.get_or_create_index(d);
    }

    c.bench_function("palette_get_or_create_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % descriptors.len();
            palette.get_or_create_index(black_box(&descriptors[i]))
        });
    });
}

fn bench_grid_set_full(c: &mut Criterion) {
    c.bench_function("grid_set_full_16", |b| {
        b.iter(|| striped_grid(black_box(12)));
    });
}

fn bench_grid_get(c: &mut Criterion) {
    let grid = striped_grid(12);

    c.bench_function("grid_get_16", |b| {
        let mut n = 0i32;
        b.iter(|| {
            n = (n + 7) % 4096;
            grid.get(black_box(IVec3::new(n / 256, (n / 16) % 16, n % 16)))
        });
    });
}

fn bench_grid_iterate(c: &mut Criterion) {
    let grid = striped_grid(12);

    c.bench_function("grid_iterate_identity", |b| {
        b.iter(|| grid.iterate(PositionMutator::identity()).filter(|(_, d)| !d.is_empty()).count());
    });

    c.bench_function("grid_iterate_y_first", |b| {
        b.iter(|| grid.iterate(PositionMutator::from_axis(chiselgrid::math::Axis::Y)).filter(|(_, d)| !d.is_empty()).count());
    });
}

fn bench_grid_compact(c: &mut Criterion) {
    let mut base = striped_grid(12);
    // Orphan half of the palette.
    for z in 0..16 {
        let _ = base.set(IVec3::new(0, 8, z), &ContentDescriptor::new(StateId(9000 + z as u32)));
        let _ = base.set(IVec3::new(0, 8, z), &ContentDescriptor::new(StateId(1)));
    }

    c.bench_function("grid_compact", |b| {
        b.iter(|| {
            let mut grid = base.clone();
            grid.compact()
        });
    });
}

fn bench_grid_fingerprint(c: &mut Criterion) {
    let grid = striped_grid(12);

    c.bench_function("grid_fingerprint", |b| {
        b.iter(|| black_box(&grid).fingerprint());
    });
}

fn bench_grid_compress(c: &mut Criterion) {
    let grid = striped_grid(12);
    let compressed = compress_grid(&grid);

    c.bench_function("grid_compress", |b| {
        b.iter(|| compress_grid(black_box(&grid)));
    });

    c.bench_function("grid_decompress", |b| {
        b.iter(|| decompress_grid(black_box(&compressed)));
    });
}

criterion_group!(
    benches,
    bench_palette_lookup_hit,
    bench_grid_set_full,
    bench_grid_get,
    bench_grid_iterate,
    bench_grid_compact,
    bench_grid_fingerprint,
    bench_grid_compress,
);
criterion_main!(benches);
