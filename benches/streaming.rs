use criterion::{criterion_group, criterion_main, Criterion, black_box};

use std::sync::Arc;

use terrastream::mesh::{build_mesh, extract_isosurface};
use terrastream::streaming::{StreamingConfig, TerrainStreamer};
use terrastream::terrain::{
    ChunkBuilder, FractalNoise, HeightfieldChunkBuilder, HeightmapField, NoiseParams, SampleGrid,
    ScalarFieldGenerator, Warping,
};

use glam::{UVec3, Vec2, Vec3};

fn bench_fbm_sample_2d(c: &mut Criterion) {
    let noise = FractalNoise::new(NoiseParams::default());

    c.bench_function("fbm_sample_2d", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            noise.sample_2d(black_box(Vec2::new(i as f32 * 0.37, i as f32 * 0.11)))
        });
    });
}

fn bench_fbm_sample_2d_warped(c: &mut Criterion) {
    let noise = FractalNoise::new(NoiseParams {
        warping: Some(Warping::default()),
        ..Default::default()
    });

    c.bench_function("fbm_sample_2d_warped", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            noise.sample_2d(black_box(Vec2::new(i as f32 * 0.37, i as f32 * 0.11)))
        });
    });
}

fn bench_build_mesh_32(c: &mut Criterion) {
    let noise = FractalNoise::new(NoiseParams::default());

    c.bench_function("build_mesh_32", |b| {
        b.iter(|| build_mesh(black_box(Vec3::ZERO), 64.0, 32, &noise));
    });
}

fn bench_scalar_field_32(c: &mut Criterion) {
    let field = HeightmapField::new(NoiseParams { amplitude: 16.0, ..Default::default() });
    let grid = SampleGrid::new(Vec3::ZERO, 1.0, UVec3::splat(32));

    c.bench_function("scalar_field_32", |b| {
        b.iter(|| field.generate_scalar_field(black_box(&grid)));
    });
}

fn bench_marching_cubes_32(c: &mut Criterion) {
    let field = HeightmapField::new(NoiseParams { amplitude: 16.0, ..Default::default() });
    let lattice = field.generate_scalar_field(&SampleGrid::new(Vec3::ZERO, 1.0, UVec3::splat(32)));

    c.bench_function("marching_cubes_32", |b| {
        b.iter(|| extract_isosurface(black_box(&lattice), 0.0, true));
    });
}

fn bench_streamer_tick(c: &mut Criterion) {
    let config = StreamingConfig { chunk_resolution: 8, ..Default::default() };
    let builder: Arc<dyn ChunkBuilder> = Arc::new(HeightfieldChunkBuilder::new(NoiseParams::default()));
    let mut streamer = TerrainStreamer::new(config, builder).unwrap();

    c.bench_function("streamer_tick_moving", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let pos = Vec3::new(frame as f32 * 16.0, 50.0, (frame as f32 * 0.05).sin() * 200.0);
            black_box(streamer.tick(pos).unwrap().ready_count());
        });
    });
}

criterion_group!(
    benches,
    bench_fbm_sample_2d,
    bench_fbm_sample_2d_warped,
    bench_build_mesh_32,
    bench_scalar_field_32,
    bench_marching_cubes_32,
    bench_streamer_tick,
);
criterion_main!(benches);
