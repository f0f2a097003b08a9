//! Flythrough driver: streams terrain along a straight camera path and logs
//! per-tick statistics.
//!
//! Usage: cargo run --release --bin stream_flythrough -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Streaming config JSON (flags below override it)
//!   --levels <N>        Levels of detail (default: 4)
//!   --radius <N>        Chunks per direction (default: 2)
//!   --resolution <N>    Cells per chunk edge (default: 32)
//!   --chunk-size <M>    Level 0 chunk size in meters (default: 64)
//!   --seed <SEED>       Noise seed (default: 12345)
//!   --amplitude <H>     Noise amplitude (default: 64)
//!   --builder <KIND>    mesh | heightfield | iso (default: mesh)
//!   --steps <N>         Ticks to simulate (default: 120)
//!   --speed <M>         Camera distance per tick (default: 8)
//!   --background        Build chunks on the background runtime

use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use terrastream::core::{logging, Error, Result};
use terrastream::streaming::{BuildMode, StreamingConfig, TerrainStreamer};
use terrastream::terrain::{
    compute_height_bounds, ChunkBuilder, HeightfieldChunkBuilder, HeightmapField,
    IsosurfaceChunkBuilder, MeshChunkBuilder, NoiseParams,
};

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::from_json_file(path)?,
        None => StreamingConfig::default(),
    };
    if let Some(n) = parse_usize_arg(&args, "--levels") {
        config.levels_of_detail = n;
    }
    if let Some(n) = parse_u32_arg(&args, "--radius") {
        config.chunks_per_direction = n;
    }
    if let Some(n) = parse_u32_arg(&args, "--resolution") {
        config.chunk_resolution = n;
    }
    if let Some(size) = parse_f32_arg(&args, "--chunk-size") {
        config.starting_chunk_size = size;
    }
    if args.iter().any(|a| a == "--background") {
        config.build_mode = BuildMode::Background;
    }

    let params = NoiseParams {
        seed: parse_u32_arg(&args, "--seed").unwrap_or(12345),
        amplitude: parse_f32_arg(&args, "--amplitude").unwrap_or(64.0),
        ..Default::default()
    };
    let steps = parse_usize_arg(&args, "--steps").unwrap_or(120);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(8.0);
    let kind = parse_str_arg(&args, "--builder").unwrap_or_else(|| "mesh".to_string());

    let (min_h, max_h) = compute_height_bounds(&params);
    let builder: Arc<dyn ChunkBuilder> = match kind.as_str() {
        "mesh" => Arc::new(MeshChunkBuilder::new(params)),
        "heightfield" => Arc::new(HeightfieldChunkBuilder::new(params)),
        "iso" => Arc::new(IsosurfaceChunkBuilder::new(
            HeightmapField::new(params),
            min_h - 1.0,
            max_h + 1.0,
        )),
        other => return Err(Error::Config(format!("unknown builder '{other}'"))),
    };

    log::info!("=== Terrain Flythrough ===");
    log::info!("Builder: {kind}, {:?} builds", config.build_mode);
    log::info!("Height bounds: [{min_h:.1}, {max_h:.1}]");
    log::info!("Path: {steps} ticks at {speed} m/tick");

    let mut streamer = TerrainStreamer::new(config, builder)?;

    let start = Instant::now();
    let mut totals = (0usize, 0usize, 0usize);
    let mut failed = 0usize;
    let mut triangles = 0usize;
    for step in 0..steps {
        let position = Vec3::new(step as f32 * speed, max_h + 10.0, step as f32 * speed * 0.5);
        let tick_start = Instant::now();
        let report = streamer.tick(position)?;

        totals.0 += report.spawned_count();
        totals.1 += report.despawned_count();
        totals.2 += report.ready_count();
        failed += report.failed_count();
        for failure in report.levels.iter().flat_map(|l| &l.failed) {
            log::warn!("LOD {} chunk {} failed: {}", failure.level, failure.coord, failure.error);
        }
        triangles += report
            .levels
            .iter()
            .flat_map(|l| &l.ready)
            .filter_map(|h| h.mesh.as_ref())
            .map(|m| m.triangle_count())
            .sum::<usize>();

        if !report.is_empty() {
            log::info!(
                "tick {step:4} at ({:.0}, {:.0}): +{} -{} ready {} pending {} ({:.1}ms)",
                position.x,
                position.z,
                report.spawned_count(),
                report.despawned_count(),
                report.ready_count(),
                streamer.pending_builds(),
                tick_start.elapsed().as_secs_f64() * 1000.0,
            );
        }
    }

    let late = streamer.flush_builds();
    totals.2 += late.ready.len();
    failed += late.failed.len();

    log::info!(
        "Done in {:.2}s: {} spawned, {} despawned, {} built ({} triangles), {} failed, {} active",
        start.elapsed().as_secs_f64(),
        totals.0,
        totals.1,
        totals.2,
        triangles,
        failed,
        streamer.active_count(),
    );

    streamer.shutdown();
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
