//! LOD terrain streamer
//!
//! Keeps a `(2r + 1)^2` window of chunks per level around a reference
//! position. Each `tick` diffs the desired window against the active chunks,
//! recycles slots that left it and requests geometry for new ones.

use std::sync::Arc;
use std::time::Instant;

use glam::{IVec2, Vec3};
use rayon::prelude::*;

use super::build_queue::{BackgroundBuilder, BuildOutcome};
use super::config::{BuildMode, StreamingConfig};
use super::lod::{ChunkHandle, LodLevel};
use crate::core::{Error, Result};
use crate::terrain::{BuildRequest, ChunkBuilder};

/// Changes to one level during a tick
#[derive(Clone, Debug, Default)]
pub struct LevelReport {
    pub level: usize,
    /// Reference grid coordinate of this level
    pub reference: IVec2,
    /// Chunks assigned a coordinate this tick (geometry may still be pending)
    pub spawned: Vec<ChunkHandle>,
    /// Chunks returned to the pool
    pub despawned: Vec<ChunkHandle>,
    /// Chunks whose geometry was installed
    pub ready: Vec<ChunkHandle>,
    /// Builds that returned an error; their coordinates are retried
    pub failed: Vec<BuildFailure>,
}

/// A chunk build that returned an error.
///
/// The slot went back to the pool and the level rescans on its next tick.
#[derive(Clone, Debug)]
pub struct BuildFailure {
    pub level: usize,
    pub coord: IVec2,
    pub error: Arc<Error>,
}

/// Results installed by one batch of builds
#[derive(Clone, Debug, Default)]
pub struct AppliedBuilds {
    pub ready: Vec<ChunkHandle>,
    pub failed: Vec<BuildFailure>,
}

impl AppliedBuilds {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of [`TerrainStreamer::tick`]
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub levels: Vec<LevelReport>,
}

impl TickReport {
    pub fn spawned_count(&self) -> usize {
        self.levels.iter().map(|l| l.spawned.len()).sum()
    }

    pub fn despawned_count(&self) -> usize {
        self.levels.iter().map(|l| l.despawned.len()).sum()
    }

    pub fn ready_count(&self) -> usize {
        self.levels.iter().map(|l| l.ready.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.levels.iter().map(|l| l.failed.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spawned_count() + self.despawned_count() + self.ready_count() + self.failed_count() == 0
    }

    fn absorb(&mut self, applied: AppliedBuilds) {
        for handle in applied.ready {
            self.levels[handle.level].ready.push(handle);
        }
        for failure in applied.failed {
            self.levels[failure.level].failed.push(failure);
        }
    }
}

/// Multi-level chunk streamer
pub struct TerrainStreamer {
    config: StreamingConfig,
    builder: Arc<dyn ChunkBuilder>,
    levels: Vec<LodLevel>,
    background: Option<BackgroundBuilder>,
    /// Shared by all levels and never reset, so builds from before a
    /// `reset` can't match a fresh slot
    next_ticket: u64,
}

fn build_levels(config: &StreamingConfig) -> Result<Vec<LodLevel>> {
    let pool = config.effective_pool_size();
    (0..config.levels_of_detail)
        .map(|i| {
            let finer = (i > 0).then(|| config.chunk_size(i - 1));
            LodLevel::new(
                i,
                config.chunk_size(i),
                finer,
                config.chunks_per_direction,
                config.chunk_resolution,
                pool,
            )
        })
        .collect()
}

impl TerrainStreamer {
    /// Validate `config` and warm up every level's pool
    pub fn new(config: StreamingConfig, builder: Arc<dyn ChunkBuilder>) -> Result<Self> {
        config.validate()?;

        let levels = build_levels(&config)?;
        let background = match config.build_mode {
            BuildMode::Inline => None,
            BuildMode::Background => {
                Some(BackgroundBuilder::new(Arc::clone(&builder), config.worker_threads)?)
            }
        };

        log::info!(
            "Terrain streamer ready: {} levels x {} slots, radius {}, resolution {}, {:?} builds",
            config.levels_of_detail,
            config.effective_pool_size(),
            config.chunks_per_direction,
            config.chunk_resolution,
            config.build_mode,
        );

        Ok(Self {
            config,
            builder,
            levels,
            background,
            next_ticket: 1,
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&LodLevel> {
        self.levels.get(index)
    }

    /// Slots per level
    pub fn pool_size(&self) -> usize {
        self.config.effective_pool_size()
    }

    /// Handles of every assigned chunk across all levels
    pub fn active_chunks(&self) -> Vec<ChunkHandle> {
        self.levels.iter().flat_map(LodLevel::handles).collect()
    }

    pub fn active_count(&self) -> usize {
        self.levels.iter().map(LodLevel::active_count).sum()
    }

    /// Assigned chunks whose bounds touch the sphere at `center`
    pub fn chunks_within(&self, center: Vec3, radius: f32) -> Vec<ChunkHandle> {
        self.levels
            .iter()
            .flat_map(LodLevel::handles)
            .filter(|h| h.bounds.intersects_sphere(center, radius))
            .collect()
    }

    /// Finest assigned chunk covering `position` on the XZ plane
    pub fn chunk_at(&self, position: Vec3) -> Option<ChunkHandle> {
        self.levels.iter().find_map(|level| {
            let slot = level.slot_of(level.reference_coord(position))?;
            level.handle(slot.index)
        })
    }

    /// Background builds not yet received
    pub fn pending_builds(&self) -> usize {
        self.background.as_ref().map_or(0, BackgroundBuilder::in_flight)
    }

    /// Advance streaming to the reference `position`.
    ///
    /// Consistency errors abort the tick; call [`reset`](Self::reset) to recover.
    /// Failed builds do not: they are listed in the report next to the chunks
    /// that did land.
    pub fn tick(&mut self, position: Vec3) -> Result<TickReport> {
        let start = Instant::now();
        let mut report = TickReport {
            levels: self
                .levels
                .iter()
                .map(|l| LevelReport {
                    level: l.index(),
                    reference: l.reference_coord(position),
                    ..Default::default()
                })
                .collect(),
        };

        let polled = self.poll_builds();
        report.absorb(polled);

        let mut requests = Vec::new();
        for (level, entry) in self.levels.iter_mut().zip(report.levels.iter_mut()) {
            if !level.needs_update(entry.reference) {
                continue;
            }
            let update = level.update(entry.reference, &mut self.next_ticket)?;
            entry.despawned = update.despawned;
            for request in &update.requests {
                if let Some(handle) = level.slot_of(request.coord).and_then(|s| level.handle(s.index)) {
                    entry.spawned.push(handle);
                }
            }
            requests.extend(update.requests);
        }

        if !requests.is_empty() {
            let built = self.dispatch(requests)?;
            report.absorb(built);
        }

        if !report.is_empty() {
            log::debug!(
                "Tick at {position}: +{} -{} ready {} failed {} ({} pending) in {:.2}ms",
                report.spawned_count(),
                report.despawned_count(),
                report.ready_count(),
                report.failed_count(),
                self.pending_builds(),
                start.elapsed().as_secs_f64() * 1000.0,
            );
        }
        Ok(report)
    }

    /// Build inline or hand requests to the background runtime
    fn dispatch(&mut self, requests: Vec<BuildRequest>) -> Result<AppliedBuilds> {
        if let Some(background) = self.background.as_mut() {
            for request in requests {
                background.submit(request)?;
            }
            return Ok(AppliedBuilds::default());
        }

        let builder = &self.builder;
        let outcomes: Vec<BuildOutcome> = requests
            .into_par_iter()
            .map(|request| BuildOutcome {
                level: request.level,
                coord: request.coord,
                ticket: request.ticket,
                result: builder.build(&request),
            })
            .collect();

        Ok(self.apply_all(outcomes))
    }

    /// Apply background builds that have finished, without blocking
    pub fn poll_builds(&mut self) -> AppliedBuilds {
        let outcomes = match self.background.as_mut() {
            Some(background) => background.poll(),
            None => return AppliedBuilds::default(),
        };
        self.apply_all(outcomes)
    }

    /// Block until every background build has landed and apply them
    pub fn flush_builds(&mut self) -> AppliedBuilds {
        let mut outcomes = Vec::new();
        if let Some(background) = self.background.as_mut() {
            while let Some(outcome) = background.wait() {
                outcomes.push(outcome);
            }
        }
        self.apply_all(outcomes)
    }

    fn apply_all(&mut self, outcomes: Vec<BuildOutcome>) -> AppliedBuilds {
        let mut applied = AppliedBuilds::default();
        for outcome in outcomes {
            let Some(level) = self.levels.get_mut(outcome.level) else {
                log::warn!("Discarding build for unknown LOD {}", outcome.level);
                continue;
            };

            match outcome.result {
                Ok(built) => applied.ready.extend(level.apply(outcome.coord, outcome.ticket, built)),
                Err(e) if level.abandon(outcome.coord, outcome.ticket) => {
                    log::error!("LOD {} chunk {} failed to build: {e}", outcome.level, outcome.coord);
                    applied.failed.push(BuildFailure {
                        level: outcome.level,
                        coord: outcome.coord,
                        error: Arc::new(e),
                    });
                }
                Err(e) => log::warn!("Ignoring failure of stale build {}: {e}", outcome.coord),
            }
        }
        applied
    }

    /// Rebuild every level from an empty pool.
    ///
    /// In-flight background builds are discarded when they land.
    pub fn reset(&mut self) -> Result<()> {
        self.levels = build_levels(&self.config)?;
        log::info!(
            "Terrain streamer reset ({} background builds will be discarded)",
            self.pending_builds()
        );
        Ok(())
    }

    /// Stop background workers and release every chunk
    pub fn shutdown(mut self) {
        if let Some(mut background) = self.background.take() {
            background.shutdown();
        }
        log::info!("Terrain streamer shut down with {} active chunks", self.active_count());
        self.levels.clear();
    }
}
