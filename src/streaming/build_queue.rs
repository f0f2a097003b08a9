//! Background chunk building on a dedicated tokio runtime

use std::sync::Arc;

use glam::IVec2;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::core::{Error, Result};
use crate::terrain::{BuildRequest, BuiltChunk, ChunkBuilder};

/// Result of one background build
#[derive(Debug)]
pub struct BuildOutcome {
    pub level: usize,
    pub coord: IVec2,
    pub ticket: u64,
    pub result: Result<BuiltChunk>,
}

/// Runs [`ChunkBuilder`]s on a blocking pool and reports through a channel
pub struct BackgroundBuilder {
    runtime: Option<Runtime>,
    builder: Arc<dyn ChunkBuilder>,
    result_tx: mpsc::UnboundedSender<BuildOutcome>,
    result_rx: mpsc::UnboundedReceiver<BuildOutcome>,
    /// Submitted builds whose outcome has not been received yet
    in_flight: usize,
}

impl BackgroundBuilder {
    /// Start a runtime with `worker_threads` workers (tokio default when `None`)
    pub fn new(builder: Arc<dyn ChunkBuilder>, worker_threads: Option<usize>) -> Result<Self> {
        let mut runtime = tokio::runtime::Builder::new_multi_thread();
        runtime.thread_name("terrain-build");
        if let Some(n) = worker_threads {
            runtime.worker_threads(n);
        }
        let runtime = runtime
            .build()
            .map_err(|e| Error::Runtime(format!("failed to start build runtime: {e}")))?;

        let (result_tx, result_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime: Some(runtime),
            builder,
            result_tx,
            result_rx,
            in_flight: 0,
        })
    }

    /// Queue a build; its outcome shows up in [`poll`](Self::poll) or [`wait`](Self::wait)
    pub fn submit(&mut self, request: BuildRequest) -> Result<()> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(Error::Runtime("build runtime has been shut down".into()));
        };

        let builder = Arc::clone(&self.builder);
        let result_tx = self.result_tx.clone();
        let (level, coord, ticket) = (request.level, request.coord, request.ticket);

        runtime.spawn(async move {
            let joined = tokio::task::spawn_blocking(move || builder.build(&request)).await;
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Runtime(format!("build task for {coord} failed: {e}"))),
            };
            // Receiver gone means the streamer was dropped
            let _ = result_tx.send(BuildOutcome { level, coord, ticket, result });
        });

        self.in_flight += 1;
        Ok(())
    }

    /// Drain outcomes that are already available (non-blocking)
    pub fn poll(&mut self) -> Vec<BuildOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.result_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Block until the next outcome arrives; `None` when nothing is in flight.
    ///
    /// Must not be called from within an async context.
    pub fn wait(&mut self) -> Option<BuildOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let outcome = self.result_rx.blocking_recv()?;
        self.in_flight -= 1;
        Some(outcome)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Stop the runtime without waiting for running builds
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            if self.in_flight > 0 {
                log::info!("Abandoning {} in-flight chunk builds", self.in_flight);
            }
            runtime.shutdown_background();
            self.in_flight = 0;
        }
    }
}

impl Drop for BackgroundBuilder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::flat_mesh;
    use crate::terrain::{MeshChunkBuilder, NoiseParams};
    use glam::Vec3;

    fn request(coord: IVec2, ticket: u64) -> BuildRequest {
        BuildRequest {
            level: 0,
            coord,
            origin: Vec3::new(coord.x as f32 * 8.0, 0.0, coord.y as f32 * 8.0),
            chunk_size: 8.0,
            resolution: 4,
            template: Arc::new(flat_mesh(8.0, 4).unwrap()),
            ticket,
        }
    }

    fn background() -> BackgroundBuilder {
        let builder: Arc<dyn ChunkBuilder> = Arc::new(MeshChunkBuilder::new(NoiseParams::default()));
        BackgroundBuilder::new(builder, Some(2)).unwrap()
    }

    #[test]
    fn test_builds_complete() {
        let mut queue = background();
        for (i, x) in (-2..2).enumerate() {
            queue.submit(request(IVec2::new(x, 1), i as u64 + 1)).unwrap();
        }
        assert_eq!(queue.in_flight(), 4);

        let mut outcomes = Vec::new();
        while let Some(outcome) = queue.wait() {
            outcomes.push(outcome);
        }

        assert_eq!(outcomes.len(), 4);
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.poll().is_empty());
        for outcome in &outcomes {
            let built = outcome.result.as_ref().unwrap();
            assert_eq!(built.mesh.vertex_count(), 25);
        }
        let mut tickets: Vec<u64> = outcomes.iter().map(|o| o.ticket).collect();
        tickets.sort();
        assert_eq!(tickets, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_build_error_is_reported() {
        let mut queue = background();
        let mut bad = request(IVec2::ZERO, 7);
        bad.resolution = 0;
        queue.submit(bad).unwrap();

        let outcome = queue.wait().unwrap();
        assert_eq!(outcome.ticket, 7);
        assert!(matches!(outcome.result, Err(Error::Config(_))));
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut queue = background();
        queue.shutdown();
        assert!(matches!(queue.submit(request(IVec2::ZERO, 1)), Err(Error::Runtime(_))));
        assert!(queue.wait().is_none());
    }
}
