//! Per-tick lifecycle coordination
//!
//! [`FrameRelay`] is called once per render tick with a polled
//! [`TickSnapshot`]. It decides whether to allocate, tear down, or publish,
//! and never lets a failure escape to the host: every tick ends in a
//! [`TickOutcome`].
//!
//! The render surface and the shared mapping are created together and
//! released together; one never exists without the other.


use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use framerelay_shared::{MappingLayout, Resolution, mapping_name};

use crate::channel::{SharedFrameMap, ensure_work_dir};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::publisher::{ParallelPublisher, PublishStats};
use crate::readback::PixelReadback;
use crate::surface::{FrameBufferStore, FrameRenderer, SurfaceBackend};
use crate::timing::FrameTiming;

/// State polled by the host at the start of each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSnapshot {
    pub timing: FrameTiming,
    /// Current output resolution
    pub resolution: Resolution,
    /// Whether the target process is alive
    pub target_running: bool,
}

impl TickSnapshot {
    pub fn new(timing: FrameTiming, resolution: Resolution, target_running: bool) -> Self {
        Self {
            timing,
            resolution,
            target_running,
        }
    }
}

/// Why a tick did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The one-shot skip flag was set
    SkipRequested,
    /// The target process is not running
    TargetNotRunning,
    /// The output resolution has a zero dimension
    EmptyResolution,
}

/// Which step of a tick failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Allocation,
    Render,
    Readback,
    Publish,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Allocation => "allocation",
            Self::Render => "render",
            Self::Readback => "readback",
            Self::Publish => "publish",
        };
        f.write_str(stage)
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was published. `allocated` is set when resources were created
    /// during this tick.
    Published { allocated: bool, stats: PublishStats },
    Skipped(SkipReason),
    /// The resolution changed; resources were released and nothing was published
    ResizeTeardown { from: Resolution, to: Resolution },
    Failed(FailureStage),
}

impl TickOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Counters over the relay's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub ticks: u64,
    pub published: u64,
    pub skipped: u64,
    pub failed: u64,
    pub resize_teardowns: u64,
    /// Surface + mapping pairs created
    pub allocations: u64,
    /// Publishes slower than the configured budget
    pub budget_overruns: u64,
    /// Render + readback + publish time of the last published frame
    pub last_frame_time: Option<Duration>,
}

/// Thread-safe handle that skips the relay's next tick.
#[derive(Debug, Clone)]
pub struct SkipHandle {
    flag: Arc<AtomicBool>,
}

impl SkipHandle {
    /// Skip the next tick. Requests made before that tick collapse into one.
    pub fn request_skip(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// Publishes each rendered frame into a named shared mapping.
pub struct FrameRelay<B: SurfaceBackend, R: FrameRenderer<B>> {
    store: FrameBufferStore<B>,
    readback: PixelReadback,
    publisher: ParallelPublisher,
    channel: Option<SharedFrameMap>,
    renderer: R,
    config: RelayConfig,
    work_dir: PathBuf,
    skip: Arc<AtomicBool>,
    stats: RelayStats,
}

impl<B: SurfaceBackend, R: FrameRenderer<B>> FrameRelay<B, R> {
    /// Create a relay. No resources are allocated until the first tick.
    pub fn new(backend: B, renderer: R, config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let publisher = ParallelPublisher::from_config(&config.publish)?;
        let work_dir = config.mapping.work_dir();

        tracing::debug!(
            "Frame relay using {} backend, {} publish chunks, work dir {}",
            backend.name(),
            publisher.chunk_count(),
            work_dir.display()
        );

        Ok(Self {
            store: FrameBufferStore::new(backend),
            readback: PixelReadback::new(),
            publisher,
            channel: None,
            renderer,
            config,
            work_dir,
            skip: Arc::new(AtomicBool::new(false)),
            stats: RelayStats::default(),
        })
    }

    /// Run one tick.
    pub fn tick(&mut self, snapshot: &TickSnapshot) -> TickOutcome {
        self.stats.ticks += 1;

        if self.skip.swap(false, Ordering::AcqRel) {
            return self.skipped(SkipReason::SkipRequested);
        }
        if !snapshot.target_running {
            // Resources stay allocated; release_resources() or shutdown() frees them
            return self.skipped(SkipReason::TargetNotRunning);
        }

        let resolution = snapshot.resolution;
        if resolution.is_empty() {
            return self.skipped(SkipReason::EmptyResolution);
        }

        let mut allocated = false;
        if !self.has_resources() {
            if let Err(e) = self.allocate(resolution) {
                return self.failed(FailureStage::Allocation, &e);
            }
            allocated = true;
        }

        if let Some(current) = self.store.dimensions() {
            if current != resolution {
                tracing::info!(
                    "Removing render target {} (resolution {} -> {})",
                    self.mapping_name().unwrap_or_default(),
                    current,
                    resolution
                );
                self.dispose_resources();
                self.stats.resize_teardowns += 1;
                return TickOutcome::ResizeTeardown {
                    from: current,
                    to: resolution,
                };
            }
        }

        let start = Instant::now();
        match self.render_and_publish(&snapshot.timing, resolution) {
            Ok(stats) => {
                let frame_time = start.elapsed();
                let budget = self.config.publish.budget();
                if frame_time > budget {
                    tracing::warn!(
                        "Frame took {:?}, exceeds budget of {:?}",
                        frame_time,
                        budget
                    );
                    self.stats.budget_overruns += 1;
                }
                self.stats.published += 1;
                self.stats.last_frame_time = Some(frame_time);
                TickOutcome::Published { allocated, stats }
            }
            Err((stage, e)) => self.failed(stage, &e),
        }
    }

    fn skipped(&mut self, reason: SkipReason) -> TickOutcome {
        tracing::trace!("Tick skipped: {:?}", reason);
        self.stats.skipped += 1;
        TickOutcome::Skipped(reason)
    }

    fn failed(&mut self, stage: FailureStage, error: &RelayError) -> TickOutcome {
        tracing::error!("Frame relay {} failed: {}", stage, error_chain(error));
        self.stats.failed += 1;
        TickOutcome::Failed(stage)
    }

    fn has_resources(&self) -> bool {
        self.store.is_allocated() && self.channel.is_some()
    }

    /// Create the surface and mapping for `resolution`, or neither.
    fn allocate(&mut self, resolution: Resolution) -> Result<(), RelayError> {
        // Clear a half-allocated pair before starting over
        self.dispose_resources();

        let name = mapping_name(
            &self.config.mapping.prefix,
            self.config.mapping.label.as_deref(),
            resolution,
        );
        tracing::info!("New render target: {}", name);

        ensure_work_dir(&self.work_dir)?;
        self.store.ensure(resolution)?;

        let capacity = MappingLayout::new(resolution).capacity();
        match SharedFrameMap::create(&self.work_dir, &name, capacity) {
            Ok(map) => self.channel = Some(map),
            Err(e) => {
                self.store.dispose();
                return Err(e);
            }
        }

        self.stats.allocations += 1;
        Ok(())
    }

    fn render_and_publish(
        &mut self,
        timing: &FrameTiming,
        resolution: Resolution,
    ) -> Result<PublishStats, (FailureStage, RelayError)> {
        let (backend, surface) = self
            .store
            .parts_mut()
            .map_err(|e| (FailureStage::Render, e))?;
        self.renderer
            .render(backend, surface, timing)
            .map_err(|e| (FailureStage::Render, RelayError::Render(e)))?;

        let pixel_count = resolution.pixel_count();
        let pixels = self
            .readback
            .read(&mut self.store, pixel_count)
            .map_err(|e| (FailureStage::Readback, e))?;

        let channel = self
            .channel
            .as_mut()
            .ok_or((FailureStage::Publish, RelayError::NoMapping))?;
        self.publisher
            .publish(pixels, pixel_count, channel)
            .map_err(|e| (FailureStage::Publish, e))
    }

    fn dispose_resources(&mut self) -> bool {
        let had_surface = self.store.dispose();
        let had_channel = match self.channel.take() {
            Some(mut map) => {
                map.dispose();
                true
            }
            None => false,
        };
        had_surface || had_channel
    }

    /// Release the surface and mapping (zeroing the mapping).
    ///
    /// The next tick with a running target allocates again. Returns `true`
    /// if anything was released.
    pub fn release_resources(&mut self) -> bool {
        let name = self.mapping_name().map(str::to_string);
        let released = self.dispose_resources();
        if released {
            tracing::info!("Released render target {}", name.unwrap_or_default());
        }
        released
    }

    /// Release everything before the host exits. Also runs on drop.
    pub fn shutdown(&mut self) {
        if self.release_resources() {
            tracing::debug!("Frame relay shut down after {} ticks", self.stats.ticks);
        }
    }

    /// Handle for skipping the next tick from another thread.
    pub fn skip_handle(&self) -> SkipHandle {
        SkipHandle {
            flag: Arc::clone(&self.skip),
        }
    }

    /// Skip the next tick.
    pub fn skip_next_frame(&self) {
        self.skip.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Resolution of the allocated resources, if any.
    pub fn resolution(&self) -> Option<Resolution> {
        self.store.dimensions()
    }

    /// Name of the current shared mapping, if any.
    pub fn mapping_name(&self) -> Option<&str> {
        self.channel.as_ref().map(SharedFrameMap::name)
    }

    pub fn channel(&self) -> Option<&SharedFrameMap> {
        self.channel.as_ref()
    }

    pub fn store(&self) -> &FrameBufferStore<B> {
        &self.store
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }
}

impl<B: SurfaceBackend, R: FrameRenderer<B>> Drop for FrameRelay<B, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `error: cause: cause` for log lines.
fn error_chain(error: &RelayError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
