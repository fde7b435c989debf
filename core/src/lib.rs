//! FrameRelay Core - Render-tick frame publishing
//!
//! This crate renders frames into an off-screen surface and publishes each
//! completed frame into a named shared-memory mapping that a consumer process
//! can read without any handshake.
//!
//! # Architecture
//!
//! - [`FrameRelay`] - Per-tick coordinator: allocate, tear down, or publish
//! - [`FrameBufferStore`] - Owns the render surface for the current resolution
//! - [`PixelReadback`] - Copies the rendered surface into a CPU pixel buffer
//! - [`SharedFrameMap`] - Named file-backed mapping, zeroed on dispose
//! - [`ParallelPublisher`] - Writes the pixel buffer into the mapping in chunks
//! - [`TargetWatch`] - Liveness of the target process

pub mod channel;
pub mod config;
pub mod error;
pub mod publisher;
pub mod readback;
pub mod relay;
pub mod surface;
#[cfg(test)]
pub mod test_utils;
pub mod timing;
pub mod watch;

pub use channel::{FrameMapView, MapRegion, SharedFrameMap, ensure_work_dir, open_view};
pub use config::{MappingConfig, PublishConfig, RelayConfig, RemainderPolicy, WatchConfig};
pub use error::{ConfigError, RelayError};
pub use publisher::{ParallelPublisher, PublishStats, partition};
pub use readback::PixelReadback;
pub use relay::{
    FailureStage, FrameRelay, RelayStats, SkipHandle, SkipReason, TickOutcome, TickSnapshot,
};
#[cfg(feature = "gpu")]
pub use surface::{WgpuBackend, WgpuSurface};
pub use surface::{
    FrameBufferStore, FrameRenderer, FrameSurface, SoftwareBackend, SoftwareSurface,
    SurfaceBackend,
};
pub use timing::{FrameClock, FrameTiming};
pub use watch::TargetWatch;

// Re-export wgpu so hosts can drive the GPU backend without a separate dependency
#[cfg(feature = "gpu")]
pub use wgpu;

// Re-export shared layout types for convenience
pub use framerelay_shared::{MappingLayout, Resolution, mapping_name, pack_bgrx, unpack_bgrx};
