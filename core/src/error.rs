//! Error types for the frame relay

use std::io;
use std::path::PathBuf;

use framerelay_shared::Resolution;

/// Errors raised by the relay components.
///
/// None of these are fatal to the host: the coordinator logs them and
/// reports the tick as failed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Render surface could not be created
    #[error("failed to create {resolution} render surface: {reason}")]
    SurfaceAllocation { resolution: Resolution, reason: String },

    /// Shared mapping could not be created or opened
    #[error("failed to create shared mapping '{name}' ({capacity} bytes)")]
    MappingAllocation {
        name: String,
        capacity: usize,
        #[source]
        source: io::Error,
    },

    /// Working directory for mapping backing files could not be created
    #[error("failed to create working directory {}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation on a mapping that was already disposed
    #[error("shared mapping '{name}' is closed")]
    MappingClosed { name: String },

    /// Write or region outside the mapping
    #[error("{len} bytes at offset {offset} exceed mapping capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Regions passed to `regions_mut` overlap or are out of order
    #[error("region {index} overlaps the previous region")]
    OverlappingRegion { index: usize },

    /// No surface exists for the requested operation
    #[error("no render surface allocated")]
    NoSurface,

    /// No shared mapping exists for the requested operation
    #[error("no shared mapping allocated")]
    NoMapping,

    /// Relay configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Render callback failed
    #[error("render callback failed: {0:#}")]
    Render(anyhow::Error),

    /// GPU-to-CPU copy failed
    #[error("pixel readback failed: {0}")]
    Readback(String),

    /// GPU device error (lost device, adapter unavailable)
    #[error("GPU device error: {0}")]
    Device(String),

    /// A publish chunk failed to write
    #[error("publish chunk {index} failed")]
    ChunkWrite {
        index: usize,
        #[source]
        source: Box<RelayError>,
    },

    /// Publish worker pool could not be built
    #[error("failed to build publish worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
