//! Centralized constants for the frame channel.
//!
//! Single source of truth for values the producer and any consumer must
//! agree on.

/// Bytes per pixel in the published frame (BGRX8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Number of full frames the mapping has room for.
///
/// Only slot 0 is written today; slot 1 is reserved capacity.
pub const FRAME_SLOTS: usize = 2;

/// Default prefix for mapping names.
pub const DEFAULT_MAP_PREFIX: &str = "framerelay";

/// Default number of parallel publish chunks per frame.
pub const DEFAULT_CHUNK_COUNT: usize = 8;
