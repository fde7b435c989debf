//! Shared types for the FrameRelay frame channel.
//!
//! Both the producer (`framerelay-core`) and consumer-side tooling agree on
//! the items in this crate: how a mapping is named, how large it is, and how
//! a pixel is laid out in memory.

pub mod constants;
pub mod layout;
pub mod pixel;
pub mod resolution;

pub use constants::{BYTES_PER_PIXEL, DEFAULT_CHUNK_COUNT, DEFAULT_MAP_PREFIX, FRAME_SLOTS};
pub use layout::{MappingLayout, mapping_name, sanitize_label};
pub use pixel::{decode_bgrx, pack_bgrx, unpack_bgrx};
pub use resolution::{Resolution, ResolutionParseError};
