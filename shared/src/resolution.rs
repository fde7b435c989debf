//! Output resolution type

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BYTES_PER_PIXEL, FRAME_SLOTS};

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Error returned when parsing a `WxH` resolution string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionParseError {
    #[error("expected WIDTHxHEIGHT, got '{0}'")]
    MissingSeparator(String),

    #[error("invalid dimension '{0}'")]
    InvalidDimension(String),
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels in one frame.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one frame in bytes.
    pub const fn frame_bytes(&self) -> usize {
        self.pixel_count() * BYTES_PER_PIXEL
    }

    /// Size of the shared mapping for this resolution (all frame slots).
    pub const fn mapping_capacity(&self) -> usize {
        self.frame_bytes() * FRAME_SLOTS
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ResolutionParseError::MissingSeparator(s.to_string()))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| ResolutionParseError::InvalidDimension(part.to_string()))
        };

        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}
