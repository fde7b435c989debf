//! CPU render surfaces
//!
//! Used by headless hosts without a GPU and by tests. Surfaces carry a color
//! buffer and a depth buffer so depth-tested draws composite the same way a
//! GPU target would.

use framerelay_shared::Resolution;

use super::{FrameSurface, SurfaceBackend};
use crate::error::RelayError;

/// Largest width or height accepted, matching wgpu's default 2D texture limit.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// CPU-side color + depth surface.
pub struct SoftwareSurface {
    resolution: Resolution,
    color: Vec<u32>,
    depth: Vec<f32>,
}

impl SoftwareSurface {
    fn new(resolution: Resolution) -> Self {
        let pixels = resolution.pixel_count();
        Self {
            resolution,
            color: vec![0; pixels],
            depth: vec![1.0; pixels],
        }
    }

    /// Fill the color buffer and reset depth to the far plane.
    pub fn clear(&mut self, color: u32) {
        self.color.fill(color);
        self.depth.fill(1.0);
    }

    /// Draw an axis-aligned rectangle with a depth test (`depth < stored`).
    ///
    /// The rectangle is clipped to the surface.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: u32, depth: f32) {
        let x_end = x.saturating_add(width).min(self.resolution.width);
        let y_end = y.saturating_add(height).min(self.resolution.height);
        let stride = self.resolution.width as usize;

        for row in y..y_end {
            let base = row as usize * stride;
            for col in x..x_end {
                let idx = base + col as usize;
                if depth < self.depth[idx] {
                    self.depth[idx] = depth;
                    self.color[idx] = color;
                }
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        self.color
            .get(y as usize * self.resolution.width as usize + x as usize)
            .copied()
    }

    pub fn pixels(&self) -> &[u32] {
        &self.color
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.color
    }
}

impl FrameSurface for SoftwareSurface {
    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Backend producing [`SoftwareSurface`]s.
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    max_dimension: u32,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Override the largest accepted width or height.
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl SurfaceBackend for SoftwareBackend {
    type Surface = SoftwareSurface;

    fn name(&self) -> &'static str {
        "software"
    }

    fn create_surface(&self, resolution: Resolution) -> Result<SoftwareSurface, RelayError> {
        if resolution.width > self.max_dimension || resolution.height > self.max_dimension {
            return Err(RelayError::SurfaceAllocation {
                resolution,
                reason: format!("exceeds maximum dimension {}", self.max_dimension),
            });
        }
        Ok(SoftwareSurface::new(resolution))
    }

    fn read_pixels(&self, surface: &mut SoftwareSurface, dst: &mut [u32]) -> Result<(), RelayError> {
        let src = surface.color.get(..dst.len()).ok_or_else(|| {
            RelayError::Readback(format!(
                "requested {} pixels from a {} surface",
                dst.len(),
                surface.resolution
            ))
        })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
