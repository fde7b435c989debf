//! Render surfaces and the frame buffer store
//!
//! A [`SurfaceBackend`] creates off-screen color+depth surfaces and copies
//! their pixels back to the CPU. The [`FrameBufferStore`] owns the backend and
//! at most one surface, sized to the current output resolution.
//!
//! Two backends are provided:
//! - [`SoftwareBackend`] - CPU surfaces, always available
//! - `WgpuBackend` - GPU textures with staging-buffer readback (feature `gpu`)

#[cfg(feature = "gpu")]
mod gpu;
mod software;

#[cfg(feature = "gpu")]
pub use gpu::{COLOR_FORMAT, DEPTH_FORMAT, WgpuBackend, WgpuSurface};
pub use software::{DEFAULT_MAX_DIMENSION, SoftwareBackend, SoftwareSurface};

use framerelay_shared::Resolution;

use crate::error::RelayError;
use crate::timing::FrameTiming;

/// A render surface with a fixed resolution.
pub trait FrameSurface {
    fn resolution(&self) -> Resolution;
}

/// Trait for backends that can allocate render surfaces and read them back.
///
/// Implement this trait to publish frames rendered by a graphics API.
pub trait SurfaceBackend {
    /// Surface type created by this backend
    type Surface: FrameSurface;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Create a color+depth surface of exactly `resolution`.
    fn create_surface(&self, resolution: Resolution) -> Result<Self::Surface, RelayError>;

    /// Copy the first `dst.len()` pixels (row-major, BGRX8) of `surface` into `dst`.
    ///
    /// Blocks until the copy is complete.
    fn read_pixels(&self, surface: &mut Self::Surface, dst: &mut [u32]) -> Result<(), RelayError>;

    /// Release a surface's resources.
    fn destroy_surface(&self, surface: Self::Surface) {
        drop(surface);
    }
}

/// Render callback that draws one frame into the active surface.
///
/// Implemented for closures of the matching signature.
pub trait FrameRenderer<B: SurfaceBackend> {
    fn render(
        &mut self,
        backend: &B,
        surface: &mut B::Surface,
        timing: &FrameTiming,
    ) -> anyhow::Result<()>;
}

impl<B, F> FrameRenderer<B> for F
where
    B: SurfaceBackend,
    F: FnMut(&B, &mut B::Surface, &FrameTiming) -> anyhow::Result<()>,
{
    fn render(
        &mut self,
        backend: &B,
        surface: &mut B::Surface,
        timing: &FrameTiming,
    ) -> anyhow::Result<()> {
        self(backend, surface, timing)
    }
}

/// Owns the backend and the current render surface.
pub struct FrameBufferStore<B: SurfaceBackend> {
    backend: B,
    surface: Option<B::Surface>,
    /// Number of surfaces created over the store's lifetime
    allocations: u64,
}

impl<B: SurfaceBackend> FrameBufferStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            surface: None,
            allocations: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Make sure a surface of exactly `resolution` exists.
    ///
    /// Returns `true` if a surface was created. Same dimensions is a no-op;
    /// different dimensions replace the existing surface.
    pub fn ensure(&mut self, resolution: Resolution) -> Result<bool, RelayError> {
        if self.dimensions() == Some(resolution) {
            return Ok(false);
        }
        if resolution.is_empty() {
            return Err(RelayError::SurfaceAllocation {
                resolution,
                reason: "zero-sized surface".to_string(),
            });
        }

        self.dispose();
        let surface = self.backend.create_surface(resolution)?;
        self.surface = Some(surface);
        self.allocations += 1;

        tracing::debug!(
            "Created {} render surface {}",
            self.backend.name(),
            resolution
        );
        Ok(true)
    }

    /// Release the current surface. Safe to call when nothing is allocated.
    ///
    /// Returns `true` if a surface was released.
    pub fn dispose(&mut self) -> bool {
        match self.surface.take() {
            Some(surface) => {
                self.backend.destroy_surface(surface);
                true
            }
            None => false,
        }
    }

    /// Resolution of the current surface, if any.
    pub fn dimensions(&self) -> Option<Resolution> {
        self.surface.as_ref().map(FrameSurface::resolution)
    }

    pub fn is_allocated(&self) -> bool {
        self.surface.is_some()
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Backend and surface borrowed together, for rendering and readback.
    pub fn parts_mut(&mut self) -> Result<(&B, &mut B::Surface), RelayError> {
        let surface = self.surface.as_mut().ok_or(RelayError::NoSurface)?;
        Ok((&self.backend, surface))
    }
}

impl<B: SurfaceBackend> Drop for FrameBufferStore<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
