//! Shared test utilities for relay unit tests

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use framerelay_shared::Resolution;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::surface::{FrameRenderer, SoftwareBackend, SoftwareSurface, SurfaceBackend};
use crate::timing::FrameTiming;

// ============================================================================
// Configuration
// ============================================================================

/// Default config with the mapping work dir inside `dir`.
pub fn test_config(dir: &Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.mapping.work_dir = Some(dir.to_path_buf());
    config
}

// ============================================================================
// Renderers
// ============================================================================

/// Renderer that clears the surface to one color and counts its calls.
#[derive(Clone)]
pub struct SolidRenderer {
    color: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

impl SolidRenderer {
    pub fn new(color: u32) -> Self {
        Self {
            color: Arc::new(AtomicU32::new(color)),
            calls: Arc::new(AtomicU32::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_color(&self, color: u32) {
        self.color.store(color, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make subsequent renders return an error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl<B> FrameRenderer<B> for SolidRenderer
where
    B: SurfaceBackend<Surface = SoftwareSurface>,
{
    fn render(
        &mut self,
        _backend: &B,
        surface: &mut SoftwareSurface,
        _timing: &FrameTiming,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("injected render failure");
        }
        surface.clear(self.color.load(Ordering::SeqCst));
        Ok(())
    }
}

// ============================================================================
// Fault-injecting backend
// ============================================================================

/// Software backend whose allocation and readback can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyBackend {
    inner: SoftwareBackend,
    fail_create: Arc<AtomicBool>,
    fail_read: Arc<AtomicBool>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }
}

impl SurfaceBackend for FlakyBackend {
    type Surface = SoftwareSurface;

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn create_surface(&self, resolution: Resolution) -> Result<SoftwareSurface, RelayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RelayError::SurfaceAllocation {
                resolution,
                reason: "injected allocation failure".to_string(),
            });
        }
        self.inner.create_surface(resolution)
    }

    fn read_pixels(&self, surface: &mut SoftwareSurface, dst: &mut [u32]) -> Result<(), RelayError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(RelayError::Readback("injected readback failure".to_string()));
        }
        self.inner.read_pixels(surface, dst)
    }
}
