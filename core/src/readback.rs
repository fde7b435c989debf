//! GPU-to-CPU pixel readback
//!
//! [`PixelReadback`] owns the CPU pixel buffer. The buffer only grows, so a
//! steady resolution never reallocates and a shrink keeps the larger
//! allocation around for the next resize back.

use crate::error::RelayError;
use crate::surface::{FrameBufferStore, SurfaceBackend};

/// CPU-side pixel buffer filled from the render surface once per tick.
#[derive(Debug, Default)]
pub struct PixelReadback {
    buffer: Vec<u32>,
}

impl PixelReadback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `pixel_count` pixels from the store's surface into the buffer.
    ///
    /// Blocks until the copy completes. Returns the filled prefix.
    pub fn read<B: SurfaceBackend>(
        &mut self,
        store: &mut FrameBufferStore<B>,
        pixel_count: usize,
    ) -> Result<&[u32], RelayError> {
        let (backend, surface) = store.parts_mut()?;

        if self.buffer.len() < pixel_count {
            tracing::debug!(
                "Growing readback buffer from {} to {} pixels",
                self.buffer.len(),
                pixel_count
            );
            self.buffer.resize(pixel_count, 0);
        }

        let dst = &mut self.buffer[..pixel_count];
        backend.read_pixels(surface, dst)?;
        Ok(&*dst)
    }

    /// Current buffer length in pixels (the largest frame seen).
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SoftwareBackend;
    use framerelay_shared::{Resolution, pack_bgrx};

    fn store_with(res: Resolution, color: u32) -> FrameBufferStore<SoftwareBackend> {
        let mut store = FrameBufferStore::new(SoftwareBackend::new());
        store.ensure(res).unwrap();
        let (_, surface) = store.parts_mut().unwrap();
        surface.clear(color);
        store
    }

    #[test]
    fn test_read_copies_pixels() {
        let color = pack_bgrx(10, 20, 30);
        let res = Resolution::new(8, 4);
        let mut store = store_with(res, color);
        let mut readback = PixelReadback::new();

        let pixels = readback.read(&mut store, res.pixel_count()).unwrap();
        assert_eq!(pixels.len(), 32);
        assert!(pixels.iter().all(|&p| p == color));
    }

    #[test]
    fn test_buffer_grows_never_shrinks() {
        let mut readback = PixelReadback::new();

        let mut large = store_with(Resolution::new(16, 16), 1);
        readback.read(&mut large, 256).unwrap();
        assert_eq!(readback.capacity(), 256);

        let mut small = store_with(Resolution::new(4, 4), 2);
        let pixels = readback.read(&mut small, 16).unwrap();
        assert_eq!(pixels.len(), 16);
        assert!(pixels.iter().all(|&p| p == 2));
        assert_eq!(readback.capacity(), 256);
    }

    #[test]
    fn test_read_without_surface() {
        let mut store = FrameBufferStore::new(SoftwareBackend::new());
        let mut readback = PixelReadback::new();
        assert!(matches!(
            readback.read(&mut store, 4),
            Err(RelayError::NoSurface)
        ));
    }
}
