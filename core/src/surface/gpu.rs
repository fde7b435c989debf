//! wgpu render surfaces
//!
//! Each surface is a `Bgra8Unorm` color texture plus a `Depth24Plus` depth
//! texture, both sized to the output resolution, and a persistent staging
//! buffer for readback so no buffer is allocated per frame.
//!
//! wgpu keeps texture contents between passes, so whatever the render
//! callback draws stays intact until the readback copy.

use anyhow::Context;
use framerelay_shared::{BYTES_PER_PIXEL, Resolution};

use super::{FrameSurface, SurfaceBackend};
use crate::error::RelayError;

/// Color format of the render target (32-bit, alpha ignored by consumers)
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// Depth format of the render target
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Off-screen render target with readback staging buffer.
///
/// The textures must be stored here because `wgpu::TextureView` does not
/// own the underlying texture.
pub struct WgpuSurface {
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    staging_buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
    resolution: Resolution,
}

impl WgpuSurface {
    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color_texture
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}

impl FrameSurface for WgpuSurface {
    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// GPU backend built on a wgpu device and queue.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    /// Wrap a device owned by the host's renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Create a headless device (no window surface).
    pub fn new_headless() -> Result<Self, RelayError> {
        Self::request_headless().map_err(|e| RelayError::Device(format!("{e:#}")))
    }

    fn request_headless() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("Failed to find suitable GPU adapter")?;

        tracing::info!("Using GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("FrameRelay Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .context("Failed to create GPU device")?;

        Ok(Self { device, queue })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Clear color and depth of a surface.
    pub fn clear(&self, surface: &WgpuSurface, color: wgpu::Color) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("FrameRelay Clear Encoder"),
            });

        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("FrameRelay Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface.color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &surface.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn create_textures(&self, resolution: Resolution) -> WgpuSurface {
        let size = wgpu::Extent3d {
            width: resolution.width,
            height: resolution.height,
            depth_or_array_layers: 1,
        };

        let color_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("FrameRelay Color Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("FrameRelay Depth Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        // wgpu requires rows to be aligned to COPY_BYTES_PER_ROW_ALIGNMENT (256 bytes)
        let unpadded_bytes_per_row = resolution.width * BYTES_PER_PIXEL as u32;
        let padded_bytes_per_row =
            unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
                * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FrameRelay Readback Staging Buffer"),
            size: padded_bytes_per_row as u64 * resolution.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        WgpuSurface {
            color_texture,
            color_view,
            depth_texture,
            depth_view,
            staging_buffer,
            padded_bytes_per_row,
            resolution,
        }
    }
}

impl SurfaceBackend for WgpuBackend {
    type Surface = WgpuSurface;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_surface(&self, resolution: Resolution) -> Result<WgpuSurface, RelayError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if resolution.width > max || resolution.height > max {
            return Err(RelayError::SurfaceAllocation {
                resolution,
                reason: format!("exceeds device texture limit {max}"),
            });
        }

        // Surface allocation errors are caught here instead of reaching the
        // device's uncaptured error handler.
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let surface = self.create_textures(resolution);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(error) => {
                self.destroy_surface(surface);
                Err(RelayError::SurfaceAllocation {
                    resolution,
                    reason: error.to_string(),
                })
            }
            None => Ok(surface),
        }
    }

    fn read_pixels(&self, surface: &mut WgpuSurface, dst: &mut [u32]) -> Result<(), RelayError> {
        let resolution = surface.resolution;
        if dst.len() > resolution.pixel_count() {
            return Err(RelayError::Readback(format!(
                "requested {} pixels from a {} surface",
                dst.len(),
                resolution
            )));
        }

        // A failed copy must not reach the uncaptured error handler; the
        // next tick retries.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("FrameRelay Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &surface.staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(surface.padded_bytes_per_row),
                    rows_per_image: Some(resolution.height),
                },
            },
            wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            surface.staging_buffer.unmap();
            return Err(RelayError::Readback(error.to_string()));
        }

        let slice = surface.staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let mapped = self
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RelayError::Device(e.to_string()))
            .and_then(|_| {
                rx.recv()
                    .map_err(|_| RelayError::Readback("map callback dropped".to_string()))?
                    .map_err(|e| RelayError::Readback(e.to_string()))
            });
        if let Err(e) = mapped {
            // Leave the staging buffer unmapped so the next copy is valid
            surface.staging_buffer.unmap();
            return Err(e);
        }

        // Remove row padding while copying into the CPU buffer
        {
            let mapped = slice.get_mapped_range();
            let dst_bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
            let row_bytes = resolution.width as usize * BYTES_PER_PIXEL;
            let padded = surface.padded_bytes_per_row as usize;

            for (row, out) in dst_bytes.chunks_mut(row_bytes).enumerate() {
                let start = row * padded;
                out.copy_from_slice(&mapped[start..start + out.len()]);
            }
        }
        surface.staging_buffer.unmap();

        Ok(())
    }

    fn destroy_surface(&self, surface: WgpuSurface) {
        surface.color_texture.destroy();
        surface.depth_texture.destroy();
        surface.staging_buffer.destroy();
    }
}
