//! Inspect command - summarize a published mapping
//!
//! Opens the mapping read-only, the way a consumer would, and reports its
//! size and what slot 0 currently holds.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use framerelay_core::config;
use framerelay_core::open_view;
use framerelay_shared::{BYTES_PER_PIXEL, MappingLayout, Resolution, decode_bgrx, mapping_name};

/// Arguments for the inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// Resolution the mapping was published at (WIDTHxHEIGHT)
    #[arg(short, long)]
    pub resolution: Resolution,

    /// Label used by the publisher (overrides config)
    #[arg(short, long)]
    pub label: Option<String>,

    /// Directory holding mapping backing files (overrides config)
    #[arg(short, long)]
    pub work_dir: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// What slot 0 of a mapping holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    /// Pixels with any non-zero color channel
    pub lit_pixels: usize,
    pub total_pixels: usize,
    /// Color of the first pixel
    pub first_pixel: (u8, u8, u8),
    /// Mean color over the frame
    pub average: (u8, u8, u8),
}

impl FrameSummary {
    /// Summarize a BGRX8 frame. Trailing partial pixels are ignored.
    pub fn from_frame(frame: &[u8]) -> Self {
        let mut lit_pixels = 0;
        let mut total_pixels = 0;
        let mut sums = [0u64; 3];

        for px in frame.chunks_exact(BYTES_PER_PIXEL) {
            let Some((r, g, b)) = decode_bgrx(px) else {
                continue;
            };
            total_pixels += 1;
            if (r, g, b) != (0, 0, 0) {
                lit_pixels += 1;
            }
            sums[0] += r as u64;
            sums[1] += g as u64;
            sums[2] += b as u64;
        }

        let mean = |sum: u64| (sum / total_pixels.max(1) as u64) as u8;
        Self {
            lit_pixels,
            total_pixels,
            first_pixel: decode_bgrx(frame).unwrap_or_default(),
            average: (mean(sums[0]), mean(sums[1]), mean(sums[2])),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.lit_pixels == 0
    }
}

/// Execute the inspect command
pub fn execute(args: InspectArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::load(),
    };

    let label = args.label.as_deref().or(config.mapping.label.as_deref());
    let name = mapping_name(&config.mapping.prefix, label, args.resolution);
    let work_dir = args
        .work_dir
        .clone()
        .unwrap_or_else(|| config.mapping.work_dir());

    let view = open_view(&work_dir, &name)
        .with_context(|| format!("Failed to open mapping {} in {}", name, work_dir.display()))?;

    let layout = MappingLayout::new(args.resolution);
    println!("Mapping:   {}", name);
    println!("Path:      {}", work_dir.join(&name).display());
    println!("Size:      {} bytes (expected {})", view.len(), layout.capacity());

    if view.len() < layout.capacity() {
        tracing::warn!("Mapping is smaller than a {} double buffer", args.resolution);
    }

    let frame_range = layout.slot_range(0).unwrap_or(0..0);
    let frame = view.bytes().get(frame_range).unwrap_or(view.bytes());
    let summary = FrameSummary::from_frame(frame);

    if summary.is_blank() {
        println!("Frame:     blank (no publisher, or publisher shut down)");
    } else {
        println!(
            "Frame:     {}/{} pixels lit",
            summary.lit_pixels, summary.total_pixels
        );
        println!("First:     rgb{:?}", summary.first_pixel);
        println!("Average:   rgb{:?}", summary.average);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use framerelay_shared::pack_bgrx;

    fn frame(pixels: &[u32]) -> Vec<u8> {
        pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
    }

    #[test]
    fn test_summary_blank() {
        let summary = FrameSummary::from_frame(&[0; 64]);
        assert!(summary.is_blank());
        assert_eq!(summary.total_pixels, 16);
    }

    #[test]
    fn test_summary_counts_lit_and_average() {
        let bytes = frame(&[pack_bgrx(100, 0, 0), pack_bgrx(0, 0, 0), pack_bgrx(200, 40, 0), 0]);
        let summary = FrameSummary::from_frame(&bytes);
        assert_eq!(summary.lit_pixels, 2);
        assert_eq!(summary.total_pixels, 4);
        assert_eq!(summary.first_pixel, (100, 0, 0));
        assert_eq!(summary.average, (75, 10, 0));
    }

    #[test]
    fn test_summary_ignores_partial_pixel() {
        let mut bytes = frame(&[pack_bgrx(1, 2, 3)]);
        bytes.push(0xFF);
        assert_eq!(FrameSummary::from_frame(&bytes).total_pixels, 1);
    }

    #[test]
    fn test_inspect_missing_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let args = InspectArgs {
            resolution: Resolution::new(4, 4),
            label: None,
            work_dir: Some(dir.path().to_path_buf()),
            config: None,
        };
        assert!(execute(args).is_err());
    }
}
