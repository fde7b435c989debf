//! Mapping names and byte layout.
//!
//! A mapping is named `{prefix}_{label}_{width}x{height}`. The label is
//! optional; when absent the name keeps the empty segment
//! (`framerelay__1920x1080`) so names stay positional for consumers that
//! split on `_`.

use std::ops::Range;

use crate::constants::{BYTES_PER_PIXEL, FRAME_SLOTS};
use crate::resolution::Resolution;

/// Replace characters that are unsafe in a file or mapping name.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive the mapping name for a resolution.
pub fn mapping_name(prefix: &str, label: Option<&str>, resolution: Resolution) -> String {
    let label = label.map(sanitize_label).unwrap_or_default();
    format!(
        "{}_{}_{}x{}",
        sanitize_label(prefix),
        label,
        resolution.width,
        resolution.height
    )
}

/// Byte layout of a frame mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingLayout {
    pub resolution: Resolution,
}

impl MappingLayout {
    pub const fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Bytes in one frame slot.
    pub const fn slot_bytes(&self) -> usize {
        self.resolution.pixel_count() * BYTES_PER_PIXEL
    }

    /// Total mapping size.
    pub const fn capacity(&self) -> usize {
        self.slot_bytes() * FRAME_SLOTS
    }

    /// Byte range of a frame slot, or `None` if the slot does not exist.
    pub fn slot_range(&self, slot: usize) -> Option<Range<usize>> {
        (slot < FRAME_SLOTS).then(|| {
            let start = slot * self.slot_bytes();
            start..start + self.slot_bytes()
        })
    }

    /// Byte offset of a pixel inside slot 0.
    pub const fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.resolution.width as usize + x as usize) * BYTES_PER_PIXEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_name_with_label() {
        let name = mapping_name("framerelay", Some("lions-arch"), Resolution::new(1920, 1080));
        assert_eq!(name, "framerelay_lions-arch_1920x1080");
    }

    #[test]
    fn test_mapping_name_without_label() {
        let name = mapping_name("framerelay", None, Resolution::new(800, 600));
        assert_eq!(name, "framerelay__800x600");
    }

    #[test]
    fn test_mapping_name_sanitizes() {
        let name = mapping_name("frame relay", Some("a/b\\c:d"), Resolution::new(1, 1));
        assert_eq!(name, "frame_relay_a_b_c_d_1x1");
    }

    #[test]
    fn test_names_differ_by_resolution() {
        let a = mapping_name("p", Some("x"), Resolution::new(1920, 1080));
        let b = mapping_name("p", Some("x"), Resolution::new(1080, 1920));
        assert_ne!(a, b);
    }

    #[test]
    fn test_layout_slots() {
        let layout = MappingLayout::new(Resolution::new(4, 2));
        assert_eq!(layout.slot_bytes(), 32);
        assert_eq!(layout.capacity(), 64);
        assert_eq!(layout.slot_range(0), Some(0..32));
        assert_eq!(layout.slot_range(1), Some(32..64));
        assert_eq!(layout.slot_range(2), None);
    }

    #[test]
    fn test_pixel_offset() {
        let layout = MappingLayout::new(Resolution::new(4, 2));
        assert_eq!(layout.pixel_offset(0, 0), 0);
        assert_eq!(layout.pixel_offset(3, 0), 12);
        assert_eq!(layout.pixel_offset(0, 1), 16);
    }
}
