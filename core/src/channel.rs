//! Named shared-memory frame mapping
//!
//! The mapping is backed by a file named after the mapping inside a working
//! directory, so any process on the machine that knows the name can map the
//! same bytes. Capacity is fixed at creation.
//!
//! Disposal zeroes the whole region before unmapping, so the next process to
//! map the same name never sees a stale frame.

use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::RelayError;

/// Create the working directory that holds mapping backing files.
pub fn ensure_work_dir(path: &Path) -> Result<(), RelayError> {
    std::fs::create_dir_all(path).map_err(|source| RelayError::WorkDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Writable shared mapping owned by the producer.
pub struct SharedFrameMap {
    name: String,
    path: PathBuf,
    capacity: usize,
    /// `None` once disposed
    mmap: Option<MmapMut>,
}

/// A disjoint writable window into a [`SharedFrameMap`].
///
/// Regions from one `regions_mut` call never overlap, so they can be written
/// from different threads without locking.
pub struct MapRegion<'a> {
    offset: usize,
    bytes: &'a mut [u8],
}

impl MapRegion<'_> {
    /// Byte offset of this region inside the mapping.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy `data` to the start of the region.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RelayError> {
        let capacity = self.offset + self.bytes.len();
        let dst = self
            .bytes
            .get_mut(..data.len())
            .ok_or(RelayError::OutOfBounds {
                offset: self.offset,
                len: data.len(),
                capacity,
            })?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

impl SharedFrameMap {
    /// Create or open the mapping `name` inside `dir` with exactly `capacity` bytes.
    ///
    /// `dir` must already exist (see [`ensure_work_dir`]).
    pub fn create(dir: &Path, name: &str, capacity: usize) -> Result<Self, RelayError> {
        let path = dir.join(name);
        let alloc_err = |source| RelayError::MappingAllocation {
            name: name.to_string(),
            capacity,
            source,
        };

        if capacity == 0 {
            return Err(alloc_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "zero-sized mapping",
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(alloc_err)?;
        file.set_len(capacity as u64).map_err(alloc_err)?;

        // SAFETY: the file was just sized to `capacity`. Other processes may
        // map the same file; this process only writes through the mapping
        // and consumers treat the bytes as plain pixel data.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(alloc_err)?;

        tracing::debug!("Mapped {} ({} bytes)", path.display(), capacity);

        Ok(Self {
            name: name.to_string(),
            path,
            capacity,
            mmap: Some(mmap),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.mmap.is_some()
    }

    /// Bounded write of `data` at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RelayError> {
        let capacity = self.capacity;
        let Some(mmap) = self.mmap.as_mut() else {
            return Err(RelayError::MappingClosed {
                name: self.name.clone(),
            });
        };

        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= capacity)
            .ok_or(RelayError::OutOfBounds {
                offset,
                len: data.len(),
                capacity,
            })?;

        mmap[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Split the mapping into disjoint writable regions.
    ///
    /// `ranges` must be sorted, non-overlapping, and inside the mapping.
    pub fn regions_mut(&mut self, ranges: &[Range<usize>]) -> Result<Vec<MapRegion<'_>>, RelayError> {
        let capacity = self.capacity;
        let Some(mmap) = self.mmap.as_mut() else {
            return Err(RelayError::MappingClosed {
                name: self.name.clone(),
            });
        };

        let mut rest: &mut [u8] = &mut mmap[..];
        let mut consumed = 0;
        let mut regions = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().enumerate() {
            if range.start < consumed || range.end < range.start {
                return Err(RelayError::OverlappingRegion { index });
            }
            if range.end > capacity {
                return Err(RelayError::OutOfBounds {
                    offset: range.start,
                    len: range.end - range.start,
                    capacity,
                });
            }

            let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - consumed);
            let (bytes, tail) = tail.split_at_mut(range.end - range.start);
            rest = tail;
            consumed = range.end;

            regions.push(MapRegion {
                offset: range.start,
                bytes,
            });
        }

        Ok(regions)
    }

    /// Read-only view of the mapped bytes.
    pub fn as_slice(&self) -> Result<&[u8], RelayError> {
        self.mmap
            .as_deref()
            .ok_or_else(|| RelayError::MappingClosed {
                name: self.name.clone(),
            })
    }

    /// Zero the region, flush, and unmap. Safe to call more than once.
    pub fn dispose(&mut self) {
        let Some(mut mmap) = self.mmap.take() else {
            return;
        };

        mmap.fill(0);
        if let Err(e) = mmap.flush() {
            tracing::warn!("Failed to flush zeroed mapping {}: {}", self.name, e);
        }
        drop(mmap);

        tracing::debug!("Disposed mapping {}", self.name);
    }
}

impl Drop for SharedFrameMap {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Map an existing mapping read-only.
pub fn open_view(dir: &Path, name: &str) -> Result<FrameMapView, RelayError> {
    FrameMapView::open(dir, name)
}

/// Read-only view of an existing mapping, for consumers and tooling.
pub struct FrameMapView {
    name: String,
    mmap: Mmap,
}

impl FrameMapView {
    /// Map the existing mapping `name` inside `dir`.
    pub fn open(dir: &Path, name: &str) -> Result<Self, RelayError> {
        let file = File::open(dir.join(name))?;

        // SAFETY: the producer may write to the file while it is mapped;
        // callers only copy bytes out and tolerate torn frames.
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(Self {
            name: name.to_string(),
            mmap,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}
