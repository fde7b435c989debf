//! Parallel frame publishing
//!
//! The CPU pixel buffer is split into `chunk_count` contiguous chunks and each
//! chunk is copied into its own disjoint region of the shared mapping on a
//! dedicated rayon pool. `publish` joins every chunk before returning.

use std::ops::Range;
use std::time::{Duration, Instant};

use framerelay_shared::BYTES_PER_PIXEL;
use rayon::prelude::*;

use crate::channel::{MapRegion, SharedFrameMap};
use crate::config::{PublishConfig, RemainderPolicy};
use crate::error::RelayError;

/// Split `[0, pixel_count)` into `chunk_count` contiguous pixel ranges.
///
/// Every chunk has length `pixel_count / chunk_count`. With
/// [`RemainderPolicy::LastChunk`] the last chunk also takes the leftover
/// pixels; with [`RemainderPolicy::Truncate`] they are not covered.
pub fn partition(
    pixel_count: usize,
    chunk_count: usize,
    remainder: RemainderPolicy,
) -> Vec<Range<usize>> {
    if chunk_count == 0 {
        return Vec::new();
    }

    let chunk_len = pixel_count / chunk_count;
    (0..chunk_count)
        .map(|index| {
            let start = index * chunk_len;
            let end = if index + 1 == chunk_count && remainder == RemainderPolicy::LastChunk {
                pixel_count
            } else {
                start + chunk_len
            };
            start..end
        })
        .collect()
}

/// Result of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishStats {
    pub chunks: usize,
    pub pixels_written: usize,
    pub bytes_written: usize,
    pub elapsed: Duration,
}

/// Copies frames into a [`SharedFrameMap`] on a fixed worker pool.
pub struct ParallelPublisher {
    pool: rayon::ThreadPool,
    chunk_count: usize,
    remainder: RemainderPolicy,
    /// Chunk handed more bytes than its region holds
    #[cfg(test)]
    overrun_chunk: Option<usize>,
}

impl ParallelPublisher {
    /// Build a publisher with one worker thread per chunk.
    pub fn new(chunk_count: usize, remainder: RemainderPolicy) -> Result<Self, RelayError> {
        let chunk_count = chunk_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(chunk_count)
            .thread_name(|i| format!("framerelay-publish-{i}"))
            .build()?;

        Ok(Self {
            pool,
            chunk_count,
            remainder,
            #[cfg(test)]
            overrun_chunk: None,
        })
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self, RelayError> {
        Self::new(config.chunk_count, config.remainder)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn remainder(&self) -> RemainderPolicy {
        self.remainder
    }

    /// Make chunk `index` fail its region write on every publish.
    #[cfg(test)]
    pub(crate) fn set_overrun_chunk(&mut self, index: Option<usize>) {
        self.overrun_chunk = index;
    }

    #[cfg(test)]
    fn inject_overrun<'m, 's>(
        &self,
        mut jobs: Vec<(MapRegion<'m>, &'s [u8])>,
        src: &'s [u8],
    ) -> Vec<(MapRegion<'m>, &'s [u8])> {
        if let Some(index) = self.overrun_chunk {
            if let Some((region, chunk)) = jobs.get_mut(index) {
                *chunk = &src[region.offset()..];
            }
        }
        jobs
    }

    /// Write the first `pixel_count` pixels of `pixels` to the start of `map`.
    ///
    /// Chunk `i` lands at byte offset `i * chunk_len * 4`. The first failing
    /// chunk aborts the publish; chunks already written stay written.
    pub fn publish(
        &self,
        pixels: &[u32],
        pixel_count: usize,
        map: &mut SharedFrameMap,
    ) -> Result<PublishStats, RelayError> {
        let start = Instant::now();

        let src = pixels.get(..pixel_count).ok_or(RelayError::OutOfBounds {
            offset: 0,
            len: pixel_count,
            capacity: pixels.len(),
        })?;
        let src: &[u8] = bytemuck::cast_slice(src);

        let byte_ranges: Vec<Range<usize>> = partition(pixel_count, self.chunk_count, self.remainder)
            .into_iter()
            .map(|r| r.start * BYTES_PER_PIXEL..r.end * BYTES_PER_PIXEL)
            .collect();
        let bytes_written = byte_ranges.iter().map(|r| r.len()).sum::<usize>();

        let regions = map.regions_mut(&byte_ranges)?;
        let jobs: Vec<(MapRegion<'_>, &[u8])> = regions
            .into_iter()
            .zip(byte_ranges.iter().map(|r| &src[r.clone()]))
            .collect();
        #[cfg(test)]
        let jobs = self.inject_overrun(jobs, src);

        self.pool.install(|| {
            jobs.into_par_iter()
                .enumerate()
                .try_for_each(|(index, (mut region, chunk))| {
                    region.write(chunk).map_err(|e| RelayError::ChunkWrite {
                        index,
                        source: Box::new(e),
                    })
                })
        })?;

        let stats = PublishStats {
            chunks: self.chunk_count,
            pixels_written: bytes_written / BYTES_PER_PIXEL,
            bytes_written,
            elapsed: start.elapsed(),
        };
        tracing::trace!(
            "Published {} bytes in {} chunks ({:?})",
            stats.bytes_written,
            stats.chunks,
            stats.elapsed
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framerelay_shared::{Resolution, decode_bgrx, pack_bgrx, unpack_bgrx};

    // ========================================================================
    // Partition
    // ========================================================================

    fn assert_contiguous(ranges: &[Range<usize>]) {
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "chunks must be contiguous");
        }
    }

    #[test]
    fn test_partition_divisible() {
        let ranges = partition(64, 8, RemainderPolicy::LastChunk);
        assert_eq!(ranges.len(), 8);
        assert!(ranges.iter().all(|r| r.len() == 8));
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[7].end, 64);
        assert_contiguous(&ranges);

        assert_eq!(ranges, partition(64, 8, RemainderPolicy::Truncate));
    }

    #[test]
    fn test_partition_remainder_last_chunk() {
        let ranges = partition(70, 8, RemainderPolicy::LastChunk);
        assert_eq!(ranges.len(), 8);
        assert!(ranges[..7].iter().all(|r| r.len() == 8));
        assert_eq!(ranges[7], 56..70);
        assert_contiguous(&ranges);
    }

    #[test]
    fn test_partition_remainder_truncate() {
        let ranges = partition(70, 8, RemainderPolicy::Truncate);
        assert!(ranges.iter().all(|r| r.len() == 8));
        assert_eq!(ranges[7].end, 64);
        assert_contiguous(&ranges);
    }

    #[test]
    fn test_partition_fewer_pixels_than_chunks() {
        let ranges = partition(5, 8, RemainderPolicy::LastChunk);
        assert_eq!(ranges.len(), 8);
        assert!(ranges[..7].iter().all(|r| r.is_empty()));
        assert_eq!(ranges[7], 0..5);

        let truncated = partition(5, 8, RemainderPolicy::Truncate);
        assert!(truncated.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_partition_zero_chunks() {
        assert!(partition(100, 0, RemainderPolicy::LastChunk).is_empty());
    }

    #[test]
    fn test_partition_real_resolutions() {
        for res in [Resolution::new(1920, 1080), Resolution::new(1366, 767)] {
            let n = res.pixel_count();
            let ranges = partition(n, 8, RemainderPolicy::LastChunk);
            assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), n);

            let truncated = partition(n, 8, RemainderPolicy::Truncate);
            assert_eq!(
                truncated.iter().map(|r| r.len()).sum::<usize>(),
                8 * (n / 8)
            );
        }
    }

    // ========================================================================
    // Publish
    // ========================================================================

    fn gradient(n: usize) -> Vec<u32> {
        (0..n)
            .map(|i| pack_bgrx((i % 256) as u8, (i / 256 % 256) as u8, 7))
            .collect()
    }

    #[test]
    fn test_publish_writes_every_pixel() {
        let dir = tempfile::tempdir().unwrap();
        let res = Resolution::new(13, 7);
        let n = res.pixel_count();
        let mut map = SharedFrameMap::create(dir.path(), "pub", n * 4 * 2).unwrap();
        let pixels = gradient(n);

        let publisher = ParallelPublisher::new(8, RemainderPolicy::LastChunk).unwrap();
        let stats = publisher.publish(&pixels, n, &mut map).unwrap();

        assert_eq!(stats.chunks, 8);
        assert_eq!(stats.pixels_written, n);
        assert_eq!(stats.bytes_written, n * 4);

        let bytes = map.as_slice().unwrap();
        for (i, &p) in pixels.iter().enumerate() {
            assert_eq!(decode_bgrx(&bytes[i * 4..]), Some(unpack_bgrx(p)));
        }
        // Second slot untouched
        assert!(bytes[n * 4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_publish_truncate_leaves_tail() {
        let dir = tempfile::tempdir().unwrap();
        let n = 8 * 4 + 3;
        let mut map = SharedFrameMap::create(dir.path(), "trunc", n * 4).unwrap();
        let pixels = vec![pack_bgrx(9, 9, 9); n];

        let publisher = ParallelPublisher::new(8, RemainderPolicy::Truncate).unwrap();
        let stats = publisher.publish(&pixels, n, &mut map).unwrap();
        assert_eq!(stats.pixels_written, 32);

        let bytes = map.as_slice().unwrap();
        assert!(bytes[..32 * 4].chunks(4).all(|px| px == [9, 9, 9, 0xFF]));
        assert!(bytes[32 * 4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_publish_rejects_small_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = SharedFrameMap::create(dir.path(), "small", 16).unwrap();
        let pixels = vec![1u32; 64];

        let publisher = ParallelPublisher::new(4, RemainderPolicy::LastChunk).unwrap();
        let err = publisher.publish(&pixels, 64, &mut map).unwrap_err();
        assert!(matches!(err, RelayError::OutOfBounds { .. }));
    }

    #[test]
    fn test_publish_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = SharedFrameMap::create(dir.path(), "short", 64).unwrap();
        let publisher = ParallelPublisher::new(2, RemainderPolicy::LastChunk).unwrap();
        assert!(publisher.publish(&[1, 2], 4, &mut map).is_err());
    }

    #[test]
    fn test_publish_closed_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = SharedFrameMap::create(dir.path(), "closed", 64).unwrap();
        map.dispose();
        let publisher = ParallelPublisher::new(2, RemainderPolicy::LastChunk).unwrap();
        assert!(matches!(
            publisher.publish(&[1; 4], 4, &mut map),
            Err(RelayError::MappingClosed { .. })
        ));
    }

    #[test]
    fn test_publish_chunk_failure_reports_index() {
        let dir = tempfile::tempdir().unwrap();
        let n = 64;
        let mut map = SharedFrameMap::create(dir.path(), "overrun", n * 4 * 2).unwrap();
        let pixels = vec![pack_bgrx(5, 5, 5); n];

        let mut publisher = ParallelPublisher::new(8, RemainderPolicy::LastChunk).unwrap();
        publisher.set_overrun_chunk(Some(2));
        let err = publisher.publish(&pixels, n, &mut map).unwrap_err();

        let (index, source) = match err {
            RelayError::ChunkWrite { index, source } => (index, source),
            other => panic!("expected ChunkWrite, got {other:?}"),
        };
        assert_eq!(index, 2);
        assert!(matches!(
            *source,
            RelayError::OutOfBounds {
                offset: 64,
                len: 192,
                capacity: 96
            }
        ));

        publisher.set_overrun_chunk(None);
        let stats = publisher.publish(&pixels, n, &mut map).unwrap();
        assert_eq!(stats.pixels_written, n);
    }

    #[test]
    fn test_from_config() {
        let config = PublishConfig {
            chunk_count: 3,
            remainder: RemainderPolicy::Truncate,
            budget_ms: 8,
        };
        let publisher = ParallelPublisher::from_config(&config).unwrap();
        assert_eq!(publisher.chunk_count(), 3);
        assert_eq!(publisher.remainder(), RemainderPolicy::Truncate);
    }
}
