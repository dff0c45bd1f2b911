//! Audio chunking for long audio files
//!
//! Splits a buffer into fixed-duration, non-overlapping windows so the
//! separation model never sees more than one window at a time. Chunks are
//! plain sample ranges; the caller slices its own buffer with them.

use tracing::info;

/// Default chunk duration in seconds
pub const DEFAULT_CHUNK_SECONDS: f32 = 10.0;

/// Configuration for fixed-duration chunking
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Chunk duration in seconds
    pub chunk_seconds: f32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: DEFAULT_CHUNK_SECONDS,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_seconds: f32) -> Self {
        Self { chunk_seconds }
    }

    /// Chunk size in samples for the given rate (never zero)
    pub fn chunk_samples(&self, sample_rate: u32) -> usize {
        let samples = (self.chunk_seconds as f64 * sample_rate as f64).round();
        if samples.is_finite() && samples >= 1.0 {
            samples as usize
        } else {
            1
        }
    }

    /// Build the chunk plan for a buffer of `total_samples` at `sample_rate`
    pub fn plan(&self, total_samples: usize, sample_rate: u32) -> ChunkPlan {
        let plan = ChunkPlan::new(total_samples, self.chunk_samples(sample_rate));
        info!(
            "Split {:.2}s audio into {} chunks (chunk={:.1}s)",
            total_samples as f64 / sample_rate.max(1) as f64,
            plan.len(),
            self.chunk_seconds
        );
        plan
    }
}

/// A contiguous range of samples in the original buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk index (0-based)
    pub index: usize,
    /// First sample (inclusive)
    pub start: usize,
    /// Last sample (exclusive)
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Borrow this chunk's samples out of the full buffer
    pub fn slice<'a>(&self, samples: &'a [f32]) -> &'a [f32] {
        &samples[self.start..self.end]
    }

    /// Start time in milliseconds
    pub fn start_ms(&self, sample_rate: u32) -> i64 {
        (self.start as f64 / sample_rate as f64 * 1000.0) as i64
    }

    /// End time in milliseconds
    pub fn end_ms(&self, sample_rate: u32) -> i64 {
        (self.end as f64 / sample_rate as f64 * 1000.0) as i64
    }
}

/// Partition of `total_samples` into windows of `chunk_samples`
///
/// The plan is `Copy`; calling [`ChunkPlan::iter`] again restarts from the
/// first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_samples: usize,
    chunk_samples: usize,
}

impl ChunkPlan {
    pub fn new(total_samples: usize, chunk_samples: usize) -> Self {
        Self {
            total_samples,
            chunk_samples: chunk_samples.max(1),
        }
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Number of chunks, counting a shorter trailing remainder
    pub fn len(&self) -> usize {
        self.total_samples.div_ceil(self.chunk_samples)
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    pub fn iter(&self) -> Chunks {
        Chunks {
            plan: *self,
            next_start: 0,
            index: 0,
        }
    }
}

impl IntoIterator for ChunkPlan {
    type Item = Chunk;
    type IntoIter = Chunks;

    fn into_iter(self) -> Chunks {
        self.iter()
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = Chunk;
    type IntoIter = Chunks;

    fn into_iter(self) -> Chunks {
        self.iter()
    }
}

/// Lazy iterator over the chunks of a [`ChunkPlan`]
#[derive(Debug, Clone)]
pub struct Chunks {
    plan: ChunkPlan,
    next_start: usize,
    index: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_start >= self.plan.total_samples {
            return None;
        }

        let start = self.next_start;
        let end = (start + self.plan.chunk_samples).min(self.plan.total_samples);
        let chunk = Chunk {
            index: self.index,
            start,
            end,
        };

        self.next_start = end;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}
