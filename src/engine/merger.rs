//! Track reassembly for chunked separation
//!
//! Concatenates per-chunk stems back into two continuous tracks. Chunks must
//! arrive in plan order; anything else would scramble the song.

use crate::audio::Chunk;
use crate::error::{AppError, Result};
use tracing::{debug, info, warn};

/// Accumulates vocal and accompaniment chunks in order
#[derive(Debug, Default)]
pub struct StemAssembler {
    vocals: Vec<f32>,
    accompaniment: Vec<f32>,
    next_index: usize,
}

impl StemAssembler {
    /// Pre-allocate for a track of roughly `total_samples`
    pub fn with_capacity(total_samples: usize) -> Self {
        Self {
            vocals: Vec::with_capacity(total_samples),
            accompaniment: Vec::with_capacity(total_samples),
            next_index: 0,
        }
    }

    /// Append one chunk's stems
    pub fn push(&mut self, chunk: &Chunk, vocals: &[f32], accompaniment: &[f32]) -> Result<()> {
        if chunk.index != self.next_index {
            return Err(AppError::InvalidState(format!(
                "Chunk {} arrived out of order, expected chunk {}",
                chunk.index, self.next_index
            )));
        }

        if vocals.len() != chunk.len() || accompaniment.len() != chunk.len() {
            debug!(
                "Chunk {}: stem lengths differ from input (input={}, vocals={}, accompaniment={})",
                chunk.index,
                chunk.len(),
                vocals.len(),
                accompaniment.len()
            );
        }

        self.vocals.extend_from_slice(vocals);
        self.accompaniment.extend_from_slice(accompaniment);
        self.next_index += 1;
        Ok(())
    }

    /// Number of chunks appended so far
    pub fn chunks_pushed(&self) -> usize {
        self.next_index
    }

    /// Finish both tracks, truncated to the shorter of the two
    pub fn finish(mut self) -> (Vec<f32>, Vec<f32>) {
        let min_len = self.vocals.len().min(self.accompaniment.len());

        if self.vocals.len() != self.accompaniment.len() {
            warn!(
                "Track lengths drifted (vocals={}, accompaniment={}), truncating to {}",
                self.vocals.len(),
                self.accompaniment.len(),
                min_len
            );
        }

        self.vocals.truncate(min_len);
        self.accompaniment.truncate(min_len);

        info!(
            "Reassembled {} chunks into {} samples per track",
            self.next_index, min_len
        );

        (self.vocals, self.accompaniment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ChunkPlan;

    #[test]
    fn test_concatenates_in_chunk_order() {
        let plan = ChunkPlan::new(5, 2);
        let mut assembler = StemAssembler::with_capacity(5);

        for chunk in plan.iter() {
            let vocals: Vec<f32> = (chunk.start..chunk.end).map(|i| i as f32).collect();
            let accompaniment: Vec<f32> = vocals.iter().map(|v| -v).collect();
            assembler.push(&chunk, &vocals, &accompaniment).unwrap();
        }

        assert_eq!(assembler.chunks_pushed(), 3);
        let (vocals, accompaniment) = assembler.finish();
        assert_eq!(vocals, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(accompaniment, vec![0.0, -1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_rejects_out_of_order_chunks() {
        let chunks: Vec<Chunk> = ChunkPlan::new(4, 2).iter().collect();
        let mut assembler = StemAssembler::default();

        let err = assembler.push(&chunks[1], &[0.0, 0.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_truncates_to_shorter_track() {
        let chunk = ChunkPlan::new(4, 4).iter().next().unwrap();
        let mut assembler = StemAssembler::default();
        assembler.push(&chunk, &[0.1, 0.2, 0.3, 0.4], &[0.5, 0.6, 0.7]).unwrap();

        let (vocals, accompaniment) = assembler.finish();
        assert_eq!(vocals, vec![0.1, 0.2, 0.3]);
        assert_eq!(accompaniment, vec![0.5, 0.6, 0.7]);
    }
}
