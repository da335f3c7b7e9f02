//! Pull-source contract and the in-memory implementation

use std::sync::Arc;
use thiserror::Error;

/// Errors a source can raise while serving frames
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Synchronous supplier of decoded interleaved stereo frames.
///
/// `extract` must be side-effect-free: the read position is always passed
/// explicitly, so repeated reads of the same range return the same frames.
pub trait SampleSource {
    /// Copy up to `num_frames` frames starting at `position` into `target`
    /// (interleaved, `2 * num_frames` floats), returning the number of
    /// frames actually read. Fewer than requested means the end is near.
    fn extract(
        &mut self,
        target: &mut [f32],
        num_frames: usize,
        position: usize,
    ) -> Result<usize, SourceError>;

    fn sample_rate(&self) -> u32;

    fn duration_frames(&self) -> usize;
}

/// Source over a fully decoded track held in memory.
///
/// Interleaved stereo is served as-is; mono input is duplicated into both
/// channels. `Arc` keeps handing a track to the pipeline cheap.
pub struct MemorySource {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl MemorySource {
    pub fn new(samples: Arc<Vec<f32>>, channels: u16, sample_rate: u32) -> Self {
        debug_assert!(channels == 1 || channels == 2);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }
}

impl SampleSource for MemorySource {
    fn extract(
        &mut self,
        target: &mut [f32],
        num_frames: usize,
        position: usize,
    ) -> Result<usize, SourceError> {
        let total = self.duration_frames();
        let available = total.saturating_sub(position);
        let n = num_frames.min(available);

        match self.channels {
            1 => {
                for i in 0..n {
                    let v = self.samples[position + i];
                    target[2 * i] = v;
                    target[2 * i + 1] = v;
                }
            }
            _ => {
                let start = position * 2;
                target[..n * 2].copy_from_slice(&self.samples[start..start + n * 2]);
            }
        }
        Ok(n)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}
