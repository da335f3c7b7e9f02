//! Rate transposer - arbitrary-ratio resampling via linear interpolation

use crate::fifo::SampleFifo;

/// Resamples interleaved stereo audio by an arbitrary rate ratio.
///
/// The transposer walks the input with a fractional cursor (`slope`) that
/// advances by `rate` per output frame; whole steps are consumed from the
/// input. The last input frame of every call is carried over so that the
/// first output frame of the next call interpolates against it, keeping the
/// stream seamless across call boundaries.
///
/// The stage holds only this carry state; the buffers it reads and writes
/// are owned by the engine and passed into [`process`](Self::process).
#[derive(Debug)]
pub struct RateTransposer {
    rate: f64,
    slope: f64,
    prev_left: f32,
    prev_right: f32,
}

impl Default for RateTransposer {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTransposer {
    pub fn new() -> Self {
        Self {
            rate: 1.0,
            slope: 0.0,
            prev_left: 0.0,
            prev_right: 0.0,
        }
    }

    /// Set the rate ratio (>1 speeds up and raises pitch)
    pub fn set_rate(&mut self, rate: f64) {
        debug_assert!(rate > 0.0);
        self.rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Reset the fractional cursor and carry samples
    pub fn clear(&mut self) {
        self.slope = 0.0;
        self.prev_left = 0.0;
        self.prev_right = 0.0;
    }

    /// Consume all buffered input, appending `input/rate` (±1) resampled
    /// frames to `output`
    pub fn process(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        let num_frames = input.frame_count();
        // Worst case one extra slope pass at the call boundary
        let max_out = ((num_frames as f64 + 1.0) / self.rate) as usize + 2;
        let produced = {
            let dest = output.tail_mut(max_out);
            self.transpose(input.samples(), num_frames, dest)
        };
        input.receive_all();
        output.put(produced);
    }

    /// Interpolate `num_frames` input frames into `dest`, returning the
    /// number of output frames written
    fn transpose(&mut self, src: &[f32], num_frames: usize, dest: &mut [f32]) -> usize {
        if num_frames == 0 {
            return 0;
        }
        let mut produced = 0;

        // Frames that fall between the previous call's last input frame
        // and the first frame of this one.
        while self.slope < 1.0 {
            let t = self.slope as f32;
            dest[2 * produced] = (1.0 - t) * self.prev_left + t * src[0];
            dest[2 * produced + 1] = (1.0 - t) * self.prev_right + t * src[1];
            produced += 1;
            self.slope += self.rate;
        }
        self.slope -= 1.0;

        if num_frames != 1 {
            let mut used = 0;
            'bulk: loop {
                while self.slope > 1.0 {
                    self.slope -= 1.0;
                    used += 1;
                    if used >= num_frames - 1 {
                        break 'bulk;
                    }
                }
                let s = 2 * used;
                let t = self.slope as f32;
                dest[2 * produced] = (1.0 - t) * src[s] + t * src[s + 2];
                dest[2 * produced + 1] = (1.0 - t) * src[s + 1] + t * src[s + 3];
                produced += 1;
                self.slope += self.rate;
            }
        }

        self.prev_left = src[2 * num_frames - 2];
        self.prev_right = src[2 * num_frames - 1];
        produced
    }
}
