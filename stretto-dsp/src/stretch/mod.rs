//! Time stretcher - tempo change with pitch preserved.
//!
//! Classic segment-based overlap-add: carve the input into overlapping
//! sequences, search a small window of candidate offsets for the alignment
//! that best correlates with the tail of the previous segment, crossfade
//! across the overlap, and advance the input by a tempo-scaled skip. The
//! correlation search lives in `seek.rs`.

mod seek;

use crate::fifo::SampleFifo;

/// Default crossfade length in milliseconds
const DEFAULT_OVERLAP_MS: u32 = 8;

/// Tempo range over which sequence/seek-window lengths are auto-derived;
/// outside it the derived values clamp to the calibrated endpoints.
const AUTOSEQ_TEMPO_LOW: f64 = 0.25;
const AUTOSEQ_TEMPO_TOP: f64 = 4.0;

/// Auto sequence length endpoints in ms (slow tempo -> long sequence)
const AUTOSEQ_AT_MIN: f64 = 125.0;
const AUTOSEQ_AT_MAX: f64 = 50.0;

/// Auto seek window endpoints in ms
const AUTOSEEK_AT_MIN: f64 = 25.0;
const AUTOSEEK_AT_MAX: f64 = 15.0;

/// Clamped linear map from tempo to milliseconds between calibrated endpoints
fn auto_param_ms(tempo: f64, at_min: f64, at_max: f64) -> u32 {
    let k = (at_max - at_min) / (AUTOSEQ_TEMPO_TOP - AUTOSEQ_TEMPO_LOW);
    let c = at_min - k * AUTOSEQ_TEMPO_LOW;
    (c + k * tempo).clamp(at_max, at_min).round() as u32
}

/// Changes perceived duration by `1/tempo` while preserving pitch.
///
/// Owns only per-stage state (mid-buffer, weighted correlation reference,
/// derived lengths); the input and output FIFOs belong to the engine and are
/// passed into [`process`](Self::process).
#[derive(Debug)]
pub struct TimeStretcher {
    sample_rate: u32,
    tempo: f64,
    quick_seek: bool,

    sequence_ms: u32,
    seek_window_ms: u32,
    overlap_ms: u32,
    auto_sequence: bool,
    auto_seek_window: bool,

    /// Crossfade length in frames, multiple of 8, at least 16
    overlap_length: usize,
    /// Segment length in frames
    seek_window_length: usize,
    /// Number of candidate alignment offsets
    seek_length: usize,
    /// Minimum buffered input frames per iteration
    sample_req: usize,

    /// Ideal (fractional) input advance per iteration
    nominal_skip: f64,
    /// Running remainder so the average skip converges to nominal
    skip_fract: f64,

    /// Tail of the previous segment, crossfaded with the next one
    mid_buffer: Vec<f32>,
    /// Mid-buffer weighted toward its center, precomputed per search
    ref_mid: Vec<f32>,
    /// False until the mid-buffer is seeded from the first input frames
    mid_seeded: bool,
}

impl TimeStretcher {
    pub fn new(sample_rate: u32) -> Self {
        let mut stretcher = Self {
            sample_rate,
            tempo: 1.0,
            quick_seek: true,
            sequence_ms: 0,
            seek_window_ms: 0,
            overlap_ms: DEFAULT_OVERLAP_MS,
            auto_sequence: true,
            auto_seek_window: true,
            overlap_length: 0,
            seek_window_length: 0,
            seek_length: 0,
            sample_req: 0,
            nominal_skip: 0.0,
            skip_fract: 0.0,
            mid_buffer: Vec::new(),
            ref_mid: Vec::new(),
            mid_seeded: false,
        };
        stretcher.set_parameters(sample_rate, None, None, DEFAULT_OVERLAP_MS);
        stretcher
    }

    /// Configure sample rate, sequence/seek-window lengths, and overlap.
    ///
    /// `None` for `sequence_ms` or `seek_window_ms` re-enables auto
    /// derivation from tempo for that parameter, independently of the other.
    pub fn set_parameters(
        &mut self,
        sample_rate: u32,
        sequence_ms: Option<u32>,
        seek_window_ms: Option<u32>,
        overlap_ms: u32,
    ) {
        if sample_rate > 0 {
            self.sample_rate = sample_rate;
        }
        if overlap_ms > 0 {
            self.overlap_ms = overlap_ms;
        }
        match sequence_ms {
            Some(ms) if ms > 0 => {
                self.sequence_ms = ms;
                self.auto_sequence = false;
            }
            _ => self.auto_sequence = true,
        }
        match seek_window_ms {
            Some(ms) if ms > 0 => {
                self.seek_window_ms = ms;
                self.auto_seek_window = false;
            }
            _ => self.auto_seek_window = true,
        }
        self.calculate_sequence_parameters();
        self.calculate_overlap_length();
        // Re-derive the skip lengths for the current tempo
        self.set_tempo(self.tempo);
    }

    /// Set the tempo ratio and recompute the derived iteration parameters
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.calculate_sequence_parameters();
        self.nominal_skip = self.tempo * (self.seek_window_length - self.overlap_length) as f64;
        self.skip_fract = 0.0;
        let int_skip = (self.nominal_skip + 0.5).floor() as usize;
        self.sample_req =
            (int_skip + self.overlap_length).max(self.seek_window_length) + self.seek_length;
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Choose between the sparse multi-pass search (default) and testing
    /// every candidate offset
    pub fn set_quick_seek(&mut self, enable: bool) {
        self.quick_seek = enable;
    }

    pub fn sequence_ms(&self) -> u32 {
        self.sequence_ms
    }

    pub fn seek_window_ms(&self) -> u32 {
        self.seek_window_ms
    }

    pub(crate) fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    pub(crate) fn seek_length(&self) -> usize {
        self.seek_length
    }

    /// Input frames needed before an iteration can run
    pub fn input_chunk_size(&self) -> usize {
        self.sample_req
    }

    /// Drop carried segment state; the next call re-seeds the mid-buffer
    pub fn clear(&mut self) {
        self.mid_buffer.fill(0.0);
        self.mid_seeded = false;
        self.skip_fract = 0.0;
    }

    fn calculate_sequence_parameters(&mut self) {
        if self.auto_sequence {
            self.sequence_ms = auto_param_ms(self.tempo, AUTOSEQ_AT_MIN, AUTOSEQ_AT_MAX);
        }
        if self.auto_seek_window {
            self.seek_window_ms = auto_param_ms(self.tempo, AUTOSEEK_AT_MIN, AUTOSEEK_AT_MAX);
        }
        self.seek_window_length = self.sample_rate as usize * self.sequence_ms as usize / 1000;
        // A sequence must at least cover its two crossfade ends
        self.seek_window_length = self.seek_window_length.max(2 * self.overlap_length);
        self.seek_length = self.sample_rate as usize * self.seek_window_ms as usize / 1000;
    }

    fn calculate_overlap_length(&mut self) {
        let mut overlap = (self.sample_rate as f64 * self.overlap_ms as f64 / 1000.0) as usize;
        if overlap < 16 {
            overlap = 16;
        }
        overlap -= overlap % 8;
        self.overlap_length = overlap;
        self.mid_buffer = vec![0.0; overlap * 2];
        self.ref_mid = vec![0.0; overlap * 2];
        self.mid_seeded = false;
    }

    /// Run as many stretch iterations as the buffered input allows,
    /// appending the stretched frames to `output`
    pub fn process(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        if !self.mid_seeded {
            if input.frame_count() < self.overlap_length {
                return;
            }
            // First segment: seed the crossfade tail directly, no search
            input.receive_samples(&mut self.mid_buffer, self.overlap_length);
            self.mid_seeded = true;
        }

        while input.frame_count() >= self.sample_req {
            let offset = self.seek_best_overlap(input);

            // Crossfade the previous tail against the chosen alignment
            {
                let dest = output.tail_mut(self.overlap_length);
                Self::overlap_stereo(
                    &self.mid_buffer,
                    self.overlap_length,
                    input.samples(),
                    2 * offset,
                    dest,
                );
            }
            output.put(self.overlap_length);

            // Middle of the segment passes through untouched
            let middle = self.seek_window_length as isize - 2 * self.overlap_length as isize;
            if middle > 0 {
                output.put_from(input, offset + self.overlap_length, middle as usize);
            }

            // Segment tail becomes the next crossfade reference
            input.extract(
                &mut self.mid_buffer,
                offset + self.seek_window_length - self.overlap_length,
                self.overlap_length,
            );

            // Fractional skip accumulator keeps the average advance nominal
            self.skip_fract += self.nominal_skip;
            let skip = self.skip_fract.floor() as usize;
            self.skip_fract -= skip as f64;
            input.receive(skip);
        }
    }

    /// Linear-ramp crossfade of the mid-buffer tail with the input segment
    /// at `input_pos` (sample offset), writing `overlap_length` frames
    fn overlap_stereo(
        mid_buffer: &[f32],
        overlap_length: usize,
        input: &[f32],
        input_pos: usize,
        dest: &mut [f32],
    ) {
        let scale = 1.0 / overlap_length as f32;
        for i in 0..overlap_length {
            let fade_in = i as f32 * scale;
            let fade_out = (overlap_length - i) as f32 * scale;
            let s = 2 * i;
            dest[s] = input[input_pos + s] * fade_in + mid_buffer[s] * fade_out;
            dest[s + 1] = input[input_pos + s + 1] * fade_in + mid_buffer[s + 1] * fade_out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    fn tone(frames: usize, freq: f64) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let v = (2.0 * std::f64::consts::PI * freq * i as f64 / RATE as f64).sin() as f32;
                [v, v]
            })
            .collect()
    }

    fn stretch_all(tempo: f64, samples: &[f32]) -> Vec<f32> {
        let mut stretcher = TimeStretcher::new(RATE);
        stretcher.set_tempo(tempo);
        let mut input = SampleFifo::new();
        let mut output = SampleFifo::new();

        let mut out = Vec::new();
        for chunk in samples.chunks(4096 * 2) {
            input.put_samples(chunk);
            stretcher.process(&mut input, &mut output);
            let n = output.frame_count();
            let mut buf = vec![0.0; n * 2];
            output.receive_samples(&mut buf, n);
            out.extend_from_slice(&buf);
        }
        out
    }

    #[test]
    fn test_overlap_length_multiple_of_8_with_floor() {
        let stretcher = TimeStretcher::new(RATE);
        // 44100 * 8ms = 352.8 -> 352
        assert_eq!(stretcher.overlap_length(), 352);
        assert_eq!(stretcher.overlap_length() % 8, 0);

        let mut tiny = TimeStretcher::new(1000);
        tiny.set_parameters(1000, None, None, 1);
        // 1 frame raw, floored to the 16-frame minimum
        assert_eq!(tiny.overlap_length(), 16);
    }

    #[test]
    fn test_auto_parameters_clamp_outside_tempo_range() {
        let mut stretcher = TimeStretcher::new(RATE);

        stretcher.set_tempo(0.1); // below the calibrated range
        assert_eq!(stretcher.sequence_ms(), 125);
        assert_eq!(stretcher.seek_window_ms(), 25);

        stretcher.set_tempo(10.0); // above it
        assert_eq!(stretcher.sequence_ms(), 50);
        assert_eq!(stretcher.seek_window_ms(), 15);

        stretcher.set_tempo(1.0);
        assert!(stretcher.sequence_ms() > 50 && stretcher.sequence_ms() < 125);
    }

    #[test]
    fn test_explicit_parameters_disable_auto_derivation() {
        let mut stretcher = TimeStretcher::new(RATE);
        stretcher.set_parameters(RATE, Some(80), None, 8);

        stretcher.set_tempo(0.25);
        assert_eq!(stretcher.sequence_ms(), 80); // pinned
        assert_eq!(stretcher.seek_window_ms(), 25); // still auto
    }

    #[test]
    fn test_duration_converges_to_inverse_tempo() {
        for &tempo in &[0.5, 1.5, 2.0] {
            let input_frames = RATE as usize * 2; // 2 seconds
            let out = stretch_all(tempo, &tone(input_frames, 440.0));
            let out_frames = out.len() / 2;
            let expected = input_frames as f64 / tempo;
            let mut stretcher = TimeStretcher::new(RATE);
            stretcher.set_tempo(tempo);
            // One sequence length of slack, plus the input the stretcher
            // legitimately retains unprocessed at the end of the run
            let tolerance = (RATE as usize * stretcher.sequence_ms() as usize / 1000) as f64
                + stretcher.input_chunk_size() as f64 / tempo;
            assert!(
                (out_frames as f64 - expected).abs() <= tolerance,
                "tempo {tempo}: got {out_frames} frames, expected ~{expected}"
            );
        }
    }

    #[test]
    fn test_tone_frequency_preserved_across_tempo_change() {
        let freq = 440.0;
        let out = stretch_all(1.5, &tone(RATE as usize * 2, freq));

        // Count left-channel rising zero crossings to estimate frequency
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        // Skip the transient head
        let body = &left[4410..left.len() - 4410];
        let mut crossings = 0;
        for pair in body.windows(2) {
            if pair[0] <= 0.0 && pair[1] > 0.0 {
                crossings += 1;
            }
        }
        let seconds = body.len() as f64 / RATE as f64;
        let estimated = crossings as f64 / seconds;
        assert!(
            (estimated - freq).abs() < freq * 0.03,
            "estimated {estimated} Hz, expected ~{freq} Hz"
        );
    }

    #[test]
    fn test_constant_signal_passes_through() {
        let level = 0.25;
        let samples: Vec<f32> = std::iter::repeat([level, level])
            .take(RATE as usize)
            .flatten()
            .collect();
        let out = stretch_all(1.0, &samples);
        assert!(!out.is_empty());
        // Crossfade of a constant with itself is the constant
        for (i, &v) in out.iter().enumerate() {
            assert!(
                (v - level).abs() < 1e-4,
                "sample {i} deviated: {v} vs {level}"
            );
        }
    }
}
