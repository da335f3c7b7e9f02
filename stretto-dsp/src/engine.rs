//! Engine - combines the rate transposer and time stretcher behind
//! independent pitch, rate, and tempo knobs

use crate::fifo::SampleFifo;
use crate::stretch::TimeStretcher;
use crate::transposer::RateTransposer;
use tracing::debug;

/// Threshold below which a knob change is considered no change at all
const PARAM_EPSILON: f64 = 1e-10;

/// Order the two transform stages run in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOrder {
    /// Resample first (effective rate <= 1)
    TransposeThenStretch,
    /// Stretch first, shrinking the data the resampler must handle
    /// (effective rate > 1)
    StretchThenTranspose,
}

/// Pitch/tempo/rate processing pipeline over interleaved stereo floats.
///
/// The three knobs are independent; the engine derives the effective
/// resampling rate (`rate * pitch`) and stretching tempo (`tempo / pitch`)
/// and pushes them into the stages only when they actually change. The
/// engine owns all three FIFOs and hands them to the stages in the current
/// topology order, so no two stages ever share a buffer.
#[derive(Debug)]
pub struct Engine {
    transposer: RateTransposer,
    stretcher: TimeStretcher,

    input: SampleFifo,
    intermediate: SampleFifo,
    output: SampleFifo,

    virtual_pitch: f64,
    virtual_rate: f64,
    virtual_tempo: f64,
    /// Effective resampling rate (`virtual_rate * virtual_pitch`)
    rate: f64,
    /// Effective stretching tempo (`virtual_tempo / virtual_pitch`)
    tempo: f64,
    order: StageOrder,
}

impl Engine {
    pub fn new(sample_rate: u32) -> Self {
        let mut engine = Self {
            transposer: RateTransposer::new(),
            stretcher: TimeStretcher::new(sample_rate),
            input: SampleFifo::new(),
            intermediate: SampleFifo::new(),
            output: SampleFifo::new(),
            virtual_pitch: 1.0,
            virtual_rate: 1.0,
            virtual_tempo: 1.0,
            rate: 0.0,
            tempo: 0.0,
            order: StageOrder::TransposeThenStretch,
        };
        engine.update_effective_rate_and_tempo();
        engine
    }

    /// Set playback rate (changes both speed and pitch, like vinyl)
    pub fn set_rate(&mut self, rate: f64) {
        self.virtual_rate = rate.max(PARAM_EPSILON);
        self.update_effective_rate_and_tempo();
    }

    /// Set rate as a percent change, e.g. +10.0 for 10% faster
    pub fn set_rate_change(&mut self, percent: f64) {
        self.set_rate(1.0 + 0.01 * percent);
    }

    /// Set tempo (changes speed, preserves pitch)
    pub fn set_tempo(&mut self, tempo: f64) {
        self.virtual_tempo = tempo.max(PARAM_EPSILON);
        self.update_effective_rate_and_tempo();
    }

    /// Set tempo as a percent change
    pub fn set_tempo_change(&mut self, percent: f64) {
        self.set_tempo(1.0 + 0.01 * percent);
    }

    /// Set pitch (changes pitch, preserves speed)
    pub fn set_pitch(&mut self, pitch: f64) {
        self.virtual_pitch = pitch.max(PARAM_EPSILON);
        self.update_effective_rate_and_tempo();
    }

    /// Set pitch in octaves relative to the original
    pub fn set_pitch_octaves(&mut self, octaves: f64) {
        self.set_pitch((std::f64::consts::LN_2 * octaves).exp());
    }

    /// Set pitch in semitones relative to the original
    pub fn set_pitch_semitones(&mut self, semitones: f64) {
        self.set_pitch_octaves(semitones / 12.0);
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn order(&self) -> StageOrder {
        self.order
    }

    /// Reconfigure the stretcher; `None` lengths re-enable auto derivation
    pub fn configure_stretch(
        &mut self,
        sample_rate: u32,
        sequence_ms: Option<u32>,
        seek_window_ms: Option<u32>,
        overlap_ms: u32,
    ) {
        self.stretcher
            .set_parameters(sample_rate, sequence_ms, seek_window_ms, overlap_ms);
        self.stretcher.set_tempo(self.tempo);
    }

    /// Toggle the sparse correlation search (on by default)
    pub fn set_quick_seek(&mut self, enable: bool) {
        self.stretcher.set_quick_seek(enable);
    }

    /// Buffer for frames waiting to be processed
    pub fn input_mut(&mut self) -> &mut SampleFifo {
        &mut self.input
    }

    pub fn input_frame_count(&self) -> usize {
        self.input.frame_count()
    }

    /// Buffer of processed frames ready for extraction
    pub fn output(&self) -> &SampleFifo {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut SampleFifo {
        &mut self.output
    }

    /// Run both stages once over whatever input is buffered
    pub fn process(&mut self) {
        match self.order {
            StageOrder::TransposeThenStretch => {
                self.transposer
                    .process(&mut self.input, &mut self.intermediate);
                self.stretcher
                    .process(&mut self.intermediate, &mut self.output);
            }
            StageOrder::StretchThenTranspose => {
                self.stretcher
                    .process(&mut self.input, &mut self.intermediate);
                self.transposer
                    .process(&mut self.intermediate, &mut self.output);
            }
        }
    }

    /// Drop all buffered audio and carried stage state
    pub fn clear(&mut self) {
        self.transposer.clear();
        self.stretcher.clear();
        self.input.clear();
        self.intermediate.clear();
        self.output.clear();
    }

    fn update_effective_rate_and_tempo(&mut self) {
        let previous_rate = self.rate;
        let previous_tempo = self.tempo;
        self.tempo = self.virtual_tempo / self.virtual_pitch;
        self.rate = self.virtual_rate * self.virtual_pitch;

        if (self.tempo - previous_tempo).abs() > PARAM_EPSILON {
            self.stretcher.set_tempo(self.tempo);
        }
        if (self.rate - previous_rate).abs() > PARAM_EPSILON {
            self.transposer.set_rate(self.rate);
        }

        let order = if self.rate > 1.0 {
            StageOrder::StretchThenTranspose
        } else {
            StageOrder::TransposeThenStretch
        };
        // Leave in-flight buffer contents alone unless the order really flips
        if order != self.order {
            debug!(rate = self.rate, tempo = self.tempo, ?order, "stage order changed");
            self.order = order;
        }
    }
}
