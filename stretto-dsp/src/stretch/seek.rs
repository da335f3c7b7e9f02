//! Best-overlap alignment search for the time stretcher.
//!
//! Both modes score candidate offsets by cross-correlating the input
//! against a center-weighted copy of the mid-buffer. Exhaustive mode tests
//! every offset in the seek window; quick mode runs four refinement passes
//! over a fixed sparse offset table, each pass narrowing around the best
//! offset found so far.

use super::TimeStretcher;
use crate::fifo::SampleFifo;

/// Quick-seek scan steps, coarse to fine. Calibrated values; rows are
/// zero-terminated and each pass re-centers on the best offset so far.
const SCAN_OFFSETS: [[i32; 24]; 4] = [
    [
        124, 186, 248, 310, 372, 434, 496, 558, 620, 682, 744, 806, 868, 930, 992, 1054, 1116,
        1178, 1240, 1302, 1364, 1426, 1488, 0,
    ],
    [
        -100, -75, -50, -25, 25, 50, 75, 100, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    [
        -20, -15, -10, -5, 5, 10, 15, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    [
        -4, -3, -2, -1, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
];

impl TimeStretcher {
    /// Find the candidate offset whose overlap correlates best with the
    /// retained mid-buffer. Offset 0 wins ties and the all-silent case.
    pub(crate) fn seek_best_overlap(&mut self, input: &SampleFifo) -> usize {
        self.precalculate_reference();
        let samples = input.samples();
        if self.quick_seek {
            self.seek_quick(samples)
        } else {
            self.seek_exhaustive(samples)
        }
    }

    pub(crate) fn seek_exhaustive(&self, samples: &[f32]) -> usize {
        let mut best_offset = 0;
        let mut best_correlation = f64::MIN;
        for offset in 0..self.seek_length() {
            let correlation = self.cross_correlation(samples, 2 * offset);
            if correlation > best_correlation {
                best_correlation = correlation;
                best_offset = offset;
            }
        }
        best_offset
    }

    pub(crate) fn seek_quick(&self, samples: &[f32]) -> usize {
        let mut best_offset = 0usize;
        let mut best_correlation = f64::MIN;
        let mut center = 0i32;
        for pass in &SCAN_OFFSETS {
            for &step in pass {
                if step == 0 {
                    break; // row terminator
                }
                let candidate = center + step;
                if candidate >= self.seek_length() as i32 {
                    break;
                }
                if candidate < 0 {
                    continue;
                }
                let correlation = self.cross_correlation(samples, 2 * candidate as usize);
                if correlation > best_correlation {
                    best_correlation = correlation;
                    best_offset = candidate as usize;
                }
            }
            center = best_offset as i32;
        }
        best_offset
    }

    /// Weight the mid-buffer toward its center: `i * (overlap - i)` peaks
    /// mid-overlap, so alignment favors the perceptually dominant region
    fn precalculate_reference(&mut self) {
        let overlap = self.overlap_length();
        for i in 0..overlap {
            let weight = (i * (overlap - i)) as f32;
            let s = 2 * i;
            self.ref_mid[s] = self.mid_buffer[s] * weight;
            self.ref_mid[s + 1] = self.mid_buffer[s + 1] * weight;
        }
    }

    /// Correlate the input at sample offset `pos` against the weighted
    /// reference. The first frame carries zero weight and is skipped.
    fn cross_correlation(&self, samples: &[f32], pos: usize) -> f64 {
        let mut correlation = 0.0f64;
        let len = 2 * self.overlap_length();
        let mut i = 2;
        while i < len {
            let m = pos + i;
            correlation += (samples[m] * self.ref_mid[i]) as f64
                + (samples[m + 1] * self.ref_mid[i + 1]) as f64;
            i += 2;
        }
        correlation
    }
}
