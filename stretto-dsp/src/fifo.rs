//! Interleaved stereo sample FIFO shared by all pipeline stages

/// Number of interleaved channels per frame
pub const CHANNELS: usize = 2;

/// Growable FIFO of interleaved stereo samples.
///
/// The live data is a logical window of `frame_count` frames starting at
/// `position` inside a larger backing allocation. Writes append past the
/// logical end, reads consume from the logical start. The window is copied
/// back to offset 0 ("rewind") only when growth or drift would otherwise
/// force a reallocation, so memory stays bounded by the peak live window
/// rather than the total frames ever written.
///
/// All public offsets and counts are frame-based; internal storage is
/// sample-based (two samples per frame).
#[derive(Debug, Default)]
pub struct SampleFifo {
    /// Backing storage, sample-addressed
    data: Vec<f32>,
    /// First live frame
    position: usize,
    /// Number of live frames
    frames: usize,
}

impl SampleFifo {
    /// Create an empty FIFO
    pub fn new() -> Self {
        Self::default()
    }

    /// First live sample index in the backing storage
    fn start_index(&self) -> usize {
        self.position * CHANNELS
    }

    /// One past the last live sample index
    fn end_index(&self) -> usize {
        (self.position + self.frames) * CHANNELS
    }

    /// Number of buffered frames
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// True if no frames are buffered
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// The live window as an interleaved sample slice
    pub fn samples(&self) -> &[f32] {
        &self.data[self.start_index()..self.end_index()]
    }

    /// Drop all buffered frames
    pub fn clear(&mut self) {
        self.position = 0;
        self.frames = 0;
    }

    /// Commit `num_frames` frames already written into the tail region
    /// (see [`tail_mut`](Self::tail_mut))
    pub fn put(&mut self, num_frames: usize) {
        self.frames += num_frames;
        debug_assert!(self.end_index() <= self.data.len());
    }

    /// Append interleaved stereo samples, growing capacity as needed
    pub fn put_samples(&mut self, samples: &[f32]) {
        debug_assert_eq!(samples.len() % CHANNELS, 0);
        let num_frames = samples.len() / CHANNELS;
        self.ensure_capacity(self.frames + num_frames);
        let dest = self.end_index();
        self.data[dest..dest + samples.len()].copy_from_slice(samples);
        self.frames += num_frames;
    }

    /// Append `num_frames` frames copied from another FIFO's live window,
    /// starting at logical `offset`
    pub fn put_from(&mut self, other: &SampleFifo, offset: usize, num_frames: usize) {
        let start = offset * CHANNELS;
        let src = &other.samples()[start..start + num_frames * CHANNELS];
        self.ensure_capacity(self.frames + num_frames);
        let dest = self.end_index();
        self.data[dest..dest + src.len()].copy_from_slice(src);
        self.frames += num_frames;
    }

    /// Drop up to `num_frames` frames from the front of the window
    pub fn receive(&mut self, num_frames: usize) {
        let n = num_frames.min(self.frames);
        self.frames -= n;
        self.position += n;
    }

    /// Drop all buffered frames, advancing the window past them
    pub fn receive_all(&mut self) {
        self.receive(self.frames);
    }

    /// Copy `num_frames` frames from the front into `output` and consume them
    pub fn receive_samples(&mut self, output: &mut [f32], num_frames: usize) {
        self.extract(output, 0, num_frames);
        self.receive(num_frames);
    }

    /// Copy `num_frames` frames starting at logical `offset` into `output`
    /// without consuming anything
    pub fn extract(&self, output: &mut [f32], offset: usize, num_frames: usize) {
        let start = self.start_index() + offset * CHANNELS;
        let len = num_frames * CHANNELS;
        output[..len].copy_from_slice(&self.data[start..start + len]);
    }

    /// Make room for a total of `num_frames` buffered frames.
    ///
    /// Either reallocates (copying only the live window and resetting
    /// `position` to 0) or, when current capacity already suffices but the
    /// window has drifted, compacts in place.
    pub fn ensure_capacity(&mut self, num_frames: usize) {
        let min_len = num_frames * CHANNELS;
        if self.data.len() < min_len {
            let mut grown = vec![0.0; min_len];
            let live = self.frames * CHANNELS;
            grown[..live].copy_from_slice(&self.data[self.start_index()..self.end_index()]);
            self.data = grown;
            self.position = 0;
        } else {
            self.rewind();
        }
    }

    /// Make room for `num_frames` more frames beyond those already buffered
    pub fn ensure_additional(&mut self, num_frames: usize) {
        self.ensure_capacity(self.frames + num_frames);
    }

    /// Writable region of `num_frames` frames past the logical end.
    ///
    /// The frames become part of the window only once committed with
    /// [`put`](Self::put).
    pub fn tail_mut(&mut self, num_frames: usize) -> &mut [f32] {
        self.ensure_additional(num_frames);
        let start = self.end_index();
        &mut self.data[start..start + num_frames * CHANNELS]
    }

    /// Copy the live window back to offset 0
    fn rewind(&mut self) {
        if self.position > 0 {
            let (start, end) = (self.start_index(), self.end_index());
            self.data.copy_within(start..end, 0);
            self.position = 0;
        }
    }
}
