//! Player configuration

/// Options recognized when building a player pipeline.
///
/// All ratio knobs default to 1.0 (no change). `sequence_ms` and
/// `seek_window_ms` default to automatic derivation from tempo; giving
/// either an explicit value disables auto-derivation for that parameter
/// only.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Processing sample rate in Hz; `None` uses the source's rate
    pub sample_rate: Option<u32>,
    /// Pitch ratio (2.0 = up one octave)
    pub pitch: f64,
    /// Playback rate ratio (affects speed and pitch together)
    pub rate: f64,
    /// Tempo ratio (affects speed only)
    pub tempo: f64,
    /// Sparse multi-pass overlap search instead of exhaustive
    pub quick_seek: bool,
    /// Crossfade length in milliseconds
    pub overlap_ms: u32,
    /// Stretch sequence length in ms; `None` = derive from tempo
    pub sequence_ms: Option<u32>,
    /// Overlap search window in ms; `None` = derive from tempo
    pub seek_window_ms: Option<u32>,
    /// Frames served per extraction tick
    pub block_frames: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            pitch: 1.0,
            rate: 1.0,
            tempo: 1.0,
            quick_seek: true,
            overlap_ms: 8,
            sequence_ms: None,
            seek_window_ms: None,
            block_frames: 4096,
        }
    }
}
