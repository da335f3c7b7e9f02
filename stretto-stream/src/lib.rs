//! Streaming driver for stretto - feeds the transform engine from a pull
//! source and serves a real-time playback callback.
//!
//! - SampleSource: synchronous supplier of decoded stereo frames
//! - PullFilter: on-demand pipeline driver with a bounded look-back history
//! - StreamAdapter: periodic fixed-block extraction, playback-time events,
//!   percentage seeking
//! - PlayerConfig: recognized pipeline options

mod adapter;
mod config;
mod filter;
mod source;

pub use adapter::{PlayerEvent, StreamAdapter};
pub use config::PlayerConfig;
pub use filter::{PullFilter, StreamError, HISTORY_FRAMES, MAX_INPUT_CHUNK};
pub use source::{MemorySource, SampleSource, SourceError};
