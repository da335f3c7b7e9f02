//! Transform core for stretto - streaming pitch/tempo shifting.
//!
//! This crate holds the buffer-oriented transform stages:
//! - SampleFifo: interleaved stereo sample queue shared by all stages
//! - RateTransposer: arbitrary-ratio resampling via linear interpolation
//! - TimeStretcher: tempo change with pitch preserved (overlap-add)
//! - Engine: derives effective rate/tempo from independent knobs and
//!   chains the two stages in the cheaper order
//!
//! Everything here is synchronous, allocation-bounded, and incremental:
//! stages carry fractional-sample and crossfade state across calls so the
//! pipeline can be driven in small chunks from a real-time callback.

mod engine;
mod fifo;
pub mod stretch;
mod transposer;

pub use engine::{Engine, StageOrder};
pub use fifo::{SampleFifo, CHANNELS};
pub use stretch::TimeStretcher;
pub use transposer::RateTransposer;
