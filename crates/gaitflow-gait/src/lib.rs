//! Gait-cycle extraction.
//!
//! Turns a per-frame depth signal (left leg depth minus right leg depth) and
//! a turning mask into per-stride clinical parameters.
//!
//! ```text
//! signal ──► onsets of s and -s ──► drop turning frames ──► split at turn
//!                                                               │
//!        summary ◄── parameters ◄── median filter ◄── pairs ◄── depth filter
//! ```
//!
//! Everything here is synchronous and free of I/O.

mod error;
mod events;
mod extractor;
mod interval;
mod params;
mod signal;

pub use error::GaitError;
pub use events::{exclude_turning, filter_by_depth, region_onsets, split_by_turn, turn_bounds};
pub use extractor::{GaitExtractor, GaitReport};
pub use interval::{GaitInterval, RatioBand, median_length, pair_consecutive, reject_outliers};
pub use params::{ExtractorConfig, GaitSummary, StrideParameters, summarize};
pub use signal::{FrameSample, GaitEvent, Leg, LegSample, SignalSeries};
