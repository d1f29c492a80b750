use thiserror::Error;

/// Errors raised while turning a signal series into gait parameters.
#[derive(Debug, Error, PartialEq)]
pub enum GaitError {
  /// Not enough usable gait cycles survived filtering.
  #[error("insufficient gait data: {message}")]
  InsufficientGaitData { message: String },

  /// The turning mask does not describe exactly one contiguous turn.
  #[error("ambiguous turn region: found {runs} turning runs, expected exactly one")]
  AmbiguousTurnRegion { runs: usize },

  /// The turning mask and the signal cover a different number of frames.
  #[error("turn mask has {mask} frames but signal has {signal}")]
  MaskLengthMismatch { mask: usize, signal: usize },

  /// An interval whose start is not strictly before its end.
  #[error("degenerate interval [{start}, {end}]")]
  DegenerateInterval { start: usize, end: usize },

  /// A frame index outside the signal.
  #[error("frame {frame} is outside the signal (length {len})")]
  FrameOutOfRange { frame: usize, len: usize },

  /// Extractor configuration is unusable.
  #[error("invalid extractor config: {message}")]
  InvalidConfig { message: String },
}

impl GaitError {
  pub fn insufficient(message: impl Into<String>) -> Self {
    Self::InsufficientGaitData {
      message: message.into(),
    }
  }
}
