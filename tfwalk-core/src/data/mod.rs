//! Data preparation: raw record normalization, timeframe alignment, rolling buffers.

pub mod align;
pub mod buffer;
pub mod normalize;

pub use align::{
    align, AlignedSeries, AlignedWindow, AlignmentError, InsufficientDataError, Violation,
    ViolationKind,
};
pub use buffer::{CandleBuffer, DEFAULT_HISTORY_WINDOW, DEFAULT_MIN_BARS};
pub use normalize::{merge_incremental, normalize_raw, DropReport};
