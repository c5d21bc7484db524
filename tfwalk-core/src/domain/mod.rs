//! Domain types for the multi-timeframe walk-forward engine.

pub mod candle;
pub mod direction;
pub mod instrument;
pub mod position;
pub mod timeframe;
pub mod trade;

pub use candle::{parse_timestamp, Candle, CandleError, RawCandle};
pub use direction::{Direction, Signal, Trend};
pub use instrument::{AssetClass, InstrumentSpec};
pub use position::Position;
pub use timeframe::{Timeframe, TimeframeError, TimeframeTriple};
pub use trade::{EquityPoint, ExitReason, TradeRecord};

/// Symbol type alias
pub type Symbol = String;
