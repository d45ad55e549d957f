/*
[INPUT]:  Streaming records for trades, candles, orders, positions, balances
[OUTPUT]: Bounded caches and the snapshot bootstrap gate
[POS]:    Cache layer - module root
[UPDATE]: When adding cache kinds
*/

pub mod bootstrap;
pub mod keyed;
pub mod ohlcv;
pub mod ring;

pub use bootstrap::BootstrapGate;
pub use keyed::{CacheKey, KeyedCache, OrderCache, PositionCache};
pub use ohlcv::{CandleOutcome, OhlcvCache};
pub use ring::{BoundedBuffer, TradeCache};
