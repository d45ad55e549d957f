/*
[INPUT]:  Book storage and reconstruction submodules
[OUTPUT]: Public order book API
[POS]:    Order book layer - module root
[UPDATE]: When adding order book submodules
*/

pub mod book;
pub mod reconstructor;

pub use book::{BookSide, OrderBook, PriceLevel};
pub use reconstructor::{ApplyOutcome, BookReconstructor, BookState, BookUpdate, ResyncReason};
