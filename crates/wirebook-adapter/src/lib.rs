/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public wirebook streaming engine surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod orderbook;
pub mod types;
pub mod ws;

pub use auth::{Credentials, HmacSigner};

pub use config::StreamConfig;

pub use error::{ErrorTaxonomy, ExchangeErrorKind, Result, WirebookError};

pub use http::{ClientConfig, RestClient, SnapshotFetcher, SnapshotRequest};

pub use orderbook::{OrderBook, PriceLevel};

// Re-export all types
pub use types::*;

pub use ws::{
    ChannelKind,
    Connector,
    Frame,
    GenericVenue,
    StreamClient,
    StreamClientBuilder,
    StreamUpdate,
    TungsteniteConnector,
    Venue,
};
