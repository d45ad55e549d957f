/*
[INPUT]:  Venue dialect, transport connector, stream configuration
[OUTPUT]: Streaming client, connection loop and the pieces it is built from
[POS]:    WebSocket layer - subscription multiplexing and state reconstruction
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod connection;
pub mod generic;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;
pub mod update;
pub mod waiters;

pub use client::{StreamClient, StreamClientBuilder};
pub use connection::{ConnectionHandle, ConnectionStatus, SubscribeRequest};
pub use generic::{GenericVenue, SUPPORTED_TIMEFRAMES};
pub use pool::ConnectionPool;
pub use protocol::{ChannelKind, DataMessage, Inbound, Payload, Venue};
pub use registry::message_hash;
pub use transport::{Connector, Frame, FrameSink, FrameStream, TungsteniteConnector};
pub use update::StreamUpdate;
