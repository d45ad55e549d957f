/*
[INPUT]:  WebSocket URL and connect timeout
[OUTPUT]: Boxed frame sink/stream pair for one socket
[POS]:    WebSocket layer - transport seam between the engine and tungstenite
[UPDATE]: When changing frame mapping or adding transports
*/

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info};

use crate::error::{Result, WirebookError};

/// Transport-level frame seen by the connection loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = WirebookError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Opens sockets for the connection pool
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)>;
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                WirebookError::Timeout(format!(
                    "connect to {url} exceeded {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;
        info!(url, "ws socket opened");

        let (write, read) = ws_stream.split();
        let sink = write.with(|frame: Frame| future::ready(Ok::<_, WirebookError>(to_message(frame))));
        let stream = read.filter_map(|message| future::ready(from_message(message)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn to_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Ping(payload) => WsMessage::Ping(payload.into()),
        Frame::Pong(payload) => WsMessage::Pong(payload.into()),
        Frame::Close => WsMessage::Close(None),
    }
}

fn from_message(
    message: std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Frame>> {
    match message {
        Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
        Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(err) => {
                debug!(bytes = bytes.len(), error = %err, "ws binary frame is not utf-8");
                None
            }
        },
        Ok(WsMessage::Ping(payload)) => Some(Ok(Frame::Ping(payload.to_vec()))),
        Ok(WsMessage::Pong(payload)) => Some(Ok(Frame::Pong(payload.to_vec()))),
        Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
        Ok(WsMessage::Frame(_)) => None,
        Err(err) => Some(Err(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trips_through_message() {
        let message = to_message(Frame::Text("{\"op\":\"ping\"}".to_string()));
        assert!(matches!(message, WsMessage::Text(_)));
        assert_eq!(
            from_message(Ok(message)),
            Some(Ok(Frame::Text("{\"op\":\"ping\"}".to_string())))
        );
    }

    #[test]
    fn test_binary_utf8_decoded_as_text() {
        let message = WsMessage::Binary(b"hello".to_vec().into());
        assert_eq!(
            from_message(Ok(message)),
            Some(Ok(Frame::Text("hello".to_string())))
        );
    }

    #[test]
    fn test_invalid_binary_is_skipped() {
        let message = WsMessage::Binary(vec![0xff, 0xfe].into());
        assert_eq!(from_message(Ok(message)), None);
    }

    #[test]
    fn test_close_maps_to_close_frame() {
        assert_eq!(from_message(Ok(WsMessage::Close(None))), Some(Ok(Frame::Close)));
    }
}
