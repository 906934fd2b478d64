//! Adapter for axum server-side websockets (telephony leg).

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use super::{BoxedSink, BoxedSource, Frame, FrameSink, FrameSource, TransportError};

/// Outbound half of an accepted websocket.
pub struct ServerSocketSink(SplitSink<WebSocket, Message>);

/// Inbound half of an accepted websocket.
pub struct ServerSocketSource(SplitStream<WebSocket>);

/// Split an upgraded axum websocket into relay halves.
pub fn split_server_socket(socket: WebSocket) -> (BoxedSink, BoxedSource) {
    let (sink, stream) = socket.split();
    (
        Box::new(ServerSocketSink(sink)),
        Box::new(ServerSocketSource(stream)),
    )
}

#[async_trait]
impl FrameSink for ServerSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close => Message::Close(None),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for ServerSocketSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.0.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            return Some(Ok(match message {
                Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                Message::Binary(data) => Frame::Binary(data),
                Message::Close(_) => Frame::Close,
                Message::Ping(_) | Message::Pong(_) => continue,
            }));
        }
    }
}
