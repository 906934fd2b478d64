//! Adapter for tokio-tungstenite client websockets (agent leg).

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use super::{BoxedSink, BoxedSource, Frame, FrameSink, FrameSource, TransportError};

/// Outbound half of a client websocket.
pub struct ClientSocketSink<S>(SplitSink<WebSocketStream<S>, Message>);

/// Inbound half of a client websocket.
pub struct ClientSocketSource<S>(SplitStream<WebSocketStream<S>>);

/// Split a connected client websocket into relay halves.
pub fn split_client_socket<S>(socket: WebSocketStream<S>) -> (BoxedSink, BoxedSource)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    (
        Box::new(ClientSocketSink(sink)),
        Box::new(ClientSocketSource(stream)),
    )
}

#[async_trait]
impl<S> FrameSink for ClientSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
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
impl<S> FrameSource for ClientSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
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
                // tungstenite answers pings itself on the next read/write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }));
        }
    }
}
