use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::frame::{Frame, FrameKind, FrameReader, FrameWriter};

/// Split an upgraded WebSocket into independently owned frame halves
pub fn split(socket: WebSocket) -> (WsFrameReader, WsFrameWriter) {
    let (sink, stream) = socket.split();
    (WsFrameReader { stream }, WsFrameWriter { sink })
}

pub struct WsFrameReader {
    stream: SplitStream<WebSocket>,
}

pub struct WsFrameWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let message = match self.stream.next().await {
                Some(message) => message.context("WebSocket read failed")?,
                None => return Ok(None),
            };

            match message {
                Message::Binary(data) => {
                    return Ok(Some(Frame {
                        kind: FrameKind::Binary,
                        payload: data,
                    }))
                }
                Message::Text(text) => {
                    return Ok(Some(Frame {
                        kind: FrameKind::Text,
                        payload: text.into_bytes(),
                    }))
                }
                Message::Close(reason) => {
                    debug!("Peer sent close frame: {:?}", reason);
                    return Ok(None);
                }
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }
}

#[async_trait::async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let message = match frame.kind {
            FrameKind::Binary => Message::Binary(frame.payload),
            FrameKind::Text => Message::Text(
                String::from_utf8(frame.payload).context("Text frame is not valid UTF-8")?,
            ),
        };

        self.sink
            .send(message)
            .await
            .context("WebSocket write failed")
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .context("Failed to send close frame")
    }
}
