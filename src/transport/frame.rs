use anyhow::Result;

/// Payload kind of a frame on the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn binary(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: text.into().into_bytes(),
        }
    }
}

/// Receiving half of a duplex frame connection
#[async_trait::async_trait]
pub trait FrameReader: Send {
    /// Read the next data frame
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Sending half of a duplex frame connection
#[async_trait::async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;

    /// Tell the peer no more frames will follow
    async fn close(&mut self) -> Result<()>;
}
