//! Framed command channel over a TCP stream
//!
//! Wire format (both directions):
//!   [4 bytes: body len u32 BE] [N bytes: UTF-8 message]
//!
//! TCP has no message boundaries, so every token travels in its own
//! length-prefixed frame and is only handed to the caller once complete.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::debug;

use super::message::WireMessage;
use crate::error::{Error, Result};

/// Largest frame either side will accept (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// One message pulled off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<M> {
    /// A token the receiver understands
    Message(M),
    /// A complete frame that did not decode (forward-compatibility: callers ignore these)
    Unrecognized(String),
}

impl<M> Inbound<M> {
    /// The decoded message, or `Error::ProtocolViolation` naming the raw token
    pub fn into_message(self) -> Result<M> {
        match self {
            Inbound::Message(message) => Ok(message),
            Inbound::Unrecognized(raw) => Err(Error::ProtocolViolation(format!(
                "unrecognized token {:?}",
                raw
            ))),
        }
    }
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// A connected, framed message channel
pub struct CommandChannel {
    receiver: ChannelReceiver,
    sender: ChannelSender,
}

impl CommandChannel {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            receiver: ChannelReceiver {
                frames: FramedRead::new(read_half, codec()),
                peer,
            },
            sender: ChannelSender {
                frames: FramedWrite::new(write_half, codec()),
                peer,
            },
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.receiver.peer
    }

    /// Send one message as a single frame
    pub async fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        self.sender.send(message).await
    }

    /// Wait for the next complete frame; `Ok(None)` means the peer closed the stream
    pub async fn receive<M: WireMessage>(&mut self) -> Result<Option<Inbound<M>>> {
        self.receiver.receive().await
    }

    /// Split into independently owned halves
    pub fn into_split(self) -> (ChannelReceiver, ChannelSender) {
        (self.receiver, self.sender)
    }
}

/// Receiving half of a `CommandChannel`
pub struct ChannelReceiver {
    frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    peer: SocketAddr,
}

impl ChannelReceiver {
    /// Cancel-safe: a partially read frame stays buffered until the next call.
    pub async fn receive<M: WireMessage>(&mut self) -> Result<Option<Inbound<M>>> {
        let frame = match self.frames.next().await {
            None => return Ok(None),
            Some(frame) => frame.map_err(Error::ConnectionLost)?,
        };

        let inbound = match std::str::from_utf8(&frame) {
            Ok(text) => match M::decode(text) {
                Some(message) => Inbound::Message(message),
                None => Inbound::Unrecognized(text.to_string()),
            },
            Err(_) => {
                debug!("Non UTF-8 frame from {} ({} bytes)", self.peer, frame.len());
                Inbound::Unrecognized(String::from_utf8_lossy(&frame).into_owned())
            }
        };

        Ok(Some(inbound))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Sending half of a `CommandChannel`
pub struct ChannelSender {
    frames: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    peer: SocketAddr,
}

impl ChannelSender {
    pub async fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        self.send_raw(&message.encode()).await
    }

    /// Send arbitrary text as one frame (used for tokens outside the typed set)
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.frames
            .send(Bytes::copy_from_slice(text.as_bytes()))
            .await
            .map_err(Error::ConnectionLost)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
