//! Wire protocol between the control surface and the capture host
//!
//! - `message`: typed command/response tokens
//! - `channel`: length-prefixed framing over a TCP stream

pub mod channel;
pub mod message;

pub use channel::{ChannelReceiver, ChannelSender, CommandChannel, Inbound, MAX_FRAME_LEN};
pub use message::{Command, Response, WireMessage};
