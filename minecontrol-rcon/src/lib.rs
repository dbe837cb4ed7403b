//! This crate provides an implementation of an RCON client for Minecraft servers, following the
//! protocol described on [wiki.vg].
//!
//! A client owns a single TCP connection. It logs in once and then runs commands one at a time,
//! each command being a request packet followed by exactly one response packet. The client may be
//! shared between threads; concurrent callers are serialized so their packets never interleave.
//!
//! Two flavours are available:
//!  - [`Client`], a blocking client built on [`std::net::TcpStream`] (feature `sync`, enabled by
//!    default).
//!  - [`AsyncClient`], the same client on top of a [Tokio](https://tokio.rs/) runtime (feature
//!    `async`).
//!
//! Responses the server splits over several packets are not reassembled: only the first packet
//! of a response is returned.
//!
//! # Example
//! ```rust,no_run
//! use minecontrol_rcon::Client;
//!
//! let client = Client::connect(("localhost", 25575), "password123").unwrap();
//!
//! let players = client.execute("/list").unwrap();
//! println!("{}", players);
//!
//! client.close();
//! ```
//!
//! [wiki.vg]: https://wiki.vg/RCON

use std::time::Duration;

pub mod packet;

#[cfg(feature = "sync")]
mod sync;

#[cfg(feature = "async")]
mod r#async;

pub use self::packet::{Packet, PacketType, PaddingMode};

#[cfg(feature = "sync")]
pub use self::sync::*;

#[cfg(feature = "async")]
pub use self::r#async::*;

/// Error type for RCON operations.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(RconError);

#[derive(Debug, thiserror::Error)]
pub(crate) enum RconError {
    #[error("could not connect to RCON server")]
    ConnectionFailed(#[source] std::io::Error),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("client is not connected")]
    NotConnected,

    #[error("stream ended in the middle of a packet")]
    TruncatedStream,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("failed to write packet")]
    WriteFailed(#[source] std::io::Error),

    #[error("failed to read packet")]
    ReadFailed(#[source] std::io::Error),
}

/// The category of an [`Error`], for callers that need to react differently to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The TCP connection could not be established.
    ConnectionFailed,
    /// The server rejected the password or answered the login with an unexpected packet.
    AuthenticationFailed,
    /// The client was never authenticated, or has been closed.
    NotConnected,
    /// The connection closed before a whole packet arrived.
    TruncatedStream,
    /// A packet violated the framing rules.
    MalformedPacket,
    /// A payload was too long to fit in a packet.
    PayloadTooLarge,
    /// Writing to the connection failed.
    WriteFailed,
    /// Reading from the connection failed for a reason other than end of stream.
    ReadFailed,
}

/// [`Result`] alias for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<T> for Error
where
    T: Into<RconError>,
{
    fn from(inner: T) -> Self {
        Error(inner.into())
    }
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            RconError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            RconError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            RconError::NotConnected => ErrorKind::NotConnected,
            RconError::TruncatedStream => ErrorKind::TruncatedStream,
            RconError::MalformedPacket(_) => ErrorKind::MalformedPacket,
            RconError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            RconError::WriteFailed(_) => ErrorKind::WriteFailed,
            RconError::ReadFailed(_) => ErrorKind::ReadFailed,
        }
    }
}

/// Maps an I/O error raised while reading a packet onto the protocol error it stands for.
pub(crate) fn read_error(err: std::io::Error) -> RconError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RconError::TruncatedStream
    } else {
        RconError::ReadFailed(err)
    }
}

/// Connection settings shared by both client flavours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// How the padding bytes of incoming packets are checked.
    pub padding: PaddingMode,

    /// Deadline applied to dialing and to every read and write. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl Options {
    pub fn padding(mut self, padding: PaddingMode) -> Self {
        self.padding = padding;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }
}

/// Picks a correlation id for an outgoing packet. Never `-1`, which servers reserve for
/// authentication failures.
pub(crate) fn next_request_id() -> i32 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..i32::MAX)
}
