//! Client error taxonomy.
//!
//! Three classes of failure, none of which unwind past the command that
//! hit them:
//!
//! - connection errors ([`Error::Io`], [`Error::ConnectionClosed`],
//!   [`Error::ServerUnavailable`]) - the affected connection is discarded
//!   and later commands routed to that server fail until a reconnect
//!   cycle
//! - framing errors ([`Error::Protocol`], [`Error::UnexpectedResponse`])
//!   - fatal to the current exchange only
//! - status errors ([`Error::Server`], [`Error::Status`]) - the server
//!   processed the request and said no

use std::net::SocketAddr;

use mcproto::binary::Status;

/// Errors surfaced through command results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer closed the connection mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket-level failure (dial, read, write).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The response could not be decoded; fatal to this exchange only.
    #[error("protocol error: {0}")]
    Protocol(#[from] mcproto::ParseError),

    /// The response decoded fine but was the wrong shape for the command.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// The server for this key has no live connection. No reconnect is
    /// attempted automatically; see `Client::reconnect`.
    #[error("server {addr} is not connected")]
    ServerUnavailable { addr: SocketAddr },

    /// Text-protocol error response (ERROR / CLIENT_ERROR / SERVER_ERROR).
    #[error("server error: {0}")]
    Server(String),

    /// Binary-protocol non-success status.
    #[error("server status {:#06x}: {}", .status.as_u16(), .status.reason())]
    Status { status: Status },

    /// Value pipeline failure (serialization or compression).
    #[error("value transform: {0}")]
    Value(#[from] mcproto::value::ValueError),

    /// No server addresses were configured.
    #[error("no servers configured")]
    NoServers,

    /// The client's drain loop has shut down.
    #[error("client closed")]
    ClientClosed,
}

impl Error {
    /// True for errors that poison the connection they occurred on.
    pub(crate) fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::Io(_))
    }
}
