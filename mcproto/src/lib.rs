//! Bidirectional memcached wire protocol.
//!
//! This crate implements both memcached protocols plus the value
//! transformation pipeline used by the client engine:
//!
//! - [`text`] - the line-oriented ASCII protocol (`get`, `set`,
//!   `VALUE ... END`, `STORED`, ...)
//! - [`binary`] - the fixed-24-byte-header binary protocol (magic `0x80`
//!   requests, `0x81` responses, big-endian fields)
//! - [`value`] - flags-tagged structured-value serialization and
//!   size-triggered compression
//!
//! The client side (request encoding, response parsing) is the primary
//! surface. Server-side halves (request parsing, response encoding) are
//! provided so that test fixtures and mock servers share the exact same
//! framing as the client.
//!
//! # Parse contract
//!
//! Every parser takes a byte slice and returns `(parsed, consumed)` or
//! [`ParseError::Incomplete`] when the buffer does not yet hold a full
//! frame. `Incomplete` is a buffer-more signal, not a failure; all other
//! variants are fatal to the exchange being parsed.
//!
//! ```
//! use mcproto::text::{Request, Response};
//!
//! let mut buf = Vec::new();
//! Request::get(&[b"mykey".as_slice()]).encode(&mut buf);
//! assert_eq!(buf, b"get mykey\r\n");
//!
//! let (response, consumed) = Response::parse(b"VALUE mykey 0 5\r\nhello\r\nEND\r\n").unwrap();
//! ```

pub mod binary;
pub mod text;
pub mod value;

mod error;

pub use error::ParseError;
