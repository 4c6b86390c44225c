//! Asynchronous memcached client.
//!
//! cacheline turns high-level cache operations (get, set, add, replace,
//! delete, incr/decr, stats) into wire-format requests distributed
//! across a pool of server connections, and turns the responses back
//! into typed results.
//!
//! # Architecture
//!
//! - Every [`Client`] clone feeds one FIFO command queue.
//! - A single drain-loop task pops commands and executes exactly one at
//!   a time; within a command, per-server fan-out (multi-key fetch,
//!   stats) runs concurrently and is joined before the next command.
//! - Keys map to servers by `crc32(key) >> 16 & 0x7FFF` modulo the
//!   server count - static modulo sharding, deliberately not consistent
//!   hashing, so changing the server list remaps nearly all keys.
//! - Both memcached wire protocols are supported; pick one with
//!   [`Protocol`] at construction.
//! - Values ride a flags-tagged pipeline: structured values are
//!   serialized to JSON, large payloads are zlib-compressed when that
//!   actually saves space.
//!
//! # Failure model
//!
//! A connection that errors is discarded, not retried; commands routed
//! to that server fail with [`Error::ServerUnavailable`] until
//! [`Client::reconnect`] runs a fresh connect cycle. Malformed responses
//! fail only the command that hit them. Server-side rejections surface
//! as typed results (`false`, `None`, a status) rather than errors where
//! the operation has a natural miss case.
//!
//! ```no_run
//! use cacheline::{Client, ClientConfig, Protocol};
//!
//! # async fn example() -> Result<(), cacheline::Error> {
//! let mut config = ClientConfig::new(vec![
//!     "10.0.0.1:11211".parse().unwrap(),
//!     "10.0.0.2:11211".parse().unwrap(),
//! ]);
//! config.protocol = Protocol::Binary;
//! let client = Client::new(config)?;
//!
//! client.set("user:42", serde_json::json!({"name": "ada"}), 300).await?;
//! let hits = client.get_multi(["user:42", "user:43"]).await?;
//! # Ok(())
//! # }
//! ```

mod barrier;
mod client;
mod codec;
mod command;
mod config;
mod connection;
mod driver;
mod error;
mod metrics;
mod pool;
mod registry;

pub use client::Client;
pub use command::{CasOutcome, ServerStats};
pub use config::{ClientConfig, Protocol};
pub use error::Error;

/// Value type stored and fetched by the client.
pub use mcproto::value::CacheValue;
