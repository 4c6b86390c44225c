//! Line-oriented ASCII protocol.
//!
//! Requests are single `\r\n`-terminated lines, with storage commands
//! followed by a raw payload and its own terminator. Responses are lines;
//! `VALUE` and `STAT` blocks repeat until an `END` line.

mod command;
mod request;
mod response;

pub use command::{Command, StoreKind};
pub use request::{Request, StoreVerb};
pub use response::{Response, Stat, Value};
