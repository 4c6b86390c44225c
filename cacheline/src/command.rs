//! Queued commands.
//!
//! Each public client operation becomes one `Command`: the operation
//! kind, its arguments, and a oneshot sender that settles the caller's
//! future. Commands are immutable once enqueued and consumed exactly
//! once by the drain loop; dropping the sender (process teardown) is
//! observed by the caller as [`Error::ClientClosed`](crate::Error).

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::oneshot;

use mcproto::value::CacheValue;

use crate::error::Error;

/// Completion side of one command.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, Error>>;

/// Conditional-store mode for the `set` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreMode {
    /// Unconditional store.
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists.
    Replace,
}

/// Byte-concatenation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConcatMode {
    Append,
    Prepend,
}

/// Arithmetic direction for counter operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterOp {
    Incr,
    Decr,
}

/// Outcome of a compare-and-swap store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The token matched and the value was stored.
    Stored,
    /// The item changed since the token was fetched.
    Exists,
    /// The key no longer exists.
    NotFound,
}

/// Stats for one server.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub server: SocketAddr,
    pub stats: HashMap<String, String>,
}

pub(crate) enum Command {
    Get {
        key: Vec<u8>,
        reply: Reply<Option<CacheValue>>,
    },
    /// `gets`: fetch with the CAS token.
    GetCas {
        key: Vec<u8>,
        reply: Reply<Option<(CacheValue, u64)>>,
    },
    GetMulti {
        keys: Vec<Vec<u8>>,
        reply: Reply<HashMap<Vec<u8>, CacheValue>>,
    },
    Store {
        mode: StoreMode,
        key: Vec<u8>,
        value: CacheValue,
        exptime: u32,
        noreply: bool,
        reply: Reply<bool>,
    },
    Cas {
        key: Vec<u8>,
        value: CacheValue,
        exptime: u32,
        cas: u64,
        reply: Reply<CasOutcome>,
    },
    Concat {
        mode: ConcatMode,
        key: Vec<u8>,
        value: Vec<u8>,
        reply: Reply<bool>,
    },
    Counter {
        op: CounterOp,
        key: Vec<u8>,
        delta: u64,
        reply: Reply<Option<u64>>,
    },
    Delete {
        key: Vec<u8>,
        noreply: bool,
        reply: Reply<bool>,
    },
    Stats {
        name: Option<Vec<u8>>,
        reply: Reply<Vec<ServerStats>>,
    },
    Version {
        reply: Reply<Vec<(SocketAddr, String)>>,
    },
    FlushAll {
        reply: Reply<()>,
    },
    /// Drop every connection and run a fresh connect cycle.
    Reconnect {
        reply: Reply<()>,
    },
}

impl Command {
    /// Operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::GetCas { .. } => "gets",
            Command::GetMulti { .. } => "get_multi",
            Command::Store {
                mode: StoreMode::Set,
                ..
            } => "set",
            Command::Store {
                mode: StoreMode::Add,
                ..
            } => "add",
            Command::Store {
                mode: StoreMode::Replace,
                ..
            } => "replace",
            Command::Cas { .. } => "cas",
            Command::Concat {
                mode: ConcatMode::Append,
                ..
            } => "append",
            Command::Concat {
                mode: ConcatMode::Prepend,
                ..
            } => "prepend",
            Command::Counter {
                op: CounterOp::Incr,
                ..
            } => "incr",
            Command::Counter {
                op: CounterOp::Decr,
                ..
            } => "decr",
            Command::Delete { .. } => "delete",
            Command::Stats { .. } => "stats",
            Command::Version { .. } => "version",
            Command::FlushAll { .. } => "flush_all",
            Command::Reconnect { .. } => "reconnect",
        }
    }
}
