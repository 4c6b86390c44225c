//! Protocol codecs.
//!
//! One codec per wire protocol, selected once at construction by
//! [`Codec::new`]. Both expose the same operation set; the drain loop
//! never matches on the protocol itself.
//!
//! Single-server operations are plain async methods. Fan-out operations
//! (multi-key fetch, stats) are split in two: `plan_*` encodes the
//! request and captures the expected end-of-exchange marker on the
//! drain-loop task (where the opaque counter lives), and the returned
//! plan's `run` drives one connection and can be polled concurrently
//! with its sibling branches.

mod binary;
mod text;

pub(crate) use binary::BinaryCodec;
pub(crate) use text::TextCodec;

use mcproto::value::{CacheValue, ValuePipeline};

use crate::command::{CasOutcome, ConcatMode, CounterOp, StoreMode};
use crate::config::Protocol;
use crate::connection::Connection;
use crate::error::Error;

/// A fetched item before the value pipeline runs: wire payload plus the
/// flags word that says how to undo the storage transformations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawItem {
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub flags: u32,
    pub cas: Option<u64>,
}

pub(crate) enum Codec {
    Text(TextCodec),
    Binary(BinaryCodec),
}

impl Codec {
    /// Codec factory; the protocol choice is fixed for the client's life.
    pub fn new(protocol: Protocol, pipeline: ValuePipeline) -> Self {
        match protocol {
            Protocol::Text => Codec::Text(TextCodec::new(pipeline)),
            Protocol::Binary => Codec::Binary(BinaryCodec::new(pipeline)),
        }
    }

    pub fn pipeline(&self) -> &ValuePipeline {
        match self {
            Codec::Text(codec) => codec.pipeline(),
            Codec::Binary(codec) => codec.pipeline(),
        }
    }

    /// Run a fetched item back through the value pipeline.
    pub fn decode_value(&self, item: &RawItem) -> Result<CacheValue, Error> {
        Ok(self.pipeline().decode(&item.payload, item.flags)?)
    }

    pub async fn get(
        &mut self,
        conn: &mut Connection,
        key: &[u8],
        want_cas: bool,
    ) -> Result<Option<RawItem>, Error> {
        match self {
            Codec::Text(codec) => codec.get(conn, key, want_cas).await,
            Codec::Binary(codec) => codec.get(conn, key).await,
        }
    }

    pub async fn store(
        &mut self,
        conn: &mut Connection,
        mode: StoreMode,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        noreply: bool,
    ) -> Result<bool, Error> {
        match self {
            Codec::Text(codec) => codec.store(conn, mode, key, value, exptime, noreply).await,
            Codec::Binary(codec) => codec.store(conn, mode, key, value, exptime, noreply).await,
        }
    }

    pub async fn cas(
        &mut self,
        conn: &mut Connection,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        cas: u64,
    ) -> Result<CasOutcome, Error> {
        match self {
            Codec::Text(codec) => codec.cas(conn, key, value, exptime, cas).await,
            Codec::Binary(codec) => codec.cas(conn, key, value, exptime, cas).await,
        }
    }

    pub async fn concat(
        &mut self,
        conn: &mut Connection,
        mode: ConcatMode,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool, Error> {
        match self {
            Codec::Text(codec) => codec.concat(conn, mode, key, value).await,
            Codec::Binary(codec) => codec.concat(conn, mode, key, value).await,
        }
    }

    pub async fn counter(
        &mut self,
        conn: &mut Connection,
        op: CounterOp,
        key: &[u8],
        delta: u64,
    ) -> Result<Option<u64>, Error> {
        match self {
            Codec::Text(codec) => codec.counter(conn, op, key, delta).await,
            Codec::Binary(codec) => codec.counter(conn, op, key, delta).await,
        }
    }

    pub async fn delete(
        &mut self,
        conn: &mut Connection,
        key: &[u8],
        noreply: bool,
    ) -> Result<bool, Error> {
        match self {
            Codec::Text(codec) => codec.delete(conn, key, noreply).await,
            Codec::Binary(codec) => codec.delete(conn, key, noreply).await,
        }
    }

    pub async fn version(&mut self, conn: &mut Connection) -> Result<String, Error> {
        match self {
            Codec::Text(codec) => codec.version(conn).await,
            Codec::Binary(codec) => codec.version(conn).await,
        }
    }

    pub async fn flush(&mut self, conn: &mut Connection) -> Result<(), Error> {
        match self {
            Codec::Text(codec) => codec.flush(conn).await,
            Codec::Binary(codec) => codec.flush(conn).await,
        }
    }

    /// Encode one batched fetch for keys that all map to the same server.
    pub fn plan_fetch(&mut self, keys: &[Vec<u8>]) -> FetchPlan {
        match self {
            Codec::Text(codec) => codec.plan_fetch(keys),
            Codec::Binary(codec) => codec.plan_fetch(keys),
        }
    }

    /// Encode one stats request.
    pub fn plan_stats(&mut self, name: Option<&[u8]>) -> StatsPlan {
        match self {
            Codec::Text(codec) => codec.plan_stats(name),
            Codec::Binary(codec) => codec.plan_stats(name),
        }
    }
}

/// How a batched exchange signals its end on the wire.
#[derive(Debug, Clone, Copy)]
enum ExchangeEnd {
    /// Text batches end at the `END` line (absorbed by the parser).
    TextEnd,
    /// Binary batches end at a terminator packet carrying this opaque
    /// (the NOOP echo for fetches, the empty STAT for stats).
    Binary { opaque: u32 },
}

/// A planned multi-key fetch against a single server.
#[derive(Debug)]
pub(crate) struct FetchPlan {
    request: Vec<u8>,
    end: ExchangeEnd,
}

impl FetchPlan {
    /// Drive the exchange on one connection, returning the hits. Misses
    /// and per-key status failures are simply absent from the result.
    pub async fn run(&self, conn: &mut Connection) -> Result<Vec<RawItem>, Error> {
        match self.end {
            ExchangeEnd::TextEnd => text::run_fetch(&self.request, conn).await,
            ExchangeEnd::Binary { opaque } => binary::run_fetch(&self.request, opaque, conn).await,
        }
    }
}

/// A planned stats request against a single server.
#[derive(Debug)]
pub(crate) struct StatsPlan {
    request: Vec<u8>,
    end: ExchangeEnd,
}

impl StatsPlan {
    /// Drive the exchange on one connection, returning stat pairs.
    pub async fn run(&self, conn: &mut Connection) -> Result<Vec<(String, String)>, Error> {
        match self.end {
            ExchangeEnd::TextEnd => text::run_stats(&self.request, conn).await,
            ExchangeEnd::Binary { opaque } => binary::run_stats(&self.request, opaque, conn).await,
        }
    }
}
