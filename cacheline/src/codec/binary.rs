//! Binary protocol exchanges.

use mcproto::binary::{BinaryRequest, BinaryResponse, Opcode, Status};
use mcproto::value::{CacheValue, ValuePipeline};

use crate::command::{CasOutcome, ConcatMode, CounterOp, StoreMode};
use crate::connection::Connection;
use crate::error::Error;

use super::{ExchangeEnd, FetchPlan, RawItem, StatsPlan};

/// Expiration sentinel that tells the server not to seed a missing
/// counter: increment/decrement on an absent key then fails with
/// key-not-found, matching the text protocol's behavior.
const COUNTER_NO_AUTOCREATE: u32 = 0xFFFF_FFFF;

pub(crate) struct BinaryCodec {
    pipeline: ValuePipeline,
    /// Per-client opaque counter; wraps after 0xFFFFFFFF. Exchanges are
    /// strictly sequential, so the echo is used only to discard stale
    /// packets (late errors from quiet operations), not for reordering.
    opaque: u32,
}

impl BinaryCodec {
    pub fn new(pipeline: ValuePipeline) -> Self {
        BinaryCodec {
            pipeline,
            opaque: 0,
        }
    }

    pub fn pipeline(&self) -> &ValuePipeline {
        &self.pipeline
    }

    fn next_opaque(&mut self) -> u32 {
        self.opaque = self.opaque.wrapping_add(1);
        self.opaque
    }

    pub async fn get(
        &mut self,
        conn: &mut Connection,
        key: &[u8],
    ) -> Result<Option<RawItem>, Error> {
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(32 + key.len());
        BinaryRequest::encode_get(&mut request, key, opaque);
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(Some(RawItem {
                key: key.to_vec(),
                flags: response.flags,
                cas: Some(response.cas),
                payload: response.value,
            })),
            Status::KeyNotFound => Ok(None),
            status => Err(Error::Status { status }),
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
        let (payload, flags) = self.pipeline.encode(value, true)?;
        let opcode = match (mode, noreply) {
            (StoreMode::Set, false) => Opcode::Set,
            (StoreMode::Set, true) => Opcode::SetQ,
            (StoreMode::Add, false) => Opcode::Add,
            (StoreMode::Add, true) => Opcode::AddQ,
            (StoreMode::Replace, false) => Opcode::Replace,
            (StoreMode::Replace, true) => Opcode::ReplaceQ,
        };
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(64 + key.len() + payload.len());
        BinaryRequest::encode_store(&mut request, opcode, key, &payload, flags, exptime, 0, opaque);
        if noreply {
            conn.send(&request).await?;
            return Ok(true);
        }
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(true),
            Status::KeyExists | Status::KeyNotFound | Status::ItemNotStored
                if mode != StoreMode::Set =>
            {
                Ok(false)
            }
            status => Err(Error::Status { status }),
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
        let (payload, flags) = self.pipeline.encode(value, true)?;
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(64 + key.len() + payload.len());
        BinaryRequest::encode_store(
            &mut request,
            Opcode::Set,
            key,
            &payload,
            flags,
            exptime,
            cas,
            opaque,
        );
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(CasOutcome::Stored),
            Status::KeyExists => Ok(CasOutcome::Exists),
            Status::KeyNotFound => Ok(CasOutcome::NotFound),
            status => Err(Error::Status { status }),
        }
    }

    pub async fn concat(
        &mut self,
        conn: &mut Connection,
        mode: ConcatMode,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool, Error> {
        let opcode = match mode {
            ConcatMode::Append => Opcode::Append,
            ConcatMode::Prepend => Opcode::Prepend,
        };
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(32 + key.len() + value.len());
        BinaryRequest::encode_concat(&mut request, opcode, key, value, opaque);
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(true),
            Status::ItemNotStored | Status::KeyNotFound => Ok(false),
            status => Err(Error::Status { status }),
        }
    }

    pub async fn counter(
        &mut self,
        conn: &mut Connection,
        op: CounterOp,
        key: &[u8],
        delta: u64,
    ) -> Result<Option<u64>, Error> {
        let opcode = match op {
            CounterOp::Incr => Opcode::Increment,
            CounterOp::Decr => Opcode::Decrement,
        };
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(48 + key.len());
        BinaryRequest::encode_counter(
            &mut request,
            opcode,
            key,
            delta,
            0,
            COUNTER_NO_AUTOCREATE,
            opaque,
        );
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(Some(response.counter_value()?)),
            Status::KeyNotFound => Ok(None),
            status => Err(Error::Status { status }),
        }
    }

    pub async fn delete(
        &mut self,
        conn: &mut Connection,
        key: &[u8],
        noreply: bool,
    ) -> Result<bool, Error> {
        let opcode = if noreply {
            Opcode::DeleteQ
        } else {
            Opcode::Delete
        };
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(32 + key.len());
        BinaryRequest::encode_delete(&mut request, opcode, key, opaque);
        if noreply {
            conn.send(&request).await?;
            return Ok(true);
        }
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(true),
            Status::KeyNotFound => Ok(false),
            status => Err(Error::Status { status }),
        }
    }

    pub async fn version(&mut self, conn: &mut Connection) -> Result<String, Error> {
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(24);
        BinaryRequest::encode_version(&mut request, opaque);
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(String::from_utf8_lossy(&response.value).into_owned()),
            status => Err(Error::Status { status }),
        }
    }

    pub async fn flush(&mut self, conn: &mut Connection) -> Result<(), Error> {
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(24);
        BinaryRequest::encode_flush(&mut request, opaque);
        let response = exchange(conn, &request, opaque).await?;
        match response.status {
            Status::NoError => Ok(()),
            status => Err(Error::Status { status }),
        }
    }

    /// One GETK per key, then a NOOP whose echo terminates the batch.
    pub fn plan_fetch(&mut self, keys: &[Vec<u8>]) -> FetchPlan {
        let mut request = Vec::with_capacity(keys.len() * 48 + 24);
        for key in keys {
            let opaque = self.next_opaque();
            BinaryRequest::encode_getk(&mut request, key, opaque);
        }
        let terminator = self.next_opaque();
        BinaryRequest::encode_noop(&mut request, terminator);
        FetchPlan {
            request,
            end: ExchangeEnd::Binary { opaque: terminator },
        }
    }

    pub fn plan_stats(&mut self, name: Option<&[u8]>) -> StatsPlan {
        let opaque = self.next_opaque();
        let mut request = Vec::with_capacity(32);
        BinaryRequest::encode_stat(&mut request, name, opaque);
        StatsPlan {
            request,
            end: ExchangeEnd::Binary { opaque },
        }
    }
}

/// Send one packet and read its matching response, discarding stale
/// packets (late errors from quiet operations) whose opaque does not
/// match.
async fn exchange(
    conn: &mut Connection,
    request: &[u8],
    opaque: u32,
) -> Result<BinaryResponse, Error> {
    conn.send(request).await?;
    loop {
        let response = conn.read_frame(BinaryResponse::parse).await?;
        if response.opaque == opaque {
            return Ok(response);
        }
        tracing::debug!(
            expected = opaque,
            received = response.opaque,
            "discarding stale response packet"
        );
    }
}

/// Drive one planned GETK+NOOP batch. Hits become items; misses and
/// per-key failures are dropped so sibling keys still resolve.
pub(super) async fn run_fetch(
    request: &[u8],
    terminator: u32,
    conn: &mut Connection,
) -> Result<Vec<RawItem>, Error> {
    conn.send(request).await?;
    let mut items = Vec::new();
    loop {
        let response = conn.read_frame(BinaryResponse::parse).await?;
        match response.opcode {
            Opcode::Noop if response.opaque == terminator => return Ok(items),
            Opcode::GetK | Opcode::GetKQ => match response.status {
                Status::NoError => items.push(RawItem {
                    key: response.key,
                    flags: response.flags,
                    cas: Some(response.cas),
                    payload: response.value,
                }),
                Status::KeyNotFound => {}
                status => {
                    tracing::debug!(status = status.as_u16(), "fetch branch key failed");
                }
            },
            _ => {
                tracing::debug!(opcode = ?response.opcode, "discarding stale response packet");
            }
        }
    }
}

/// Drive one planned STAT exchange: entries until the empty terminator.
pub(super) async fn run_stats(
    request: &[u8],
    opaque: u32,
    conn: &mut Connection,
) -> Result<Vec<(String, String)>, Error> {
    conn.send(request).await?;
    let mut stats = Vec::new();
    loop {
        let response = conn.read_frame(BinaryResponse::parse).await?;
        if response.opcode != Opcode::Stat || response.opaque != opaque {
            tracing::debug!(opcode = ?response.opcode, "discarding stale response packet");
            continue;
        }
        if !response.status.is_success() {
            return Err(Error::Status {
                status: response.status,
            });
        }
        if response.is_stat_end() {
            return Ok(stats);
        }
        stats.push((
            String::from_utf8_lossy(&response.key).into_owned(),
            String::from_utf8_lossy(&response.value).into_owned(),
        ));
    }
}
