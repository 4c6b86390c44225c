//! ASCII protocol exchanges.

use mcproto::text::{Request, Response, StoreVerb};
use mcproto::value::{CacheValue, ValuePipeline};

use crate::command::{CasOutcome, ConcatMode, CounterOp, StoreMode};
use crate::connection::Connection;
use crate::error::Error;

use super::{ExchangeEnd, FetchPlan, RawItem, StatsPlan};

pub(crate) struct TextCodec {
    pipeline: ValuePipeline,
}

impl TextCodec {
    pub fn new(pipeline: ValuePipeline) -> Self {
        TextCodec { pipeline }
    }

    pub fn pipeline(&self) -> &ValuePipeline {
        &self.pipeline
    }

    /// Send a request and read one response, mapping error lines to
    /// [`Error::Server`].
    async fn exchange(
        &self,
        conn: &mut Connection,
        request: &Request<'_>,
    ) -> Result<Response, Error> {
        conn.send(&request.to_bytes()).await?;
        if request.is_noreply() {
            return Ok(Response::Ok);
        }
        let response = conn.read_frame(Response::parse).await?;
        reject_error(response)
    }

    pub async fn get(
        &self,
        conn: &mut Connection,
        key: &[u8],
        want_cas: bool,
    ) -> Result<Option<RawItem>, Error> {
        let keys: [&[u8]; 1] = [key];
        let request = if want_cas {
            Request::gets(&keys)
        } else {
            Request::get(&keys)
        };
        match self.exchange(conn, &request).await? {
            Response::Values(values) => Ok(values.into_iter().next().map(raw_item)),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn store(
        &self,
        conn: &mut Connection,
        mode: StoreMode,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        noreply: bool,
    ) -> Result<bool, Error> {
        let (payload, flags) = self.pipeline.encode(value, true)?;
        let verb = match mode {
            StoreMode::Set => StoreVerb::Set,
            StoreMode::Add => StoreVerb::Add,
            StoreMode::Replace => StoreVerb::Replace,
        };
        let mut request = Request::store(verb, key, &payload, flags, exptime);
        if noreply {
            request = request.noreply();
        }
        match self.exchange(conn, &request).await? {
            Response::Ok if noreply => Ok(true),
            Response::Stored => Ok(true),
            Response::NotStored | Response::Exists | Response::NotFound => Ok(false),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn cas(
        &self,
        conn: &mut Connection,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        cas: u64,
    ) -> Result<CasOutcome, Error> {
        let (payload, flags) = self.pipeline.encode(value, true)?;
        let request = Request::Cas {
            key,
            value: &payload,
            flags,
            exptime,
            cas,
            noreply: false,
        };
        match self.exchange(conn, &request).await? {
            Response::Stored => Ok(CasOutcome::Stored),
            Response::Exists => Ok(CasOutcome::Exists),
            Response::NotFound => Ok(CasOutcome::NotFound),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn concat(
        &self,
        conn: &mut Connection,
        mode: ConcatMode,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool, Error> {
        let verb = match mode {
            ConcatMode::Append => StoreVerb::Append,
            ConcatMode::Prepend => StoreVerb::Prepend,
        };
        // Concatenation bypasses the pipeline entirely: raw bytes, zero
        // flags, and never compressed.
        let request = Request::store(verb, key, value, 0, 0);
        match self.exchange(conn, &request).await? {
            Response::Stored => Ok(true),
            Response::NotStored => Ok(false),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn counter(
        &self,
        conn: &mut Connection,
        op: CounterOp,
        key: &[u8],
        delta: u64,
    ) -> Result<Option<u64>, Error> {
        let request = match op {
            CounterOp::Incr => Request::incr(key, delta),
            CounterOp::Decr => Request::decr(key, delta),
        };
        match self.exchange(conn, &request).await? {
            Response::Numeric(value) => Ok(Some(value)),
            Response::NotFound => Ok(None),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn delete(
        &self,
        conn: &mut Connection,
        key: &[u8],
        noreply: bool,
    ) -> Result<bool, Error> {
        let mut request = Request::delete(key);
        if noreply {
            request = request.noreply();
        }
        match self.exchange(conn, &request).await? {
            Response::Ok if noreply => Ok(true),
            Response::Deleted => Ok(true),
            Response::NotFound => Ok(false),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn version(&self, conn: &mut Connection) -> Result<String, Error> {
        match self.exchange(conn, &Request::Version).await? {
            Response::Version(v) => Ok(String::from_utf8_lossy(&v).into_owned()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub async fn flush(&self, conn: &mut Connection) -> Result<(), Error> {
        match self.exchange(conn, &Request::FlushAll).await? {
            Response::Ok => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    pub fn plan_fetch(&self, keys: &[Vec<u8>]) -> FetchPlan {
        let borrowed: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        FetchPlan {
            request: Request::get(&borrowed).to_bytes(),
            end: ExchangeEnd::TextEnd,
        }
    }

    pub fn plan_stats(&self, name: Option<&[u8]>) -> StatsPlan {
        StatsPlan {
            request: Request::stats(name).to_bytes(),
            end: ExchangeEnd::TextEnd,
        }
    }
}

/// Drive one planned multi-key fetch: a single `get` line, drained to
/// `END` by the response parser.
pub(super) async fn run_fetch(request: &[u8], conn: &mut Connection) -> Result<Vec<RawItem>, Error> {
    conn.send(request).await?;
    match reject_error(conn.read_frame(Response::parse).await?)? {
        Response::Values(values) => Ok(values.into_iter().map(raw_item).collect()),
        _ => Err(Error::UnexpectedResponse),
    }
}

/// Drive one planned stats exchange, drained to `END`.
pub(super) async fn run_stats(
    request: &[u8],
    conn: &mut Connection,
) -> Result<Vec<(String, String)>, Error> {
    conn.send(request).await?;
    match reject_error(conn.read_frame(Response::parse).await?)? {
        Response::Stats(stats) => Ok(stats
            .into_iter()
            .map(|stat| {
                (
                    String::from_utf8_lossy(&stat.name).into_owned(),
                    String::from_utf8_lossy(&stat.value).into_owned(),
                )
            })
            .collect()),
        // A server with nothing to report sends a bare END, which parses
        // as an empty fetch.
        Response::Values(values) if values.is_empty() => Ok(Vec::new()),
        _ => Err(Error::UnexpectedResponse),
    }
}

fn reject_error(response: Response) -> Result<Response, Error> {
    match response {
        Response::Error => Err(Error::Server("ERROR".into())),
        Response::ClientError(msg) => Err(Error::Server(format!(
            "CLIENT_ERROR {}",
            String::from_utf8_lossy(&msg)
        ))),
        Response::ServerError(msg) => Err(Error::Server(format!(
            "SERVER_ERROR {}",
            String::from_utf8_lossy(&msg)
        ))),
        other => Ok(other),
    }
}

fn raw_item(value: mcproto::text::Value) -> RawItem {
    RawItem {
        key: value.key,
        payload: value.data,
        flags: value.flags,
        cas: value.cas,
    }
}
