//! Public client facade.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};

use mcproto::value::CacheValue;

use crate::command::{CasOutcome, Command, ConcatMode, CounterOp, Reply, ServerStats, StoreMode};
use crate::config::ClientConfig;
use crate::driver::Driver;
use crate::error::Error;

/// Handle to a memcached client.
///
/// Cheap to clone; all clones feed one FIFO command queue drained by a
/// single background task, so operations complete in submission order
/// regardless of which clone submitted them. Connections are opened
/// lazily, all at once, when the first command arrives.
///
/// Must be created inside a tokio runtime (the drain loop is spawned on
/// the current runtime).
///
/// ```no_run
/// use cacheline::{Client, ClientConfig};
///
/// # async fn example() -> Result<(), cacheline::Error> {
/// let config = ClientConfig::new(vec!["127.0.0.1:11211".parse().unwrap()]);
/// let client = Client::new(config)?;
/// client.set("greeting", "hello", 0).await?;
/// let value = client.get("greeting").await?;
/// assert_eq!(value.unwrap().as_raw(), Some(b"hello".as_slice()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    queue: mpsc::UnboundedSender<Command>,
}

impl Client {
    /// Build a client and spawn its drain loop.
    ///
    /// Fails if no servers are configured. Does not dial anything yet;
    /// the first command triggers the connect cycle.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        if config.servers.is_empty() {
            return Err(Error::NoServers);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Driver::new(&config, rx).run());
        Ok(Client { queue: tx })
    }

    async fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, Error> {
        let (reply, completion) = oneshot::channel();
        self.queue
            .send(build(reply))
            .map_err(|_| Error::ClientClosed)?;
        completion.await.map_err(|_| Error::ClientClosed)?
    }

    /// Fetch a key. `None` on cache miss.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<CacheValue>, Error> {
        let key = key.as_ref().to_vec();
        self.submit(|reply| Command::Get { key, reply }).await
    }

    /// Fetch a key together with its CAS token, for a later [`cas`](Client::cas).
    pub async fn gets(&self, key: impl AsRef<[u8]>) -> Result<Option<(CacheValue, u64)>, Error> {
        let key = key.as_ref().to_vec();
        self.submit(|reply| Command::GetCas { key, reply }).await
    }

    /// Fetch many keys in one command: one batched request per server,
    /// issued concurrently. Only hits appear in the map. An empty key
    /// list resolves immediately without any network exchange.
    pub async fn get_multi(
        &self,
        keys: impl IntoIterator<Item = impl AsRef<[u8]>>,
    ) -> Result<HashMap<Vec<u8>, CacheValue>, Error> {
        let keys: Vec<Vec<u8>> = keys.into_iter().map(|key| key.as_ref().to_vec()).collect();
        if keys.is_empty() {
            // Nothing to fetch; resolve without ever touching the queue
            // or the network.
            return Ok(HashMap::new());
        }
        self.submit(|reply| Command::GetMulti { keys, reply }).await
    }

    /// Store unconditionally. `exptime` is seconds (or a unix timestamp
    /// past 30 days), 0 means never expire.
    pub async fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
    ) -> Result<bool, Error> {
        self.store(StoreMode::Set, key, value, exptime, false).await
    }

    /// Store unconditionally without waiting for the server's verdict.
    /// Resolves once the request is written.
    pub async fn set_noreply(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
    ) -> Result<(), Error> {
        self.store(StoreMode::Set, key, value, exptime, true)
            .await
            .map(|_| ())
    }

    /// Store only if the key does not exist. Returns false if it does.
    pub async fn add(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
    ) -> Result<bool, Error> {
        self.store(StoreMode::Add, key, value, exptime, false).await
    }

    /// Store only if the key already exists. Returns false if it doesn't.
    pub async fn replace(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
    ) -> Result<bool, Error> {
        self.store(StoreMode::Replace, key, value, exptime, false)
            .await
    }

    async fn store(
        &self,
        mode: StoreMode,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
        noreply: bool,
    ) -> Result<bool, Error> {
        let key = key.as_ref().to_vec();
        let value = value.into();
        self.submit(|reply| Command::Store {
            mode,
            key,
            value,
            exptime,
            noreply,
            reply,
        })
        .await
    }

    /// Compare-and-swap: store only if the item is unchanged since the
    /// token was fetched with [`gets`](Client::gets).
    pub async fn cas(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<CacheValue>,
        exptime: u32,
        cas: u64,
    ) -> Result<CasOutcome, Error> {
        let key = key.as_ref().to_vec();
        let value = value.into();
        self.submit(|reply| Command::Cas {
            key,
            value,
            exptime,
            cas,
            reply,
        })
        .await
    }

    /// Append raw bytes to an existing value. Never compressed.
    pub async fn append(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<bool, Error> {
        self.concat(ConcatMode::Append, key, value).await
    }

    /// Prepend raw bytes to an existing value. Never compressed.
    pub async fn prepend(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<bool, Error> {
        self.concat(ConcatMode::Prepend, key, value).await
    }

    async fn concat(
        &self,
        mode: ConcatMode,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<bool, Error> {
        let key = key.as_ref().to_vec();
        let value = value.as_ref().to_vec();
        self.submit(|reply| Command::Concat {
            mode,
            key,
            value,
            reply,
        })
        .await
    }

    /// Increment a numeric value. `None` if the key does not exist; a
    /// non-numeric value is a per-command error.
    pub async fn incr(&self, key: impl AsRef<[u8]>, delta: u64) -> Result<Option<u64>, Error> {
        self.counter(CounterOp::Incr, key, delta).await
    }

    /// Decrement a numeric value (floored at zero by the server).
    pub async fn decr(&self, key: impl AsRef<[u8]>, delta: u64) -> Result<Option<u64>, Error> {
        self.counter(CounterOp::Decr, key, delta).await
    }

    async fn counter(
        &self,
        op: CounterOp,
        key: impl AsRef<[u8]>,
        delta: u64,
    ) -> Result<Option<u64>, Error> {
        let key = key.as_ref().to_vec();
        self.submit(|reply| Command::Counter {
            op,
            key,
            delta,
            reply,
        })
        .await
    }

    /// Delete a key. Returns false if it was not present.
    pub async fn delete(&self, key: impl AsRef<[u8]>) -> Result<bool, Error> {
        let key = key.as_ref().to_vec();
        self.submit(|reply| Command::Delete {
            key,
            noreply: false,
            reply,
        })
        .await
    }

    /// Delete without waiting for the server's verdict.
    pub async fn delete_noreply(&self, key: impl AsRef<[u8]>) -> Result<(), Error> {
        let key = key.as_ref().to_vec();
        self.submit(|reply| Command::Delete {
            key,
            noreply: true,
            reply,
        })
        .await
        .map(|_| ())
    }

    /// Fetch statistics from every connected server, optionally scoped
    /// to a named stats group (`items`, `slabs`, ...).
    pub async fn stats(&self, name: Option<&str>) -> Result<Vec<ServerStats>, Error> {
        let name = name.map(|name| name.as_bytes().to_vec());
        self.submit(|reply| Command::Stats { name, reply }).await
    }

    /// Version string of every connected server.
    pub async fn version(&self) -> Result<Vec<(SocketAddr, String)>, Error> {
        self.submit(|reply| Command::Version { reply }).await
    }

    /// Invalidate every item on every connected server.
    pub async fn flush_all(&self) -> Result<(), Error> {
        self.submit(|reply| Command::FlushAll { reply }).await
    }

    /// Drop every connection and run a fresh connect cycle. This is the
    /// only recovery path for servers whose connections were discarded;
    /// the client never reconnects on its own.
    pub async fn reconnect(&self) -> Result<(), Error> {
        self.submit(|reply| Command::Reconnect { reply }).await
    }
}
