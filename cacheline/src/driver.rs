//! The drain loop.
//!
//! One task owns the registry, the distributor, the connection pool, and
//! the codec. Commands arrive over the queue channel in submission order
//! and execute strictly one at a time; concurrency exists only inside a
//! command, where per-server fan-out branches are joined by a
//! [`JoinBarrier`] before the next command may start.
//!
//! State machine: `Disconnected -> Connecting -> Idle <-> Executing`.
//! The first command to arrive while `Disconnected` triggers one connect
//! cycle that dials every server concurrently and populates the pool all
//! at once. The single-consumer queue makes a duplicate connect storm
//! structurally impossible; the state is still tracked and asserted.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mcproto::value::CacheValue;
use modhash::Distributor;

use crate::barrier::JoinBarrier;
use crate::codec::{Codec, RawItem};
use crate::command::{CasOutcome, Command, ConcatMode, CounterOp, ServerStats, StoreMode};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::metrics;
use crate::pool::ConnectionPool;
use crate::registry::ServerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Disconnected,
    Connecting,
    Idle,
    Executing,
}

pub(crate) struct Driver {
    registry: ServerRegistry,
    distributor: Distributor,
    pool: ConnectionPool,
    codec: Codec,
    queue: mpsc::UnboundedReceiver<Command>,
    state: DriverState,
}

impl Driver {
    pub fn new(config: &ClientConfig, queue: mpsc::UnboundedReceiver<Command>) -> Self {
        Driver {
            registry: ServerRegistry::new(config.servers.clone()),
            distributor: Distributor::new(),
            pool: ConnectionPool::new(config.servers.len()),
            codec: Codec::new(config.protocol, config.pipeline()),
            queue,
            state: DriverState::Disconnected,
        }
    }

    /// Dequeue and execute commands until every client handle is gone.
    ///
    /// Commands still queued at shutdown are dropped with their reply
    /// senders; callers observe `ClientClosed`.
    pub async fn run(mut self) {
        while let Some(command) = self.queue.recv().await {
            if self.state == DriverState::Disconnected {
                self.connect_cycle().await;
            }
            self.state = DriverState::Executing;
            debug!(command = command.name(), "executing");
            metrics::COMMANDS.increment();
            self.execute(command).await;
            self.state = DriverState::Idle;
        }
        debug!("command queue closed; drain loop stopping");
    }

    /// Dial every registered server concurrently and populate the pool
    /// all at once behind the join barrier. A failed dial leaves its
    /// slot empty; commands routed there fail until the next cycle.
    async fn connect_cycle(&mut self) {
        debug_assert_eq!(self.state, DriverState::Disconnected);
        self.state = DriverState::Connecting;
        debug!(servers = self.registry.len(), "connect cycle starting");

        let barrier = JoinBarrier::new();
        let mut attempts = Vec::with_capacity(self.registry.len());
        for (index, addr) in self.registry.iter().enumerate() {
            barrier.register();
            let barrier = &barrier;
            attempts.push(async move {
                let result = Connection::open(addr).await;
                barrier.complete();
                (index, addr, result)
            });
        }
        let results = join_all(attempts).await;
        barrier.done().await;

        for (index, addr, result) in results {
            match result {
                Ok(connection) => self.pool.install(index, connection),
                Err(error) => {
                    metrics::CONNECT_FAILURES.increment();
                    warn!(%addr, %error, "connect failed");
                }
            }
        }
        debug!(
            connected = self.pool.connected_count(),
            "connect cycle finished"
        );
        self.state = DriverState::Idle;
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Get { key, reply } => {
                let result = match self.fetch_one(&key, false).await {
                    Ok(None) => Ok(None),
                    Ok(Some(item)) => self.codec.decode_value(&item).map(Some),
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            Command::GetCas { key, reply } => {
                let result = match self.fetch_one(&key, true).await {
                    Ok(None) => Ok(None),
                    Ok(Some(item)) => match item.cas {
                        Some(cas) => self
                            .codec
                            .decode_value(&item)
                            .map(|value| Some((value, cas))),
                        None => Err(Error::UnexpectedResponse),
                    },
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            Command::GetMulti { keys, reply } => {
                let _ = reply.send(self.get_multi(keys).await);
            }
            Command::Store {
                mode,
                key,
                value,
                exptime,
                noreply,
                reply,
            } => {
                let _ = reply.send(self.store(mode, &key, &value, exptime, noreply).await);
            }
            Command::Cas {
                key,
                value,
                exptime,
                cas,
                reply,
            } => {
                let _ = reply.send(self.cas(&key, &value, exptime, cas).await);
            }
            Command::Concat {
                mode,
                key,
                value,
                reply,
            } => {
                let _ = reply.send(self.concat(mode, &key, &value).await);
            }
            Command::Counter {
                op,
                key,
                delta,
                reply,
            } => {
                let _ = reply.send(self.counter(op, &key, delta).await);
            }
            Command::Delete {
                key,
                noreply,
                reply,
            } => {
                let _ = reply.send(self.delete(&key, noreply).await);
            }
            Command::Stats { name, reply } => {
                let _ = reply.send(self.stats(name.as_deref()).await);
            }
            Command::Version { reply } => {
                let _ = reply.send(self.version().await);
            }
            Command::FlushAll { reply } => {
                let _ = reply.send(self.flush_all().await);
            }
            Command::Reconnect { reply } => {
                self.pool.clear();
                self.state = DriverState::Disconnected;
                self.connect_cycle().await;
                self.state = DriverState::Executing;
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn route(&self, key: &[u8]) -> usize {
        self.distributor.server_index(key, self.registry.len())
    }

    /// Inspect a finished exchange: connection-class failures discard the
    /// connection (no reconnect), framing failures are counted but leave
    /// the connection installed.
    fn after_exchange<T>(&mut self, index: usize, result: &Result<T, Error>) {
        match result {
            Err(error) if error.is_connection_fatal() => {
                metrics::CONNECTIONS_DROPPED.increment();
                warn!(addr = %self.registry.get(index), %error, "discarding connection");
                self.pool.discard(index);
            }
            Err(Error::Protocol(_)) | Err(Error::UnexpectedResponse) => {
                metrics::PROTOCOL_ERRORS.increment();
            }
            _ => {}
        }
    }

    // ── Single-server operations ────────────────────────────────────

    async fn fetch_one(&mut self, key: &[u8], want_cas: bool) -> Result<Option<RawItem>, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self.codec.get(conn, key, want_cas).await;
        self.after_exchange(index, &result);
        result
    }

    async fn store(
        &mut self,
        mode: StoreMode,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        noreply: bool,
    ) -> Result<bool, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self
            .codec
            .store(conn, mode, key, value, exptime, noreply)
            .await;
        self.after_exchange(index, &result);
        result
    }

    async fn cas(
        &mut self,
        key: &[u8],
        value: &CacheValue,
        exptime: u32,
        cas: u64,
    ) -> Result<CasOutcome, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self.codec.cas(conn, key, value, exptime, cas).await;
        self.after_exchange(index, &result);
        result
    }

    async fn concat(&mut self, mode: ConcatMode, key: &[u8], value: &[u8]) -> Result<bool, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self.codec.concat(conn, mode, key, value).await;
        self.after_exchange(index, &result);
        result
    }

    async fn counter(
        &mut self,
        op: CounterOp,
        key: &[u8],
        delta: u64,
    ) -> Result<Option<u64>, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self.codec.counter(conn, op, key, delta).await;
        self.after_exchange(index, &result);
        result
    }

    async fn delete(&mut self, key: &[u8], noreply: bool) -> Result<bool, Error> {
        let index = self.route(key);
        let addr = self.registry.get(index);
        let Some(conn) = self.pool.get_mut(index) else {
            return Err(Error::ServerUnavailable { addr });
        };
        let result = self.codec.delete(conn, key, noreply).await;
        self.after_exchange(index, &result);
        result
    }

    // ── Fan-out operations ──────────────────────────────────────────

    /// Batched multi-key fetch: group keys by server index, issue one
    /// batched request per server, run the branches concurrently, join
    /// on the barrier, then decode.
    ///
    /// A failed branch drops only its own keys from the result; the
    /// command errors only when every branch failed. An empty key list
    /// resolves immediately without touching the network.
    async fn get_multi(
        &mut self,
        keys: Vec<Vec<u8>>,
    ) -> Result<HashMap<Vec<u8>, CacheValue>, Error> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let server_count = self.registry.len();
        let mut groups: BTreeMap<usize, Vec<Vec<u8>>> = BTreeMap::new();
        for key in keys {
            groups
                .entry(self.distributor.server_index(&key, server_count))
                .or_default()
                .push(key);
        }

        // Plan on this task (the opaque counter lives here), then run
        // the branches concurrently on connections taken out of the pool.
        let mut branches = Vec::with_capacity(groups.len());
        for (index, group) in &groups {
            let plan = self.codec.plan_fetch(group);
            branches.push((*index, plan, self.pool.take(*index)));
        }

        let barrier = JoinBarrier::new();
        let registry = &self.registry;
        let branch_futures: Vec<_> = branches
            .iter_mut()
            .map(|(index, plan, slot)| {
                barrier.register();
                let barrier = &barrier;
                let addr = registry.get(*index);
                async move {
                    let result = match slot.as_mut() {
                        Some(conn) => plan.run(conn).await,
                        None => Err(Error::ServerUnavailable { addr }),
                    };
                    barrier.complete();
                    result
                }
            })
            .collect();
        let outcomes = join_all(branch_futures).await;
        barrier.done().await;

        let mut map = HashMap::new();
        let mut first_error = None;
        let mut any_ok = false;
        for ((index, _plan, slot), outcome) in branches.into_iter().zip(outcomes) {
            match outcome {
                Ok(items) => {
                    any_ok = true;
                    if let Some(conn) = slot {
                        self.pool.install(index, conn);
                    }
                    for item in items {
                        match self.codec.decode_value(&item) {
                            Ok(value) => {
                                map.insert(item.key, value);
                            }
                            Err(error) => {
                                metrics::PROTOCOL_ERRORS.increment();
                                warn!(%error, "dropping value that failed to decode");
                            }
                        }
                    }
                }
                Err(error) => {
                    self.settle_failed_branch(index, slot, &error);
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) if !any_ok => Err(error),
            _ => Ok(map),
        }
    }

    /// Stats fan-out across every registered server.
    async fn stats(&mut self, name: Option<&[u8]>) -> Result<Vec<ServerStats>, Error> {
        let mut branches = Vec::with_capacity(self.registry.len());
        for index in 0..self.registry.len() {
            let plan = self.codec.plan_stats(name);
            branches.push((index, plan, self.pool.take(index)));
        }

        let barrier = JoinBarrier::new();
        let registry = &self.registry;
        let branch_futures: Vec<_> = branches
            .iter_mut()
            .map(|(index, plan, slot)| {
                barrier.register();
                let barrier = &barrier;
                let addr = registry.get(*index);
                async move {
                    let result = match slot.as_mut() {
                        Some(conn) => plan.run(conn).await,
                        None => Err(Error::ServerUnavailable { addr }),
                    };
                    barrier.complete();
                    result
                }
            })
            .collect();
        let outcomes = join_all(branch_futures).await;
        barrier.done().await;

        let mut servers = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;
        for ((index, _plan, slot), outcome) in branches.into_iter().zip(outcomes) {
            match outcome {
                Ok(stats) => {
                    any_ok = true;
                    if let Some(conn) = slot {
                        self.pool.install(index, conn);
                    }
                    servers.push(ServerStats {
                        server: self.registry.get(index),
                        stats: stats.into_iter().collect(),
                    });
                }
                Err(error) => {
                    self.settle_failed_branch(index, slot, &error);
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) if !any_ok => Err(error),
            _ => Ok(servers),
        }
    }

    /// Bookkeeping for a failed fan-out branch: fatal errors drop the
    /// taken connection, anything else puts it back.
    fn settle_failed_branch(&mut self, index: usize, slot: Option<Connection>, error: &Error) {
        if error.is_connection_fatal() {
            metrics::CONNECTIONS_DROPPED.increment();
            warn!(addr = %self.registry.get(index), %error, "discarding connection");
            // slot dropped here
        } else {
            if matches!(error, Error::Protocol(_) | Error::UnexpectedResponse) {
                metrics::PROTOCOL_ERRORS.increment();
            }
            if let Some(conn) = slot {
                self.pool.install(index, conn);
            }
        }
    }

    // ── Whole-pool operations ───────────────────────────────────────

    async fn version(&mut self) -> Result<Vec<(SocketAddr, String)>, Error> {
        let mut versions = Vec::new();
        for index in self.pool.connected_indices() {
            let addr = self.registry.get(index);
            let Some(conn) = self.pool.get_mut(index) else {
                continue;
            };
            let result = self.codec.version(conn).await;
            self.after_exchange(index, &result);
            versions.push((addr, result?));
        }
        Ok(versions)
    }

    async fn flush_all(&mut self) -> Result<(), Error> {
        for index in self.pool.connected_indices() {
            let Some(conn) = self.pool.get_mut(index) else {
                continue;
            };
            let result = self.codec.flush(conn).await;
            self.after_exchange(index, &result);
            result?;
        }
        Ok(())
    }
}
