//! In-process mock memcached server.
//!
//! Speaks both wire protocols through the same `mcproto` types the
//! client uses, over a shared in-memory item table. Enough semantics for
//! the integration suite: conditional stores, CAS, counters with the
//! text protocol's non-numeric error, stats, and quiet/noreply handling.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};

use cacheline::Protocol;
use mcproto::binary::{BinaryCommand, Opcode, ResponseWriter, Status};
use mcproto::text::{Command, Response, Stat, StoreKind, Value};

#[derive(Clone)]
struct Item {
    flags: u32,
    data: Vec<u8>,
    cas: u64,
}

#[derive(Default)]
pub struct MockState {
    items: Mutex<HashMap<Vec<u8>, Item>>,
    cas_counter: AtomicU64,
    /// Connections accepted since start.
    pub accepted: AtomicUsize,
    /// Batched fetches served: text `get`/`gets` lines, binary NOOP
    /// batch terminators.
    pub fetch_batches: AtomicUsize,
    /// Artificial latency applied to store commands, for ordering tests.
    pub store_delay_ms: AtomicU64,
    kill: Notify,
}

impl MockState {
    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn store_delay(&self) {
        let ms = self.store_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockServer {
    pub async fn start(protocol: Protocol) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                let conn_state = accept_state.clone();
                tokio::spawn(async move {
                    match protocol {
                        Protocol::Text => serve_text(socket, conn_state).await,
                        Protocol::Binary => serve_binary(socket, conn_state).await,
                    }
                });
            }
        });
        MockServer { addr, state }
    }

    /// Drop every established connection; the listener keeps accepting,
    /// so a later reconnect cycle succeeds.
    pub fn kill_connections(&self) {
        self.state.kill.notify_waiters();
    }

    pub async fn item_count(&self) -> usize {
        self.state.items.lock().await.len()
    }
}

async fn serve_text(mut socket: TcpStream, state: Arc<MockState>) {
    let mut buf = BytesMut::with_capacity(16 * 1024);
    loop {
        loop {
            if buf.is_empty() {
                break;
            }
            match Command::parse(&buf) {
                Ok((command, consumed)) => {
                    buf.advance(consumed);
                    let mut out = Vec::new();
                    let quit = handle_text(&state, command, &mut out).await;
                    if !out.is_empty() && socket.write_all(&out).await.is_err() {
                        return;
                    }
                    if quit {
                        return;
                    }
                }
                Err(error) if error.is_incomplete() => break,
                Err(_) => {
                    let mut out = Vec::new();
                    Response::Error.encode(&mut out);
                    let _ = socket.write_all(&out).await;
                    return;
                }
            }
        }
        tokio::select! {
            _ = state.kill.notified() => return,
            read = socket.read_buf(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

async fn handle_text(state: &MockState, command: Command, out: &mut Vec<u8>) -> bool {
    match command {
        Command::Get { keys } => {
            state.fetch_batches.fetch_add(1, Ordering::SeqCst);
            text_values(state, &keys, false).await.encode(out);
        }
        Command::Gets { keys } => {
            state.fetch_batches.fetch_add(1, Ordering::SeqCst);
            text_values(state, &keys, true).await.encode(out);
        }
        Command::Store {
            kind,
            key,
            flags,
            exptime: _,
            data,
            noreply,
        } => {
            state.store_delay().await;
            let response = {
                let mut items = state.items.lock().await;
                let exists = items.contains_key(&key);
                let stored = match kind {
                    StoreKind::Set => true,
                    StoreKind::Add => !exists,
                    StoreKind::Replace => exists,
                    StoreKind::Append | StoreKind::Prepend => exists,
                };
                if stored {
                    match kind {
                        StoreKind::Append => {
                            let item = items.get_mut(&key).unwrap();
                            item.data.extend_from_slice(&data);
                            item.cas = state.next_cas();
                        }
                        StoreKind::Prepend => {
                            let item = items.get_mut(&key).unwrap();
                            let mut joined = data;
                            joined.extend_from_slice(&item.data);
                            item.data = joined;
                            item.cas = state.next_cas();
                        }
                        _ => {
                            items.insert(
                                key,
                                Item {
                                    flags,
                                    data,
                                    cas: state.next_cas(),
                                },
                            );
                        }
                    }
                    Response::Stored
                } else {
                    Response::NotStored
                }
            };
            if !noreply {
                response.encode(out);
            }
        }
        Command::Cas {
            key,
            flags,
            exptime: _,
            cas,
            data,
            noreply,
        } => {
            state.store_delay().await;
            let response = {
                let mut items = state.items.lock().await;
                match items.get_mut(&key) {
                    None => Response::NotFound,
                    Some(item) if item.cas != cas => Response::Exists,
                    Some(item) => {
                        item.flags = flags;
                        item.data = data;
                        item.cas = state.next_cas();
                        Response::Stored
                    }
                }
            };
            if !noreply {
                response.encode(out);
            }
        }
        Command::Incr {
            key,
            delta,
            noreply,
        } => {
            let response = text_counter(state, &key, delta, true).await;
            if !noreply {
                response.encode(out);
            }
        }
        Command::Decr {
            key,
            delta,
            noreply,
        } => {
            let response = text_counter(state, &key, delta, false).await;
            if !noreply {
                response.encode(out);
            }
        }
        Command::Delete { key, noreply } => {
            let removed = state.items.lock().await.remove(&key).is_some();
            if !noreply {
                let response = if removed {
                    Response::Deleted
                } else {
                    Response::NotFound
                };
                response.encode(out);
            }
        }
        Command::Stats { name } => {
            let mut stats = vec![
                Stat {
                    name: b"curr_items".to_vec(),
                    value: state
                        .items
                        .lock()
                        .await
                        .len()
                        .to_string()
                        .into_bytes(),
                },
                Stat {
                    name: b"threads".to_vec(),
                    value: b"1".to_vec(),
                },
            ];
            if let Some(group) = name {
                stats.push(Stat {
                    name: b"group".to_vec(),
                    value: group,
                });
            }
            Response::Stats(stats).encode(out);
        }
        Command::Version => Response::Version(b"1.6.21-mock".to_vec()).encode(out),
        Command::FlushAll => {
            state.items.lock().await.clear();
            Response::Ok.encode(out);
        }
        Command::Quit => return true,
    }
    false
}

async fn text_values(state: &MockState, keys: &[Vec<u8>], with_cas: bool) -> Response {
    let items = state.items.lock().await;
    let values = keys
        .iter()
        .filter_map(|key| {
            items.get(key).map(|item| Value {
                key: key.clone(),
                flags: item.flags,
                data: item.data.clone(),
                cas: with_cas.then_some(item.cas),
            })
        })
        .collect();
    Response::Values(values)
}

async fn text_counter(state: &MockState, key: &[u8], delta: u64, incr: bool) -> Response {
    let mut items = state.items.lock().await;
    let Some(item) = items.get_mut(key) else {
        return Response::NotFound;
    };
    let Some(current) = std::str::from_utf8(&item.data)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
    else {
        return Response::ClientError(
            b"cannot increment or decrement non-numeric value".to_vec(),
        );
    };
    let next = if incr {
        current.wrapping_add(delta)
    } else {
        current.saturating_sub(delta)
    };
    item.data = next.to_string().into_bytes();
    item.cas = state.next_cas();
    Response::Numeric(next)
}

async fn serve_binary(mut socket: TcpStream, state: Arc<MockState>) {
    let mut buf = BytesMut::with_capacity(16 * 1024);
    loop {
        loop {
            if buf.is_empty() {
                break;
            }
            match BinaryCommand::parse(&buf) {
                Ok((command, consumed)) => {
                    buf.advance(consumed);
                    let mut out = Vec::new();
                    let quit = handle_binary(&state, command, &mut out).await;
                    if !out.is_empty() && socket.write_all(&out).await.is_err() {
                        return;
                    }
                    if quit {
                        return;
                    }
                }
                Err(error) if error.is_incomplete() => break,
                Err(_) => return,
            }
        }
        tokio::select! {
            _ = state.kill.notified() => return,
            read = socket.read_buf(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

async fn handle_binary(state: &MockState, command: BinaryCommand, out: &mut Vec<u8>) -> bool {
    match command {
        BinaryCommand::Fetch { opcode, key, opaque } => {
            let items = state.items.lock().await;
            let quiet = opcode.is_quiet();
            let echo_key = matches!(opcode, Opcode::GetK | Opcode::GetKQ);
            match items.get(&key) {
                Some(item) => ResponseWriter::value(
                    out,
                    opcode,
                    opaque,
                    item.cas,
                    item.flags,
                    echo_key.then_some(key.as_slice()),
                    &item.data,
                ),
                None if quiet => {}
                None => ResponseWriter::status(out, opcode, opaque, Status::KeyNotFound),
            }
        }
        BinaryCommand::Store {
            opcode,
            key,
            value,
            flags,
            exptime: _,
            cas,
            opaque,
        } => {
            state.store_delay().await;
            let quiet = opcode.is_quiet();
            let mut items = state.items.lock().await;
            let exists = items.contains_key(&key);
            let failure = match opcode {
                _ if cas != 0 => match items.get(&key) {
                    None => Some(Status::KeyNotFound),
                    Some(item) if item.cas != cas => Some(Status::KeyExists),
                    Some(_) => None,
                },
                Opcode::Add | Opcode::AddQ if exists => Some(Status::KeyExists),
                Opcode::Replace | Opcode::ReplaceQ if !exists => Some(Status::KeyNotFound),
                _ => None,
            };
            match failure {
                Some(status) => ResponseWriter::status(out, opcode, opaque, status),
                None => {
                    let new_cas = state.next_cas();
                    items.insert(
                        key,
                        Item {
                            flags,
                            data: value,
                            cas: new_cas,
                        },
                    );
                    if !quiet {
                        ResponseWriter::success(out, opcode, opaque, new_cas);
                    }
                }
            }
        }
        BinaryCommand::Concat {
            opcode,
            key,
            value,
            opaque,
        } => {
            let quiet = opcode.is_quiet();
            let mut items = state.items.lock().await;
            match items.get_mut(&key) {
                None => ResponseWriter::status(out, opcode, opaque, Status::ItemNotStored),
                Some(item) => {
                    if matches!(opcode, Opcode::Append | Opcode::AppendQ) {
                        item.data.extend_from_slice(&value);
                    } else {
                        let mut joined = value;
                        joined.extend_from_slice(&item.data);
                        item.data = joined;
                    }
                    item.cas = state.next_cas();
                    if !quiet {
                        ResponseWriter::success(out, opcode, opaque, item.cas);
                    }
                }
            }
        }
        BinaryCommand::Counter {
            opcode,
            key,
            delta,
            initial,
            exptime,
            opaque,
        } => {
            let mut items = state.items.lock().await;
            let incr = matches!(opcode, Opcode::Increment | Opcode::IncrementQ);
            let current = items.get(&key).map(|item| {
                std::str::from_utf8(&item.data)
                    .ok()
                    .and_then(|text| text.parse::<u64>().ok())
            });
            let next = match current {
                None if exptime == 0xFFFF_FFFF => {
                    ResponseWriter::status(out, opcode, opaque, Status::KeyNotFound);
                    return false;
                }
                None => {
                    items.insert(
                        key,
                        Item {
                            flags: 0,
                            data: initial.to_string().into_bytes(),
                            cas: state.next_cas(),
                        },
                    );
                    initial
                }
                Some(None) => {
                    ResponseWriter::status(out, opcode, opaque, Status::NonNumericValue);
                    return false;
                }
                Some(Some(current)) => {
                    let next = if incr {
                        current.wrapping_add(delta)
                    } else {
                        current.saturating_sub(delta)
                    };
                    let item = items.get_mut(&key).expect("checked above");
                    item.data = next.to_string().into_bytes();
                    item.cas = state.next_cas();
                    next
                }
            };
            if !opcode.is_quiet() {
                ResponseWriter::counter(out, opcode, opaque, state.next_cas(), next);
            }
        }
        BinaryCommand::Delete { opcode, key, opaque } => {
            let removed = state.items.lock().await.remove(&key).is_some();
            let quiet = opcode.is_quiet();
            if removed {
                if !quiet {
                    ResponseWriter::success(out, opcode, opaque, 0);
                }
            } else {
                // Errors are sent even for the quiet variant.
                ResponseWriter::status(out, opcode, opaque, Status::KeyNotFound);
            }
        }
        BinaryCommand::Stat { name, opaque } => {
            let count = state.items.lock().await.len().to_string();
            ResponseWriter::stat(out, opaque, b"curr_items", count.as_bytes());
            ResponseWriter::stat(out, opaque, b"threads", b"1");
            if let Some(group) = name {
                ResponseWriter::stat(out, opaque, b"group", &group);
            }
            ResponseWriter::stat_end(out, opaque);
        }
        BinaryCommand::Noop { opaque } => {
            state.fetch_batches.fetch_add(1, Ordering::SeqCst);
            ResponseWriter::success(out, Opcode::Noop, opaque, 0);
        }
        BinaryCommand::Version { opaque } => {
            ResponseWriter::version(out, opaque, b"1.6.21-mock");
        }
        BinaryCommand::Flush { opcode, opaque } => {
            state.items.lock().await.clear();
            if !opcode.is_quiet() {
                ResponseWriter::success(out, opcode, opaque, 0);
            }
        }
        BinaryCommand::Quit { opcode, opaque } => {
            if !opcode.is_quiet() {
                ResponseWriter::success(out, opcode, opaque, 0);
            }
            return true;
        }
    }
    false
}
