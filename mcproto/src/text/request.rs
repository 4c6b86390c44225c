//! Client-side request encoding for the ASCII protocol.

use std::io::Write;

/// The storage verb for [`Request::Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreVerb {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            StoreVerb::Set => b"set",
            StoreVerb::Add => b"add",
            StoreVerb::Replace => b"replace",
            StoreVerb::Append => b"append",
            StoreVerb::Prepend => b"prepend",
        }
    }
}

/// An ASCII protocol request.
///
/// Borrows keys and values from the caller; [`encode`](Request::encode)
/// appends the wire form to a buffer.
#[derive(Debug, Clone)]
pub enum Request<'a> {
    /// `get <k1> <k2> ...\r\n` - one line fetches any number of keys.
    Get { keys: &'a [&'a [u8]] },
    /// `gets <k1> ...\r\n` - like `get` but responses carry CAS tokens.
    Gets { keys: &'a [&'a [u8]] },
    /// `<verb> <key> <flags> <exptime> <bytes> [noreply]\r\n<data>\r\n`
    Store {
        verb: StoreVerb,
        key: &'a [u8],
        value: &'a [u8],
        flags: u32,
        exptime: u32,
        noreply: bool,
    },
    /// `cas <key> <flags> <exptime> <bytes> <cas> [noreply]\r\n<data>\r\n`
    Cas {
        key: &'a [u8],
        value: &'a [u8],
        flags: u32,
        exptime: u32,
        cas: u64,
        noreply: bool,
    },
    /// `incr <key> <delta> [noreply]\r\n`
    Incr {
        key: &'a [u8],
        delta: u64,
        noreply: bool,
    },
    /// `decr <key> <delta> [noreply]\r\n`
    Decr {
        key: &'a [u8],
        delta: u64,
        noreply: bool,
    },
    /// `delete <key> [noreply]\r\n`
    Delete { key: &'a [u8], noreply: bool },
    /// `stats\r\n` or `stats <name>\r\n`
    Stats { name: Option<&'a [u8]> },
    /// `version\r\n`
    Version,
    /// `flush_all\r\n`
    FlushAll,
    /// `quit\r\n`
    Quit,
}

impl<'a> Request<'a> {
    #[inline]
    pub fn get(keys: &'a [&'a [u8]]) -> Self {
        Request::Get { keys }
    }

    #[inline]
    pub fn gets(keys: &'a [&'a [u8]]) -> Self {
        Request::Gets { keys }
    }

    #[inline]
    pub fn store(verb: StoreVerb, key: &'a [u8], value: &'a [u8], flags: u32, exptime: u32) -> Self {
        Request::Store {
            verb,
            key,
            value,
            flags,
            exptime,
            noreply: false,
        }
    }

    #[inline]
    pub fn incr(key: &'a [u8], delta: u64) -> Self {
        Request::Incr {
            key,
            delta,
            noreply: false,
        }
    }

    #[inline]
    pub fn decr(key: &'a [u8], delta: u64) -> Self {
        Request::Decr {
            key,
            delta,
            noreply: false,
        }
    }

    #[inline]
    pub fn delete(key: &'a [u8]) -> Self {
        Request::Delete {
            key,
            noreply: false,
        }
    }

    #[inline]
    pub fn stats(name: Option<&'a [u8]>) -> Self {
        Request::Stats { name }
    }

    /// Mark the request `noreply` where the protocol supports it.
    ///
    /// The server sends no response line for a `noreply` request, so the
    /// caller must not wait for one.
    pub fn noreply(mut self) -> Self {
        match &mut self {
            Request::Store { noreply, .. }
            | Request::Cas { noreply, .. }
            | Request::Incr { noreply, .. }
            | Request::Decr { noreply, .. }
            | Request::Delete { noreply, .. } => *noreply = true,
            _ => {}
        }
        self
    }

    /// Returns true if the server will not answer this request.
    pub fn is_noreply(&self) -> bool {
        matches!(
            self,
            Request::Store { noreply: true, .. }
                | Request::Cas { noreply: true, .. }
                | Request::Incr { noreply: true, .. }
                | Request::Decr { noreply: true, .. }
                | Request::Delete { noreply: true, .. }
        )
    }

    /// Append the wire form of this request to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Request::Get { keys } => encode_fetch(buf, b"get", keys),
            Request::Gets { keys } => encode_fetch(buf, b"gets", keys),
            Request::Store {
                verb,
                key,
                value,
                flags,
                exptime,
                noreply,
            } => {
                buf.extend_from_slice(verb.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(key);
                let _ = write!(buf, " {flags} {exptime} {}", value.len());
                finish_line(buf, *noreply);
                buf.extend_from_slice(value);
                buf.extend_from_slice(b"\r\n");
            }
            Request::Cas {
                key,
                value,
                flags,
                exptime,
                cas,
                noreply,
            } => {
                buf.extend_from_slice(b"cas ");
                buf.extend_from_slice(key);
                let _ = write!(buf, " {flags} {exptime} {} {cas}", value.len());
                finish_line(buf, *noreply);
                buf.extend_from_slice(value);
                buf.extend_from_slice(b"\r\n");
            }
            Request::Incr {
                key,
                delta,
                noreply,
            } => encode_counter(buf, b"incr", key, *delta, *noreply),
            Request::Decr {
                key,
                delta,
                noreply,
            } => encode_counter(buf, b"decr", key, *delta, *noreply),
            Request::Delete { key, noreply } => {
                buf.extend_from_slice(b"delete ");
                buf.extend_from_slice(key);
                finish_line(buf, *noreply);
            }
            Request::Stats { name } => {
                buf.extend_from_slice(b"stats");
                if let Some(name) = name {
                    buf.push(b' ');
                    buf.extend_from_slice(name);
                }
                buf.extend_from_slice(b"\r\n");
            }
            Request::Version => buf.extend_from_slice(b"version\r\n"),
            Request::FlushAll => buf.extend_from_slice(b"flush_all\r\n"),
            Request::Quit => buf.extend_from_slice(b"quit\r\n"),
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        self.encode(&mut buf);
        buf
    }
}

fn encode_fetch(buf: &mut Vec<u8>, verb: &[u8], keys: &[&[u8]]) {
    buf.extend_from_slice(verb);
    for key in keys {
        buf.push(b' ');
        buf.extend_from_slice(key);
    }
    buf.extend_from_slice(b"\r\n");
}

fn encode_counter(buf: &mut Vec<u8>, verb: &[u8], key: &[u8], delta: u64, noreply: bool) {
    buf.extend_from_slice(verb);
    buf.push(b' ');
    buf.extend_from_slice(key);
    let _ = write!(buf, " {delta}");
    finish_line(buf, noreply);
}

fn finish_line(buf: &mut Vec<u8>, noreply: bool) {
    if noreply {
        buf.extend_from_slice(b" noreply");
    }
    buf.extend_from_slice(b"\r\n");
}
