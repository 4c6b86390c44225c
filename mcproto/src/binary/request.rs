//! Client-side binary request encoding.
//!
//! Each encoder appends a complete packet (header, extras, key, value) to
//! the caller's buffer. The `opaque` argument is echoed verbatim by the
//! server; callers that batch requests on one connection use it to mark
//! packet boundaries (see the GETK+NOOP multi-get flow).

use super::header::{Opcode, RequestHeader};

/// Binary protocol request encoders.
pub struct BinaryRequest;

impl BinaryRequest {
    /// GET: key only, no extras. Response value carries the flags extra.
    pub fn encode_get(buf: &mut Vec<u8>, key: &[u8], opaque: u32) {
        Self::encode_fetch(buf, Opcode::Get, key, opaque);
    }

    /// GETK: like GET but the response echoes the key, which lets
    /// multi-key batches attribute values without positional bookkeeping.
    pub fn encode_getk(buf: &mut Vec<u8>, key: &[u8], opaque: u32) {
        Self::encode_fetch(buf, Opcode::GetK, key, opaque);
    }

    fn encode_fetch(buf: &mut Vec<u8>, opcode: Opcode, key: &[u8], opaque: u32) {
        let mut header = RequestHeader::new(opcode);
        header.key_length = key.len() as u16;
        header.total_body_length = key.len() as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(key);
    }

    /// SET/ADD/REPLACE (or their quiet variants): 8-byte extras carrying
    /// flags and expiration, then key, then value.
    pub fn encode_store(
        buf: &mut Vec<u8>,
        opcode: Opcode,
        key: &[u8],
        value: &[u8],
        flags: u32,
        exptime: u32,
        cas: u64,
        opaque: u32,
    ) {
        debug_assert!(matches!(
            opcode,
            Opcode::Set
                | Opcode::Add
                | Opcode::Replace
                | Opcode::SetQ
                | Opcode::AddQ
                | Opcode::ReplaceQ
        ));
        let mut header = RequestHeader::new(opcode);
        header.key_length = key.len() as u16;
        header.extras_length = 8;
        header.total_body_length = (8 + key.len() + value.len()) as u32;
        header.cas = cas;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(&exptime.to_be_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }

    /// APPEND/PREPEND (or quiet variants): no extras, key then value.
    pub fn encode_concat(
        buf: &mut Vec<u8>,
        opcode: Opcode,
        key: &[u8],
        value: &[u8],
        opaque: u32,
    ) {
        debug_assert!(matches!(
            opcode,
            Opcode::Append | Opcode::Prepend | Opcode::AppendQ | Opcode::PrependQ
        ));
        let mut header = RequestHeader::new(opcode);
        header.key_length = key.len() as u16;
        header.total_body_length = (key.len() + value.len()) as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }

    /// INCREMENT/DECREMENT: 20-byte extras - delta (8), initial value (8),
    /// expiration (4). Expiration `0xFFFFFFFF` tells the server to fail
    /// with key-not-found instead of seeding the initial value.
    pub fn encode_counter(
        buf: &mut Vec<u8>,
        opcode: Opcode,
        key: &[u8],
        delta: u64,
        initial: u64,
        exptime: u32,
        opaque: u32,
    ) {
        debug_assert!(matches!(
            opcode,
            Opcode::Increment | Opcode::Decrement | Opcode::IncrementQ | Opcode::DecrementQ
        ));
        let mut header = RequestHeader::new(opcode);
        header.key_length = key.len() as u16;
        header.extras_length = 20;
        header.total_body_length = (20 + key.len()) as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(&delta.to_be_bytes());
        buf.extend_from_slice(&initial.to_be_bytes());
        buf.extend_from_slice(&exptime.to_be_bytes());
        buf.extend_from_slice(key);
    }

    /// DELETE (or DELETEQ): key only.
    pub fn encode_delete(buf: &mut Vec<u8>, opcode: Opcode, key: &[u8], opaque: u32) {
        debug_assert!(matches!(opcode, Opcode::Delete | Opcode::DeleteQ));
        let mut header = RequestHeader::new(opcode);
        header.key_length = key.len() as u16;
        header.total_body_length = key.len() as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(key);
    }

    /// STAT: optional group name as the key.
    pub fn encode_stat(buf: &mut Vec<u8>, name: Option<&[u8]>, opaque: u32) {
        let name = name.unwrap_or(b"");
        let mut header = RequestHeader::new(Opcode::Stat);
        header.key_length = name.len() as u16;
        header.total_body_length = name.len() as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(name);
    }

    /// NOOP: header only. Forces quiet pipelines to flush and marks the
    /// end of a batched exchange.
    pub fn encode_noop(buf: &mut Vec<u8>, opaque: u32) {
        Self::encode_bare(buf, Opcode::Noop, opaque);
    }

    /// VERSION: header only.
    pub fn encode_version(buf: &mut Vec<u8>, opaque: u32) {
        Self::encode_bare(buf, Opcode::Version, opaque);
    }

    /// FLUSH with no delay: header only.
    pub fn encode_flush(buf: &mut Vec<u8>, opaque: u32) {
        Self::encode_bare(buf, Opcode::Flush, opaque);
    }

    /// QUIT: header only.
    pub fn encode_quit(buf: &mut Vec<u8>, opaque: u32) {
        Self::encode_bare(buf, Opcode::Quit, opaque);
    }

    fn encode_bare(buf: &mut Vec<u8>, opcode: Opcode, opaque: u32) {
        let mut header = RequestHeader::new(opcode);
        header.opaque = opaque;
        header.encode(buf);
    }
}
