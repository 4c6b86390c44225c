//! Binary response parsing (client side) and encoding (server side).

use crate::error::ParseError;

use super::header::{HEADER_SIZE, Opcode, ResponseHeader, Status};

/// One parsed binary response packet.
///
/// The flags extra (present on fetch responses) is surfaced as a field;
/// non-fetch responses leave it zero. For non-success statuses the value
/// holds the server's textual reason, when it sent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResponse {
    pub opcode: Opcode,
    pub status: Status,
    pub opaque: u32,
    pub cas: u64,
    pub flags: u32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl BinaryResponse {
    /// Parse one response packet from `data`.
    ///
    /// The magic byte is validated before anything else; a wrong magic is
    /// a framing error for the whole exchange. Returns
    /// [`ParseError::Incomplete`] until the header and declared body are
    /// fully buffered.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        let header = ResponseHeader::parse(data)?;
        let total = HEADER_SIZE + header.total_body_length as usize;
        if data.len() < total {
            return Err(ParseError::Incomplete);
        }

        let extras_len = header.extras_length as usize;
        let key_len = header.key_length as usize;
        if extras_len + key_len > header.total_body_length as usize {
            return Err(ParseError::Protocol("body lengths exceed total"));
        }

        let body = &data[HEADER_SIZE..total];
        let extras = &body[..extras_len];
        let key = &body[extras_len..extras_len + key_len];
        let value = &body[extras_len + key_len..];

        let flags = if extras_len >= 4 {
            u32::from_be_bytes([extras[0], extras[1], extras[2], extras[3]])
        } else {
            0
        };

        Ok((
            BinaryResponse {
                opcode: header.opcode,
                status: header.status,
                opaque: header.opaque,
                cas: header.cas,
                flags,
                key: key.to_vec(),
                value: value.to_vec(),
            },
            total,
        ))
    }

    /// Interpret the value as an increment/decrement result.
    pub fn counter_value(&self) -> Result<u64, ParseError> {
        let bytes: [u8; 8] = self
            .value
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::Protocol("counter value is not 8 bytes"))?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// True for the empty-key, empty-value packet that terminates a
    /// STAT sequence.
    pub fn is_stat_end(&self) -> bool {
        self.opcode == Opcode::Stat && self.key.is_empty() && self.value.is_empty()
    }
}

/// Server-side response encoders, used by mock servers and test fixtures.
pub struct ResponseWriter;

impl ResponseWriter {
    /// Fetch hit: 4-byte flags extra, optional echoed key, value.
    pub fn value(
        buf: &mut Vec<u8>,
        opcode: Opcode,
        opaque: u32,
        cas: u64,
        flags: u32,
        key: Option<&[u8]>,
        value: &[u8],
    ) {
        let key = key.unwrap_or(b"");
        let mut header = ResponseHeader::new(opcode, Status::NoError);
        header.extras_length = 4;
        header.key_length = key.len() as u16;
        header.total_body_length = (4 + key.len() + value.len()) as u32;
        header.opaque = opaque;
        header.cas = cas;
        header.encode(buf);
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }

    /// Bare success packet (stores, deletes, noop, flush, quit).
    pub fn success(buf: &mut Vec<u8>, opcode: Opcode, opaque: u32, cas: u64) {
        let mut header = ResponseHeader::new(opcode, Status::NoError);
        header.opaque = opaque;
        header.cas = cas;
        header.encode(buf);
    }

    /// Increment/decrement result: 8-byte big-endian value body.
    pub fn counter(buf: &mut Vec<u8>, opcode: Opcode, opaque: u32, cas: u64, value: u64) {
        let mut header = ResponseHeader::new(opcode, Status::NoError);
        header.total_body_length = 8;
        header.opaque = opaque;
        header.cas = cas;
        header.encode(buf);
        buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Non-success status with the reason string as the body.
    pub fn status(buf: &mut Vec<u8>, opcode: Opcode, opaque: u32, status: Status) {
        let reason = status.reason().as_bytes();
        let mut header = ResponseHeader::new(opcode, status);
        header.total_body_length = reason.len() as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(reason);
    }

    /// VERSION response: version string as the body.
    pub fn version(buf: &mut Vec<u8>, opaque: u32, version: &[u8]) {
        let mut header = ResponseHeader::new(Opcode::Version, Status::NoError);
        header.total_body_length = version.len() as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(version);
    }

    /// One STAT entry (name as key, value as body).
    pub fn stat(buf: &mut Vec<u8>, opaque: u32, name: &[u8], value: &[u8]) {
        let mut header = ResponseHeader::new(Opcode::Stat, Status::NoError);
        header.key_length = name.len() as u16;
        header.total_body_length = (name.len() + value.len()) as u32;
        header.opaque = opaque;
        header.encode(buf);
        buf.extend_from_slice(name);
        buf.extend_from_slice(value);
    }

    /// STAT terminator: empty key, empty value.
    pub fn stat_end(buf: &mut Vec<u8>, opaque: u32) {
        Self::stat(buf, opaque, b"", b"");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_response() {
        let mut buf = Vec::new();
        ResponseWriter::value(&mut buf, Opcode::Get, 42, 777, 3, None, b"hello");
        let (response, consumed) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(response.opcode, Opcode::Get);
        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.opaque, 42);
        assert_eq!(response.cas, 777);
        assert_eq!(response.flags, 3);
        assert!(response.key.is_empty());
        assert_eq!(response.value, b"hello");
    }

    #[test]
    fn parse_getk_response_with_key() {
        let mut buf = Vec::new();
        ResponseWriter::value(&mut buf, Opcode::GetK, 1, 0, 0, Some(b"mykey".as_slice()), b"v");
        let (response, _) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(response.key, b"mykey");
        assert_eq!(response.value, b"v");
    }

    #[test]
    fn parse_success_response() {
        let mut buf = Vec::new();
        ResponseWriter::success(&mut buf, Opcode::Set, 9, 0xDEAD_BEEF_0000_0001);
        let (response, consumed) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.cas, 0xDEAD_BEEF_0000_0001);
        assert_eq!(response.flags, 0);
        assert!(response.value.is_empty());
    }

    #[test]
    fn parse_counter_response() {
        let mut buf = Vec::new();
        ResponseWriter::counter(&mut buf, Opcode::Increment, 2, 1, 15);
        let (response, _) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(response.counter_value().unwrap(), 15);
    }

    #[test]
    fn counter_value_wrong_size() {
        let mut buf = Vec::new();
        ResponseWriter::success(&mut buf, Opcode::Increment, 2, 0);
        let (response, _) = BinaryResponse::parse(&buf).unwrap();
        assert!(response.counter_value().is_err());
    }

    #[test]
    fn parse_status_response() {
        let mut buf = Vec::new();
        ResponseWriter::status(&mut buf, Opcode::Get, 5, Status::KeyNotFound);
        let (response, _) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(response.status, Status::KeyNotFound);
        assert_eq!(response.value, b"key not found");
    }

    #[test]
    fn parse_version_response() {
        let mut buf = Vec::new();
        ResponseWriter::version(&mut buf, 0, b"1.6.9");
        let (response, _) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(response.opcode, Opcode::Version);
        assert_eq!(response.value, b"1.6.9");
    }

    #[test]
    fn parse_stat_sequence() {
        let mut buf = Vec::new();
        ResponseWriter::stat(&mut buf, 1, b"pid", b"123");
        ResponseWriter::stat(&mut buf, 1, b"uptime", b"9");
        ResponseWriter::stat_end(&mut buf, 1);

        let (first, consumed) = BinaryResponse::parse(&buf).unwrap();
        assert_eq!(first.key, b"pid");
        assert_eq!(first.value, b"123");
        assert!(!first.is_stat_end());

        let (second, consumed2) = BinaryResponse::parse(&buf[consumed..]).unwrap();
        assert_eq!(second.key, b"uptime");

        let (end, _) = BinaryResponse::parse(&buf[consumed + consumed2..]).unwrap();
        assert!(end.is_stat_end());
    }

    #[test]
    fn parse_incomplete() {
        let mut buf = Vec::new();
        ResponseWriter::value(&mut buf, Opcode::Get, 0, 0, 0, None, b"hello");
        for cut in [0, 1, HEADER_SIZE - 1, HEADER_SIZE, buf.len() - 1] {
            assert!(matches!(
                BinaryResponse::parse(&buf[..cut]),
                Err(ParseError::Incomplete)
            ));
        }
    }

    #[test]
    fn parse_wrong_magic_is_fatal() {
        let mut buf = Vec::new();
        ResponseWriter::success(&mut buf, Opcode::Set, 0, 0);
        buf[0] = 0x80;
        assert!(matches!(
            BinaryResponse::parse(&buf),
            Err(ParseError::InvalidMagic(0x80))
        ));
    }

    #[test]
    fn parse_inconsistent_lengths() {
        let mut buf = Vec::new();
        ResponseWriter::success(&mut buf, Opcode::Get, 0, 0);
        buf[4] = 10; // extras claim exceeds total body of zero
        assert!(matches!(
            BinaryResponse::parse(&buf),
            Err(ParseError::Protocol("body lengths exceed total"))
        ));
    }

    #[test]
    fn cas_survives_full_range() {
        for cas in [0u64, 0xFFFF_FFFF, 0x1_0000_0000, u64::MAX] {
            let mut buf = Vec::new();
            ResponseWriter::success(&mut buf, Opcode::Set, 0, cas);
            let (response, _) = BinaryResponse::parse(&buf).unwrap();
            assert_eq!(response.cas, cas);
        }
    }
}
