//! ASCII protocol response parsing and encoding.
//!
//! Response shapes:
//! - `VALUE <key> <flags> <bytes> [<cas>]\r\n<data>\r\n ... END\r\n` - fetch
//! - `STAT <name> <value>\r\n ... END\r\n` - stats
//! - `STORED` / `NOT_STORED` / `EXISTS` - storage outcomes
//! - `DELETED` / `NOT_FOUND` - delete outcomes
//! - `<decimal>\r\n` - incr/decr result
//! - `VERSION <v>` / `OK`
//! - `ERROR` / `CLIENT_ERROR <msg>` / `SERVER_ERROR <msg>`

use std::io::Write;

use crate::error::ParseError;

/// Upper bound on a single value payload (1 MiB, the memcached default
/// item size limit). Larger advertised lengths are treated as protocol
/// errors rather than allocation requests.
const MAX_VALUE_LEN: usize = 1024 * 1024;

/// One `VALUE` block from a fetch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key: Vec<u8>,
    pub flags: u32,
    pub data: Vec<u8>,
    /// CAS token, present when the fetch was issued as `gets`.
    pub cas: Option<u64>,
}

/// One `STAT` line from a stats response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// A parsed ASCII protocol response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Zero or more values terminated by `END`. Empty means miss.
    Values(Vec<Value>),
    /// Zero or more `STAT` lines terminated by `END`.
    Stats(Vec<Stat>),
    Stored,
    NotStored,
    Exists,
    Deleted,
    NotFound,
    Ok,
    /// Result of incr/decr: the new counter value.
    Numeric(u64),
    Version(Vec<u8>),
    Error,
    ClientError(Vec<u8>),
    ServerError(Vec<u8>),
}

impl Response {
    /// Returns true if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::Error | Response::ClientError(_) | Response::ServerError(_)
        )
    }

    /// Parse one full response from `data`.
    ///
    /// Returns the response and the number of bytes consumed, or
    /// [`ParseError::Incomplete`] if `data` does not yet hold the whole
    /// frame (for VALUE/STAT blocks, everything up to and including
    /// `END\r\n`).
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
        let line = &data[..line_end];

        let simple = match line {
            b"STORED" => Some(Response::Stored),
            b"NOT_STORED" => Some(Response::NotStored),
            b"EXISTS" => Some(Response::Exists),
            b"DELETED" => Some(Response::Deleted),
            b"NOT_FOUND" => Some(Response::NotFound),
            b"OK" => Some(Response::Ok),
            b"ERROR" => Some(Response::Error),
            // A lone END is an empty fetch (miss). An empty stats reply
            // parses identically; callers treat the two the same way.
            b"END" => Some(Response::Values(Vec::new())),
            _ => None,
        };
        if let Some(response) = simple {
            return Ok((response, line_end + 2));
        }

        if let Some(msg) = line.strip_prefix(b"CLIENT_ERROR ") {
            return Ok((Response::ClientError(msg.to_vec()), line_end + 2));
        }
        if let Some(msg) = line.strip_prefix(b"SERVER_ERROR ") {
            return Ok((Response::ServerError(msg.to_vec()), line_end + 2));
        }
        if let Some(version) = line.strip_prefix(b"VERSION ") {
            return Ok((Response::Version(version.to_vec()), line_end + 2));
        }
        if line.starts_with(b"VALUE ") {
            return parse_values(data);
        }
        if line.starts_with(b"STAT ") {
            return parse_stats(data);
        }
        if !line.is_empty() && line.iter().all(|b| b.is_ascii_digit()) {
            return Ok((Response::Numeric(parse_u64(line)?), line_end + 2));
        }

        Err(ParseError::Protocol("unknown response line"))
    }

    /// Append the wire form of this response to `buf` (server side).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Stored => buf.extend_from_slice(b"STORED\r\n"),
            Response::NotStored => buf.extend_from_slice(b"NOT_STORED\r\n"),
            Response::Exists => buf.extend_from_slice(b"EXISTS\r\n"),
            Response::Deleted => buf.extend_from_slice(b"DELETED\r\n"),
            Response::NotFound => buf.extend_from_slice(b"NOT_FOUND\r\n"),
            Response::Ok => buf.extend_from_slice(b"OK\r\n"),
            Response::Error => buf.extend_from_slice(b"ERROR\r\n"),
            Response::Numeric(value) => {
                let _ = write!(buf, "{value}\r\n");
            }
            Response::Version(v) => {
                buf.extend_from_slice(b"VERSION ");
                buf.extend_from_slice(v);
                buf.extend_from_slice(b"\r\n");
            }
            Response::ClientError(msg) => {
                buf.extend_from_slice(b"CLIENT_ERROR ");
                buf.extend_from_slice(msg);
                buf.extend_from_slice(b"\r\n");
            }
            Response::ServerError(msg) => {
                buf.extend_from_slice(b"SERVER_ERROR ");
                buf.extend_from_slice(msg);
                buf.extend_from_slice(b"\r\n");
            }
            Response::Values(values) => {
                for value in values {
                    buf.extend_from_slice(b"VALUE ");
                    buf.extend_from_slice(&value.key);
                    match value.cas {
                        Some(cas) => {
                            let _ = write!(buf, " {} {} {cas}\r\n", value.flags, value.data.len());
                        }
                        None => {
                            let _ = write!(buf, " {} {}\r\n", value.flags, value.data.len());
                        }
                    }
                    buf.extend_from_slice(&value.data);
                    buf.extend_from_slice(b"\r\n");
                }
                buf.extend_from_slice(b"END\r\n");
            }
            Response::Stats(stats) => {
                for stat in stats {
                    buf.extend_from_slice(b"STAT ");
                    buf.extend_from_slice(&stat.name);
                    buf.push(b' ');
                    buf.extend_from_slice(&stat.value);
                    buf.extend_from_slice(b"\r\n");
                }
                buf.extend_from_slice(b"END\r\n");
            }
        }
    }
}

/// Find `\r\n`, returning the offset of `\r`.
fn find_crlf(data: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = memchr::memchr(b'\r', &data[from..]) {
        let pos = from + pos;
        if pos + 1 < data.len() {
            if data[pos + 1] == b'\n' {
                return Some(pos);
            }
            from = pos + 1;
        } else {
            return None;
        }
    }
    None
}

fn parse_values(data: &[u8]) -> Result<(Response, usize), ParseError> {
    let mut values = Vec::new();
    let mut pos = 0;

    loop {
        let remaining = &data[pos..];
        let line_end = find_crlf(remaining).ok_or(ParseError::Incomplete)?;
        let line = &remaining[..line_end];

        if line == b"END" {
            pos += line_end + 2;
            return Ok((Response::Values(values), pos));
        }

        let header = line
            .strip_prefix(b"VALUE ")
            .ok_or(ParseError::Protocol("expected VALUE or END"))?;

        // VALUE <key> <flags> <bytes> [<cas>]
        let fields: Vec<&[u8]> = header.split(|&b| b == b' ').collect();
        if fields.len() < 3 || fields.len() > 4 {
            return Err(ParseError::Protocol("malformed VALUE line"));
        }
        let key = fields[0].to_vec();
        let flags = parse_u32(fields[1])?;
        let len = parse_u64(fields[2])? as usize;
        if len > MAX_VALUE_LEN {
            return Err(ParseError::Protocol("value payload too large"));
        }
        let cas = match fields.get(3) {
            Some(field) => Some(parse_u64(field)?),
            None => None,
        };

        pos += line_end + 2;
        if data.len() < pos + len + 2 {
            return Err(ParseError::Incomplete);
        }
        if &data[pos + len..pos + len + 2] != b"\r\n" {
            return Err(ParseError::Protocol("missing payload terminator"));
        }
        values.push(Value {
            key,
            flags,
            data: data[pos..pos + len].to_vec(),
            cas,
        });
        pos += len + 2;
    }
}

fn parse_stats(data: &[u8]) -> Result<(Response, usize), ParseError> {
    let mut stats = Vec::new();
    let mut pos = 0;

    loop {
        let remaining = &data[pos..];
        let line_end = find_crlf(remaining).ok_or(ParseError::Incomplete)?;
        let line = &remaining[..line_end];
        pos += line_end + 2;

        if line == b"END" {
            return Ok((Response::Stats(stats), pos));
        }
        let rest = line
            .strip_prefix(b"STAT ")
            .ok_or(ParseError::Protocol("expected STAT or END"))?;
        let sep = memchr::memchr(b' ', rest).ok_or(ParseError::Protocol("malformed STAT line"))?;
        stats.push(Stat {
            name: rest[..sep].to_vec(),
            value: rest[sep + 1..].to_vec(),
        });
    }
}

fn parse_u32(data: &[u8]) -> Result<u32, ParseError> {
    std::str::from_utf8(data)
        .map_err(|_| ParseError::InvalidNumber)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber)
}

fn parse_u64(data: &[u8]) -> Result<u64, ParseError> {
    std::str::from_utf8(data)
        .map_err(|_| ParseError::InvalidNumber)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(response: Response) {
        let mut buf = Vec::new();
        response.encode(&mut buf);
        let (parsed, consumed) = Response::parse(&buf).unwrap();
        assert_eq!(parsed, response);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn parse_simple_lines() {
        assert_eq!(
            Response::parse(b"STORED\r\n").unwrap(),
            (Response::Stored, 8)
        );
        assert_eq!(
            Response::parse(b"NOT_STORED\r\n").unwrap(),
            (Response::NotStored, 12)
        );
        assert_eq!(
            Response::parse(b"DELETED\r\n").unwrap(),
            (Response::Deleted, 9)
        );
        assert_eq!(
            Response::parse(b"NOT_FOUND\r\n").unwrap(),
            (Response::NotFound, 11)
        );
        assert_eq!(
            Response::parse(b"EXISTS\r\n").unwrap(),
            (Response::Exists, 8)
        );
        assert_eq!(Response::parse(b"OK\r\n").unwrap(), (Response::Ok, 4));
    }

    #[test]
    fn parse_end_is_miss() {
        let (response, consumed) = Response::parse(b"END\r\n").unwrap();
        assert_eq!(response, Response::Values(vec![]));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn parse_single_value() {
        let data = b"VALUE mykey 42 7\r\nmyvalue\r\nEND\r\n";
        let (response, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        let Response::Values(values) = response else {
            panic!("expected Values");
        };
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].key, b"mykey");
        assert_eq!(values[0].flags, 42);
        assert_eq!(values[0].data, b"myvalue");
        assert_eq!(values[0].cas, None);
    }

    #[test]
    fn parse_value_with_cas() {
        let data = b"VALUE k 0 5 12345\r\nhello\r\nEND\r\n";
        let (response, _) = Response::parse(data).unwrap();
        let Response::Values(values) = response else {
            panic!("expected Values");
        };
        assert_eq!(values[0].cas, Some(12345));
    }

    #[test]
    fn parse_multi_value() {
        let data = b"VALUE k1 0 3\r\nfoo\r\nVALUE k2 1 3\r\nbar\r\nEND\r\n";
        let (response, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        let Response::Values(values) = response else {
            panic!("expected Values");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].key, b"k1");
        assert_eq!(values[1].key, b"k2");
        assert_eq!(values[1].flags, 1);
    }

    #[test]
    fn parse_value_binary_payload() {
        // Payload bytes may contain \r\n; the declared length governs.
        let data = b"VALUE k 0 4\r\na\r\nb\r\nEND\r\n";
        let (response, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        let Response::Values(values) = response else {
            panic!("expected Values");
        };
        assert_eq!(values[0].data, b"a\r\nb");
    }

    #[test]
    fn parse_stats_block() {
        let data = b"STAT pid 123\r\nSTAT uptime 99\r\nEND\r\n";
        let (response, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        let Response::Stats(stats) = response else {
            panic!("expected Stats");
        };
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, b"pid");
        assert_eq!(stats[0].value, b"123");
        assert_eq!(stats[1].name, b"uptime");
        assert_eq!(stats[1].value, b"99");
    }

    #[test]
    fn parse_stat_value_with_spaces() {
        let data = b"STAT version 1.6.21 beta\r\nEND\r\n";
        let (response, _) = Response::parse(data).unwrap();
        let Response::Stats(stats) = response else {
            panic!("expected Stats");
        };
        assert_eq!(stats[0].name, b"version");
        assert_eq!(stats[0].value, b"1.6.21 beta");
    }

    #[test]
    fn parse_numeric() {
        assert_eq!(Response::parse(b"0\r\n").unwrap(), (Response::Numeric(0), 3));
        assert_eq!(
            Response::parse(b"42\r\n").unwrap(),
            (Response::Numeric(42), 4)
        );
        assert_eq!(
            Response::parse(b"18446744073709551615\r\n").unwrap(),
            (Response::Numeric(u64::MAX), 22)
        );
    }

    #[test]
    fn parse_errors() {
        let (response, _) = Response::parse(b"ERROR\r\n").unwrap();
        assert!(response.is_error());

        let (response, _) = Response::parse(b"CLIENT_ERROR bad data chunk\r\n").unwrap();
        assert_eq!(response, Response::ClientError(b"bad data chunk".to_vec()));
        assert!(response.is_error());

        let (response, _) = Response::parse(b"SERVER_ERROR out of memory\r\n").unwrap();
        assert_eq!(response, Response::ServerError(b"out of memory".to_vec()));
    }

    #[test]
    fn parse_version() {
        let (response, consumed) = Response::parse(b"VERSION 1.6.9\r\n").unwrap();
        assert_eq!(response, Response::Version(b"1.6.9".to_vec()));
        assert_eq!(consumed, 15);
    }

    #[test]
    fn parse_incomplete() {
        assert!(matches!(
            Response::parse(b"STORE"),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(
            Response::parse(b"VALUE k 0 10\r\nshort"),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(
            Response::parse(b"VALUE k 0 3\r\nfoo\r\n"),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(
            Response::parse(b"STAT pid 1\r\n"),
            Err(ParseError::Incomplete)
        ));
    }

    #[test]
    fn parse_unknown_line() {
        assert!(matches!(
            Response::parse(b"BOGUS\r\n"),
            Err(ParseError::Protocol("unknown response line"))
        ));
    }

    #[test]
    fn parse_malformed_value_line() {
        assert!(matches!(
            Response::parse(b"VALUE k\r\nEND\r\n"),
            Err(ParseError::Protocol("malformed VALUE line"))
        ));
        assert!(matches!(
            Response::parse(b"VALUE k zero 3\r\nfoo\r\nEND\r\n"),
            Err(ParseError::InvalidNumber)
        ));
    }

    #[test]
    fn parse_missing_payload_terminator() {
        assert!(matches!(
            Response::parse(b"VALUE k 0 5\r\nhelloXXEND\r\n"),
            Err(ParseError::Protocol("missing payload terminator"))
        ));
    }

    #[test]
    fn parse_oversized_value_rejected() {
        let data = b"VALUE k 0 1073741824\r\n";
        assert!(matches!(
            Response::parse(data),
            Err(ParseError::Protocol("value payload too large"))
        ));
    }

    #[test]
    fn parse_value_then_garbage() {
        assert!(matches!(
            Response::parse(b"VALUE k 0 3\r\nfoo\r\nSTORED\r\n"),
            Err(ParseError::Protocol("expected VALUE or END"))
        ));
    }

    #[test]
    fn roundtrip_simple() {
        roundtrip(Response::Stored);
        roundtrip(Response::NotStored);
        roundtrip(Response::Exists);
        roundtrip(Response::Deleted);
        roundtrip(Response::NotFound);
        roundtrip(Response::Ok);
        roundtrip(Response::Error);
        roundtrip(Response::Numeric(0));
        roundtrip(Response::Numeric(u64::MAX));
        roundtrip(Response::Version(b"1.6.9".to_vec()));
        roundtrip(Response::ClientError(b"oops".to_vec()));
        roundtrip(Response::ServerError(b"worse".to_vec()));
    }

    #[test]
    fn roundtrip_values() {
        roundtrip(Response::Values(vec![]));
        roundtrip(Response::Values(vec![
            Value {
                key: b"k1".to_vec(),
                flags: 3,
                data: b"abc".to_vec(),
                cas: None,
            },
            Value {
                key: b"k2".to_vec(),
                flags: 0,
                data: b"with\r\ncrlf".to_vec(),
                cas: Some(77),
            },
        ]));
    }

    #[test]
    fn roundtrip_stats() {
        roundtrip(Response::Stats(vec![Stat {
            name: b"curr_items".to_vec(),
            value: b"5".to_vec(),
        }]));
    }

    #[test]
    fn crlf_scan_skips_bare_cr() {
        // A lone \r inside the line must not terminate it.
        let data = b"VERSION 1.\r6\r\n";
        let (response, consumed) = Response::parse(data).unwrap();
        assert_eq!(response, Response::Version(b"1.\r6".to_vec()));
        assert_eq!(consumed, data.len());
    }
}
