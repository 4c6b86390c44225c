//! Server-side parsing of binary protocol requests.
//!
//! Used by mock servers and test fixtures. Commands are grouped by body
//! family rather than one variant per opcode; the opcode is carried so a
//! server can distinguish quiet variants and echo the right opcode back.

use crate::error::ParseError;

use super::header::{HEADER_SIZE, Opcode, RequestHeader};

/// A parsed binary protocol request (server side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryCommand {
    /// GET / GETQ / GETK / GETKQ
    Fetch {
        opcode: Opcode,
        key: Vec<u8>,
        opaque: u32,
    },
    /// SET / ADD / REPLACE and quiet variants
    Store {
        opcode: Opcode,
        key: Vec<u8>,
        value: Vec<u8>,
        flags: u32,
        exptime: u32,
        cas: u64,
        opaque: u32,
    },
    /// APPEND / PREPEND and quiet variants
    Concat {
        opcode: Opcode,
        key: Vec<u8>,
        value: Vec<u8>,
        opaque: u32,
    },
    /// INCREMENT / DECREMENT and quiet variants
    Counter {
        opcode: Opcode,
        key: Vec<u8>,
        delta: u64,
        initial: u64,
        exptime: u32,
        opaque: u32,
    },
    /// DELETE / DELETEQ
    Delete {
        opcode: Opcode,
        key: Vec<u8>,
        opaque: u32,
    },
    Stat {
        name: Option<Vec<u8>>,
        opaque: u32,
    },
    Noop {
        opaque: u32,
    },
    Version {
        opaque: u32,
    },
    Flush {
        opcode: Opcode,
        opaque: u32,
    },
    Quit {
        opcode: Opcode,
        opaque: u32,
    },
}

impl BinaryCommand {
    /// Parse one request packet, returning it and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        let header = RequestHeader::parse(data)?;
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
        let key = body[extras_len..extras_len + key_len].to_vec();
        let value = body[extras_len + key_len..].to_vec();
        let opaque = header.opaque;

        let command = match header.opcode {
            opcode @ (Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ) => {
                BinaryCommand::Fetch { opcode, key, opaque }
            }
            opcode @ (Opcode::Set
            | Opcode::Add
            | Opcode::Replace
            | Opcode::SetQ
            | Opcode::AddQ
            | Opcode::ReplaceQ) => {
                if extras_len != 8 {
                    return Err(ParseError::Protocol("store requires 8 extras bytes"));
                }
                BinaryCommand::Store {
                    opcode,
                    key,
                    value,
                    flags: u32::from_be_bytes([extras[0], extras[1], extras[2], extras[3]]),
                    exptime: u32::from_be_bytes([extras[4], extras[5], extras[6], extras[7]]),
                    cas: header.cas,
                    opaque,
                }
            }
            opcode @ (Opcode::Append | Opcode::Prepend | Opcode::AppendQ | Opcode::PrependQ) => {
                BinaryCommand::Concat {
                    opcode,
                    key,
                    value,
                    opaque,
                }
            }
            opcode @ (Opcode::Increment
            | Opcode::Decrement
            | Opcode::IncrementQ
            | Opcode::DecrementQ) => {
                if extras_len != 20 {
                    return Err(ParseError::Protocol("counter requires 20 extras bytes"));
                }
                BinaryCommand::Counter {
                    opcode,
                    key,
                    delta: u64::from_be_bytes([
                        extras[0], extras[1], extras[2], extras[3], extras[4], extras[5],
                        extras[6], extras[7],
                    ]),
                    initial: u64::from_be_bytes([
                        extras[8], extras[9], extras[10], extras[11], extras[12], extras[13],
                        extras[14], extras[15],
                    ]),
                    exptime: u32::from_be_bytes([extras[16], extras[17], extras[18], extras[19]]),
                    opaque,
                }
            }
            opcode @ (Opcode::Delete | Opcode::DeleteQ) => {
                BinaryCommand::Delete { opcode, key, opaque }
            }
            Opcode::Stat => BinaryCommand::Stat {
                name: if key.is_empty() { None } else { Some(key) },
                opaque,
            },
            Opcode::Noop => BinaryCommand::Noop { opaque },
            Opcode::Version => BinaryCommand::Version { opaque },
            opcode @ (Opcode::Flush | Opcode::FlushQ) => BinaryCommand::Flush { opcode, opaque },
            opcode @ (Opcode::Quit | Opcode::QuitQ) => BinaryCommand::Quit { opcode, opaque },
        };
        Ok((command, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::request::BinaryRequest;

    #[test]
    fn parse_incomplete_header_and_body() {
        let mut buf = Vec::new();
        BinaryRequest::encode_store(&mut buf, Opcode::Set, b"key", b"value", 0, 0, 0, 0);
        assert!(matches!(
            BinaryCommand::parse(&buf[..10]),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(
            BinaryCommand::parse(&buf[..buf.len() - 1]),
            Err(ParseError::Incomplete)
        ));
    }

    #[test]
    fn parse_two_packets_in_sequence() {
        let mut buf = Vec::new();
        BinaryRequest::encode_getk(&mut buf, b"k1", 1);
        BinaryRequest::encode_noop(&mut buf, 2);

        let (first, consumed) = BinaryCommand::parse(&buf).unwrap();
        assert_eq!(
            first,
            BinaryCommand::Fetch {
                opcode: Opcode::GetK,
                key: b"k1".to_vec(),
                opaque: 1,
            }
        );
        let (second, consumed2) = BinaryCommand::parse(&buf[consumed..]).unwrap();
        assert_eq!(second, BinaryCommand::Noop { opaque: 2 });
        assert_eq!(consumed + consumed2, buf.len());
    }

    #[test]
    fn parse_quiet_store() {
        let mut buf = Vec::new();
        BinaryRequest::encode_store(&mut buf, Opcode::SetQ, b"k", b"v", 1, 2, 0, 3);
        let (cmd, _) = BinaryCommand::parse(&buf).unwrap();
        let BinaryCommand::Store { opcode, .. } = cmd else {
            panic!("expected Store");
        };
        assert_eq!(opcode, Opcode::SetQ);
        assert!(opcode.is_quiet());
    }

    #[test]
    fn parse_bad_extras_length() {
        let mut buf = Vec::new();
        BinaryRequest::encode_store(&mut buf, Opcode::Set, b"k", b"v", 0, 0, 0, 0);
        buf[4] = 4; // claim 4 extras bytes for a store
        assert!(matches!(
            BinaryCommand::parse(&buf),
            Err(ParseError::Protocol("store requires 8 extras bytes"))
        ));
    }

    #[test]
    fn parse_request_magic_enforced() {
        let mut buf = Vec::new();
        BinaryRequest::encode_noop(&mut buf, 0);
        buf[0] = 0x81;
        assert!(matches!(
            BinaryCommand::parse(&buf),
            Err(ParseError::InvalidMagic(0x81))
        ));
    }
}
