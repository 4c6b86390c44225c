//! Server-side parsing of ASCII protocol requests.
//!
//! Used by in-process mock servers and test fixtures so that both ends of
//! an exchange share one definition of the wire format. Covers the
//! command set this client issues; it is not a complete server parser.

use crate::error::ParseError;

/// Storage verbs shared by the `set` family of commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

/// A parsed ASCII protocol request (server side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { keys: Vec<Vec<u8>> },
    Gets { keys: Vec<Vec<u8>> },
    Store {
        kind: StoreKind,
        key: Vec<u8>,
        flags: u32,
        exptime: u32,
        data: Vec<u8>,
        noreply: bool,
    },
    Cas {
        key: Vec<u8>,
        flags: u32,
        exptime: u32,
        cas: u64,
        data: Vec<u8>,
        noreply: bool,
    },
    Incr { key: Vec<u8>, delta: u64, noreply: bool },
    Decr { key: Vec<u8>, delta: u64, noreply: bool },
    Delete { key: Vec<u8>, noreply: bool },
    Stats { name: Option<Vec<u8>> },
    Version,
    FlushAll,
    Quit,
}

impl Command {
    /// Parse one request from `data`, returning it and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
        let line = &data[..line_end];
        let consumed = line_end + 2;

        let mut fields = line.split(|&b| b == b' ').filter(|f| !f.is_empty());
        let verb = fields.next().ok_or(ParseError::UnknownCommand)?;
        let args: Vec<&[u8]> = fields.collect();

        match verb {
            b"get" => Ok((
                Command::Get {
                    keys: args.iter().map(|k| k.to_vec()).collect(),
                },
                consumed,
            )),
            b"gets" => Ok((
                Command::Gets {
                    keys: args.iter().map(|k| k.to_vec()).collect(),
                },
                consumed,
            )),
            b"set" => parse_store(StoreKind::Set, &args, data, consumed),
            b"add" => parse_store(StoreKind::Add, &args, data, consumed),
            b"replace" => parse_store(StoreKind::Replace, &args, data, consumed),
            b"append" => parse_store(StoreKind::Append, &args, data, consumed),
            b"prepend" => parse_store(StoreKind::Prepend, &args, data, consumed),
            b"cas" => parse_cas(&args, data, consumed),
            b"incr" => parse_counter(&args, consumed, true),
            b"decr" => parse_counter(&args, consumed, false),
            b"delete" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(ParseError::Protocol("delete takes one key"));
                }
                let noreply = parse_noreply(args.get(1))?;
                Ok((
                    Command::Delete {
                        key: args[0].to_vec(),
                        noreply,
                    },
                    consumed,
                ))
            }
            b"stats" => Ok((
                Command::Stats {
                    name: args.first().map(|n| n.to_vec()),
                },
                consumed,
            )),
            b"version" => Ok((Command::Version, consumed)),
            b"flush_all" => Ok((Command::FlushAll, consumed)),
            b"quit" => Ok((Command::Quit, consumed)),
            _ => Err(ParseError::UnknownCommand),
        }
    }
}

fn parse_store(
    kind: StoreKind,
    args: &[&[u8]],
    data: &[u8],
    line_consumed: usize,
) -> Result<(Command, usize), ParseError> {
    if args.len() < 4 || args.len() > 5 {
        return Err(ParseError::Protocol("storage command takes 4 fields"));
    }
    let key = args[0].to_vec();
    let flags = parse_u32(args[1])?;
    let exptime = parse_u32(args[2])?;
    let len = parse_u64(args[3])? as usize;
    let noreply = parse_noreply(args.get(4))?;

    let (payload, consumed) = read_payload(data, line_consumed, len)?;
    Ok((
        Command::Store {
            kind,
            key,
            flags,
            exptime,
            data: payload,
            noreply,
        },
        consumed,
    ))
}

fn parse_cas(
    args: &[&[u8]],
    data: &[u8],
    line_consumed: usize,
) -> Result<(Command, usize), ParseError> {
    if args.len() < 5 || args.len() > 6 {
        return Err(ParseError::Protocol("cas takes 5 fields"));
    }
    let key = args[0].to_vec();
    let flags = parse_u32(args[1])?;
    let exptime = parse_u32(args[2])?;
    let len = parse_u64(args[3])? as usize;
    let cas = parse_u64(args[4])?;
    let noreply = parse_noreply(args.get(5))?;

    let (payload, consumed) = read_payload(data, line_consumed, len)?;
    Ok((
        Command::Cas {
            key,
            flags,
            exptime,
            cas,
            data: payload,
            noreply,
        },
        consumed,
    ))
}

fn parse_counter(
    args: &[&[u8]],
    consumed: usize,
    incr: bool,
) -> Result<(Command, usize), ParseError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(ParseError::Protocol("incr/decr take key and delta"));
    }
    let key = args[0].to_vec();
    let delta = parse_u64(args[1])?;
    let noreply = parse_noreply(args.get(2))?;
    let command = if incr {
        Command::Incr { key, delta, noreply }
    } else {
        Command::Decr { key, delta, noreply }
    };
    Ok((command, consumed))
}

fn parse_noreply(field: Option<&&[u8]>) -> Result<bool, ParseError> {
    match field {
        None => Ok(false),
        Some(&b"noreply") => Ok(true),
        Some(_) => Err(ParseError::Protocol("expected noreply")),
    }
}

fn read_payload(
    data: &[u8],
    start: usize,
    len: usize,
) -> Result<(Vec<u8>, usize), ParseError> {
    if data.len() < start + len + 2 {
        return Err(ParseError::Incomplete);
    }
    if &data[start + len..start + len + 2] != b"\r\n" {
        return Err(ParseError::Protocol("missing payload terminator"));
    }
    Ok((data[start..start + len].to_vec(), start + len + 2))
}

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
