//! Fixed-header binary protocol.
//!
//! Every packet is a 24-byte header followed by extras, key, and value,
//! with lengths declared in the header and all multi-byte fields
//! big-endian. Request magic is `0x80`, response magic `0x81`; magic is
//! validated before any other field.
//!
//! Multi-key fetches are batched as one GETK per key followed by a NOOP;
//! the NOOP response marks the end of the batch.

mod command;
mod header;
mod request;
mod response;

pub use command::BinaryCommand;
pub use header::{
    HEADER_SIZE, Opcode, REQUEST_MAGIC, RESPONSE_MAGIC, RequestHeader, ResponseHeader, Status,
    join_cas, split_cas,
};
pub use request::BinaryRequest;
pub use response::{BinaryResponse, ResponseWriter};
