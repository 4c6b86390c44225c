//! One connection to one server.

use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mcproto::ParseError;

use crate::error::Error;

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// A socket plus a read cursor.
///
/// Created once per successful connect; a connection that errors is
/// discarded by its owner and replaced by a fresh one in a later connect
/// cycle, never repaired in place.
#[derive(Debug)]
pub(crate) struct Connection {
    addr: SocketAddr,
    stream: TcpStream,
    rbuf: BytesMut,
}

impl Connection {
    /// Dial `addr`.
    pub async fn open(addr: SocketAddr) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Connection {
            addr,
            stream,
            rbuf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write a fully encoded request.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Read until `parse` produces one frame, consuming exactly the bytes
    /// it reports.
    ///
    /// `parse` is called on the buffered bytes; [`ParseError::Incomplete`]
    /// triggers another socket read, any other parse error aborts the
    /// exchange, and EOF mid-frame reports the connection closed. Bytes
    /// beyond the parsed frame stay buffered for the next call.
    pub async fn read_frame<T>(
        &mut self,
        mut parse: impl FnMut(&[u8]) -> Result<(T, usize), ParseError>,
    ) -> Result<T, Error> {
        loop {
            if !self.rbuf.is_empty() {
                match parse(&self.rbuf) {
                    Ok((frame, consumed)) => {
                        self.rbuf.advance(consumed);
                        return Ok(frame);
                    }
                    Err(error) if error.is_incomplete() => {}
                    Err(error) => return Err(Error::Protocol(error)),
                }
            }
            let read = self.stream.read_buf(&mut self.rbuf).await?;
            if read == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}
