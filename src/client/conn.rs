//! Blocking connection to a cluster endpoint
//!
//! One TCP connection per open volume. The only I/O primitives are
//! write-all and read-all: partial transfers resume where they left
//! off and interrupted syscalls retry in place, so the layers above
//! always see whole messages or a hard failure.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::protocol::types::SD_HEADER_SIZE;
use crate::protocol::wire::{Request, Response};

/// Opens streams to the cluster. The session keeps one for its own
/// connection and dials throwaway streams for name lookups.
pub trait Dial {
    type Stream: Read + Write;

    fn dial(&self) -> io::Result<Self::Stream>;
}

/// Dials TCP connections to a fixed `host:port` endpoint.
#[derive(Debug, Clone)]
pub struct TcpDial {
    addr: String,
}

impl TcpDial {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Dial for TcpDial {
    type Stream = TcpStream;

    /// Try every resolved address in turn; a connect interrupted by a
    /// signal is restarted against the same address.
    fn dial(&self) -> io::Result<TcpStream> {
        log::debug!("connecting to {}", self.addr);
        let mut last_err = None;
        for addr in self.addr.to_socket_addrs()? {
            loop {
                match TcpStream::connect(addr) {
                    Ok(stream) => return Ok(stream),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no usable address for {}", self.addr),
            )
        }))
    }
}

/// A single serialized request/response channel over one stream.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send a header and, for write operations, its payload.
    pub fn send_request(&mut self, req: &Request, payload: &[u8]) -> io::Result<()> {
        let hdr = req.to_bytes()?;
        self.write_full(&hdr)?;
        if !payload.is_empty() {
            self.write_full(payload)?;
        }
        Ok(())
    }

    /// Receive a response header and up to `payload.len()` payload
    /// bytes. The payload length is clamped to the response's
    /// `data_length`; the number of bytes actually read is returned.
    pub fn recv_response(&mut self, payload: &mut [u8]) -> io::Result<(Response, usize)> {
        let mut hdr = [0u8; SD_HEADER_SIZE];
        self.read_full(&mut hdr)?;
        let rsp = Response::read_from(&mut &hdr[..])?;

        let n = (rsp.data_length as usize).min(payload.len());
        if n > 0 {
            self.read_full(&mut payload[..n])?;
        }
        Ok((rsp, n))
    }

    /// One full round trip: request out, response in.
    pub fn request(
        &mut self,
        req: &Request,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> io::Result<(Response, usize)> {
        self.send_request(req, wbuf)?;
        self.recv_response(rbuf)
    }

    fn write_full(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "stream stopped accepting data",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if retryable(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_full(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.stream.read(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-message",
                    ))
                }
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                }
                Err(e) if retryable(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Opcode, SdResult};
    use std::collections::VecDeque;

    /// Stream that transfers at most `chunk` bytes per call and pops
    /// scripted errors before each successful transfer.
    struct ChoppyStream {
        input: Vec<u8>,
        read_pos: usize,
        written: Vec<u8>,
        chunk: usize,
        errors: VecDeque<io::ErrorKind>,
    }

    impl ChoppyStream {
        fn new(input: Vec<u8>, chunk: usize, errors: Vec<io::ErrorKind>) -> Self {
            Self {
                input,
                read_pos: 0,
                written: Vec::new(),
                chunk,
                errors: errors.into(),
            }
        }
    }

    impl Read for ChoppyStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(kind) = self.errors.pop_front() {
                return Err(io::Error::new(kind, "scripted"));
            }
            let n = buf
                .len()
                .min(self.chunk)
                .min(self.input.len() - self.read_pos);
            buf[..n].copy_from_slice(&self.input[self.read_pos..self.read_pos + n]);
            self.read_pos += n;
            Ok(n)
        }
    }

    impl Write for ChoppyStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.errors.pop_front() {
                return Err(io::Error::new(kind, "scripted"));
            }
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_full_resumes_partial_writes() {
        let mut conn = Connection::new(ChoppyStream::new(
            Vec::new(),
            3,
            vec![io::ErrorKind::Interrupted, io::ErrorKind::WouldBlock],
        ));
        conn.write_full(b"hello sheepdog").unwrap();
        assert_eq!(conn.stream.written, b"hello sheepdog");
    }

    #[test]
    fn test_read_full_resumes_partial_reads() {
        let mut conn = Connection::new(ChoppyStream::new(
            b"0123456789".to_vec(),
            4,
            vec![io::ErrorKind::Interrupted],
        ));
        let mut buf = [0u8; 10];
        conn.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"0123456789");
    }

    #[test]
    fn test_read_full_eof_is_error() {
        let mut conn = Connection::new(ChoppyStream::new(b"abc".to_vec(), 8, vec![]));
        let mut buf = [0u8; 5];
        let err = conn.read_full(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_full_propagates_hard_errors() {
        let mut conn = Connection::new(ChoppyStream::new(
            b"abc".to_vec(),
            8,
            vec![io::ErrorKind::ConnectionReset],
        ));
        let mut buf = [0u8; 3];
        let err = conn.read_full(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_response_payload_clamped_to_data_length() {
        let rsp = Response::object(Opcode::ReadObj, SdResult::Success as u32, 4, 1);
        let mut wire = rsp.to_bytes().unwrap().to_vec();
        wire.extend_from_slice(b"data");

        let mut conn = Connection::new(ChoppyStream::new(wire, 64, vec![]));
        let mut payload = [0xffu8; 16];
        let (got, n) = conn.recv_response(&mut payload).unwrap();
        assert_eq!(got.result, SdResult::Success as u32);
        assert_eq!(n, 4);
        assert_eq!(&payload[..4], b"data");
        assert_eq!(payload[4], 0xff);
    }
}
