//! Cluster client: connection handling and typed object/VDI operations

pub mod conn;
pub mod rpc;

pub use conn::{Connection, Dial, TcpDial};
pub use rpc::{find_vdi, flush_vdi, read_object, release_vdi, write_object, WriteOutcome};

/// Scripted server-side harness for protocol tests.
///
/// A `ScriptConn` plays the server over an in-memory stream: it parses
/// complete request messages out of the bytes the client writes and
/// only then releases the next canned response for reading. Reading
/// with no response pending fails the test, which pins down the
/// serialized request/response ordering. A `ScriptDial` hands out
/// prepared connections in dial order.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::rc::Rc;

    use super::conn::Dial;
    use crate::protocol::types::{Opcode, SdResult, SD_FLAG_CMD_WRITE, SD_HEADER_SIZE};
    use crate::protocol::wire::{Request, Response};

    struct ScriptState {
        responses: VecDeque<Vec<u8>>,
        inbuf: Vec<u8>,
        readable: Vec<u8>,
        read_pos: usize,
        requests: Vec<Vec<u8>>,
    }

    impl ScriptState {
        /// Release one response per complete request message.
        fn pump(&mut self) {
            loop {
                if self.inbuf.len() < SD_HEADER_SIZE {
                    return;
                }
                let flags = u16::from_le_bytes([self.inbuf[2], self.inbuf[3]]);
                let data_length = u32::from_le_bytes([
                    self.inbuf[12],
                    self.inbuf[13],
                    self.inbuf[14],
                    self.inbuf[15],
                ]) as usize;
                let total = if flags & SD_FLAG_CMD_WRITE != 0 {
                    SD_HEADER_SIZE + data_length
                } else {
                    SD_HEADER_SIZE
                };
                if self.inbuf.len() < total {
                    return;
                }
                let msg: Vec<u8> = self.inbuf.drain(..total).collect();
                self.requests.push(msg);
                if let Some(rsp) = self.responses.pop_front() {
                    self.readable.extend_from_slice(&rsp);
                }
            }
        }
    }

    #[derive(Clone)]
    pub struct ScriptConn(Rc<RefCell<ScriptState>>);

    impl ScriptConn {
        pub fn new(responses: Vec<Vec<u8>>) -> Self {
            Self(Rc::new(RefCell::new(ScriptState {
                responses: responses.into(),
                inbuf: Vec::new(),
                readable: Vec::new(),
                read_pos: 0,
                requests: Vec::new(),
            })))
        }

        /// Complete request messages received so far, decoded.
        pub fn requests(&self) -> Vec<(Request, Vec<u8>)> {
            self.0
                .borrow()
                .requests
                .iter()
                .map(|msg| {
                    let req = Request::read_from(&mut &msg[..SD_HEADER_SIZE])
                        .expect("scripted request should decode");
                    (req, msg[SD_HEADER_SIZE..].to_vec())
                })
                .collect()
        }

        pub fn request_count(&self) -> usize {
            self.0.borrow().requests.len()
        }
    }

    impl Read for ScriptConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut st = self.0.borrow_mut();
            if st.read_pos >= st.readable.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "read with no response pending (ordering violation or script exhausted)",
                ));
            }
            let n = buf.len().min(st.readable.len() - st.read_pos);
            buf[..n].copy_from_slice(&st.readable[st.read_pos..st.read_pos + n]);
            st.read_pos += n;
            Ok(n)
        }
    }

    impl Write for ScriptConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut st = self.0.borrow_mut();
            st.inbuf.extend_from_slice(buf);
            st.pump();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub struct ScriptDial {
        conns: RefCell<VecDeque<ScriptConn>>,
    }

    impl ScriptDial {
        pub fn new(conns: Vec<ScriptConn>) -> Self {
            Self {
                conns: RefCell::new(conns.into()),
            }
        }
    }

    impl Dial for ScriptDial {
        type Stream = ScriptConn;

        fn dial(&self) -> io::Result<ScriptConn> {
            self.conns.borrow_mut().pop_front().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "no scripted connection left")
            })
        }
    }

    fn message(rsp: Response, payload: &[u8]) -> Vec<u8> {
        let mut msg = rsp.to_bytes().expect("scripted response should encode").to_vec();
        msg.extend_from_slice(payload);
        msg
    }

    /// Successful object response carrying `payload`.
    pub fn object_ok(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        message(
            Response::object(opcode, SdResult::Success as u32, payload.len() as u32, 1),
            payload,
        )
    }

    /// Object response with an arbitrary result code and no payload.
    pub fn object_result(opcode: Opcode, result: SdResult) -> Vec<u8> {
        message(Response::object(opcode, result as u32, 0, 0), &[])
    }

    /// VDI response with a result code and resolved id.
    pub fn vdi_result(opcode: Opcode, result: SdResult, vdi_id: u32) -> Vec<u8> {
        message(Response::vdi(opcode, result as u32, vdi_id), &[])
    }
}
