//! Typed object and VDI operations
//!
//! Thin wrappers over `Connection::request` that build the right
//! header shape for each opcode and translate result codes into the
//! error taxonomy.

use std::io::{self, Read, Write};

use super::conn::{Connection, Dial};
use crate::protocol::inode::{copy_nul_padded, nul_trimmed};
use crate::protocol::types::{
    vid_to_vdi_oid, Opcode, SdResult, SD_FLAG_CMD_WRITE, SD_MAX_VDI_LEN, SD_MAX_VDI_TAG_LEN,
};
use crate::protocol::wire::{Request, ResponseBody};
use crate::protocol::SdError;

/// Outcome of a successful object write
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    /// The server accepted the write request but the target object has
    /// gone read-only under a concurrent snapshot; the caller must
    /// reload its inode and retry.
    pub need_reload: bool,
}

/// Read `buf.len()` bytes of object `oid` starting at `offset`.
/// Returns the number of payload bytes the server actually delivered.
pub fn read_object<S: Read + Write>(
    conn: &mut Connection<S>,
    oid: u64,
    buf: &mut [u8],
    offset: u64,
    copies: u32,
) -> Result<usize, SdError> {
    let req = Request::object(Opcode::ReadObj, 0, buf.len() as u32, oid, 0, copies, offset);
    let (rsp, n) = conn.request(&req, &[], buf)?;
    match SdResult::try_from(rsp.result) {
        Ok(SdResult::Success) => Ok(n),
        _ => Err(SdError::server(Opcode::ReadObj, rsp.result)),
    }
}

/// Write `buf` into object `oid` at `offset`. With `create` the object
/// is allocated first, inheriting from `cow_oid` when that is nonzero.
pub fn write_object<S: Read + Write>(
    conn: &mut Connection<S>,
    oid: u64,
    cow_oid: u64,
    buf: &[u8],
    offset: u64,
    copies: u32,
    create: bool,
    flags: u16,
) -> Result<WriteOutcome, SdError> {
    let opcode = if create {
        Opcode::CreateAndWriteObj
    } else {
        Opcode::WriteObj
    };
    let req = Request::object(
        opcode,
        flags | SD_FLAG_CMD_WRITE,
        buf.len() as u32,
        oid,
        cow_oid,
        copies,
        offset,
    );
    let (rsp, _) = conn.request(&req, buf, &mut [])?;
    match SdResult::try_from(rsp.result) {
        Ok(SdResult::Success) => Ok(WriteOutcome { need_reload: false }),
        Ok(SdResult::Readonly) => Ok(WriteOutcome { need_reload: true }),
        _ => Err(SdError::server(opcode, rsp.result)),
    }
}

/// Flush any server-side cache for the volume. A server without an
/// object cache layer answers INVALID_PARMS; there is nothing to flush
/// then and the call counts as success.
pub fn flush_vdi<S: Read + Write>(conn: &mut Connection<S>, vdi_id: u32) -> Result<(), SdError> {
    let req = Request::object(Opcode::FlushVdi, 0, 0, vid_to_vdi_oid(vdi_id), 0, 0, 0);
    let (rsp, _) = conn.request(&req, &[], &mut [])?;
    match SdResult::try_from(rsp.result) {
        Ok(SdResult::Success) | Ok(SdResult::InvalidParms) => Ok(()),
        _ => Err(SdError::server(Opcode::FlushVdi, rsp.result)),
    }
}

/// Drop the lock on a VDI. Returns the raw result code; close-time
/// callers decide what deserves a log line.
pub fn release_vdi<S: Read + Write>(conn: &mut Connection<S>, vdi_id: u32) -> Result<u32, SdError> {
    let req = Request::vdi(Opcode::ReleaseVdi, 0, 0, 0, vdi_id, 0, 0);
    let (rsp, _) = conn.request(&req, &[], &mut [])?;
    Ok(rsp.result)
}

/// Resolve a VDI name (and optional snapshot tag/id) to its VID over a
/// throwaway connection. Locks the VDI unless `for_snapshot`.
pub fn find_vdi<D: Dial>(
    dial: &D,
    name: &[u8],
    tag: &[u8],
    snapid: u32,
    for_snapshot: bool,
) -> Result<u32, SdError> {
    let payload = vdi_name_payload(name, tag);
    let opcode = if for_snapshot {
        Opcode::GetVdiInfo
    } else {
        Opcode::LockVdi
    };
    let req = Request::vdi(
        opcode,
        SD_FLAG_CMD_WRITE,
        payload.len() as u32,
        0,
        0,
        0,
        snapid,
    );

    let mut conn = Connection::new(dial.dial()?);
    let (rsp, _) = conn.request(&req, &payload, &mut [])?;
    match SdResult::try_from(rsp.result) {
        Ok(SdResult::Success) => match rsp.body {
            ResponseBody::Vdi { vdi_id } => Ok(vdi_id),
            _ => Err(SdError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "lookup response missing VDI fields",
            ))),
        },
        Ok(SdResult::NoVdi) => Err(SdError::VdiNotFound(
            String::from_utf8_lossy(nul_trimmed(name)).into_owned(),
        )),
        _ => Err(SdError::server(opcode, rsp.result)),
    }
}

/// Lookup payload: the name and tag, each truncated to and NUL-padded
/// across its fixed wire width.
fn vdi_name_payload(name: &[u8], tag: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8; SD_MAX_VDI_LEN + SD_MAX_VDI_TAG_LEN];
    copy_nul_padded(&mut payload[..SD_MAX_VDI_LEN], nul_trimmed(name));
    copy_nul_padded(&mut payload[SD_MAX_VDI_LEN..], nul_trimmed(tag));
    payload
}
