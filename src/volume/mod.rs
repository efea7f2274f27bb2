//! Volume sessions and the inode-indirected I/O engine
//!
//! A session owns one connection, the cached inode, and the dirty-slot
//! hint window. Linear reads and writes are sliced into per-object
//! pieces aligned to the 4 MiB object size; each write decides
//! create/copy-on-write/in-place from the indirection table, retries
//! against a freshly reloaded inode when the server reports the target
//! object has gone read-only, and writes the inode back once after any
//! allocating write.

use std::io::{self, Read, Write};

use crate::client::conn::{Connection, Dial};
use crate::client::rpc;
use crate::protocol::inode::{Inode, SD_INODE_SIZE};
use crate::protocol::types::{
    vid_to_data_oid, vid_to_vdi_oid, SdResult, CURRENT_VDI_ID, SD_DATA_OBJ_SIZE, SD_FLAG_CMD_COW,
};
use crate::protocol::SdError;

/// One open volume: connection, cached inode, dirty hint window.
///
/// A session is owned by a single worker thread for its whole
/// lifetime; requests on its connection are strictly serialized.
pub struct VdiSession<D: Dial> {
    dial: D,
    conn: Connection<D::Stream>,
    inode: Inode,
    min_dirty_data_idx: u32,
    max_dirty_data_idx: u32,
}

impl<D: Dial> std::fmt::Debug for VdiSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdiSession").finish_non_exhaustive()
    }
}

/// One per-object piece of a linear request
#[derive(Debug, PartialEq, Eq)]
struct Slice {
    idx: usize,
    obj_off: u64,
    start: usize,
    len: usize,
}

/// Cut `[offset, offset + len)` into pieces aligned to the object
/// size, in ascending slot order.
fn object_slices(offset: u64, len: usize) -> Vec<Slice> {
    let mut slices = Vec::new();
    let mut pos = 0usize;
    while pos < len {
        let abs = offset + pos as u64;
        let idx = (abs / SD_DATA_OBJ_SIZE) as usize;
        let obj_off = abs % SD_DATA_OBJ_SIZE;
        let n = ((SD_DATA_OBJ_SIZE - obj_off) as usize).min(len - pos);
        slices.push(Slice {
            idx,
            obj_off,
            start: pos,
            len: n,
        });
        pos += n;
    }
    slices
}

impl<D: Dial> VdiSession<D> {
    /// Lock the named VDI, open the session connection and read the
    /// inode.
    pub fn open(dial: D, name: &str) -> Result<Self, SdError> {
        let vid = rpc::find_vdi(&dial, name.as_bytes(), b"", CURRENT_VDI_ID, false)?;
        log::debug!("VDI {:?} resolved to {:#x}", name, vid);

        let mut conn = Connection::new(dial.dial()?);
        let inode = read_inode(&mut conn, vid, 0)?;

        Ok(Self {
            dial,
            conn,
            inode,
            min_dirty_data_idx: u32::MAX,
            max_dirty_data_idx: 0,
        })
    }

    /// Volume capacity in bytes.
    pub fn size(&self) -> u64 {
        self.inode.vdi_size
    }

    pub fn vdi_id(&self) -> u32 {
        self.inode.vdi_id
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    /// Read a linear range. Slots never written read as zeros without
    /// touching the cluster.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), SdError> {
        self.check_range(offset, buf.len())?;
        let copies = self.inode.nr_copies as u32;

        for s in object_slices(offset, buf.len()) {
            let vid = self.inode.data_vdi_id[s.idx];
            let dst = &mut buf[s.start..s.start + s.len];
            if vid == 0 {
                dst.fill(0);
                continue;
            }
            rpc::read_object(
                &mut self.conn,
                vid_to_data_oid(vid, s.idx as u32),
                dst,
                s.obj_off,
                copies,
            )?;
        }
        Ok(())
    }

    /// Write a linear range. Allocates or copy-on-writes objects the
    /// inode does not own yet, then writes the inode back once.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<(), SdError> {
        self.check_range(offset, buf.len())?;
        let mut need_update_inode = false;

        for s in object_slices(offset, buf.len()) {
            let data = &buf[s.start..s.start + s.len];
            loop {
                let copies = self.inode.nr_copies as u32;
                let own = self.inode.vdi_id;
                let cur = self.inode.data_vdi_id[s.idx];

                let (oid, cow_oid, create, flags) = if cur == own {
                    (vid_to_data_oid(cur, s.idx as u32), 0, false, 0)
                } else {
                    let (cow_oid, flags) = if cur != 0 {
                        (vid_to_data_oid(cur, s.idx as u32), SD_FLAG_CMD_COW)
                    } else {
                        (0, 0)
                    };
                    let idx = s.idx as u32;
                    self.min_dirty_data_idx = self.min_dirty_data_idx.min(idx);
                    self.max_dirty_data_idx = self.max_dirty_data_idx.max(idx);
                    self.inode.data_vdi_id[s.idx] = own;
                    (vid_to_data_oid(own, s.idx as u32), cow_oid, true, flags)
                };

                let outcome = rpc::write_object(
                    &mut self.conn,
                    oid,
                    cow_oid,
                    data,
                    s.obj_off,
                    copies,
                    create,
                    flags,
                )?;
                if outcome.need_reload {
                    // Concurrent snapshot: retry this piece against the
                    // reloaded inode, which may change the decision.
                    self.reload_inode()?;
                    continue;
                }
                if create {
                    need_update_inode = true;
                }
                break;
            }
        }

        if need_update_inode {
            self.update_inode()?;
        }
        Ok(())
    }

    /// Flush server-side caching for this volume.
    pub fn sync(&mut self) -> Result<(), SdError> {
        rpc::flush_vdi(&mut self.conn, self.inode.vdi_id)
    }

    /// Release the VDI lock and drop the connection. Anomalous release
    /// results are logged and otherwise ignored.
    pub fn close(mut self) {
        match rpc::release_vdi(&mut self.conn, self.inode.vdi_id) {
            Ok(result) => match SdResult::try_from(result) {
                Ok(SdResult::Success) | Ok(SdResult::VdiNotLocked) => {}
                _ => log::warn!(
                    "releasing VDI {:#x} answered {:#04x}",
                    self.inode.vdi_id,
                    result
                ),
            },
            Err(e) => log::warn!("releasing VDI {:#x} failed: {}", self.inode.vdi_id, e),
        }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<(), SdError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.inode.vdi_size => Ok(()),
            _ => Err(SdError::OutOfRange {
                offset,
                len: len as u64,
                size: self.inode.vdi_size,
            }),
        }
    }

    /// The addressed object went read-only under a concurrent
    /// snapshot. Re-resolve the name to the current writable
    /// generation and replace the cached inode, indirection table and
    /// all. The dirty window keeps accumulating across reloads.
    fn reload_inode(&mut self) -> Result<(), SdError> {
        let name = self.inode.name;
        let vid = rpc::find_vdi(&self.dial, &name, b"", CURRENT_VDI_ID, false)?;
        self.inode = read_inode(&mut self.conn, vid, self.inode.nr_copies as u32)?;
        log::debug!("inode reloaded, now VDI {:#x}", self.inode.vdi_id);
        Ok(())
    }

    /// Write the cached inode back in full.
    fn update_inode(&mut self) -> Result<(), SdError> {
        let bytes = self.inode.to_bytes()?;
        rpc::write_object(
            &mut self.conn,
            vid_to_vdi_oid(self.inode.vdi_id),
            0,
            &bytes,
            0,
            self.inode.nr_copies as u32,
            false,
            0,
        )?;
        Ok(())
    }
}

fn read_inode<S: Read + Write>(
    conn: &mut Connection<S>,
    vid: u32,
    copies: u32,
) -> Result<Inode, SdError> {
    let mut buf = vec![0u8; SD_INODE_SIZE];
    let n = rpc::read_object(conn, vid_to_vdi_oid(vid), &mut buf, 0, copies)?;
    if n != SD_INODE_SIZE {
        return Err(SdError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("short inode object: {} bytes", n),
        )));
    }
    Ok(Inode::from_bytes(&buf)?)
}
