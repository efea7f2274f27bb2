//! The fixed-layout VDI inode object
//!
//! An inode describes one virtual disk: identity, geometry, snapshot
//! lineage, and the indirection table mapping each 4 MiB data-object
//! slot to the VID that owns the physical object backing it. The wire
//! layout is fixed at `SD_INODE_SIZE` bytes and round-trips
//! byte-for-byte.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::{self, Read, Write};

use super::types::{
    MAX_CHILDREN, MAX_DATA_OBJS, SD_DATA_OBJ_SIZE, SD_MAX_VDI_LEN, SD_MAX_VDI_TAG_LEN,
};

/// Inode bytes before the indirection table
pub const SD_INODE_HEADER_SIZE: usize =
    SD_MAX_VDI_LEN + SD_MAX_VDI_TAG_LEN + 5 * 8 + 4 + 3 * 4 + MAX_CHILDREN * 4;

/// Total on-wire size of an inode object
pub const SD_INODE_SIZE: usize = SD_INODE_HEADER_SIZE + MAX_DATA_OBJS * 4;

/// In-memory inode. The indirection table is kept as a contiguous
/// array indexed by slot; slot `idx` is unallocated iff
/// `data_vdi_id[idx] == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub name: [u8; SD_MAX_VDI_LEN],
    pub tag: [u8; SD_MAX_VDI_TAG_LEN],
    pub create_time: u64,
    pub snap_ctime: u64,
    pub vm_clock_nsec: u64,
    pub vdi_size: u64,
    pub vm_state_size: u64,
    pub copy_policy: u16,
    pub nr_copies: u8,
    pub block_size_shift: u8,
    pub snap_id: u32,
    pub vdi_id: u32,
    pub parent_vdi_id: u32,
    /// Snapshot children, `MAX_CHILDREN` entries
    pub child_vdi_id: Vec<u32>,
    /// Indirection table, `MAX_DATA_OBJS` entries
    pub data_vdi_id: Vec<u32>,
}

impl Inode {
    pub fn new() -> Self {
        Self {
            name: [0; SD_MAX_VDI_LEN],
            tag: [0; SD_MAX_VDI_TAG_LEN],
            create_time: 0,
            snap_ctime: 0,
            vm_clock_nsec: 0,
            vdi_size: 0,
            vm_state_size: 0,
            copy_policy: 0,
            nr_copies: 0,
            block_size_shift: 0,
            snap_id: 0,
            vdi_id: 0,
            parent_vdi_id: 0,
            child_vdi_id: vec![0; MAX_CHILDREN],
            data_vdi_id: vec![0; MAX_DATA_OBJS],
        }
    }

    /// Volume name up to the first NUL, lossily decoded.
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(nul_trimmed(&self.name))
    }

    /// Snapshot tag up to the first NUL, lossily decoded.
    pub fn tag_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(nul_trimmed(&self.tag))
    }

    /// Set the volume name, truncating to the field width.
    pub fn set_name(&mut self, name: &str) {
        copy_nul_padded(&mut self.name, name.as_bytes());
    }

    /// Set the snapshot tag, truncating to the field width.
    pub fn set_tag(&mut self, tag: &str) {
        copy_nul_padded(&mut self.tag, tag.as_bytes());
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut name = [0u8; SD_MAX_VDI_LEN];
        reader.read_exact(&mut name)?;
        let mut tag = [0u8; SD_MAX_VDI_TAG_LEN];
        reader.read_exact(&mut tag)?;

        let create_time = reader.read_u64::<LittleEndian>()?;
        let snap_ctime = reader.read_u64::<LittleEndian>()?;
        let vm_clock_nsec = reader.read_u64::<LittleEndian>()?;
        let vdi_size = reader.read_u64::<LittleEndian>()?;
        let vm_state_size = reader.read_u64::<LittleEndian>()?;
        let copy_policy = reader.read_u16::<LittleEndian>()?;
        let nr_copies = reader.read_u8()?;
        let block_size_shift = reader.read_u8()?;
        let snap_id = reader.read_u32::<LittleEndian>()?;
        let vdi_id = reader.read_u32::<LittleEndian>()?;
        let parent_vdi_id = reader.read_u32::<LittleEndian>()?;

        let mut child_vdi_id = vec![0u32; MAX_CHILDREN];
        reader.read_u32_into::<LittleEndian>(&mut child_vdi_id)?;
        let mut data_vdi_id = vec![0u32; MAX_DATA_OBJS];
        reader.read_u32_into::<LittleEndian>(&mut data_vdi_id)?;

        if vdi_size > SD_DATA_OBJ_SIZE * MAX_DATA_OBJS as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("inode vdi_size {} exceeds addressable range", vdi_size),
            ));
        }

        Ok(Self {
            name,
            tag,
            create_time,
            snap_ctime,
            vm_clock_nsec,
            vdi_size,
            vm_state_size,
            copy_policy,
            nr_copies,
            block_size_shift,
            snap_id,
            vdi_id,
            parent_vdi_id,
            child_vdi_id,
            data_vdi_id,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.name)?;
        writer.write_all(&self.tag)?;
        writer.write_u64::<LittleEndian>(self.create_time)?;
        writer.write_u64::<LittleEndian>(self.snap_ctime)?;
        writer.write_u64::<LittleEndian>(self.vm_clock_nsec)?;
        writer.write_u64::<LittleEndian>(self.vdi_size)?;
        writer.write_u64::<LittleEndian>(self.vm_state_size)?;
        writer.write_u16::<LittleEndian>(self.copy_policy)?;
        writer.write_u8(self.nr_copies)?;
        writer.write_u8(self.block_size_shift)?;
        writer.write_u32::<LittleEndian>(self.snap_id)?;
        writer.write_u32::<LittleEndian>(self.vdi_id)?;
        writer.write_u32::<LittleEndian>(self.parent_vdi_id)?;
        for &v in &self.child_vdi_id {
            writer.write_u32::<LittleEndian>(v)?;
        }
        for &v in &self.data_vdi_id {
            writer.write_u32::<LittleEndian>(v)?;
        }
        Ok(())
    }

    /// Decode an inode from exactly `SD_INODE_SIZE` bytes.
    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        if buf.len() != SD_INODE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("inode object has {} bytes, expected {}", buf.len(), SD_INODE_SIZE),
            ));
        }
        Self::read_from(&mut &buf[..])
    }

    /// Encode into a freshly allocated `SD_INODE_SIZE` buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(SD_INODE_SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

/// Slice a NUL-padded byte string down to its content.
pub(crate) fn nul_trimmed(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(n) => &bytes[..n],
        None => bytes,
    }
}

/// Copy a byte string into a fixed-width field, truncating to the
/// field width and NUL-padding the remainder.
pub(crate) fn copy_nul_padded(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}
