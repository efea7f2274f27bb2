//! Sheepdog protocol constants and identifier layout
//!
//! Opcode, flag and result-code values for the cluster protocol, plus
//! the 64-bit object identifier bit layout shared by every message.

/// Protocol version carried in every header
pub const SD_PROTO_VER: u8 = 0x01;

/// Default cluster endpoint
pub const SD_DEFAULT_ADDR: &str = "localhost:7000";

/// Request and response headers are both exactly this size
pub const SD_HEADER_SIZE: usize = 48;

/// Maximum length of a VDI name, NUL-padded on the wire
pub const SD_MAX_VDI_LEN: usize = 256;

/// Maximum length of a snapshot tag, NUL-padded on the wire
pub const SD_MAX_VDI_TAG_LEN: usize = 256;

/// Snapshot id meaning "the current (writable) generation"
pub const CURRENT_VDI_ID: u32 = 0;

/// Data objects are fixed 4 MiB windows of the volume
pub const SD_DATA_OBJ_SIZE: u64 = 1 << 22;

/// A volume addresses at most this many data objects (20-bit index)
pub const MAX_DATA_OBJS: usize = 1 << 20;

/// Maximum snapshot children recorded in an inode
pub const MAX_CHILDREN: usize = 1024;

/// OID bit marking an inode object
pub const VDI_BIT: u64 = 1 << 63;

/// OID bit marking a VM-state object. Not issued by this crate but
/// preserved when such identifiers are forwarded.
pub const VMSTATE_BIT: u64 = 1 << 62;

/// Request flags
pub const SD_FLAG_CMD_WRITE: u16 = 0x01;
pub const SD_FLAG_CMD_COW: u16 = 0x02;
pub const SD_FLAG_CMD_CACHE: u16 = 0x04;
pub const SD_FLAG_CMD_DIRECT: u16 = 0x08;

/// Build the OID of the inode object owned by `vid`.
pub fn vid_to_vdi_oid(vid: u32) -> u64 {
    VDI_BIT | ((vid as u64) << 32)
}

/// Build the OID of data object `idx` owned by `vid`.
pub fn vid_to_data_oid(vid: u32, idx: u32) -> u64 {
    ((vid as u64) << 32) | (idx as u64 & (MAX_DATA_OBJS as u64 - 1))
}

/// Extract the data-object index from a data OID.
pub fn data_oid_to_idx(oid: u64) -> u32 {
    (oid & (MAX_DATA_OBJS as u64 - 1)) as u32
}

/// True if `oid` names a data object rather than an inode.
pub fn is_data_obj(oid: u64) -> bool {
    oid & VDI_BIT == 0
}

/// Protocol opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    CreateAndWriteObj = 0x01,
    ReadObj = 0x02,
    WriteObj = 0x03,
    DiscardObj = 0x05,
    NewVdi = 0x11,
    LockVdi = 0x12,
    ReleaseVdi = 0x13,
    GetVdiInfo = 0x14,
    ReadVdis = 0x15,
    FlushVdi = 0x16,
    DelVdi = 0x17,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Opcode::CreateAndWriteObj),
            0x02 => Ok(Opcode::ReadObj),
            0x03 => Ok(Opcode::WriteObj),
            0x05 => Ok(Opcode::DiscardObj),
            0x11 => Ok(Opcode::NewVdi),
            0x12 => Ok(Opcode::LockVdi),
            0x13 => Ok(Opcode::ReleaseVdi),
            0x14 => Ok(Opcode::GetVdiInfo),
            0x15 => Ok(Opcode::ReadVdis),
            0x16 => Ok(Opcode::FlushVdi),
            0x17 => Ok(Opcode::DelVdi),
            other => Err(other),
        }
    }
}

/// The three wire layouts of the opcode-specific header half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    Generic,
    Object,
    Vdi,
}

impl Opcode {
    /// Which header shape this opcode travels in.
    ///
    /// FLUSH_VDI addresses the inode object directly, so it uses the
    /// object shape even though it manages a VDI. READ_VDIS carries no
    /// typed fields and uses the generic shape.
    pub fn shape(self) -> HeaderShape {
        match self {
            Opcode::CreateAndWriteObj
            | Opcode::ReadObj
            | Opcode::WriteObj
            | Opcode::DiscardObj
            | Opcode::FlushVdi => HeaderShape::Object,
            Opcode::NewVdi
            | Opcode::LockVdi
            | Opcode::ReleaseVdi
            | Opcode::GetVdiInfo
            | Opcode::DelVdi => HeaderShape::Vdi,
            Opcode::ReadVdis => HeaderShape::Generic,
        }
    }
}

/// Result codes returned by the cluster
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdResult {
    Success = 0x00,
    Unknown = 0x01,
    NoObj = 0x02,
    Eio = 0x03,
    VdiExist = 0x04,
    InvalidParms = 0x05,
    SystemError = 0x06,
    VdiLocked = 0x07,
    NoVdi = 0x08,
    NoBaseVdi = 0x09,
    VdiRead = 0x0a,
    VdiWrite = 0x0b,
    BaseVdiRead = 0x0c,
    BaseVdiWrite = 0x0d,
    NoTag = 0x0e,
    Startup = 0x0f,
    VdiNotLocked = 0x10,
    Shutdown = 0x11,
    NoMem = 0x12,
    FullVdi = 0x13,
    VerMismatch = 0x14,
    NoSpace = 0x15,
    WaitForFormat = 0x16,
    WaitForJoin = 0x17,
    JoinFailed = 0x18,
    Halt = 0x19,
    Readonly = 0x1a,
}

impl TryFrom<u32> for SdResult {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SdResult::Success),
            0x01 => Ok(SdResult::Unknown),
            0x02 => Ok(SdResult::NoObj),
            0x03 => Ok(SdResult::Eio),
            0x04 => Ok(SdResult::VdiExist),
            0x05 => Ok(SdResult::InvalidParms),
            0x06 => Ok(SdResult::SystemError),
            0x07 => Ok(SdResult::VdiLocked),
            0x08 => Ok(SdResult::NoVdi),
            0x09 => Ok(SdResult::NoBaseVdi),
            0x0a => Ok(SdResult::VdiRead),
            0x0b => Ok(SdResult::VdiWrite),
            0x0c => Ok(SdResult::BaseVdiRead),
            0x0d => Ok(SdResult::BaseVdiWrite),
            0x0e => Ok(SdResult::NoTag),
            0x0f => Ok(SdResult::Startup),
            0x10 => Ok(SdResult::VdiNotLocked),
            0x11 => Ok(SdResult::Shutdown),
            0x12 => Ok(SdResult::NoMem),
            0x13 => Ok(SdResult::FullVdi),
            0x14 => Ok(SdResult::VerMismatch),
            0x15 => Ok(SdResult::NoSpace),
            0x16 => Ok(SdResult::WaitForFormat),
            0x17 => Ok(SdResult::WaitForJoin),
            0x18 => Ok(SdResult::JoinFailed),
            0x19 => Ok(SdResult::Halt),
            0x1a => Ok(SdResult::Readonly),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_oid_round_trip() {
        for &(vid, idx) in &[(1u32, 0u32), (7, 3), (0xabcdef, MAX_DATA_OBJS as u32 - 1)] {
            let oid = vid_to_data_oid(vid, idx);
            assert_eq!(data_oid_to_idx(oid), idx);
            assert!(is_data_obj(oid));
        }
    }

    #[test]
    fn test_vdi_oid_is_not_data() {
        assert!(!is_data_obj(vid_to_vdi_oid(0)));
        assert!(!is_data_obj(vid_to_vdi_oid(7)));
        assert!(!is_data_obj(vid_to_vdi_oid(0xffffff)));
    }

    #[test]
    fn test_vdi_oid_carries_vid() {
        let oid = vid_to_vdi_oid(0x00beef);
        assert_eq!(oid & VDI_BIT, VDI_BIT);
        assert_eq!((oid >> 32) as u32 & 0x00ff_ffff, 0x00beef);
    }

    #[test]
    fn test_opcode_shapes() {
        assert_eq!(Opcode::ReadObj.shape(), HeaderShape::Object);
        assert_eq!(Opcode::FlushVdi.shape(), HeaderShape::Object);
        assert_eq!(Opcode::LockVdi.shape(), HeaderShape::Vdi);
        assert_eq!(Opcode::ReadVdis.shape(), HeaderShape::Generic);
    }

    #[test]
    fn test_opcode_byte_round_trip() {
        for op in [
            Opcode::CreateAndWriteObj,
            Opcode::ReadObj,
            Opcode::WriteObj,
            Opcode::DiscardObj,
            Opcode::NewVdi,
            Opcode::LockVdi,
            Opcode::ReleaseVdi,
            Opcode::GetVdiInfo,
            Opcode::ReadVdis,
            Opcode::FlushVdi,
            Opcode::DelVdi,
        ] {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
        assert_eq!(Opcode::try_from(0x42), Err(0x42));
    }

    #[test]
    fn test_result_code_round_trip() {
        assert_eq!(SdResult::try_from(0x00), Ok(SdResult::Success));
        assert_eq!(SdResult::try_from(0x1a), Ok(SdResult::Readonly));
        assert_eq!(SdResult::try_from(0x10), Ok(SdResult::VdiNotLocked));
        assert_eq!(SdResult::try_from(0xbeef), Err(0xbeef));
    }
}
