//! SCSI adapter
//!
//! Translates a SCSI command descriptor block into a single call on a
//! volume session and maps engine failures into sense data. Only the
//! read, write and synchronize-cache families touch the volume; every
//! other opcode passes through untouched.

use crate::client::conn::Dial;
use crate::volume::VdiSession;

/// SCSI opcodes the adapter dispatches on
pub mod opcodes {
    pub const READ_6: u8 = 0x08;
    pub const WRITE_6: u8 = 0x0a;
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2a;
    pub const SYNCHRONIZE_CACHE: u8 = 0x35;
    pub const READ_16: u8 = 0x88;
    pub const WRITE_16: u8 = 0x8a;
    pub const SYNCHRONIZE_CACHE_16: u8 = 0x91;
    pub const READ_12: u8 = 0xa8;
    pub const WRITE_12: u8 = 0xaa;
}

/// SAM status codes
pub const SAM_STAT_GOOD: u8 = 0x00;
pub const SAM_STAT_CHECK_CONDITION: u8 = 0x02;

/// SCSI sense keys
pub mod sense_key {
    pub const MEDIUM_ERROR: u8 = 0x03;
}

/// Additional Sense Code values
pub mod asc {
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
}

/// SCSI sense data (fixed format)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenseData {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    pub fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    /// Serialize to fixed-format sense data (18 bytes).
    pub fn to_fixed(&self) -> [u8; 18] {
        let mut data = [0u8; 18];
        data[0] = 0x70; // current error, fixed format
        data[2] = self.key & 0x0f;
        data[7] = 10; // additional sense length
        data[12] = self.asc;
        data[13] = self.ascq;
        data
    }
}

/// One SCSI command as handed over by the target framework. The
/// dispatcher fills in the CDB, the byte offset derived from the LBA,
/// and the transfer buffers; the adapter fills in status and sense.
#[derive(Debug)]
pub struct ScsiCommand {
    pub cdb: Vec<u8>,
    /// Byte offset on the volume
    pub offset: u64,
    /// Data-out payload for writes
    pub out_buf: Vec<u8>,
    /// Data-in buffer for reads, sized to the transfer length
    pub in_buf: Vec<u8>,
    /// SAM status
    pub result: u8,
    pub sense: Option<SenseData>,
}

impl ScsiCommand {
    pub fn new(cdb: Vec<u8>) -> Self {
        Self {
            cdb,
            offset: 0,
            out_buf: Vec::new(),
            in_buf: Vec::new(),
            result: SAM_STAT_GOOD,
            sense: None,
        }
    }
}

/// Execute one command against the session. Any engine failure,
/// whether on a read, a write or a flush, is reported as a medium
/// error; richer classification only goes to the log.
pub fn submit<D: Dial>(session: &mut VdiSession<D>, cmd: &mut ScsiCommand) {
    let op = match cmd.cdb.first() {
        Some(&op) => op,
        None => return,
    };

    let outcome = match op {
        opcodes::SYNCHRONIZE_CACHE | opcodes::SYNCHRONIZE_CACHE_16 => session.sync(),
        opcodes::WRITE_6 | opcodes::WRITE_10 | opcodes::WRITE_12 | opcodes::WRITE_16 => {
            session.write_at(&cmd.out_buf, cmd.offset)
        }
        opcodes::READ_6 | opcodes::READ_10 | opcodes::READ_12 | opcodes::READ_16 => {
            session.read_at(&mut cmd.in_buf, cmd.offset)
        }
        _ => Ok(()),
    };

    match outcome {
        Ok(()) => cmd.result = SAM_STAT_GOOD,
        Err(e) => {
            log::error!("SCSI op 0x{:02x} failed: {}", op, e);
            cmd.result = SAM_STAT_CHECK_CONDITION;
            cmd.sense = Some(SenseData::new(
                sense_key::MEDIUM_ERROR,
                asc::UNRECOVERED_READ_ERROR,
                0,
            ));
        }
    }
}
