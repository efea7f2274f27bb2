//! Cluster protocol layer
//!
//! Wire header codec, the fixed inode layout, and the error taxonomy
//! shared by the client and session layers.

pub mod inode;
pub mod types;
pub mod wire;

pub use inode::{Inode, SD_INODE_SIZE};
pub use types::{Opcode, SdResult};
pub use wire::{Request, RequestBody, Response, ResponseBody};

use thiserror::Error;

/// Errors surfaced by cluster operations
#[derive(Debug, Error)]
pub enum SdError {
    /// Transport failure: the connection died or a syscall failed in a
    /// non-retryable way. Also covers malformed headers and inodes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered the request with a failure result code.
    #[error("{opcode:?} failed with result {result:#04x}")]
    Server { opcode: Opcode, result: u32 },

    /// A VDI name could not be resolved on the cluster.
    #[error("VDI not found: {0}")]
    VdiNotFound(String),

    /// A read or write reaches beyond the end of the volume.
    #[error("request beyond end of volume: offset {offset} + {len} > {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
}

impl SdError {
    pub(crate) fn server(opcode: Opcode, result: u32) -> Self {
        SdError::Server { opcode, result }
    }
}
