//! Sheepdog backing store for SCSI targets
//!
//! This crate implements the client side of a sheepdog cluster: it
//! exposes a virtual disk stored as a sparse, copy-on-write object
//! tree on the cluster as a block device to a SCSI target framework.
//! One TCP connection per open volume carries framed binary requests;
//! the cached inode maps each 4 MiB slot of the volume to the object
//! backing it.

pub mod client;
pub mod config;
pub mod protocol;
pub mod scsi;
pub mod store;
pub mod volume;

pub use config::Config;
pub use protocol::{Inode, SdError};
pub use store::{register_into, BackingStore, Registry, SheepdogStore};
pub use volume::VdiSession;
