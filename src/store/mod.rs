//! Backing-store contract and registry
//!
//! The target framework drives each logical unit through the
//! `BackingStore` trait: open/close bracket the volume lifetime,
//! init/exit bracket the worker thread, and submit executes one
//! command at a time. `register_into` publishes the sheepdog
//! implementation; the framework's wiring module calls it at startup.

use std::collections::HashMap;

use crate::client::conn::TcpDial;
use crate::protocol::types::SD_DEFAULT_ADDR;
use crate::protocol::SdError;
use crate::scsi::{self, asc, sense_key, ScsiCommand, SenseData, SAM_STAT_CHECK_CONDITION};
use crate::volume::VdiSession;

/// Per-logical-unit backing store driven by the target framework
pub trait BackingStore {
    /// Open the volume named by `path`. Returns the capacity in bytes.
    fn open(&mut self, path: &str) -> Result<u64, SdError>;

    /// Release the volume.
    fn close(&mut self);

    /// Per-LU setup before any command is submitted. The framework
    /// registers this LU's worker thread here.
    fn init(&mut self) -> Result<(), SdError> {
        Ok(())
    }

    /// Per-LU teardown.
    fn exit(&mut self) {}

    /// Execute one SCSI command synchronously on the calling worker.
    fn submit(&mut self, cmd: &mut ScsiCommand);
}

/// Creates a fresh per-LU state for one backing-store kind
pub type StoreFactory = fn() -> Box<dyn BackingStore>;

/// Named backing-store implementations
#[derive(Default)]
pub struct Registry {
    stores: HashMap<&'static str, StoreFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, factory: StoreFactory) {
        log::debug!("registering backing store {:?}", name);
        self.stores.insert(name, factory);
    }

    /// Instantiate per-LU state for the named store.
    pub fn create(&self, name: &str) -> Option<Box<dyn BackingStore>> {
        self.stores.get(name).map(|factory| factory())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.stores.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Publish the sheepdog backing store.
pub fn register_into(registry: &mut Registry) {
    registry.register("sheepdog", || Box::new(SheepdogStore::default()));
}

/// Sheepdog-backed logical unit: one session per open volume, all
/// state on the remote cluster.
pub struct SheepdogStore {
    addr: String,
    session: Option<VdiSession<TcpDial>>,
}

impl SheepdogStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            session: None,
        }
    }
}

impl Default for SheepdogStore {
    fn default() -> Self {
        Self::new(SD_DEFAULT_ADDR)
    }
}

impl BackingStore for SheepdogStore {
    fn open(&mut self, path: &str) -> Result<u64, SdError> {
        if let Some(old) = self.session.take() {
            old.close();
        }
        let session = VdiSession::open(TcpDial::new(self.addr.clone()), path)?;
        let size = session.size();
        log::info!(
            "opened VDI {:?} ({:#x}), {} bytes",
            path,
            session.vdi_id(),
            size
        );
        self.session = Some(session);
        Ok(size)
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn submit(&mut self, cmd: &mut ScsiCommand) {
        match self.session.as_mut() {
            Some(session) => scsi::submit(session, cmd),
            None => {
                cmd.result = SAM_STAT_CHECK_CONDITION;
                cmd.sense = Some(SenseData::new(
                    sense_key::MEDIUM_ERROR,
                    asc::UNRECOVERED_READ_ERROR,
                    0,
                ));
            }
        }
    }
}
