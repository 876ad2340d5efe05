//! The running-process table (`SPEC_FULL.md`/Design Notes §9): address
//! spaces indexed by `SpaceId`, held weakly so that eviction racing a
//! process exit sees "nothing to write back" rather than a dangling
//! pointer.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::sched::SpaceId;

use super::address_space::AddressSpace;

/// Process-wide table of live address spaces.
#[derive(Default)]
pub struct ProcessTable {
    processes: spin::Mutex<BTreeMap<SpaceId, Weak<AddressSpace>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `space` under its own `SpaceId`.
    pub fn register(&self, space: &Arc<AddressSpace>) {
        self.processes
            .lock()
            .insert(space.space_id(), Arc::downgrade(space));
    }

    /// Drops the entry for `space_id` (called when the owning thread
    /// finishes).
    pub fn unregister(&self, space_id: SpaceId) {
        self.processes.lock().remove(&space_id);
    }

    /// Looks up the live address space for `space_id`, if the process that
    /// owned it hasn't exited. A page-table-eviction victim whose process
    /// has already exited resolves to `None` here -- the Design Notes §9
    /// "nothing to write back" case.
    pub fn get(&self, space_id: SpaceId) -> Option<Arc<AddressSpace>> {
        self.processes.lock().get(&space_id)?.upgrade()
    }
}
