//! Instance record.
//!
//! # Responsibility
//! - Hold the exported resource the host registers: identity fields, flags,
//!   and the session open-count.
//! - Own the host-allocated memory block for the record's entire lifetime.
//!
//! # Invariants
//! - `open_count` moves only through the session gate.
//! - `DELETE_PENDING`, once set, is cleared only by completing teardown
//!   (which consumes the record).

use crate::descriptor::Descriptor;
use crate::host::{AllocationId, InstanceMemory};
use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Instance flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstanceFlags: u8 {
        /// Host checksumming state has changed since load.
        const CHANGED = 0x02;
        /// The host's registry checksumming covers this record.
        const SUMMING_USED = 0x04;
        /// Teardown was requested while sessions were open.
        const DELETE_PENDING = 0x08;
    }
}

/// The exported resource record for one loaded device.
#[derive(Debug)]
pub struct DeviceInstance {
    name: String,
    flags: InstanceFlags,
    version: u16,
    revision: u16,
    id_string: String,
    open_count: u32,
    memory: InstanceMemory,
}

/// Serializable view of one instance record, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub version: u16,
    pub revision: u16,
    pub id_string: String,
    pub open_count: u32,
    pub flags: u8,
    pub delete_pending: bool,
}

impl DeviceInstance {
    /// Populates a fresh record inside host-allocated memory.
    ///
    /// # Invariants
    /// - Flags start as `SUMMING_USED | CHANGED`.
    /// - `open_count` starts at zero.
    pub(crate) fn populate(descriptor: &Descriptor, memory: InstanceMemory) -> Self {
        Self {
            name: descriptor.name.clone(),
            flags: InstanceFlags::SUMMING_USED | InstanceFlags::CHANGED,
            version: descriptor.version,
            revision: descriptor.revision,
            id_string: descriptor.id_string.clone(),
            open_count: 0,
            memory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> InstanceFlags {
        self.flags
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn revision(&self) -> u16 {
        self.revision
    }

    pub fn id_string(&self) -> &str {
        &self.id_string
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn delete_pending(&self) -> bool {
        self.flags.contains(InstanceFlags::DELETE_PENDING)
    }

    /// Allocation identity of the owned memory block.
    pub fn memory_id(&self) -> AllocationId {
        self.memory.id()
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            name: self.name.clone(),
            version: self.version,
            revision: self.revision,
            id_string: self.id_string.clone(),
            open_count: self.open_count,
            flags: self.flags.bits(),
            delete_pending: self.delete_pending(),
        }
    }

    pub(crate) fn increment_open_count(&mut self) {
        self.open_count += 1;
    }

    pub(crate) fn decrement_open_count(&mut self) {
        self.open_count -= 1;
    }

    pub(crate) fn set_delete_pending(&mut self) {
        self.flags.insert(InstanceFlags::DELETE_PENDING);
    }

    /// Surrenders the memory block at teardown.
    pub(crate) fn into_memory(self) -> InstanceMemory {
        self.memory
    }
}
