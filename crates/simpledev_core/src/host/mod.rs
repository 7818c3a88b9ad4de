//! Simulated host environment.
//!
//! # Responsibility
//! - Own the host's global service table: device registry plus the
//!   instance-memory allocator.
//! - Mint module handles and hand out zero-initialized instance memory.
//!
//! # Invariants
//! - Every live allocation is tracked; releasing an unknown allocation is a
//!   host error, so an exactly-once release is observable from tests.
//! - A device name is attached at most once.
//!
//! The original environment exposes its service table at a fixed, well-known
//! address. Here the bootstrap is explicit: the host passes a shared context
//! handle into module creation exactly once, and the module caches it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod loader;

/// Shared handle to the host's global service table, cached by the module at
/// creation time.
pub type SharedHost = Rc<RefCell<HostContext>>;

/// Opaque identity of a loaded code image.
///
/// Captured once at module creation, consumed once at teardown to tell the
/// host the image may be unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(u64);

impl ModuleHandle {
    /// The "no image" value; real handles are never null.
    pub const NULL: ModuleHandle = ModuleHandle(0);

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Identity of one instance-memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AllocationId(u64);

impl AllocationId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Zero-initialized instance memory block owned by exactly one holder.
///
/// Move semantics make a double release unrepresentable; the host's
/// live-allocation set makes the single release observable.
#[derive(Debug)]
pub struct InstanceMemory {
    id: AllocationId,
    bytes: Vec<u8>,
}

impl InstanceMemory {
    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_zeroed(&self) -> bool {
        self.bytes.iter().all(|byte| *byte == 0)
    }

    /// Raw access for the holder. The host hands the block over untyped.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// The host's global service table.
#[derive(Debug, Default)]
pub struct HostContext {
    next_module_handle: u64,
    next_allocation: u64,
    live_allocations: BTreeSet<AllocationId>,
    registry: BTreeMap<String, ModuleHandle>,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh host behind the shared handle modules cache.
    pub fn shared() -> SharedHost {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Mints the handle for a newly loaded code image.
    pub fn mint_module_handle(&mut self) -> ModuleHandle {
        self.next_module_handle += 1;
        ModuleHandle(self.next_module_handle)
    }

    /// Allocates a zero-initialized instance-memory block of `size` bytes.
    pub fn allocate_instance_memory(&mut self, size: u32) -> Result<InstanceMemory, HostError> {
        if size == 0 {
            return Err(HostError::ZeroAllocation);
        }
        self.next_allocation += 1;
        let id = AllocationId(self.next_allocation);
        self.live_allocations.insert(id);
        Ok(InstanceMemory {
            id,
            bytes: vec![0; size as usize],
        })
    }

    /// Returns an instance-memory block to the allocator.
    pub fn release_instance_memory(&mut self, memory: InstanceMemory) -> Result<(), HostError> {
        if !self.live_allocations.remove(&memory.id) {
            return Err(HostError::UnknownAllocation(memory.id));
        }
        Ok(())
    }

    /// Links a created device into the service registry.
    pub fn attach_device(&mut self, name: &str, handle: ModuleHandle) -> Result<(), HostError> {
        if self.registry.contains_key(name) {
            return Err(HostError::DuplicateDevice(name.to_string()));
        }
        self.registry.insert(name.to_string(), handle);
        Ok(())
    }

    /// Unlinks a device from the service registry.
    pub fn detach_device(&mut self, name: &str) -> Result<(), HostError> {
        if self.registry.remove(name).is_none() {
            return Err(HostError::DeviceNotAttached(name.to_string()));
        }
        Ok(())
    }

    pub fn is_attached(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn attached_count(&self) -> usize {
        self.registry.len()
    }

    pub fn live_allocation_count(&self) -> usize {
        self.live_allocations.len()
    }
}

/// Host bookkeeping errors. These flag host-contract violations, not module
/// failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    ZeroAllocation,
    UnknownAllocation(AllocationId),
    DuplicateDevice(String),
    DeviceNotAttached(String),
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAllocation => write!(f, "instance memory allocation size must be non-zero"),
            Self::UnknownAllocation(id) => {
                write!(f, "allocation {} is not live in this host", id.raw())
            }
            Self::DuplicateDevice(name) => write!(f, "device already attached: {name}"),
            Self::DeviceNotAttached(name) => write!(f, "device is not attached: {name}"),
        }
    }
}

impl Error for HostError {}
