//! Lifecycle manager: the create/destroy pair bracketing the instance record.
//!
//! # Responsibility
//! - Populate the instance record inside host-allocated memory, caching the
//!   host handle and module handle into process-wide module state.
//! - Tear the record down exactly once, deferring when sessions are open.
//!
//! # Invariants
//! - Both calls run on the host's single cooperative thread and complete in
//!   bounded, non-blocking time.
//! - Instance memory is released to the host at most once; the module handle
//!   is consumed at most once.
//! - `DELETE_PENDING` is cleared only by completing teardown.

use crate::descriptor::Descriptor;
use crate::device::instance::DeviceInstance;
use crate::host::{InstanceMemory, ModuleHandle, SharedHost};
use log::{error, info};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// One-time unit setup collaborator, run by the first successful open.
///
/// Command-level semantics live behind the same seam; this core ships only
/// the no-op implementation.
pub trait UnitSetup {
    fn initialize(&mut self) -> Result<(), SetupError>;
}

/// Setup collaborator stub: nothing to initialize, always succeeds.
#[derive(Debug, Default)]
pub struct NoopSetup;

impl UnitSetup for NoopSetup {
    fn initialize(&mut self) -> Result<(), SetupError> {
        Ok(())
    }
}

/// One-time setup failure reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupError {
    pub reason: String,
}

impl SetupError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Display for SetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit setup failed: {}", self.reason)
    }
}

impl Error for SetupError {}

/// Process-wide module state shared by every entry point.
///
/// Replaces the original's free-floating globals: created once at module
/// creation and threaded by reference into each call.
pub struct ModuleState {
    host: SharedHost,
    module_handle: Option<ModuleHandle>,
    session_open: bool,
    setup: Box<dyn UnitSetup>,
}

impl Debug for ModuleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleState")
            .field("module_handle", &self.module_handle)
            .field("session_open", &self.session_open)
            .finish_non_exhaustive()
    }
}

impl ModuleState {
    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    pub fn module_handle(&self) -> Option<ModuleHandle> {
        self.module_handle
    }

    pub fn session_open(&self) -> bool {
        self.session_open
    }

    pub(crate) fn set_session_open(&mut self, value: bool) {
        self.session_open = value;
    }

    pub(crate) fn run_setup(&mut self) -> Result<(), SetupError> {
        self.setup.initialize()
    }

    /// Consumes the cached module handle for unload.
    ///
    /// A second take cannot happen through the public API because teardown
    /// consumes the instance; the null fallback keeps the host contract
    /// observable if a caller wires its own sequence wrong.
    pub(crate) fn take_module_handle(&mut self) -> ModuleHandle {
        match self.module_handle.take() {
            Some(handle) => handle,
            None => {
                error!("event=take_module_handle module=lifecycle status=already_consumed");
                ModuleHandle::NULL
            }
        }
    }
}

/// Creation failure, handing the allocation back so the host can discard it.
#[derive(Debug)]
pub struct CreateFailure {
    pub error: CreateError,
    pub memory: InstanceMemory,
}

/// Reasons creation refuses to populate the record.
///
/// The original always succeeds here; these paths fire only when the host
/// breaks its allocation contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    WrongMemorySize { expected: u32, found: u32 },
    MemoryNotZeroed,
}

impl Display for CreateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongMemorySize { expected, found } => write!(
                f,
                "instance memory is {found} bytes, descriptor requires {expected}"
            ),
            Self::MemoryNotZeroed => write!(f, "instance memory is not zero-initialized"),
        }
    }
}

impl Error for CreateError {}

/// Outcome of a teardown request.
#[derive(Debug)]
pub enum ExpungeOutcome {
    /// Sessions are still open: `DELETE_PENDING` is set, nothing is freed,
    /// and the caller keeps the record resident.
    Deferred(DeviceInstance),
    /// The record is detached and freed; the handle tells the host the code
    /// image may be unloaded.
    Unloaded(ModuleHandle),
}

/// Populates the instance record and the process-wide module state.
///
/// Invoked exactly once by the host, synchronously, in a non-preemptible
/// context, with zero-initialized memory of exactly `instance_size` bytes.
/// On failure the host discards the returned allocation and does not
/// register the module.
pub fn create_instance(
    descriptor: &Descriptor,
    host: &SharedHost,
    module_handle: ModuleHandle,
    memory: InstanceMemory,
    setup: Box<dyn UnitSetup>,
) -> Result<(ModuleState, DeviceInstance), CreateFailure> {
    if memory.size() != descriptor.instance_size {
        return Err(CreateFailure {
            error: CreateError::WrongMemorySize {
                expected: descriptor.instance_size,
                found: memory.size(),
            },
            memory,
        });
    }
    if !memory.is_zeroed() {
        return Err(CreateFailure {
            error: CreateError::MemoryNotZeroed,
            memory,
        });
    }

    let state = ModuleState {
        host: Rc::clone(host),
        module_handle: Some(module_handle),
        session_open: false,
        setup,
    };
    let instance = DeviceInstance::populate(descriptor, memory);
    info!(
        "event=create_instance module=lifecycle status=ok device={} id_string=\"{}\"",
        instance.name(),
        instance.id_string()
    );
    Ok((state, instance))
}

/// Tears the instance down, or defers when sessions are still open.
///
/// Deferral is flow control, not an error: the module stays resident and the
/// last close completes the teardown.
pub fn destroy_instance(state: &mut ModuleState, mut instance: DeviceInstance) -> ExpungeOutcome {
    if instance.open_count() != 0 {
        instance.set_delete_pending();
        info!(
            "event=destroy_instance module=lifecycle status=deferred device={} open_count={}",
            instance.name(),
            instance.open_count()
        );
        return ExpungeOutcome::Deferred(instance);
    }
    ExpungeOutcome::Unloaded(teardown(state, instance))
}

/// Detaches the record, releases its memory, and yields the module handle.
///
/// Callers guarantee `open_count == 0`. Host bookkeeping failures here are
/// host bugs; they are logged and teardown still completes.
pub(crate) fn teardown(state: &mut ModuleState, instance: DeviceInstance) -> ModuleHandle {
    let name = instance.name().to_string();
    {
        let mut host = state.host.borrow_mut();
        if let Err(err) = host.detach_device(&name) {
            error!("event=teardown module=lifecycle status=detach_failed device={name} reason=\"{err}\"");
        }
        if let Err(err) = host.release_instance_memory(instance.into_memory()) {
            error!("event=teardown module=lifecycle status=release_failed device={name} reason=\"{err}\"");
        }
    }
    state.set_session_open(false);
    let handle = state.take_module_handle();
    info!(
        "event=teardown module=lifecycle status=ok device={name} module_handle={}",
        handle.raw()
    );
    handle
}

#[cfg(test)]
mod tests {
    use super::{create_instance, destroy_instance, CreateError, ExpungeOutcome, NoopSetup};
    use crate::descriptor::Descriptor;
    use crate::host::HostContext;

    #[test]
    fn create_rejects_wrong_size_memory() {
        let descriptor = Descriptor::baseline();
        let host = HostContext::shared();
        let (handle, memory) = {
            let mut host = host.borrow_mut();
            let handle = host.mint_module_handle();
            let memory = host.allocate_instance_memory(32).expect("allocation");
            (handle, memory)
        };

        let failure = create_instance(&descriptor, &host, handle, memory, Box::new(NoopSetup))
            .err()
            .expect("undersized memory must be rejected");
        assert_eq!(
            failure.error,
            CreateError::WrongMemorySize {
                expected: 64,
                found: 32
            }
        );
        // The allocation comes back so the host can discard it.
        host.borrow_mut()
            .release_instance_memory(failure.memory)
            .expect("host discards the failed allocation");
    }

    #[test]
    fn create_rejects_dirty_memory() {
        let descriptor = Descriptor::baseline();
        let host = HostContext::shared();
        let (handle, mut memory) = {
            let mut host = host.borrow_mut();
            let handle = host.mint_module_handle();
            let memory = host
                .allocate_instance_memory(descriptor.instance_size)
                .expect("allocation");
            (handle, memory)
        };
        memory.bytes_mut()[7] = 0xA5;

        let failure = create_instance(&descriptor, &host, handle, memory, Box::new(NoopSetup))
            .err()
            .expect("dirty memory must be rejected");
        assert_eq!(failure.error, CreateError::MemoryNotZeroed);
    }

    #[test]
    fn create_then_destroy_releases_everything_once() {
        let descriptor = Descriptor::baseline();
        let host = HostContext::shared();
        let (handle, memory) = {
            let mut host = host.borrow_mut();
            let handle = host.mint_module_handle();
            let memory = host
                .allocate_instance_memory(descriptor.instance_size)
                .expect("allocation");
            (handle, memory)
        };
        host.borrow_mut()
            .attach_device(&descriptor.name, handle)
            .expect("attach");

        let (mut state, instance) =
            create_instance(&descriptor, &host, handle, memory, Box::new(NoopSetup))
                .expect("creation");
        assert!(!state.session_open());
        assert_eq!(state.module_handle(), Some(handle));

        match destroy_instance(&mut state, instance) {
            ExpungeOutcome::Unloaded(returned) => assert_eq!(returned, handle),
            ExpungeOutcome::Deferred(_) => panic!("no sessions are open; teardown must run"),
        }
        assert_eq!(state.module_handle(), None);
        let host = host.borrow();
        assert_eq!(host.live_allocation_count(), 0);
        assert!(!host.is_attached(&descriptor.name));
    }
}
