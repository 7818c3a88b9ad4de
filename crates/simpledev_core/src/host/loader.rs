//! Host loader flow: discovery scan through registration.
//!
//! # Responsibility
//! - Drive the auto-init sequence the host runs after pattern-scanning a
//!   module image: validate the tag, allocate instance memory, run the
//!   creation routine, and link the device in.
//! - Discard the allocation when creation declines, leaving the host clean.

use crate::descriptor::resident::{ResidentTag, ResidentTagError};
use crate::device::instance::DeviceInstance;
use crate::device::lifecycle::{create_instance, CreateError, ModuleState, UnitSetup};
use crate::host::{HostError, SharedHost};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A module the loader registered successfully.
#[derive(Debug)]
pub struct LoadedModule {
    pub state: ModuleState,
    pub instance: DeviceInstance,
}

/// Loader failures. In every case the host's allocator and registry are left
/// as they were before the load began.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    Tag(ResidentTagError),
    Host(HostError),
    Create(CreateError),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(err) => write!(f, "discovery tag rejected: {err}"),
            Self::Host(err) => write!(f, "host refused the load: {err}"),
            Self::Create(err) => write!(f, "creation routine declined: {err}"),
        }
    }
}

impl Error for LoadError {}

impl From<ResidentTagError> for LoadError {
    fn from(err: ResidentTagError) -> Self {
        Self::Tag(err)
    }
}

impl From<HostError> for LoadError {
    fn from(err: HostError) -> Self {
        Self::Host(err)
    }
}

/// Scans, validates, and registers one module image.
///
/// Mirrors the host's auto-init contract: memory is allocated from the tag's
/// instance size, the creation routine runs single-threaded, and a declined
/// creation unloads the image with its allocation discarded.
pub fn load_module(
    host: &SharedHost,
    tag: &ResidentTag,
    setup: Box<dyn UnitSetup>,
) -> Result<LoadedModule, LoadError> {
    tag.validate()?;

    let (module_handle, memory) = {
        let mut host_ref = host.borrow_mut();
        let module_handle = host_ref.mint_module_handle();
        let memory = host_ref.allocate_instance_memory(tag.descriptor.instance_size)?;
        (module_handle, memory)
    };

    let (state, instance) =
        match create_instance(&tag.descriptor, host, module_handle, memory, setup) {
            Ok(created) => created,
            Err(failure) => {
                warn!(
                    "event=load_module module=loader status=declined device={} reason=\"{}\"",
                    tag.descriptor.name, failure.error
                );
                // Creation declined: discard the allocation, unload the image.
                host.borrow_mut().release_instance_memory(failure.memory)?;
                return Err(LoadError::Create(failure.error));
            }
        };

    let attach_result = host
        .borrow_mut()
        .attach_device(instance.name(), module_handle);
    if let Err(err) = attach_result {
        warn!(
            "event=load_module module=loader status=attach_failed device={} reason=\"{err}\"",
            instance.name()
        );
        host.borrow_mut()
            .release_instance_memory(instance.into_memory())?;
        return Err(LoadError::Host(err));
    }

    info!(
        "event=load_module module=loader status=ok device={} module_handle={}",
        instance.name(),
        module_handle.raw()
    );
    Ok(LoadedModule { state, instance })
}
