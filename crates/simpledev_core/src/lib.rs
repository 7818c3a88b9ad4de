//! Lifecycle core for a cooperative-host device module.
//! This crate is the single source of truth for registration, session, and
//! teardown invariants; unit-specific command processing stays behind the
//! `CommandProcessor` seam.

pub mod descriptor;
pub mod device;
pub mod host;
pub mod logging;
pub mod model;

pub use descriptor::resident::{
    DataInitTable, NodeType, ResidentFlags, ResidentTag, ResidentTagError, MATCH_WORD,
};
pub use descriptor::{
    format_id_string, is_well_formed_id_string, BuildDate, Descriptor, DescriptorError, EntryPoint,
    EntryPointTable, Month, ENTRY_POINT_SLOTS, SUPPORTED_UNIT,
};
pub use device::dispatch::{
    cancel_request, submit_request, CancelOutcome, CommandProcessor, DispatchError, StubProcessor,
};
pub use device::instance::{DeviceInstance, InstanceFlags, InstanceSnapshot};
pub use device::lifecycle::{
    create_instance, destroy_instance, CreateError, CreateFailure, ExpungeOutcome, ModuleState,
    NoopSetup, SetupError, UnitSetup,
};
pub use device::session::{close_session, open_session, CloseOutcome};
pub use host::loader::{load_module, LoadError, LoadedModule};
pub use host::{AllocationId, HostContext, HostError, InstanceMemory, ModuleHandle, SharedHost};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::request::{ErrorCode, IoRequest, MessageType, RequestId, RequestStatus};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
