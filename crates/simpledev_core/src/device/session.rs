//! Session gate: per-client open/close with reference counting.
//!
//! # Responsibility
//! - Admit clients to unit 0, running one-time unit setup on the first
//!   successful open.
//! - Keep `open_count` balanced and trigger deferred teardown when the last
//!   close lands after a pending delete.
//!
//! # Invariants
//! - Both calls run on the host's single cooperative thread; neither blocks.
//! - `open_count` never underflows; an unbalanced close is ignored.
//! - A failed setup leaves the session-open flag false, so a later open
//!   retries setup.

use crate::descriptor::SUPPORTED_UNIT;
use crate::device::instance::DeviceInstance;
use crate::device::lifecycle::{self, ModuleState};
use crate::host::ModuleHandle;
use crate::model::request::{ErrorCode, IoRequest, MessageType};
use log::{info, warn};

/// Outcome of a close.
#[derive(Debug)]
pub enum CloseOutcome {
    /// Sessions (or the module itself) remain; the caller keeps the record.
    Retained(DeviceInstance),
    /// This close dropped the count to zero with a delete pending; teardown
    /// ran and the handle is ready for unload.
    Unloaded(ModuleHandle),
}

/// Opens one client session on `unit_id`.
///
/// The request is primed as a failed reply first, so every early return
/// already carries `OpenFailed` and routes correctly. Only unit 0 exists;
/// the first successful open runs one-time unit setup.
pub fn open_session(
    state: &mut ModuleState,
    instance: &mut DeviceInstance,
    request: &mut IoRequest,
    unit_id: u32,
) {
    request.error = ErrorCode::OpenFailed;
    request.message_type = MessageType::Reply;

    if unit_id != SUPPORTED_UNIT {
        warn!(
            "event=open_session module=session status=rejected device={} unit={unit_id}",
            instance.name()
        );
        return;
    }

    if !state.session_open() {
        if let Err(err) = state.run_setup() {
            warn!(
                "event=open_session module=session status=setup_failed device={} reason=\"{}\"",
                instance.name(),
                err.reason
            );
            return;
        }
        state.set_session_open(true);
        info!(
            "event=unit_setup module=session status=ok device={}",
            instance.name()
        );
    }

    instance.increment_open_count();
    request.error = ErrorCode::Success;
    request.device = Some(instance.name().to_string());
    request.unit = Some(unit_id);
    info!(
        "event=open_session module=session status=ok device={} open_count={}",
        instance.name(),
        instance.open_count()
    );
}

/// Closes one client session.
///
/// Clears the request's back-references, decrements the count, and completes
/// a pending delete when this close was the last one out.
pub fn close_session(
    state: &mut ModuleState,
    mut instance: DeviceInstance,
    request: &mut IoRequest,
) -> CloseOutcome {
    request.clear_references();

    if instance.open_count() == 0 {
        warn!(
            "event=close_session module=session status=unbalanced device={}",
            instance.name()
        );
        return CloseOutcome::Retained(instance);
    }

    instance.decrement_open_count();
    info!(
        "event=close_session module=session status=ok device={} open_count={}",
        instance.name(),
        instance.open_count()
    );

    if instance.open_count() == 0 && instance.delete_pending() {
        return CloseOutcome::Unloaded(lifecycle::teardown(state, instance));
    }
    CloseOutcome::Retained(instance)
}
