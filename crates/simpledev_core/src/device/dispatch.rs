//! Dispatch stubs: submit/cancel entry points for asynchronous commands.
//!
//! # Responsibility
//! - Validate a request is well-formed and hand it to the command processor.
//! - Keep cancellation best-effort and idempotent.
//!
//! # Invariants
//! - Neither entry point blocks the calling context; blocking command work
//!   belongs to the processor, deferred to a preemptible context.
//! - An unrecognized command is reported via the request's error field,
//!   never silently dropped.

use crate::device::instance::DeviceInstance;
use crate::model::request::{ErrorCode, IoRequest, MessageType, RequestId, RequestStatus};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// External collaborator that owns command semantics.
///
/// This core validates and routes; everything unit-specific happens behind
/// this seam.
pub trait CommandProcessor {
    /// Takes ownership of an in-flight request. `Ok` means the request was
    /// accepted and the processor will complete it later; `Err` makes the
    /// dispatch layer complete it as a failed reply.
    fn submit(
        &mut self,
        instance: &DeviceInstance,
        request: &mut IoRequest,
    ) -> Result<(), DispatchError>;

    /// Best-effort cancellation of an in-flight request.
    fn cancel(&mut self, instance: &DeviceInstance, request: &mut IoRequest) -> CancelOutcome;
}

/// Command processor stub: no command set, no cancellation support.
#[derive(Debug, Default)]
pub struct StubProcessor;

impl CommandProcessor for StubProcessor {
    fn submit(
        &mut self,
        _instance: &DeviceInstance,
        _request: &mut IoRequest,
    ) -> Result<(), DispatchError> {
        Err(DispatchError::UnsupportedCommand)
    }

    fn cancel(&mut self, _instance: &DeviceInstance, _request: &mut IoRequest) -> CancelOutcome {
        CancelOutcome::NotSupported
    }
}

/// Dispatch-layer failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler recognizes the command.
    UnsupportedCommand,
    /// The request carries no open device/unit back-references.
    RequestNotOpen,
    /// The request was opened against a different device.
    DeviceMismatch { expected: String, found: String },
    /// The request is already in flight and owned by its submitter.
    AlreadyInFlight(RequestId),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedCommand => write!(f, "no handler recognizes this command"),
            Self::RequestNotOpen => write!(f, "request has not been opened on a device"),
            Self::DeviceMismatch { expected, found } => {
                write!(f, "request is open on {found}, not {expected}")
            }
            Self::AlreadyInFlight(id) => write!(f, "request {id} is already in flight"),
        }
    }
}

impl Error for DispatchError {}

/// Result of a cancellation attempt. Every variant is a defined outcome;
/// repeating a cancel never faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The processor cancelled the request.
    Cancelled,
    /// The processor has no cancellation support.
    NotSupported,
    /// The request was never submitted.
    NotInFlight,
    /// The request already completed.
    AlreadyComplete,
    /// The request was already cancelled.
    AlreadyCancelled,
}

/// Accepts an asynchronous command request and hands it to the processor.
///
/// Precondition failures leave the request untouched and are returned to the
/// caller; processor rejections complete the request as a failed reply so the
/// outcome is always reported.
pub fn submit_request(
    instance: &DeviceInstance,
    request: &mut IoRequest,
    processor: &mut dyn CommandProcessor,
) -> Result<(), DispatchError> {
    let device = request
        .device
        .as_deref()
        .ok_or(DispatchError::RequestNotOpen)?;
    if request.unit.is_none() {
        return Err(DispatchError::RequestNotOpen);
    }
    if device != instance.name() {
        return Err(DispatchError::DeviceMismatch {
            expected: instance.name().to_string(),
            found: device.to_string(),
        });
    }
    if request.status == RequestStatus::Submitted {
        return Err(DispatchError::AlreadyInFlight(request.id));
    }

    request.status = RequestStatus::Submitted;
    request.message_type = MessageType::Command;
    request.error = ErrorCode::Success;
    match processor.submit(instance, request) {
        Ok(()) => {
            info!(
                "event=submit_request module=dispatch status=accepted device={} request={}",
                instance.name(),
                request.id
            );
            Ok(())
        }
        Err(err) => {
            // Every processor-side rejection lands on the same wire code:
            // the command was not handled.
            request.complete(ErrorCode::UnsupportedCommand);
            warn!(
                "event=submit_request module=dispatch status=rejected device={} request={} code={}",
                instance.name(),
                request.id,
                request.error.code()
            );
            Err(err)
        }
    }
}

/// Requests cancellation of an in-flight request.
///
/// Idempotent: never-submitted, completed, and already-cancelled requests
/// return defined outcomes without touching instance state.
pub fn cancel_request(
    instance: &DeviceInstance,
    request: &mut IoRequest,
    processor: &mut dyn CommandProcessor,
) -> CancelOutcome {
    let outcome = match request.status {
        RequestStatus::Idle => CancelOutcome::NotInFlight,
        RequestStatus::Completed => CancelOutcome::AlreadyComplete,
        RequestStatus::Cancelled => CancelOutcome::AlreadyCancelled,
        RequestStatus::Submitted => processor.cancel(instance, request),
    };
    info!(
        "event=cancel_request module=dispatch device={} request={} outcome={outcome:?}",
        instance.name(),
        request.id
    );
    outcome
}
