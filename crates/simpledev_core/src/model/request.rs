//! I/O request record.
//!
//! # Responsibility
//! - Define the record a client threads through open/close/submit/cancel.
//! - Carry the result fields the host message system routes on: error code
//!   and reply classification.
//!
//! # Invariants
//! - `id` is stable for the request's lifetime and never reused.
//! - A request is owned by exactly one submitter while `Submitted`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identity of one request.
pub type RequestId = Uuid;

/// Signed completion code carried in the request's error field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Success,
    /// Unit not supported or one-time setup failed.
    OpenFailed,
    /// Request cancelled while in flight.
    Aborted,
    /// No handler recognizes the command.
    UnsupportedCommand,
}

impl ErrorCode {
    /// Numeric wire value: `0` success, negative failure codes.
    pub fn code(self) -> i8 {
        match self {
            Self::Success => 0,
            Self::OpenFailed => -1,
            Self::Aborted => -2,
            Self::UnsupportedCommand => -3,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::OpenFailed => "open_failed",
            Self::Aborted => "aborted",
            Self::UnsupportedCommand => "unsupported_command",
        };
        write!(f, "{name}")
    }
}

/// Message classification the host routes replies by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Command,
    Reply,
}

/// Dispatch state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Never submitted, or reset by the client for reuse.
    Idle,
    Submitted,
    Completed,
    Cancelled,
}

/// One client I/O request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoRequest {
    pub id: RequestId,
    /// Logical sub-unit the client is addressing.
    pub unit_id: u32,
    pub error: ErrorCode,
    pub message_type: MessageType,
    /// Back-reference to the opened device; cleared on close.
    pub device: Option<String>,
    /// Back-reference to the opened unit; cleared on close.
    pub unit: Option<u32>,
    pub status: RequestStatus,
}

impl IoRequest {
    /// Creates a fresh request addressed at `unit_id`.
    pub fn new(unit_id: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit_id,
            error: ErrorCode::Success,
            message_type: MessageType::Command,
            device: None,
            unit: None,
            status: RequestStatus::Idle,
        }
    }

    /// Whether the session gate has populated the back-references.
    pub fn is_open(&self) -> bool {
        self.device.is_some() && self.unit.is_some()
    }

    /// Drops the device/unit back-references so a stale handle cannot be
    /// reused after close.
    pub(crate) fn clear_references(&mut self) {
        self.device = None;
        self.unit = None;
    }

    /// Completes the request as a routed reply with `error`.
    pub(crate) fn complete(&mut self, error: ErrorCode) {
        self.error = error;
        self.message_type = MessageType::Reply;
        self.status = RequestStatus::Completed;
    }

    /// Marks an in-flight request cancelled. Collaborators that support
    /// cancellation call this exactly once per request.
    pub fn mark_cancelled(&mut self) {
        self.error = ErrorCode::Aborted;
        self.message_type = MessageType::Reply;
        self.status = RequestStatus::Cancelled;
    }
}
