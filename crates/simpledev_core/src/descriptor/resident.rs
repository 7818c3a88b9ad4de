//! Resident discovery tag.
//!
//! # Responsibility
//! - Model the fixed-layout tag the host loader pattern-scans a module image
//!   for, and the four-word auto-init record hanging off it.
//! - Validate discovery-format conformance before any registration happens.
//!
//! # Invariants
//! - `match_word` is always `MATCH_WORD`.
//! - The flags byte carries `AUTO_INIT`; the data-init slot stays empty.
//! - The end-of-code marker never precedes the tag itself.

use crate::descriptor::{Descriptor, DescriptorError};
use bitflags::bitflags;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Magic marker the loader scans for.
pub const MATCH_WORD: u16 = 0x4AFC;

/// On-image size of the tag record, in bytes.
pub const RESIDENT_TAG_BYTES: u32 = 26;

bitflags! {
    /// Flags byte of the resident tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResidentFlags: u8 {
        /// Registration runs at system cold start.
        const COLD_START = 0x01;
        /// The init reference points at an auto-init table, not a routine.
        const AUTO_INIT = 0x80;
    }
}

/// Registered node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Device,
    Library,
    Resource,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Library => "library",
            Self::Resource => "resource",
        }
    }
}

/// Data-init record. This scaffold never ships one; the auto-init slot for it
/// must stay the null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataInitTable;

/// Discovery tag embedded in the module image.
///
/// The `descriptor` field stands in for the name/id/auto-init references of
/// the on-image layout; the remaining fields mirror the raw tag bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentTag {
    pub match_word: u16,
    /// Image offset of the tag itself (the tag's self-reference).
    pub self_offset: u32,
    /// Image offset of the end-of-code marker.
    pub end_offset: u32,
    pub flags: ResidentFlags,
    /// Version byte; must agree with the descriptor's version.
    pub version: u8,
    pub node_type: NodeType,
    /// Priority byte; must agree with the descriptor's priority.
    pub priority: i8,
    pub descriptor: Descriptor,
    /// Auto-init data-init slot. Must be `None`.
    pub data_init: Option<DataInitTable>,
}

impl ResidentTag {
    /// Builds a tag at explicit image offsets.
    pub fn new(descriptor: Descriptor, self_offset: u32, end_offset: u32) -> Self {
        Self {
            match_word: MATCH_WORD,
            self_offset,
            end_offset,
            flags: ResidentFlags::AUTO_INIT,
            version: descriptor.version as u8,
            node_type: NodeType::Device,
            priority: descriptor.priority,
            descriptor,
            data_init: None,
        }
    }

    /// Builds the canonical tag layout: end-of-code marker directly after the
    /// tag record.
    pub fn for_descriptor(descriptor: Descriptor) -> Self {
        Self::new(descriptor, 0, RESIDENT_TAG_BYTES)
    }

    /// Validates discovery-format conformance.
    pub fn validate(&self) -> Result<(), ResidentTagError> {
        if self.match_word != MATCH_WORD {
            return Err(ResidentTagError::BadMatchWord(self.match_word));
        }
        if !self.flags.contains(ResidentFlags::AUTO_INIT) {
            return Err(ResidentTagError::MissingAutoInit);
        }
        if self.node_type != NodeType::Device {
            return Err(ResidentTagError::NotADevice(self.node_type));
        }
        if self.data_init.is_some() {
            return Err(ResidentTagError::DataInitPresent);
        }
        if self.end_offset < self.self_offset {
            return Err(ResidentTagError::EndBeforeTag {
                self_offset: self.self_offset,
                end_offset: self.end_offset,
            });
        }
        if u16::from(self.version) != self.descriptor.version {
            return Err(ResidentTagError::VersionMismatch {
                tag: self.version,
                descriptor: self.descriptor.version,
            });
        }
        if self.priority != self.descriptor.priority {
            return Err(ResidentTagError::PriorityMismatch {
                tag: self.priority,
                descriptor: self.descriptor.priority,
            });
        }
        self.descriptor
            .validate()
            .map_err(ResidentTagError::InvalidDescriptor)
    }
}

/// Discovery-format conformance errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResidentTagError {
    BadMatchWord(u16),
    MissingAutoInit,
    NotADevice(NodeType),
    DataInitPresent,
    EndBeforeTag { self_offset: u32, end_offset: u32 },
    VersionMismatch { tag: u8, descriptor: u16 },
    PriorityMismatch { tag: i8, descriptor: i8 },
    InvalidDescriptor(DescriptorError),
}

impl Display for ResidentTagError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMatchWord(value) => {
                write!(f, "tag match word is {value:#06x}, expected {MATCH_WORD:#06x}")
            }
            Self::MissingAutoInit => write!(f, "tag flags do not request auto-init"),
            Self::NotADevice(node_type) => {
                write!(f, "tag registers a {}, expected a device", node_type.as_str())
            }
            Self::DataInitPresent => {
                write!(f, "auto-init data-init slot must be the null value")
            }
            Self::EndBeforeTag {
                self_offset,
                end_offset,
            } => write!(
                f,
                "end-of-code marker at {end_offset:#x} precedes the tag at {self_offset:#x}"
            ),
            Self::VersionMismatch { tag, descriptor } => write!(
                f,
                "tag version byte {tag} disagrees with descriptor version {descriptor}"
            ),
            Self::PriorityMismatch { tag, descriptor } => write!(
                f,
                "tag priority byte {tag} disagrees with descriptor priority {descriptor}"
            ),
            Self::InvalidDescriptor(err) => write!(f, "invalid descriptor: {err}"),
        }
    }
}

impl Error for ResidentTagError {}
