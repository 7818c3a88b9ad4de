//! Device descriptor table.
//!
//! # Responsibility
//! - Define the immutable metadata record the host registers a device from.
//! - Keep the entry-point table in the fixed slot order the host dispatches by.
//! - Generate and validate the identification string consumed by host tooling.
//!
//! # Invariants
//! - A `Descriptor` is never mutated after construction.
//! - Entry-point slot order is the ABI; the terminator occupies the final slot
//!   and no other.
//! - `id_string` is regenerated verbatim whenever name/version/revision/date
//!   change.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod resident;

/// Number of slots in the entry-point table, terminator included.
pub const ENTRY_POINT_SLOTS: usize = 7;

/// The only unit this device exposes.
pub const SUPPORTED_UNIT: u32 = 0;

/// Identification string shape: `<name> <version>.<revision> (<d> <Mon> <yyyy>)`.
static ID_STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\S+ \d+\.\d+ \(\d{1,2} [A-Z][a-z]{2} \d{4}\)$").expect("valid id-string regex")
});

/// Tagged entry-point slot.
///
/// The host dispatches by slot position, not by tag; the tags exist so a
/// conformance check can verify the table instead of trusting memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Open,
    Close,
    Expunge,
    /// Reserved slot; the host never dispatches through it.
    Reserved,
    BeginIo,
    AbortIo,
    /// Sentinel the host recognizes as end-of-table. Never dispatched.
    Terminator,
}

impl EntryPoint {
    /// Stable slot name for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Expunge => "expunge",
            Self::Reserved => "reserved",
            Self::BeginIo => "begin_io",
            Self::AbortIo => "abort_io",
            Self::Terminator => "terminator",
        }
    }
}

/// Slot order required by the host ABI.
const EXPECTED_SLOT_ORDER: [EntryPoint; ENTRY_POINT_SLOTS] = [
    EntryPoint::Open,
    EntryPoint::Close,
    EntryPoint::Expunge,
    EntryPoint::Reserved,
    EntryPoint::BeginIo,
    EntryPoint::AbortIo,
    EntryPoint::Terminator,
];

/// Ordered, fixed-size entry-point table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointTable {
    slots: [EntryPoint; ENTRY_POINT_SLOTS],
}

impl EntryPointTable {
    /// Returns the canonical table in host ABI order.
    pub fn standard() -> Self {
        Self {
            slots: EXPECTED_SLOT_ORDER,
        }
    }

    /// Builds a table from explicit slots (conformance left to `validate`).
    pub fn from_slots(slots: [EntryPoint; ENTRY_POINT_SLOTS]) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[EntryPoint; ENTRY_POINT_SLOTS] {
        &self.slots
    }

    /// Returns the slot at `index`, or `None` past the end of the table.
    pub fn slot(&self, index: usize) -> Option<EntryPoint> {
        self.slots.get(index).copied()
    }

    /// Checks slot order and sentinel placement against the host ABI.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let last = ENTRY_POINT_SLOTS - 1;
        for (index, slot) in self.slots.iter().enumerate() {
            if *slot == EntryPoint::Terminator && index != last {
                return Err(DescriptorError::MisplacedTerminator(index));
            }
        }
        if self.slots[last] != EntryPoint::Terminator {
            return Err(DescriptorError::MissingTerminator);
        }
        for (index, (found, expected)) in
            self.slots.iter().zip(EXPECTED_SLOT_ORDER.iter()).enumerate()
        {
            if found != expected {
                return Err(DescriptorError::SlotMismatch {
                    index,
                    expected: *expected,
                    found: *found,
                });
            }
        }
        Ok(())
    }
}

/// Month abbreviation used by the identification string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jan => "Jan",
            Self::Feb => "Feb",
            Self::Mar => "Mar",
            Self::Apr => "Apr",
            Self::May => "May",
            Self::Jun => "Jun",
            Self::Jul => "Jul",
            Self::Aug => "Aug",
            Self::Sep => "Sep",
            Self::Oct => "Oct",
            Self::Nov => "Nov",
            Self::Dec => "Dec",
        }
    }
}

/// Build date embedded in the identification string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDate {
    pub day: u8,
    pub month: Month,
    pub year: u16,
}

impl BuildDate {
    /// Creates a build date; `day` must fall in `1..=31`.
    pub fn new(day: u8, month: Month, year: u16) -> Result<Self, DescriptorError> {
        if day == 0 || day > 31 {
            return Err(DescriptorError::InvalidDay(day));
        }
        Ok(Self { day, month, year })
    }
}

/// Renders the exact identification string the host tooling consumes.
pub fn format_id_string(name: &str, version: u16, revision: u16, date: BuildDate) -> String {
    format!(
        "{name} {version}.{revision} ({} {} {})",
        date.day,
        date.month.as_str(),
        date.year
    )
}

/// Returns whether `value` matches the identification string shape.
pub fn is_well_formed_id_string(value: &str) -> bool {
    ID_STRING_RE.is_match(value)
}

/// Immutable device descriptor.
///
/// Lifetime equals the loaded module image; nothing here changes at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Registered device name, e.g. `simple.device`.
    pub name: String,
    /// Identification string in the exact host format.
    pub id_string: String,
    pub version: u16,
    pub revision: u16,
    /// Registration priority. Zero unless a device genuinely needs ordering.
    pub priority: i8,
    pub entry_points: EntryPointTable,
    /// Bytes the host allocates for the instance record.
    pub instance_size: u32,
}

impl Descriptor {
    /// Builds a descriptor with the standard entry table and a generated
    /// identification string.
    pub fn new(
        name: impl Into<String>,
        version: u16,
        revision: u16,
        priority: i8,
        date: BuildDate,
        instance_size: u32,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(DescriptorError::InvalidName(name));
        }
        if instance_size == 0 {
            return Err(DescriptorError::ZeroInstanceSize);
        }

        let id_string = format_id_string(&name, version, revision, date);
        Ok(Self {
            name,
            id_string,
            version,
            revision,
            priority,
            entry_points: EntryPointTable::standard(),
            instance_size,
        })
    }

    /// Built-in baseline descriptor used to verify the registration path.
    pub fn baseline() -> Self {
        let date = BuildDate {
            day: 1,
            month: Month::Sep,
            year: 2020,
        };
        Self {
            name: "simple.device".to_string(),
            id_string: format_id_string("simple.device", 1, 0, date),
            version: 1,
            revision: 0,
            priority: 0,
            entry_points: EntryPointTable::standard(),
            instance_size: 64,
        }
    }

    /// Validates declaration-level descriptor invariants.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(DescriptorError::InvalidName(self.name.clone()));
        }
        if self.instance_size == 0 {
            return Err(DescriptorError::ZeroInstanceSize);
        }
        if !is_well_formed_id_string(&self.id_string) {
            return Err(DescriptorError::MalformedIdString(self.id_string.clone()));
        }
        self.entry_points.validate()
    }
}

/// Descriptor declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    EmptyName,
    InvalidName(String),
    ZeroInstanceSize,
    InvalidDay(u8),
    MalformedIdString(String),
    MissingTerminator,
    MisplacedTerminator(usize),
    SlotMismatch {
        index: usize,
        expected: EntryPoint,
        found: EntryPoint,
    },
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "descriptor name must not be empty"),
            Self::InvalidName(value) => {
                write!(f, "descriptor name must not contain whitespace: {value}")
            }
            Self::ZeroInstanceSize => write!(f, "descriptor instance size must be non-zero"),
            Self::InvalidDay(day) => write!(f, "build date day is out of range: {day}"),
            Self::MalformedIdString(value) => {
                write!(f, "identification string is malformed: {value}")
            }
            Self::MissingTerminator => {
                write!(f, "entry-point table does not end with the terminator")
            }
            Self::MisplacedTerminator(index) => {
                write!(f, "entry-point terminator found before final slot: {index}")
            }
            Self::SlotMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "entry-point slot {index} holds {} but the ABI expects {}",
                found.as_str(),
                expected.as_str()
            ),
        }
    }
}

impl Error for DescriptorError {}

#[cfg(test)]
mod tests {
    use super::{
        format_id_string, is_well_formed_id_string, BuildDate, Descriptor, DescriptorError,
        EntryPoint, EntryPointTable, Month, ENTRY_POINT_SLOTS,
    };

    #[test]
    fn baseline_descriptor_validates() {
        let descriptor = Descriptor::baseline();
        descriptor.validate().expect("baseline must conform");
        assert_eq!(descriptor.name, "simple.device");
        assert_eq!(descriptor.instance_size, 64);
    }

    #[test]
    fn baseline_id_string_is_exact() {
        assert_eq!(Descriptor::baseline().id_string, "simple.device 1.0 (1 Sep 2020)");
    }

    #[test]
    fn id_string_tracks_version_and_date() {
        let date = BuildDate::new(15, Month::Feb, 2024).expect("valid date");
        assert_eq!(
            format_id_string("ser.device", 37, 4, date),
            "ser.device 37.4 (15 Feb 2024)"
        );
    }

    #[test]
    fn id_string_regex_rejects_malformed_values() {
        assert!(is_well_formed_id_string("simple.device 1.0 (1 Sep 2020)"));
        assert!(!is_well_formed_id_string("simple.device 1.0 (1 September 2020)"));
        assert!(!is_well_formed_id_string("simple.device 1.0 1 Sep 2020"));
        assert!(!is_well_formed_id_string("simple.device 1 (1 Sep 2020)"));
        assert!(!is_well_formed_id_string("my device 1.0 (1 Sep 2020)"));
    }

    #[test]
    fn standard_table_conforms_to_abi_order() {
        let table = EntryPointTable::standard();
        table.validate().expect("standard table must conform");
        assert_eq!(table.slot(0), Some(EntryPoint::Open));
        assert_eq!(table.slot(3), Some(EntryPoint::Reserved));
        assert_eq!(table.slot(ENTRY_POINT_SLOTS - 1), Some(EntryPoint::Terminator));
        assert_eq!(table.slot(ENTRY_POINT_SLOTS), None);
    }

    #[test]
    fn rejects_table_without_terminator() {
        let table = EntryPointTable::from_slots([
            EntryPoint::Open,
            EntryPoint::Close,
            EntryPoint::Expunge,
            EntryPoint::Reserved,
            EntryPoint::BeginIo,
            EntryPoint::AbortIo,
            EntryPoint::Reserved,
        ]);
        assert_eq!(table.validate(), Err(DescriptorError::MissingTerminator));
    }

    #[test]
    fn rejects_terminator_before_final_slot() {
        let table = EntryPointTable::from_slots([
            EntryPoint::Open,
            EntryPoint::Close,
            EntryPoint::Terminator,
            EntryPoint::Reserved,
            EntryPoint::BeginIo,
            EntryPoint::AbortIo,
            EntryPoint::Terminator,
        ]);
        assert_eq!(table.validate(), Err(DescriptorError::MisplacedTerminator(2)));
    }

    #[test]
    fn rejects_reordered_slots() {
        let table = EntryPointTable::from_slots([
            EntryPoint::Close,
            EntryPoint::Open,
            EntryPoint::Expunge,
            EntryPoint::Reserved,
            EntryPoint::BeginIo,
            EntryPoint::AbortIo,
            EntryPoint::Terminator,
        ]);
        assert_eq!(
            table.validate(),
            Err(DescriptorError::SlotMismatch {
                index: 0,
                expected: EntryPoint::Open,
                found: EntryPoint::Close,
            })
        );
    }

    #[test]
    fn rejects_whitespace_in_device_name() {
        let date = BuildDate::new(1, Month::Sep, 2020).expect("valid date");
        let err = Descriptor::new("my device", 1, 0, 0, date, 64)
            .expect_err("whitespace name must be rejected");
        assert!(matches!(err, DescriptorError::InvalidName(_)));
    }

    #[test]
    fn rejects_zero_instance_size() {
        let date = BuildDate::new(1, Month::Sep, 2020).expect("valid date");
        let err = Descriptor::new("simple.device", 1, 0, 0, date, 0)
            .expect_err("zero instance size must be rejected");
        assert_eq!(err, DescriptorError::ZeroInstanceSize);
    }

    #[test]
    fn rejects_out_of_range_build_day() {
        assert_eq!(
            BuildDate::new(0, Month::Jan, 2020).expect_err("day 0 must fail"),
            DescriptorError::InvalidDay(0)
        );
        assert_eq!(
            BuildDate::new(32, Month::Jan, 2020).expect_err("day 32 must fail"),
            DescriptorError::InvalidDay(32)
        );
    }
}
