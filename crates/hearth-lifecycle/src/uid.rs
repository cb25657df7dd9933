//! Hierarchical identifiers for devices and device types.
//!
//! Identifiers are colon-separated segments (`module:type:instance[:sub...]`).
//! The textual form is stable and doubles as the Status Store key, so it is
//! stored once and handed out by reference.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

const SEPARATOR: char = ':';
const TYPE_SEGMENTS: usize = 2;
const MIN_DEVICE_SEGMENTS: usize = 3;

/// Errors raised when parsing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UidParseError {
    /// The identifier was empty.
    #[error("identifier must not be empty")]
    Empty,
    /// The identifier had the wrong number of segments.
    #[error("identifier '{input}' has {found} segment(s), expected {expected}")]
    SegmentCount {
        /// Offending input.
        input: String,
        /// Number of segments found.
        found: usize,
        /// Human-readable expectation, e.g. `2` or `at least 3`.
        expected: &'static str,
    },
    /// A segment was empty or contained an illegal character.
    #[error("identifier '{input}' has invalid segment '{segment}'")]
    InvalidSegment {
        /// Offending input.
        input: String,
        /// Segment that failed validation.
        segment: String,
    },
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

fn validate(input: &str) -> Result<Vec<&str>, UidParseError> {
    if input.is_empty() {
        return Err(UidParseError::Empty);
    }
    let segments: Vec<&str> = input.split(SEPARATOR).collect();
    if let Some(bad) = segments.iter().find(|segment| !is_valid_segment(segment)) {
        return Err(UidParseError::InvalidSegment {
            input: input.to_owned(),
            segment: (*bad).to_owned(),
        });
    }
    Ok(segments)
}

/// Identifier of a device type: `module:type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceTypeUid {
    raw: String,
}

impl DeviceTypeUid {
    /// Builds a type identifier from its module and type segments.
    ///
    /// # Errors
    ///
    /// Returns [`UidParseError::InvalidSegment`] when either segment is
    /// empty or contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(module: &str, type_id: &str) -> Result<Self, UidParseError> {
        format!("{module}{SEPARATOR}{type_id}").parse()
    }

    /// Returns the owning module segment.
    #[must_use]
    pub fn module(&self) -> &str {
        self.raw.split(SEPARATOR).next().unwrap_or_default()
    }

    /// Returns the type segment.
    #[must_use]
    pub fn type_id(&self) -> &str {
        self.raw.split(SEPARATOR).nth(1).unwrap_or_default()
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }
}

impl FromStr for DeviceTypeUid {
    type Err = UidParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let segments = validate(input)?;
        if segments.len() != TYPE_SEGMENTS {
            return Err(UidParseError::SegmentCount {
                input: input.to_owned(),
                found: segments.len(),
                expected: "2",
            });
        }
        Ok(Self {
            raw: input.to_owned(),
        })
    }
}

impl fmt::Display for DeviceTypeUid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

impl Serialize for DeviceTypeUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Globally unique device identifier: `module:type:instance[:sub...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceUid {
    raw: String,
}

impl DeviceUid {
    /// Builds an identifier from individual segments.
    ///
    /// # Errors
    ///
    /// Returns [`UidParseError`] when fewer than three segments are supplied
    /// or any segment is invalid.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, UidParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|segment| segment.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(":");
        joined.parse()
    }

    /// Returns the owning module segment.
    #[must_use]
    pub fn module(&self) -> &str {
        self.raw.split(SEPARATOR).next().unwrap_or_default()
    }

    /// Returns the last segment, identifying the instance.
    #[must_use]
    pub fn id(&self) -> &str {
        self.raw.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Iterates over all segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split(SEPARATOR)
    }

    /// Returns the device type encoded in the first two segments.
    #[must_use]
    pub fn device_type(&self) -> DeviceTypeUid {
        let mut segments = self.raw.splitn(MIN_DEVICE_SEGMENTS, SEPARATOR);
        let module = segments.next().unwrap_or_default();
        let type_id = segments.next().unwrap_or_default();
        DeviceTypeUid {
            raw: format!("{module}{SEPARATOR}{type_id}"),
        }
    }

    /// Returns the textual form used as the storage key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }
}

impl FromStr for DeviceUid {
    type Err = UidParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let segments = validate(input)?;
        if segments.len() < MIN_DEVICE_SEGMENTS {
            return Err(UidParseError::SegmentCount {
                input: input.to_owned(),
                found: segments.len(),
                expected: "at least 3",
            });
        }
        Ok(Self {
            raw: input.to_owned(),
        })
    }
}

impl fmt::Display for DeviceUid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

impl Serialize for DeviceUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
