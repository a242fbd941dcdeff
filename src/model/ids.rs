//! Validated identifier newtypes used throughout the region-merge domain.
//!
//! Each type validates its invariant once at construction and is otherwise a
//! thin, `Display`-able wrapper. This mirrors the rest of the crate's error
//! style: a single [`ValidationError`] carries the offending kind, the raw
//! value, and a human reason, rather than a bespoke error per type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Which identifier kind failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    TableName,
    RegionId,
    EncodedName,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableName => write!(f, "table name"),
            Self::RegionId => write!(f, "region id"),
            Self::EncodedName => write!(f, "encoded name"),
        }
    }
}

/// A value failed validation for one of the identifier newtypes in this module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?} ({})",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// TableName
// ---------------------------------------------------------------------------

/// A validated table name: non-empty, printable ASCII, no path separators.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Construct a `TableName`, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, contains a `/`, or contains
    /// non-printable bytes.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::TableName,
                value: s.to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if s.contains('/') {
            return Err(ValidationError {
                kind: ErrorKind::TableName,
                value: s.to_owned(),
                reason: "must not contain '/'".to_owned(),
            });
        }
        if !s.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError {
                kind: ErrorKind::TableName,
                value: s.to_owned(),
                reason: "must contain only printable ASCII characters".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<TableName> for String {
    fn from(v: TableName) -> Self {
        v.0
    }
}

// ---------------------------------------------------------------------------
// RegionId
// ---------------------------------------------------------------------------

/// A region's identifying timestamp: milliseconds since the Unix epoch at
/// the time the region was created. Ordering between two regions' ids is
/// meaningful — a merged region's id must exceed both parents' ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(u64);

impl RegionId {
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// The current wall-clock time as a `RegionId`.
    ///
    /// # Panics
    /// Panics if the system clock is set before the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        #[allow(clippy::unwrap_used)]
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EncodedName
// ---------------------------------------------------------------------------

/// A short, stable, filesystem- and znode-path-safe region identifier.
///
/// Derived deterministically from `(table, start key, region id)` via
/// SHA-256, truncated to the first 32 hex characters — long enough to make
/// collisions practically impossible within one table, short enough to stay
/// out of the way in directory and znode paths.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedName(String);

const ENCODED_NAME_LEN: usize = 32;

impl EncodedName {
    /// Derive the encoded name for a region from its table, start key, and id.
    #[must_use]
    pub fn derive(table: &TableName, start_key: &[u8], region_id: RegionId) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(table.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(start_key);
        hasher.update([0u8]);
        hasher.update(region_id.as_u64().to_be_bytes());
        let digest = hasher.finalize();
        let hex = hex_encode(&digest);
        Self(hex[..ENCODED_NAME_LEN].to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != ENCODED_NAME_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError {
                kind: ErrorKind::EncodedName,
                value: s.to_owned(),
                reason: format!("expected {ENCODED_NAME_LEN} lowercase hex characters"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for EncodedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EncodedName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for EncodedName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<EncodedName> for String {
    fn from(v: EncodedName) -> Self {
        v.0
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        #[allow(clippy::unwrap_used)]
        write!(out, "{b:02x}").unwrap();
    }
    out
}
