//! Core data types for the index store
//!
//! - `ComparisonOp`: query predicate with one canonical wire code per operator
//! - `KeyQuery`: a validated predicate with its key arguments
//! - `IndexRecord`: a single (key, txId) pair as persisted in the index file
//! - `StoreStats`: counters for one index

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Comparison operator applied during search
///
/// Wire codes: `Eq=0, NotEq=1, Lt=2, LtEq=3, Gt=4, GtEq=5, Range=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComparisonOp {
    Eq = 0,
    NotEq = 1,
    Lt = 2,
    LtEq = 3,
    Gt = 4,
    GtEq = 5,
    Range = 6,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 7] = [
        ComparisonOp::Eq,
        ComparisonOp::NotEq,
        ComparisonOp::Lt,
        ComparisonOp::LtEq,
        ComparisonOp::Gt,
        ComparisonOp::GtEq,
        ComparisonOp::Range,
    ];

    /// Canonical wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up an operator by wire code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Parse from a name (case-insensitive, common aliases accepted)
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "equal" | "=" | "==" => Some(Self::Eq),
            "ne" | "neq" | "noteq" | "!=" => Some(Self::NotEq),
            "lt" | "less" | "<" => Some(Self::Lt),
            "lte" | "lteq" | "lessthaneq" | "<=" => Some(Self::LtEq),
            "gt" | "greater" | ">" => Some(Self::Gt),
            "gte" | "gteq" | "greaterthaneq" | ">=" => Some(Self::GtEq),
            "range" | "between" => Some(Self::Range),
            other => other.parse::<u8>().ok().and_then(Self::from_code),
        }
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "Eq",
            Self::NotEq => "NotEq",
            Self::Lt => "Lt",
            Self::LtEq => "LtEq",
            Self::Gt => "Gt",
            Self::GtEq => "GtEq",
            Self::Range => "Range",
        }
    }

    /// Whether this operator takes a `[begin, end)` pair instead of one value
    pub fn is_range(self) -> bool {
        self == Self::Range
    }

    /// Numeric comparison used by inclusion predicates.
    ///
    /// `Range` has no single threshold and never matches here.
    pub fn compare_num(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Eq => value == threshold,
            Self::NotEq => value != threshold,
            Self::Lt => value < threshold,
            Self::LtEq => value <= threshold,
            Self::Gt => value > threshold,
            Self::GtEq => value >= threshold,
            Self::Range => false,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ComparisonOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OpRepr {
    Code(u8),
    Name(String),
}

impl<'de> Deserialize<'de> for ComparisonOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match OpRepr::deserialize(deserializer)? {
            OpRepr::Code(code) => ComparisonOp::from_code(code).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown comparison code: {}", code))
            }),
            OpRepr::Name(name) => ComparisonOp::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown comparison operator: {}", name))
            }),
        }
    }
}

/// A validated key predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    Eq(String),
    NotEq(String),
    Lt(String),
    LtEq(String),
    Gt(String),
    GtEq(String),
    /// Half-open interval `[begin, end)`
    Range { begin: String, end: String },
}

impl KeyQuery {
    pub fn op(&self) -> ComparisonOp {
        match self {
            Self::Eq(_) => ComparisonOp::Eq,
            Self::NotEq(_) => ComparisonOp::NotEq,
            Self::Lt(_) => ComparisonOp::Lt,
            Self::LtEq(_) => ComparisonOp::LtEq,
            Self::Gt(_) => ComparisonOp::Gt,
            Self::GtEq(_) => ComparisonOp::GtEq,
            Self::Range { .. } => ComparisonOp::Range,
        }
    }

    /// Build a single-value predicate. Returns `None` for `Range`.
    pub fn single(op: ComparisonOp, value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        Some(match op {
            ComparisonOp::Eq => Self::Eq(value),
            ComparisonOp::NotEq => Self::NotEq(value),
            ComparisonOp::Lt => Self::Lt(value),
            ComparisonOp::LtEq => Self::LtEq(value),
            ComparisonOp::Gt => Self::Gt(value),
            ComparisonOp::GtEq => Self::GtEq(value),
            ComparisonOp::Range => return None,
        })
    }

    pub fn range(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self::Range {
            begin: begin.into(),
            end: end.into(),
        }
    }
}

impl fmt::Display for KeyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { begin, end } => write!(f, "Range [{:?}, {:?})", begin, end),
            Self::Eq(v) | Self::NotEq(v) | Self::Lt(v) | Self::LtEq(v) | Self::Gt(v) | Self::GtEq(v) => {
                write!(f, "{} {:?}", self.op(), v)
            }
        }
    }
}

/// A single (key, txId) pair as written to the index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub key: String,
    pub tx_id: String,
}

impl IndexRecord {
    pub fn new(key: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tx_id: tx_id.into(),
        }
    }

    /// Approximate size in bytes
    pub fn estimated_size(&self) -> usize {
        self.key.len() + self.tx_id.len() + 16
    }
}

/// Outcome of inserting one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Pair was new and has been written
    Inserted,
    /// Pair already existed, nothing written
    Duplicate,
}

/// Counters for a single index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Unique keys
    pub key_count: u64,
    /// Total txId entries across all keys
    pub entry_count: u64,
    /// Size of the backing file in bytes
    pub file_size_bytes: u64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Keys: {}, Entries: {}, Size: {:.2} KB",
            self.key_count,
            self.entry_count,
            self.file_size_bytes as f64 / 1024.0
        )
    }
}
