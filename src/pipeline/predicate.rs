//! Inclusion predicates
//!
//! A predicate keeps only records whose numeric field compares true
//! against a threshold, e.g. `speeding >= 60`. Records that fail it are
//! skipped, not failed.

use crate::store::ComparisonOp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredicateError {
    #[error("Predicate field missing: {0}")]
    MissingField(String),

    #[error("Predicate field '{field}' is not numeric: {value:?}")]
    NotNumeric { field: String, value: String },

    #[error("Operator {0} cannot be used in a predicate")]
    UnsupportedOp(ComparisonOp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionPredicate {
    pub field: String,
    pub op: ComparisonOp,
    pub threshold: f64,
}

impl InclusionPredicate {
    pub fn new(field: impl Into<String>, op: ComparisonOp, threshold: f64) -> Self {
        Self {
            field: field.into(),
            op,
            threshold,
        }
    }

    /// Reject operators without a single-threshold meaning
    pub fn validate(&self) -> Result<(), PredicateError> {
        if self.op.is_range() {
            return Err(PredicateError::UnsupportedOp(self.op));
        }
        Ok(())
    }

    /// Whether the record should be indexed
    pub fn evaluate(&self, fields: &HashMap<String, String>) -> Result<bool, PredicateError> {
        self.validate()?;

        let raw = fields
            .get(&self.field)
            .ok_or_else(|| PredicateError::MissingField(self.field.clone()))?;
        let value: f64 = raw.trim().parse().map_err(|_| PredicateError::NotNumeric {
            field: self.field.clone(),
            value: raw.clone(),
        })?;

        Ok(self.op.compare_num(value, self.threshold))
    }
}

impl fmt::Display for InclusionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.threshold)
    }
}
