//! Typed requests and responses of the service core

use crate::catalog::{IndexCounters, IndexDefinition};
use crate::keys::KeyEncoder;
use crate::pipeline::{InclusionPredicate, InsertRecord};
use crate::service::error::{ServiceError, ServiceResult};
use crate::store::{ComparisonOp, KeyQuery};
use serde::Serialize;
use std::collections::HashMap;

/// Addresses one index by id or name, optionally within a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelector {
    pub id_or_name: String,
    pub network: Option<String>,
}

impl IndexSelector {
    pub fn new(id_or_name: impl Into<String>) -> Self {
        Self {
            id_or_name: id_or_name.into(),
            network: None,
        }
    }

    pub fn on_network(mut self, network: impl Into<String>) -> Self {
        let network = network.into();
        self.network = if network.is_empty() { None } else { Some(network) };
        self
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }
}

impl std::fmt::Display for IndexSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.network {
            Some(network) => write!(f, "{}/{}", network, self.id_or_name),
            None => f.write_str(&self.id_or_name),
        }
    }
}

/// A search against one index
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub selector: IndexSelector,
    /// Must name the index key column when given
    pub field: Option<String>,
    pub op: ComparisonOp,
    pub value: Option<String>,
    pub begin: Option<String>,
    pub end: Option<String>,
    /// Raw fields to build the search key from, instead of `value`
    pub fields: Option<HashMap<String, String>>,
    /// Schema used with `fields`; defaults to the index schema
    pub schema: Option<String>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(selector: IndexSelector, op: ComparisonOp) -> Self {
        Self {
            selector,
            field: None,
            op,
            value: None,
            begin: None,
            end: None,
            fields: None,
            schema: None,
            limit: None,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn range(mut self, begin: impl Into<String>, end: impl Into<String>) -> Self {
        self.begin = Some(begin.into());
        self.end = Some(end.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Check the request against the index and build the store predicate
    pub fn to_query(&self, def: &IndexDefinition, encoder: &KeyEncoder) -> ServiceResult<KeyQuery> {
        if let Some(field) = self.field.as_deref().filter(|f| !f.is_empty()) {
            if !field.eq_ignore_ascii_case(&def.key_column) {
                return Err(ServiceError::InvalidQuery(format!(
                    "field '{}' is not the key column '{}' of index {}",
                    field, def.key_column, def.index_id
                )));
            }
        }

        let begin = non_empty(self.begin.as_deref());
        let end = non_empty(self.end.as_deref());

        if self.op.is_range() {
            let (begin, end) = match (begin, end) {
                (Some(b), Some(e)) => (b, e),
                _ => {
                    return Err(ServiceError::InvalidQuery(
                        "Range requires both Begin and End".to_string(),
                    ))
                }
            };
            if begin > end {
                return Err(ServiceError::InvalidQuery(format!(
                    "Range begin {:?} is after end {:?}",
                    begin, end
                )));
            }
            return Ok(KeyQuery::range(begin, end));
        }

        if begin.is_some() || end.is_some() {
            return Err(ServiceError::InvalidQuery(format!(
                "{} takes Value, not Begin/End",
                self.op
            )));
        }

        let value = match (non_empty(self.value.as_deref()), &self.fields) {
            (Some(value), _) => value.to_string(),
            (None, Some(fields)) => self.key_from_fields(def, encoder, fields)?,
            (None, None) => {
                return Err(ServiceError::InvalidQuery(format!(
                    "{} requires a Value",
                    self.op
                )))
            }
        };

        KeyQuery::single(self.op, value)
            .ok_or_else(|| ServiceError::InvalidQuery(format!("unsupported operator {}", self.op)))
    }

    fn key_from_fields(
        &self,
        def: &IndexDefinition,
        encoder: &KeyEncoder,
        fields: &HashMap<String, String>,
    ) -> ServiceResult<String> {
        let name = self
            .schema
            .as_deref()
            .or(def.schema.as_deref())
            .ok_or_else(|| {
                ServiceError::InvalidQuery(format!(
                    "index {} has no key schema to build a key from fields",
                    def.index_id
                ))
            })?;
        let schema = encoder
            .get(name)
            .ok_or_else(|| crate::keys::EncodingError::UnknownSchema(name.to_string()))?;
        Ok(schema.encode_prefix(fields)?)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Matching transactions for one search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub index_id: String,
    pub network: String,
    pub tx_ids: Vec<String>,
    pub count: usize,
    pub duration_ms: u64,
}

/// One insert batch for one index
#[derive(Debug, Clone)]
pub struct InsertBatch {
    pub selector: IndexSelector,
    pub schema: Option<String>,
    /// Overrides the configured filter for the index
    pub filter: Option<InclusionPredicate>,
    pub records: Vec<InsertRecord>,
}

impl InsertBatch {
    pub fn new(selector: IndexSelector, records: Vec<InsertRecord>) -> Self {
        Self {
            selector,
            schema: None,
            filter: None,
            records,
        }
    }
}

/// Configured inclusion predicate for one index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    /// Index id or name
    pub index: String,
    pub network: Option<String>,
    pub predicate: InclusionPredicate,
}

impl IndexFilter {
    pub fn applies_to(&self, def: &IndexDefinition) -> bool {
        def.matches(&self.index)
            && self
                .network
                .as_deref()
                .map_or(true, |n| n.is_empty() || n == def.network)
    }
}

/// Definition, counters and availability of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub definition: IndexDefinition,
    pub counters: IndexCounters,
    pub file_size_bytes: u64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> IndexDefinition {
        IndexDefinition::new("001", "speeding", "IndexableData", 64, "hardhat")
            .with_schema("speeding")
    }

    fn request(op: ComparisonOp) -> SearchRequest {
        SearchRequest::new(IndexSelector::new("speeding"), op)
    }

    #[test]
    fn test_value_query() {
        let encoder = KeyEncoder::with_defaults();
        let query = request(ComparisonOp::GtEq)
            .field("indexabledata")
            .value("spd::060::")
            .to_query(&def(), &encoder)
            .unwrap();
        assert_eq!(query, KeyQuery::GtEq("spd::060::".into()));
    }

    #[test]
    fn test_range_requires_bounds() {
        let encoder = KeyEncoder::with_defaults();
        let err = request(ComparisonOp::Range)
            .value("x")
            .to_query(&def(), &encoder)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidQuery(_)));

        let query = request(ComparisonOp::Range)
            .range("a", "b")
            .to_query(&def(), &encoder)
            .unwrap();
        assert_eq!(query, KeyQuery::range("a", "b"));

        assert!(request(ComparisonOp::Range)
            .range("b", "a")
            .to_query(&def(), &encoder)
            .is_err());
    }

    #[test]
    fn test_bounds_rejected_for_single_value_ops() {
        let encoder = KeyEncoder::with_defaults();
        assert!(request(ComparisonOp::Eq)
            .range("a", "b")
            .to_query(&def(), &encoder)
            .is_err());
        assert!(request(ComparisonOp::Eq).to_query(&def(), &encoder).is_err());
    }

    #[test]
    fn test_wrong_field_rejected() {
        let encoder = KeyEncoder::with_defaults();
        let err = request(ComparisonOp::Eq)
            .field("purpose")
            .value("x")
            .to_query(&def(), &encoder)
            .unwrap_err();
        assert!(err.to_string().contains("key column"));
    }

    #[test]
    fn test_key_from_fields() {
        let encoder = KeyEncoder::with_defaults();
        let mut req = request(ComparisonOp::GtEq);
        req.fields = Some(HashMap::from([("speeding".to_string(), "60".to_string())]));
        let query = req.to_query(&def(), &encoder).unwrap();
        assert_eq!(query, KeyQuery::GtEq("spd::060::".into()));

        let bare = IndexDefinition::new("002", "raw", "col", 0, "hardhat");
        assert!(req.to_query(&bare, &encoder).is_err());
    }

    #[test]
    fn test_filter_applies_to() {
        let filter = IndexFilter {
            index: "speeding".into(),
            network: Some("hardhat".into()),
            predicate: InclusionPredicate::new("speeding", ComparisonOp::GtEq, 60.0),
        };
        assert!(filter.applies_to(&def()));

        let mut other = def();
        other.network = "sepolia".into();
        assert!(!filter.applies_to(&other));
    }
}
