//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! Index management and search use the PascalCase field names existing
//! callers send (`IndexID`, `ComOp`, `IdxData`); inserts use camelCase.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::catalog::IndexDefinition;
use crate::pipeline::{types::deserialize_fields, InclusionPredicate, InsertRecord};
use crate::service::{IndexInfo, IndexSelector};
use crate::store::ComparisonOp;

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Accept a JSON string or number as a string
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

/// Build a selector from an id and a name, preferring the id
fn selector(
    id: Option<&str>,
    name: Option<&str>,
    network: Option<&str>,
) -> Result<IndexSelector, String> {
    let id_or_name = id
        .filter(|s| !s.is_empty())
        .or(name.filter(|s| !s.is_empty()))
        .ok_or_else(|| "IndexID or IndexName is required".to_string())?;
    Ok(IndexSelector::new(id_or_name).on_network(network.unwrap_or_default()))
}

// ============================================
// INDEX DTOs
// ============================================

/// POST /api/index/list
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListIndexesRequest {
    #[serde(default, alias = "Network")]
    pub network: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub index_id: String,
    pub index_name: String,
    pub indexing_key: String,
    pub network: String,
    pub key_count: u64,
    pub entry_count: u64,
    pub file_path: String,
    pub key_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub available: bool,
}

impl From<IndexInfo> for IndexSummary {
    fn from(info: IndexInfo) -> Self {
        Self {
            index_id: info.definition.index_id,
            index_name: info.definition.index_name,
            indexing_key: info.definition.key_column,
            network: info.definition.network,
            key_count: info.counters.key_count,
            entry_count: info.counters.entry_count,
            file_path: info.definition.file_path,
            key_size: info.definition.key_size,
            schema: info.definition.schema,
            available: info.available,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListIndexesResponse {
    pub indexes: Vec<IndexSummary>,
}

/// POST /api/index/info
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexInfoRequest {
    #[serde(default, rename = "IndexID", alias = "indexId")]
    pub index_id: Option<String>,
    #[serde(default, rename = "IndexName", alias = "indexName")]
    pub index_name: Option<String>,
    #[serde(default, rename = "Network", alias = "network")]
    pub network: Option<String>,
}

impl IndexInfoRequest {
    pub fn selector(&self) -> Result<IndexSelector, String> {
        selector(
            self.index_id.as_deref(),
            self.index_name.as_deref(),
            self.network.as_deref(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfoResponse {
    #[serde(flatten)]
    pub summary: IndexSummary,
    pub block_num: u64,
    pub call_count: u64,
    pub file_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<IndexInfo> for IndexInfoResponse {
    fn from(info: IndexInfo) -> Self {
        let block_num = info.counters.block_num;
        let call_count = info.counters.call_count;
        let file_size_bytes = info.file_size_bytes;
        let failure = info.failure.clone();
        Self {
            summary: info.into(),
            block_num,
            call_count,
            file_size_bytes,
            failure,
        }
    }
}

/// POST /api/index/create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    #[serde(rename = "IndexID", alias = "indexId")]
    pub index_id: String,
    #[serde(rename = "IndexName", alias = "indexName")]
    pub index_name: String,
    #[serde(rename = "KeyCol", alias = "keyCol")]
    pub key_col: String,
    #[serde(default, rename = "FilePath", alias = "filePath")]
    pub file_path: String,
    #[serde(default, rename = "KeySize", alias = "keySize")]
    pub key_size: u32,
    #[serde(rename = "Network", alias = "network")]
    pub network: String,
    #[serde(default, rename = "Schema", alias = "schema")]
    pub schema: Option<String>,
}

impl CreateIndexRequest {
    pub fn into_definition(self) -> IndexDefinition {
        let def = IndexDefinition::new(
            self.index_id,
            self.index_name,
            self.key_col,
            self.key_size,
            self.network,
        )
        .with_file_path(self.file_path);
        match self.schema.filter(|s| !s.is_empty()) {
            Some(schema) => def.with_schema(schema),
            None => def,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexResponse {
    pub index_id: String,
    pub network: String,
    pub file_path: String,
    pub duration_ms: u64,
    pub response_code: u16,
}

// ============================================
// SEARCH DTOs
// ============================================

/// POST /api/index/search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexRequest {
    #[serde(default, rename = "IndexID", alias = "indexId")]
    pub index_id: Option<String>,
    #[serde(default, rename = "IndexName", alias = "indexName")]
    pub index_name: Option<String>,
    #[serde(default, rename = "Network", alias = "network")]
    pub network: Option<String>,
    #[serde(default, rename = "Field", alias = "field")]
    pub field: Option<String>,
    #[serde(
        default,
        rename = "Value",
        alias = "value",
        deserialize_with = "string_or_number"
    )]
    pub value: Option<String>,
    #[serde(
        default,
        rename = "Begin",
        alias = "begin",
        deserialize_with = "string_or_number"
    )]
    pub begin: Option<String>,
    #[serde(
        default,
        rename = "End",
        alias = "end",
        deserialize_with = "string_or_number"
    )]
    pub end: Option<String>,
    #[serde(rename = "ComOp", alias = "comOp")]
    pub com_op: ComparisonOp,
    /// Raw fields to build the key from, in place of `Value`
    #[serde(default, rename = "Fields", alias = "fields")]
    pub fields: Option<HashMap<String, Value>>,
    #[serde(default, rename = "Schema", alias = "schema")]
    pub schema: Option<String>,
    #[serde(default, rename = "Limit", alias = "limit")]
    pub limit: Option<usize>,
}

impl SearchIndexRequest {
    pub fn into_request(self) -> Result<crate::service::SearchRequest, String> {
        let selector = selector(
            self.index_id.as_deref(),
            self.index_name.as_deref(),
            self.network.as_deref(),
        )?;

        let fields = match self.fields {
            Some(map) => Some(crate::pipeline::fields_from_value(Value::Object(
                map.into_iter().collect(),
            ))?),
            None => None,
        };

        let mut request = crate::service::SearchRequest::new(selector, self.com_op);
        request.field = self.field;
        request.value = self.value;
        request.begin = self.begin;
        request.end = self.end;
        request.fields = fields;
        request.schema = self.schema;
        request.limit = self.limit;
        Ok(request)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchIndexResponse {
    #[serde(rename = "IndexID")]
    pub index_id: String,
    #[serde(rename = "Network")]
    pub network: String,
    #[serde(rename = "IdxData")]
    pub idx_data: Vec<String>,
    pub count: usize,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

// ============================================
// INSERT DTOs
// ============================================

/// POST /api/index/insert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRequest {
    #[serde(default, alias = "IndexID")]
    pub index_id: Option<String>,
    #[serde(default)]
    pub tx_id: String,
    #[serde(default, deserialize_with = "deserialize_fields")]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub network: Option<String>,
    /// Accepted for compatibility; not used for indexing
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Index name, used when `indexId` is absent
    #[serde(default)]
    pub indexing_key: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

impl InsertRequest {
    pub fn into_batch(self) -> Result<crate::service::InsertBatch, String> {
        let selector = selector(
            self.index_id.as_deref(),
            self.indexing_key.as_deref(),
            self.network.as_deref(),
        )
        .map_err(|_| "indexId or indexingKey is required".to_string())?;

        let record = InsertRecord {
            tx_id: self.tx_id,
            data: self.data,
            block_number: self.block_number,
        };

        let mut batch = crate::service::InsertBatch::new(selector, vec![record]);
        batch.schema = self.schema.filter(|s| !s.is_empty());
        Ok(batch)
    }
}

/// POST /api/index/insert/batch, and one streamed message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInsertRequest {
    #[serde(default, alias = "IndexID")]
    pub index_id: Option<String>,
    #[serde(default)]
    pub indexing_key: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub filter: Option<InclusionPredicate>,
    #[serde(default)]
    pub records: Vec<InsertRecord>,
}

impl BatchInsertRequest {
    pub fn into_batch(self) -> Result<crate::service::InsertBatch, String> {
        let selector = selector(
            self.index_id.as_deref(),
            self.indexing_key.as_deref(),
            self.network.as_deref(),
        )
        .map_err(|_| "indexId or indexingKey is required".to_string())?;

        let mut batch = crate::service::InsertBatch::new(selector, self.records);
        batch.schema = self.schema.filter(|s| !s.is_empty());
        batch.filter = self.filter;
        Ok(batch)
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub indexes: usize,
    pub unavailable_indexes: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_pascal_case() {
        let json = r#"{"IndexName":"speeding","Field":"IndexableData","Value":"spd::060::","ComOp":5}"#;
        let req: SearchIndexRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.com_op, ComparisonOp::GtEq);

        let request = req.into_request().unwrap();
        assert_eq!(request.selector.id_or_name, "speeding");
        assert!(request.selector.network.is_none());
        assert_eq!(request.value.as_deref(), Some("spd::060::"));
    }

    #[test]
    fn test_search_request_numeric_bounds() {
        let json = r#"{"IndexID":"001","Network":"hardhat","Begin":100,"End":"200","ComOp":"Range"}"#;
        let req: SearchIndexRequest = serde_json::from_str(json).unwrap();
        let request = req.into_request().unwrap();
        assert_eq!(request.begin.as_deref(), Some("100"));
        assert_eq!(request.end.as_deref(), Some("200"));
        assert_eq!(request.selector.network.as_deref(), Some("hardhat"));
    }

    #[test]
    fn test_search_request_needs_index() {
        let req: SearchIndexRequest = serde_json::from_str(r#"{"ComOp":"Eq","Value":"x"}"#).unwrap();
        assert!(req.into_request().is_err());
    }

    #[test]
    fn test_create_request() {
        let json = r#"{"IndexID":"001","IndexName":"speeding","KeyCol":"IndexableData","FilePath":"","KeySize":64,"Network":"hardhat","Schema":"speeding"}"#;
        let def = serde_json::from_str::<CreateIndexRequest>(json)
            .unwrap()
            .into_definition();
        assert_eq!(def.key_size, 64);
        assert_eq!(def.schema.as_deref(), Some("speeding"));
        assert!(def.file_path.is_empty());
    }

    #[test]
    fn test_insert_request_uses_indexing_key() {
        let json = r#"{"txId":"0xabc","data":{"purpose":"Research"},"network":"hardhat","contractAddress":"0x1","indexingKey":"purpose"}"#;
        let batch = serde_json::from_str::<InsertRequest>(json)
            .unwrap()
            .into_batch()
            .unwrap();
        assert_eq!(batch.selector.id_or_name, "purpose");
        assert_eq!(batch.records[0].data["purpose"], "Research");
    }

    #[test]
    fn test_batch_request_with_filter() {
        let json = r#"{"indexId":"001","filter":{"field":"speeding","op":"GtEq","threshold":60},"records":[{"txId":"a","data":{"speeding":70}}]}"#;
        let batch = serde_json::from_str::<BatchInsertRequest>(json)
            .unwrap()
            .into_batch()
            .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.filter.unwrap().threshold, 60.0);
    }
}
