//! Insert pipeline data types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One caller-supplied record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRecord {
    #[serde(default)]
    pub tx_id: String,
    /// Raw fields; JSON numbers and booleans are stringified
    #[serde(default, deserialize_with = "deserialize_fields")]
    pub data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl InsertRecord {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            data: HashMap::new(),
            block_number: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    pub fn with_block_number(mut self, block: u64) -> Self {
        self.block_number = Some(block);
        self
    }
}

/// Accept `data` as a JSON object or a string holding one
pub fn deserialize_fields<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    fields_from_value(value).map_err(serde::de::Error::custom)
}

/// Flatten a JSON object into string fields
pub fn fields_from_value(value: Value) -> Result<HashMap<String, String>, String> {
    match value {
        Value::Null => Ok(HashMap::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k, s)))
            .collect()),
        Value::String(s) if s.trim().is_empty() => Ok(HashMap::new()),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(&s)
                .map_err(|e| format!("data is not a JSON object: {}", e))?;
            match parsed {
                Value::Object(_) => fields_from_value(parsed),
                _ => Err("data must be a JSON object".to_string()),
            }
        }
        _ => Err("data must be a JSON object".to_string()),
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Result of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Inserted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Position in the batch
    pub index: usize,
    pub tx_id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Counts and per-record outcomes of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Highest block number among inserted records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_block_number: Option<u64>,
    pub duration_ms: u64,
    pub outcomes: Vec<RecordOutcome>,
}

impl InsertSummary {
    pub fn total(&self) -> u64 {
        self.inserted + self.skipped + self.failed
    }

    pub fn all_inserted(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }

    pub(crate) fn record_inserted(
        &mut self,
        index: usize,
        tx_id: &str,
        key: String,
        block: Option<u64>,
    ) {
        self.inserted += 1;
        if let Some(block) = block {
            self.max_block_number = Some(self.max_block_number.map_or(block, |b| b.max(block)));
        }
        self.outcomes.push(RecordOutcome {
            index,
            tx_id: tx_id.to_string(),
            status: RecordStatus::Inserted,
            key: Some(key),
            reason: None,
        });
    }

    pub(crate) fn record_skipped(
        &mut self,
        index: usize,
        tx_id: &str,
        key: Option<String>,
        reason: &str,
    ) {
        self.skipped += 1;
        self.outcomes.push(RecordOutcome {
            index,
            tx_id: tx_id.to_string(),
            status: RecordStatus::Skipped,
            key,
            reason: Some(reason.to_string()),
        });
    }

    pub(crate) fn record_failed(&mut self, index: usize, tx_id: &str, reason: String) {
        self.failed += 1;
        self.outcomes.push(RecordOutcome {
            index,
            tx_id: tx_id.to_string(),
            status: RecordStatus::Failed,
            key: None,
            reason: Some(reason),
        });
    }
}

impl std::fmt::Display for InsertSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted: {}, skipped: {}, failed: {} ({} ms)",
            self.inserted, self.skipped, self.failed, self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_object_data() {
        let json = r#"{"txId":"0x1","data":{"speeding":60,"obuId":"OBU-1","flag":true,"none":null},"blockNumber":7}"#;
        let record: InsertRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.tx_id, "0x1");
        assert_eq!(record.data["speeding"], "60");
        assert_eq!(record.data["flag"], "true");
        assert!(!record.data.contains_key("none"));
        assert_eq!(record.block_number, Some(7));
    }

    #[test]
    fn test_record_from_string_data() {
        let json = r#"{"txId":"0x2","data":"{\"purpose\":\"Research\"}"}"#;
        let record: InsertRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.data["purpose"], "Research");
        assert!(record.block_number.is_none());
    }

    #[test]
    fn test_record_rejects_non_object_data() {
        assert!(serde_json::from_str::<InsertRecord>(r#"{"txId":"x","data":[1,2]}"#).is_err());
        assert!(serde_json::from_str::<InsertRecord>(r#"{"txId":"x","data":"42"}"#).is_err());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = InsertSummary::default();
        summary.record_inserted(0, "a", "k".into(), Some(5));
        summary.record_inserted(1, "b", "k".into(), Some(3));
        summary.record_skipped(2, "c", None, "filtered");
        summary.record_failed(3, "d", "bad".into());

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.max_block_number, Some(5));
        assert!(!summary.all_inserted());
        assert_eq!(summary.outcomes[2].status, RecordStatus::Skipped);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let mut summary = InsertSummary::default();
        summary.record_failed(0, "tx", "Missing field: speeding".into());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["outcomes"][0]["txId"], "tx");
        assert_eq!(json["outcomes"][0]["status"], "failed");
    }
}
