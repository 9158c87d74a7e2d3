//! idxmngr Key Encoder
//!
//! Turns a record's fields into the sortable key stored in an index.
//!
//! - **schema**: template parsing and per-schema encoding
//! - **error**: `EncodingError`
//!
//! The [`KeyEncoder`] owns the named schemas and resolves which one applies
//! to an insert: an explicit schema name first, then the index definition's
//! schema, then the raw value of the index key column.

pub mod error;
pub mod schema;

pub use error::EncodingError;
pub use schema::{KeySchema, Segment, SEGMENT_SEPARATOR};

use std::collections::HashMap;

/// Built-in speeding schema template
pub const SPEEDING_TEMPLATE: &str = "spd::{speeding:3}::{obuId}::{collectionDt}";

/// Built-in purpose schema template
pub const PURPOSE_TEMPLATE: &str = "{purpose}";

/// Registry of named key schemas
#[derive(Debug, Clone)]
pub struct KeyEncoder {
    schemas: HashMap<String, KeySchema>,
}

impl KeyEncoder {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Registry holding the built-in `speeding` and `purpose` schemas
    pub fn with_defaults() -> Self {
        let mut encoder = Self::new();
        for (name, template) in [("speeding", SPEEDING_TEMPLATE), ("purpose", PURPOSE_TEMPLATE)] {
            if let Ok(schema) = KeySchema::parse(name, template) {
                encoder.register(schema);
            }
        }
        encoder
    }

    /// Add or replace a schema
    pub fn register(&mut self, schema: KeySchema) {
        tracing::debug!(schema = %schema, "Registered key schema");
        self.schemas.insert(schema.name().to_string(), schema);
    }

    /// Parse and add a schema from its template
    pub fn register_template(&mut self, name: &str, template: &str) -> Result<(), EncodingError> {
        let schema = KeySchema::parse(name, template)?;
        self.register(schema);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&KeySchema> {
        self.schemas.get(name)
    }

    /// Schema names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Encode with a named schema
    pub fn encode(
        &self,
        schema: &str,
        fields: &HashMap<String, String>,
        key_size: u32,
    ) -> Result<String, EncodingError> {
        self.get(schema)
            .ok_or_else(|| EncodingError::UnknownSchema(schema.to_string()))?
            .encode(fields, key_size)
    }

    /// Use the raw value of `key_column` as the key
    pub fn encode_raw(
        &self,
        key_column: &str,
        fields: &HashMap<String, String>,
        key_size: u32,
    ) -> Result<String, EncodingError> {
        let value = fields
            .get(key_column)
            .ok_or_else(|| EncodingError::MissingField(key_column.to_string()))?;
        schema::check_key_size(value, key_size)?;
        Ok(value.clone())
    }

    /// Encode using the first schema that applies.
    ///
    /// `requested` is the schema named by the caller, `default` the one
    /// attached to the index definition. With neither, the key column
    /// value is used as is.
    pub fn resolve_and_encode(
        &self,
        requested: Option<&str>,
        default: Option<&str>,
        key_column: &str,
        fields: &HashMap<String, String>,
        key_size: u32,
    ) -> Result<String, EncodingError> {
        let schema = requested
            .filter(|s| !s.is_empty())
            .or(default.filter(|s| !s.is_empty()));

        match schema {
            Some(name) => self.encode(name, fields, key_size),
            None => self.encode_raw(key_column, fields, key_size),
        }
    }
}

impl Default for KeyEncoder {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_registered() {
        let encoder = KeyEncoder::with_defaults();
        assert_eq!(encoder.names(), vec!["purpose", "speeding"]);
    }

    #[test]
    fn test_encode_named_schema() {
        let encoder = KeyEncoder::with_defaults();
        let key = encoder
            .encode(
                "speeding",
                &fields(&[("speeding", "95"), ("obuId", "OBU1"), ("collectionDt", "t1")]),
                64,
            )
            .unwrap();
        assert_eq!(key, "spd::095::OBU1::t1");

        let key = encoder
            .encode("purpose", &fields(&[("purpose", "Research")]), 64)
            .unwrap();
        assert_eq!(key, "Research");
    }

    #[test]
    fn test_unknown_schema() {
        let encoder = KeyEncoder::with_defaults();
        let err = encoder.encode("nope", &HashMap::new(), 64).unwrap_err();
        assert_eq!(err, EncodingError::UnknownSchema("nope".to_string()));
    }

    #[test]
    fn test_custom_schema_replaces_default() {
        let mut encoder = KeyEncoder::with_defaults();
        encoder
            .register_template("speeding", "spd::{speeding:4}::{obuId}")
            .unwrap();
        let key = encoder
            .encode("speeding", &fields(&[("speeding", "95"), ("obuId", "A")]), 0)
            .unwrap();
        assert_eq!(key, "spd::0095::A");
    }

    #[test]
    fn test_resolution_order() {
        let encoder = KeyEncoder::with_defaults();
        let data = fields(&[
            ("purpose", "Research"),
            ("speeding", "70"),
            ("obuId", "O"),
            ("collectionDt", "d"),
            ("IndexableData", "raw-value"),
        ]);

        let requested = encoder
            .resolve_and_encode(Some("speeding"), Some("purpose"), "IndexableData", &data, 64)
            .unwrap();
        assert_eq!(requested, "spd::070::O::d");

        let definition = encoder
            .resolve_and_encode(None, Some("purpose"), "IndexableData", &data, 64)
            .unwrap();
        assert_eq!(definition, "Research");

        let raw = encoder
            .resolve_and_encode(Some(""), None, "IndexableData", &data, 64)
            .unwrap();
        assert_eq!(raw, "raw-value");
    }

    #[test]
    fn test_raw_key_checks() {
        let encoder = KeyEncoder::new();
        assert_eq!(
            encoder.encode_raw("col", &HashMap::new(), 8).unwrap_err(),
            EncodingError::MissingField("col".to_string())
        );
        assert!(matches!(
            encoder
                .encode_raw("col", &fields(&[("col", "0123456789")]), 8)
                .unwrap_err(),
            EncodingError::KeyTooLong { len: 10, max: 8 }
        ));
    }
}
