//! Key Schema templates
//!
//! A schema describes how a record's fields become one sortable key.
//!
//! # Template Syntax
//!
//! ```text
//! template    := segment+
//! segment     := literal | placeholder
//! placeholder := '{' field [':' width] '}'
//! ```
//!
//! - `{field}` copies the field value verbatim
//! - `{field:N}` zero-pads a non-negative integer to exactly N digits
//!
//! # Example
//!
//! ```text
//! spd::{speeding:3}::{obuId}::{collectionDt}
//!   speeding=60, obuId=OBU-7, collectionDt=20240101 → spd::060::OBU-7::20240101
//! ```
//!
//! Fixed-width numeric segments make byte-wise key order match numeric
//! order, so a prefix such as `spd::060::` bounds a range query at 60.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt},
    multi::many1,
    sequence::{delimited, pair, preceded},
    IResult,
};
use std::collections::HashMap;
use std::fmt;

use crate::keys::error::EncodingError;

/// Separator convention between key segments
pub const SEGMENT_SEPARATOR: &str = "::";

/// Widest numeric segment (u64::MAX has 20 digits)
const MAX_NUMERIC_WIDTH: usize = 20;

/// One piece of a key template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text copied into every key
    Literal(String),
    /// Field value copied verbatim
    Text { field: String },
    /// Field value zero-padded to `width` digits
    Numeric { field: String, width: usize },
}

impl Segment {
    fn field(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Text { field } | Segment::Numeric { field, .. } => Some(field),
        }
    }
}

/// A parsed, named key template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    name: String,
    template: String,
    segments: Vec<Segment>,
}

impl KeySchema {
    /// Parse a template string
    pub fn parse(name: impl Into<String>, template: impl Into<String>) -> Result<Self, EncodingError> {
        let template = template.into();

        let segments = match all_consuming(parse_segments)(template.as_str()) {
            Ok((_, segments)) => segments,
            Err(e) => {
                return Err(EncodingError::InvalidTemplate {
                    template: template.clone(),
                    reason: format!("{:?}", e),
                })
            }
        };

        for segment in &segments {
            if let Segment::Numeric { field, width } = segment {
                if *width == 0 || *width > MAX_NUMERIC_WIDTH {
                    return Err(EncodingError::InvalidTemplate {
                        template: template.clone(),
                        reason: format!(
                            "width of '{}' must be between 1 and {}",
                            field, MAX_NUMERIC_WIDTH
                        ),
                    });
                }
            }
        }

        if segments.iter().all(|s| s.field().is_none()) {
            return Err(EncodingError::InvalidTemplate {
                template,
                reason: "template references no fields".to_string(),
            });
        }

        Ok(Self {
            name: name.into(),
            template,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Fields referenced by the template, in order
    pub fn fields(&self) -> Vec<&str> {
        self.segments.iter().filter_map(|s| s.field()).collect()
    }

    /// Build the full key. `key_size` 0 means unlimited.
    pub fn encode(
        &self,
        fields: &HashMap<String, String>,
        key_size: u32,
    ) -> Result<String, EncodingError> {
        let mut key = String::with_capacity(self.template.len() + 16);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Text { field } | Segment::Numeric { field, .. } => {
                    let value = fields
                        .get(field)
                        .ok_or_else(|| EncodingError::MissingField(field.clone()))?;
                    key.push_str(&encode_value(segment, field, value)?);
                }
            }
        }

        check_key_size(&key, key_size)?;
        Ok(key)
    }

    /// Build the longest key prefix the given fields allow.
    ///
    /// Stops at the first missing field, keeping the literal that precedes
    /// it, so `{speeding: 60}` yields `spd::060::` for the speeding schema.
    pub fn encode_prefix(&self, fields: &HashMap<String, String>) -> Result<String, EncodingError> {
        let mut key = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Text { field } | Segment::Numeric { field, .. } => match fields.get(field) {
                    Some(value) => key.push_str(&encode_value(segment, field, value)?),
                    None => break,
                },
            }
        }

        if key.is_empty() {
            return Err(match self.fields().first() {
                Some(field) => EncodingError::MissingField(field.to_string()),
                None => EncodingError::MissingField(String::new()),
            });
        }
        Ok(key)
    }
}

impl fmt::Display for KeySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.template)
    }
}

/// Encode a single field value for its segment
fn encode_value(segment: &Segment, field: &str, value: &str) -> Result<String, EncodingError> {
    match segment {
        Segment::Numeric { width, .. } => pad_numeric(field, value, *width),
        _ => {
            if value.contains(SEGMENT_SEPARATOR) {
                return Err(EncodingError::ForbiddenSeparator {
                    field: field.to_string(),
                });
            }
            Ok(value.to_string())
        }
    }
}

/// Zero-pad a non-negative integer to exactly `width` digits
pub fn pad_numeric(field: &str, value: &str, width: usize) -> Result<String, EncodingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::NotNumeric {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    let digits = trimmed.trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };

    if digits.len() > width {
        return Err(EncodingError::Overflow {
            field: field.to_string(),
            value: trimmed.to_string(),
            width,
        });
    }

    Ok(format!("{:0>width$}", digits, width = width))
}

/// Reject keys longer than the index key size (0 = unlimited)
pub fn check_key_size(key: &str, key_size: u32) -> Result<(), EncodingError> {
    let max = key_size as usize;
    if max > 0 && key.len() > max {
        return Err(EncodingError::KeyTooLong {
            len: key.len(),
            max,
        });
    }
    Ok(())
}

// ==================== Template Parser ====================

fn parse_segments(input: &str) -> IResult<&str, Vec<Segment>> {
    many1(alt((parse_placeholder, parse_literal)))(input)
}

fn parse_literal(input: &str) -> IResult<&str, Segment> {
    map(take_while1(|c: char| c != '{' && c != '}'), |s: &str| {
        Segment::Literal(s.to_string())
    })(input)
}

fn parse_placeholder(input: &str) -> IResult<&str, Segment> {
    map(
        delimited(
            char('{'),
            pair(parse_field_name, opt(preceded(char(':'), parse_width))),
            char('}'),
        ),
        |(field, width): (&str, Option<usize>)| match width {
            Some(width) => Segment::Numeric {
                field: field.to_string(),
                width,
            },
            None => Segment::Text {
                field: field.to_string(),
            },
        },
    )(input)
}

fn parse_field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')(input)
}

fn parse_width(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}
