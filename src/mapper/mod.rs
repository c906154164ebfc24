//! Table-driven record mapper.
//!
//! Every synced resource is described by a static [`ResourceSpec`]. Mapping a
//! raw provider row walks the resource's [`FieldMapping`]s, converts each source
//! value to its column type and leaves every key it did not consume in the
//! `extra` bag.

mod resources;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub use resources::{
    GOOGLE_CALENDAR_EVENTS, GOOGLE_CALENDAR_LIST, GOOGLE_CALENDAR_RESOURCES, OUTREACH_RESOURCES,
    SALESFORCE_RESOURCES, find_resource, resources_for,
};

use crate::paginator::Row;

/// The three supported providers, in sync priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Salesforce,
    Outreach,
    GoogleCalendar,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Salesforce,
        ProviderKind::Outreach,
        ProviderKind::GoogleCalendar,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ProviderKind::Salesforce => "salesforce",
            ProviderKind::Outreach => "outreach",
            ProviderKind::GoogleCalendar => "google-calendar",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }
}

/// Naming convention of source keys relative to snake_case columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCase {
    /// `billing_city` ↔ `BillingCity`
    Pascal,
    /// `website_url` ↔ `websiteUrl`
    Camel,
}

impl KeyCase {
    pub fn source_key(self, column: &str) -> String {
        let mut out = String::with_capacity(column.len());
        let mut upper_next = matches!(self, KeyCase::Pascal);
        for ch in column.chars() {
            if ch == '_' {
                upper_next = true;
            } else if upper_next {
                out.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                out.push(ch);
            }
        }
        out
    }
}

/// How a provider marks a record as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tombstone {
    None,
    /// Key whose truthy value means deleted
    Flag(&'static str),
    /// Key whose value equals the given string when deleted
    Equals(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { max_len: Option<usize> },
    Integer,
    Boolean,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Text(&'static str),
    Integer(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub column: &'static str,
    /// Source key when it does not follow the resource's [`KeyCase`]
    pub source: Option<&'static str>,
    pub kind: FieldKind,
    pub default: Option<DefaultValue>,
}

impl FieldMapping {
    pub const fn text(column: &'static str) -> Self {
        Self {
            column,
            source: None,
            kind: FieldKind::Text { max_len: None },
            default: None,
        }
    }

    pub const fn text_max(column: &'static str, max_len: usize) -> Self {
        Self {
            column,
            source: None,
            kind: FieldKind::Text {
                max_len: Some(max_len),
            },
            default: None,
        }
    }

    pub const fn integer(column: &'static str) -> Self {
        Self {
            column,
            source: None,
            kind: FieldKind::Integer,
            default: None,
        }
    }

    pub const fn boolean(column: &'static str) -> Self {
        Self {
            column,
            source: None,
            kind: FieldKind::Boolean,
            default: None,
        }
    }

    pub const fn json(column: &'static str) -> Self {
        Self {
            column,
            source: None,
            kind: FieldKind::Json,
            default: None,
        }
    }

    pub const fn from(mut self, source: &'static str) -> Self {
        self.source = Some(source);
        self
    }

    pub const fn or(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn source_key(&self, case: KeyCase) -> String {
        match self.source {
            Some(source) => source.to_string(),
            None => case.source_key(self.column),
        }
    }
}

/// Static description of one synced resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    pub provider: ProviderKind,
    /// Resource name recorded on checkpoints
    pub name: &'static str,
    pub table: &'static str,
    /// Remote entity or endpoint name
    pub remote_name: &'static str,
    pub cursor_field: Option<&'static str>,
    pub key_case: KeyCase,
    pub native_id_source: &'static str,
    pub tombstone: Tombstone,
    pub fields: &'static [FieldMapping],
}

impl ResourceSpec {
    /// Source keys of every mapped field, in declaration order.
    pub fn source_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| field.source_key(self.key_case))
            .collect()
    }
}

/// A typed column value; `None` stores SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Boolean(Option<bool>),
    Json(Option<JsonValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub native_id: String,
    pub values: Vec<(&'static str, ColumnValue)>,
    pub extra: Map<String, JsonValue>,
}

impl NormalizedRecord {
    pub fn value(&self, column: &str) -> Option<&ColumnValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }
}

/// What the entity store should do with a mapped row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOp {
    Upsert(NormalizedRecord),
    Delete { native_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("row of resource '{resource}' has no native id in '{key}'")]
    MissingNativeId {
        resource: &'static str,
        key: &'static str,
    },
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
}

/// Maps one raw provider row according to `spec`.
pub fn map_row(spec: &ResourceSpec, row: &Row) -> Result<RecordOp, MappingError> {
    let mut remaining = row.clone();

    let native_id = remaining
        .remove(spec.native_id_source)
        .and_then(|value| native_id_of(&value))
        .ok_or(MappingError::MissingNativeId {
            resource: spec.name,
            key: spec.native_id_source,
        })?;

    match spec.tombstone {
        Tombstone::Flag(key) => {
            if remaining.remove(key).is_some_and(|value| is_truthy(&value)) {
                return Ok(RecordOp::Delete { native_id });
            }
        }
        Tombstone::Equals(key, expected) => {
            if remaining
                .get(key)
                .and_then(JsonValue::as_str)
                .is_some_and(|value| value.eq_ignore_ascii_case(expected))
            {
                return Ok(RecordOp::Delete { native_id });
            }
        }
        Tombstone::None => {}
    }

    let mut values = Vec::with_capacity(spec.fields.len());
    for field in spec.fields {
        let key = field.source_key(spec.key_case);
        let raw = remaining.remove(&key).and_then(non_empty);

        let converted = match &raw {
            Some(value) => convert(field.kind, value),
            None => None,
        };

        let value = match converted {
            Some(value) => value,
            None => {
                // Unconvertible input is kept in the overflow bag.
                if let Some(raw) = raw {
                    remaining.insert(key, raw);
                }
                default_for(field)
            }
        };
        values.push((field.column, value));
    }

    Ok(RecordOp::Upsert(NormalizedRecord {
        native_id,
        values,
        extra: remaining,
    }))
}

fn native_id_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// CSV exports encode nulls as empty strings.
fn non_empty(value: JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(ref s) if s.is_empty() => None,
        other => Some(other),
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn convert(kind: FieldKind, value: &JsonValue) -> Option<ColumnValue> {
    match kind {
        FieldKind::Text { max_len } => {
            let text = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            Some(ColumnValue::Text(Some(match max_len {
                Some(limit) => truncate_chars(&text, limit),
                None => text,
            })))
        }
        FieldKind::Integer => {
            let parsed = match value {
                JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                JsonValue::String(s) => {
                    let trimmed = s.trim();
                    trimmed
                        .parse::<i64>()
                        .ok()
                        .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
                }
                _ => None,
            }?;
            Some(ColumnValue::Integer(Some(parsed)))
        }
        FieldKind::Boolean => {
            let parsed = match value {
                JsonValue::Bool(b) => Some(*b),
                JsonValue::Number(n) => n.as_i64().map(|i| i != 0),
                JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Some(true),
                    "false" | "0" => Some(false),
                    _ => None,
                },
                _ => None,
            }?;
            Some(ColumnValue::Boolean(Some(parsed)))
        }
        FieldKind::Json => Some(ColumnValue::Json(Some(value.clone()))),
    }
}

fn default_for(field: &FieldMapping) -> ColumnValue {
    match (field.kind, field.default) {
        (FieldKind::Text { .. }, Some(DefaultValue::Text(text))) => {
            ColumnValue::Text(Some(text.to_string()))
        }
        (FieldKind::Integer, Some(DefaultValue::Integer(n))) => ColumnValue::Integer(Some(n)),
        (FieldKind::Text { .. }, _) => ColumnValue::Text(None),
        (FieldKind::Integer, _) => ColumnValue::Integer(None),
        (FieldKind::Boolean, _) => ColumnValue::Boolean(None),
        (FieldKind::Json, _) => ColumnValue::Json(None),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
