// Routing intent - the raw list of records handed to the validator

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// The `type` discriminator of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Table,
    Route,
    Rule,
}

impl EntryKind {
    /// Order in which the validator visits records
    pub const PASSES: [EntryKind; 3] = [EntryKind::Table, EntryKind::Route, EntryKind::Rule];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "table" => Some(EntryKind::Table),
            "route" => Some(EntryKind::Route),
            "rule" => Some(EntryKind::Rule),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Table => "table",
            EntryKind::Route => "route",
            EntryKind::Rule => "rule",
        }
    }
}

/// One record with a known `type`; other fields are still untyped
#[derive(Debug, Clone, PartialEq)]
pub struct IntentRecord {
    kind: EntryKind,
    fields: Map<String, Value>,
}

impl IntentRecord {
    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(fields) = value else {
            return Err(AppError::Schema(format!(
                "routing entry error, expected an object, got {}",
                value
            )));
        };

        let Some(type_value) = fields.get("type").cloned() else {
            return Err(AppError::Schema(format!(
                "Key 'type' not found in routing entry {}",
                Value::Object(fields)
            )));
        };

        match type_value.as_str().and_then(EntryKind::parse) {
            Some(kind) => Ok(IntentRecord { kind, fields }),
            None => Err(AppError::Schema(format!(
                "unknown type found: {} in routing entry {}",
                type_value,
                Value::Object(fields)
            ))),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Optional string field; any other JSON type is a validation error
    pub fn str_field(&self, key: &str) -> AppResult<Option<&str>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(AppError::Validation(format!(
                "{} expected to be a string, got {} in {}",
                key, other, self
            ))),
        }
    }
}

impl std::fmt::Display for IntentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// Ordered list of records, all with a valid `type`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingIntent {
    records: Vec<IntentRecord>,
}

impl RoutingIntent {
    /// Parse the JSON text of an intent list
    pub fn from_json(text: &str) -> AppResult<Self> {
        if text.trim().is_empty() {
            return Err(AppError::Schema("JSON data empty in routing intent".to_string()));
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| AppError::Schema(format!("JSON format invalid, conf: {}, Error: {}", text.trim(), e)))?;
        tracing::info!("Read routing intent JSON");
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Array(items) = value else {
            return Err(AppError::Schema(format!(
                "routing intent must be a list of entries, got {}",
                value
            )));
        };
        let records = items
            .into_iter()
            .map(IntentRecord::from_value)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(RoutingIntent { records })
    }

    /// Records of one kind, in input order
    pub fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &IntentRecord> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
