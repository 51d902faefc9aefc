use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::resources::{ColumnDef, ColumnKind, ResourceDef};

/// Columns owned by the database, never accepted from API input
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// All required columns must be present
    Create,
    /// Partial update: only supplied columns are written
    Update,
}

/// Errors that can occur while turning API input into a writable record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Request body has no fields to write")]
    EmptyBody,
    #[error("System field '{0}' cannot be set via API input")]
    SystemFieldNotAllowed(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Invalid value for '{field}': expected {expected}")]
    InvalidValue { field: String, expected: String },
}

/// Validated column values for one insert or update
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Validate an API body against the resource's column definitions
    pub fn from_json(def: &ResourceDef, body: Value, mode: WriteMode) -> Result<Self, RecordError> {
        let map = match body {
            Value::Object(map) => map,
            _ => return Err(RecordError::InvalidJson("Expected JSON object".to_string())),
        };

        let mut fields = Map::new();
        for (key, value) in map {
            if SYSTEM_FIELDS.contains(&key.as_str()) {
                return Err(RecordError::SystemFieldNotAllowed(key));
            }
            let column = def
                .column(&key)
                .ok_or_else(|| RecordError::UnknownField(key.clone()))?;
            validate_value(column, &value)?;
            fields.insert(key, value);
        }

        if mode == WriteMode::Create {
            if let Some(missing) = def
                .columns
                .iter()
                .find(|c| c.required && !fields.contains_key(c.name))
            {
                return Err(RecordError::MissingRequiredField(missing.name.to_string()));
            }
        }

        if fields.is_empty() {
            return Err(RecordError::EmptyBody);
        }

        Ok(Self { fields })
    }

    /// Fill a column only when the caller left it out
    pub fn set_default(&mut self, column: &str, value: Value) -> &mut Self {
        if !self.fields.contains_key(column) {
            self.fields.insert(column.to_string(), value);
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn invalid(column: &ColumnDef) -> RecordError {
    RecordError::InvalidValue {
        field: column.name.to_string(),
        expected: column.kind.describe(),
    }
}

fn validate_value(column: &ColumnDef, value: &Value) -> Result<(), RecordError> {
    if value.is_null() {
        return if column.required {
            Err(RecordError::MissingRequiredField(column.name.to_string()))
        } else {
            Ok(())
        };
    }

    let ok = match column.kind {
        ColumnKind::Text => match value.as_str() {
            // Required text must carry content
            Some(s) => !(column.required && s.trim().is_empty()),
            None => false,
        },
        ColumnKind::Choice(values) => value.as_str().map(|s| values.contains(&s)).unwrap_or(false),
        ColumnKind::Integer => value
            .as_i64()
            .map(|n| i32::try_from(n).is_ok())
            .unwrap_or(false),
        ColumnKind::Number => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().map(|n| n.is_finite()).unwrap_or(false),
            _ => false,
        },
        ColumnKind::Boolean => value.is_boolean(),
        ColumnKind::Uuid => value.as_str().map(|s| Uuid::parse_str(s).is_ok()).unwrap_or(false),
        ColumnKind::Date => value
            .as_str()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        ColumnKind::Timestamp => value
            .as_str()
            .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        ColumnKind::TextArray => value
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false),
    };

    if ok {
        Ok(())
    } else {
        Err(invalid(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::find;
    use serde_json::json;

    #[test]
    fn create_requires_required_columns() {
        let def = find("categories").unwrap();
        let err = Record::from_json(def, json!({"name": "Tea"}), WriteMode::Create).unwrap_err();
        assert!(matches!(err, RecordError::MissingRequiredField(f) if f == "brand_id"));

        let record = Record::from_json(
            def,
            json!({"name": "Tea", "brand_id": "8d5e7f1c-3b1a-4c9e-9f0a-2b6d1e4c7a10"}),
            WriteMode::Create,
        )
        .unwrap();
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn update_accepts_partial_bodies() {
        let def = find("brands").unwrap();
        let record = Record::from_json(def, json!({"description": "New copy"}), WriteMode::Update).unwrap();
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["description"]);
        assert!(matches!(
            Record::from_json(def, json!({}), WriteMode::Update),
            Err(RecordError::EmptyBody)
        ));
    }

    #[test]
    fn rejects_system_and_unknown_fields() {
        let def = find("brands").unwrap();
        assert!(matches!(
            Record::from_json(def, json!({"id": "x", "name": "a"}), WriteMode::Create),
            Err(RecordError::SystemFieldNotAllowed(f)) if f == "id"
        ));
        assert!(matches!(
            Record::from_json(def, json!({"name": "a", "colour": "red"}), WriteMode::Create),
            Err(RecordError::UnknownField(f)) if f == "colour"
        ));
        assert!(matches!(
            Record::from_json(def, json!(["name"]), WriteMode::Create),
            Err(RecordError::InvalidJson(_))
        ));
    }

    #[test]
    fn blank_or_null_required_text_is_missing() {
        let def = find("brands").unwrap();
        assert!(matches!(
            Record::from_json(def, json!({"name": null}), WriteMode::Update),
            Err(RecordError::MissingRequiredField(_))
        ));
        assert!(matches!(
            Record::from_json(def, json!({"name": "   "}), WriteMode::Create),
            Err(RecordError::InvalidValue { .. })
        ));
        // Optional columns may be cleared
        assert!(Record::from_json(def, json!({"image_url": null}), WriteMode::Update).is_ok());
    }

    #[test]
    fn validates_value_kinds() {
        let perf = find("performance").unwrap();
        let agent = "8d5e7f1c-3b1a-4c9e-9f0a-2b6d1e4c7a10";
        let ok = json!({
            "agent_id": agent,
            "period": "2024-06-01",
            "handled_calls": 120,
            "quality_score": "93.50",
            "csat_score": 4.5
        });
        assert!(Record::from_json(perf, ok, WriteMode::Create).is_ok());

        for (field, bad) in [
            ("agent_id", json!("not-a-uuid")),
            ("period", json!("01/06/2024")),
            ("handled_calls", json!(1.5)),
            ("handled_calls", json!(10_000_000_000i64)),
            ("quality_score", json!("high")),
        ] {
            let mut body = json!({"agent_id": agent, "period": "2024-06-01"});
            body[field] = bad;
            let err = Record::from_json(perf, body, WriteMode::Create).unwrap_err();
            assert!(matches!(err, RecordError::InvalidValue { field: f, .. } if f == field));
        }

        let news = find("announcements").unwrap();
        assert!(Record::from_json(news, json!({"tags": ["a", 1]}), WriteMode::Update).is_err());
        assert!(Record::from_json(news, json!({"published": "yes"}), WriteMode::Update).is_err());

        let kb = find("knowledge").unwrap();
        assert!(Record::from_json(kb, json!({"status": "PUBLISHED"}), WriteMode::Update).is_ok());
        assert!(Record::from_json(kb, json!({"status": "LIVE"}), WriteMode::Update).is_err());
    }

    #[test]
    fn defaults_do_not_override_input() {
        let def = find("announcements").unwrap();
        let mut record =
            Record::from_json(def, json!({"title": "Hi", "content": "Body"}), WriteMode::Create).unwrap();
        record.set_default("author_id", json!("u1"));
        assert_eq!(record.get("author_id"), Some(&json!("u1")));
        record.set_default("title", json!("Other"));
        assert_eq!(record.get("title"), Some(&json!("Hi")));
    }
}
