use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::collect::global_variables::IDENTITY_PROPERTIES;
use crate::commons::basic_functions::millis_to_datetime;
use crate::error::{Result, ZonalError};

/// Scalar stored in a record field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    /// Integral values such as epoch-millisecond timestamps
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Bool(b) => FieldValue::Integer(i64::from(*b)),
            other => FieldValue::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One flat output row: statistic or category fields plus raster identity.
///
/// The field set is not fixed; categorical records only hold the categories
/// present in the region.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn extend(&mut self, fields: BTreeMap<String, FieldValue>) {
        self.fields.extend(fields);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields other than the identity ones
    pub fn value_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.iter()
            .filter(|(k, _)| !IDENTITY_PROPERTIES.iter().any(|(_, field)| field == k))
    }

    pub fn time_start(&self) -> Option<DateTime<Utc>> {
        self.get_number("system_time_start").and_then(millis_to_datetime)
    }

    pub fn time_end(&self) -> Option<DateTime<Utc>> {
        self.get_number("system_time_end").and_then(millis_to_datetime)
    }

    pub fn source_id(&self) -> Option<&str> {
        self.get("system_id").and_then(FieldValue::as_str)
    }

    /// Copy the raster identity properties in, `Null` for any the raster lacks
    pub fn insert_identity(&mut self, properties: Option<&Map<String, Value>>) {
        for (property, field) in IDENTITY_PROPERTIES {
            let value = properties
                .and_then(|p| p.get(property))
                .map(FieldValue::from_json)
                .unwrap_or(FieldValue::Null);
            self.insert(field, value);
        }
    }
}

/// Per-raster reply: a geometry-less feature whose properties hold
/// `reduction` (the reduceRegion dictionary) and `identity` (raster properties).
pub struct ImageSummary<'a> {
    pub reduction: Option<&'a Map<String, Value>>,
    pub identity: Option<&'a Map<String, Value>>,
}

impl<'a> ImageSummary<'a> {
    pub fn from_feature(feature: &'a Value) -> Result<Self> {
        let properties = feature
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ZonalError::backend(format!(
                    "unexpected response: expected a feature with properties, got {}",
                    truncate(&feature.to_string())
                ))
            })?;

        Ok(ImageSummary {
            reduction: properties.get("reduction").and_then(Value::as_object),
            identity: properties.get("identity").and_then(Value::as_object),
        })
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_flat() {
        let mut record = Record::new();
        record.insert("NDVI_min", FieldValue::Number(0.1));
        record.insert("NDVI_max", FieldValue::Null);
        record.insert("system_id", FieldValue::Text("A/B/1".to_string()));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"NDVI_max": null, "NDVI_min": 0.1, "system_id": "A/B/1"})
        );
    }

    #[test]
    fn test_identity_fields_always_present() {
        let mut record = Record::new();
        let props = json!({"system:time_start": 978307200000_i64, "system:id": "MODIS/061/MCD12Q1/2001_01_01"});
        record.insert_identity(props.as_object());
        assert_eq!(record.len(), 3);
        assert!(record.get("system_time_end").unwrap().is_null());
        assert_eq!(record.source_id(), Some("MODIS/061/MCD12Q1/2001_01_01"));
        assert_eq!(
            record.time_start().unwrap().format("%Y-%m-%d").to_string(),
            "2001-01-01"
        );
        assert_eq!(record.value_fields().count(), 0);
    }

    #[test]
    fn test_identity_timestamps_stay_integral() {
        let mut record = Record::new();
        let props = json!({
            "system:time_start": 1577836800000_i64,
            "system:time_end": 1577923200000_i64,
            "system:id": "x"
        });
        record.insert_identity(props.as_object());
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"system_id":"x","system_time_end":1577923200000,"system_time_start":1577836800000}"#
        );
        assert_eq!(record.get("system_time_start").unwrap().as_i64(), Some(1577836800000));
        assert_eq!(record.get_number("system_time_end"), Some(1577923200000.0));
        assert_eq!(
            record.time_start().unwrap().format("%Y-%m-%d").to_string(),
            "2020-01-01"
        );
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(FieldValue::from_json(&json!(7)), FieldValue::Integer(7));
        assert_eq!(FieldValue::from_json(&json!(7.5)), FieldValue::Number(7.5));
        assert_eq!(FieldValue::from_json(&json!(2.0)), FieldValue::Number(2.0));
        assert_eq!(FieldValue::from_json(&json!(true)), FieldValue::Integer(1));
    }

    #[test]
    fn test_summary_from_feature() {
        let feature = json!({
            "type": "Feature",
            "geometry": null,
            "properties": {"reduction": {"B1_mean": 2.0}, "identity": {}}
        });
        let summary = ImageSummary::from_feature(&feature).unwrap();
        assert_eq!(summary.reduction.unwrap().len(), 1);
        assert!(summary.identity.unwrap().is_empty());
    }

    #[test]
    fn test_summary_rejects_non_feature() {
        let err = ImageSummary::from_feature(&json!(42)).err().unwrap();
        assert!(matches!(err, ZonalError::Backend { .. }));
    }
}
