use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One observed value at a location, parameter and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub parameter: String,
    #[serde(deserialize_with = "timestamp_from_json")]
    pub timestamp: String,
    #[serde(default = "missing_value", deserialize_with = "value_from_json")]
    pub value: f64,
    #[serde(
        default,
        deserialize_with = "count_from_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub count: Option<i64>,
}

impl Measurement {
    pub fn new(
        latitude: f64,
        longitude: f64,
        parameter: impl Into<String>,
        timestamp: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            latitude,
            longitude,
            parameter: parameter.into(),
            timestamp: timestamp.into(),
            value,
            count: None,
        }
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey {
            latitude: self.latitude,
            longitude: self.longitude,
            parameter: self.parameter.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Identity of a measurement for deletion, also the `DELETE /api/measurement` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementKey {
    pub latitude: f64,
    pub longitude: f64,
    pub parameter: String,
    pub timestamp: String,
}

/// Renders a JSON scalar the way it would appear as an object key.
pub(crate) fn scalar_to_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric reading of a JSON scalar; numeric strings are accepted.
pub(crate) fn scalar_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn timestamp_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    scalar_to_label(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp must be a scalar, got {raw}")))
}

fn missing_value() -> f64 {
    f64::NAN
}

fn value_from_json<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(scalar_to_f64(&raw).unwrap_or(f64::NAN))
}

/// Integral counts only; `3.0` and `"3"` are accepted, anything else is dropped.
fn count_from_json<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    if let Some(n) = raw.as_i64() {
        return Ok(Some(n));
    }
    Ok(scalar_to_f64(&raw)
        .filter(|v| v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64))
}
