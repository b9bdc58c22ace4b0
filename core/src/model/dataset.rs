use crate::math::StatsHelper;
use crate::model::measurement::{scalar_to_f64, scalar_to_label};
use crate::model::{Measurement, TimestampIndex};
use crate::prelude::{VizError, VizResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Global value range used for legends and marker scaling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValueBounds {
    pub min: f64,
    pub max: f64,
}

impl ValueBounds {
    pub const UNIT: ValueBounds = ValueBounds { min: 0.0, max: 1.0 };

    /// Server bounds when both are finite and ordered, otherwise the extent of
    /// the measurement values, otherwise `{0, 1}`.
    pub fn resolve(
        server_min: Option<f64>,
        server_max: Option<f64>,
        measurements: &[Measurement],
    ) -> Self {
        if let (Some(min), Some(max)) = (server_min, server_max) {
            if min.is_finite() && max.is_finite() && min <= max {
                return Self { min, max };
            }
        }
        Self::derive(measurements)
    }

    pub fn derive(measurements: &[Measurement]) -> Self {
        StatsHelper::finite_extent(measurements.iter().map(|m| m.value))
            .map(|(min, max)| Self { min, max })
            .unwrap_or(Self::UNIT)
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

/// Decoded upload result, also the persisted session shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    #[serde(rename = "data")]
    pub measurements: Vec<Measurement>,
    pub global_min: f64,
    pub global_max: f64,
    #[serde(default)]
    pub timestamp_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Outcome of decoding an upload payload.
#[derive(Debug, Clone)]
pub struct DecodedUpload {
    pub dataset: Dataset,
    pub skipped_records: usize,
}

impl Dataset {
    /// Decodes an upload response (or a stored session copy of one).
    ///
    /// `data` must be an array; individual records that do not decode as a
    /// measurement are dropped and counted.
    pub fn decode(raw: &Value) -> VizResult<DecodedUpload> {
        let object = raw
            .as_object()
            .ok_or_else(|| VizError::invalid("upload response is not a JSON object"))?;
        let records = match object.get("data") {
            Some(Value::Array(records)) => records,
            Some(_) => return Err(VizError::invalid("`data` is not a sequence")),
            None => return Err(VizError::invalid("`data` is missing")),
        };

        let mut measurements = Vec::with_capacity(records.len());
        let mut skipped_records = 0;
        for record in records {
            match serde_json::from_value::<Measurement>(record.clone()) {
                Ok(measurement) => measurements.push(measurement),
                Err(_) => skipped_records += 1,
            }
        }

        let bounds = ValueBounds::resolve(
            object.get("global_min").and_then(scalar_to_f64),
            object.get("global_max").and_then(scalar_to_f64),
            &measurements,
        );

        let timestamp_columns = match object.get("timestamp_columns") {
            Some(Value::Array(columns)) => columns.iter().filter_map(scalar_to_label).collect(),
            _ => TimestampIndex::build(&measurements).timestamps().to_vec(),
        };

        let filename = object
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(DecodedUpload {
            dataset: Dataset {
                measurements,
                global_min: bounds.min,
                global_max: bounds.max,
                timestamp_columns,
                filename,
            },
            skipped_records,
        })
    }

    pub fn bounds(&self) -> ValueBounds {
        ValueBounds {
            min: self.global_min,
            max: self.global_max,
        }
    }

    pub fn set_bounds(&mut self, bounds: ValueBounds) {
        self.global_min = bounds.min;
        self.global_max = bounds.max;
    }

    /// Measurements whose timestamp equals `timestamp` by string comparison.
    pub fn filter_timestamp(&self, timestamp: &str) -> Vec<Measurement> {
        self.measurements
            .iter()
            .filter(|m| m.timestamp == timestamp)
            .cloned()
            .collect()
    }

    pub fn to_json(&self) -> VizResult<String> {
        serde_json::to_string(self).map_err(|e| VizError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: f64) -> Value {
        json!({"latitude": 1.0, "longitude": 2.0, "parameter": "chl",
               "timestamp": "2024-01-01", "value": value})
    }

    #[test]
    fn missing_bounds_are_derived_from_values() {
        let raw = json!({"data": [record(3.0), record(7.0), record(1.0), record(9.0)]});
        let decoded = Dataset::decode(&raw).unwrap();
        assert_eq!(decoded.dataset.bounds(), ValueBounds { min: 1.0, max: 9.0 });
    }

    #[test]
    fn float_count_keeps_the_record() {
        let raw = json!({"data": [{"latitude": 1.0, "longitude": 2.0, "parameter": "chl",
                                   "timestamp": "t", "value": 4.0, "count": 3.0}]});
        let decoded = Dataset::decode(&raw).unwrap();
        assert_eq!(decoded.skipped_records, 0);
        assert_eq!(decoded.dataset.measurements[0].count, Some(3));
    }

    #[test]
    fn single_record_gives_degenerate_bounds() {
        let raw = json!({"data": [record(5.0)]});
        let dataset = Dataset::decode(&raw).unwrap().dataset;
        assert_eq!(dataset.global_min, 5.0);
        assert_eq!(dataset.global_max, 5.0);
        assert_eq!(dataset.timestamp_columns, vec!["2024-01-01".to_string()]);
    }

    #[test]
    fn no_finite_values_default_to_unit_range() {
        let raw = json!({"data": [{"latitude": 1.0, "longitude": 2.0, "parameter": "chl",
                                   "timestamp": "t", "value": "n/a"}]});
        let dataset = Dataset::decode(&raw).unwrap().dataset;
        assert_eq!(dataset.bounds(), ValueBounds::UNIT);
    }

    #[test]
    fn server_bounds_win_when_finite() {
        let raw = json!({"data": [record(3.0)], "global_min": "0.5", "global_max": 12});
        let dataset = Dataset::decode(&raw).unwrap().dataset;
        assert_eq!(dataset.bounds(), ValueBounds { min: 0.5, max: 12.0 });
    }

    #[test]
    fn inverted_server_bounds_fall_back() {
        let raw = json!({"data": [record(3.0), record(4.0)], "global_min": 10, "global_max": 1});
        let dataset = Dataset::decode(&raw).unwrap().dataset;
        assert_eq!(dataset.bounds(), ValueBounds { min: 3.0, max: 4.0 });
    }

    #[test]
    fn data_must_be_a_sequence() {
        assert!(matches!(
            Dataset::decode(&json!({"filename": "a.csv"})),
            Err(VizError::InvalidPayload(_))
        ));
        assert!(matches!(
            Dataset::decode(&json!({"data": {"a": 1}})),
            Err(VizError::InvalidPayload(_))
        ));
    }

    #[test]
    fn undecodable_records_are_counted() {
        let raw = json!({"data": [record(1.0), {"parameter": "chl"}]});
        let decoded = Dataset::decode(&raw).unwrap();
        assert_eq!(decoded.dataset.measurements.len(), 1);
        assert_eq!(decoded.skipped_records, 1);
    }

    #[test]
    fn stored_copy_decodes_identically() {
        let raw = json!({"data": [record(2.0), record(6.0)], "filename": "lake.csv",
                         "timestamp_columns": ["2024-01-01"]});
        let dataset = Dataset::decode(&raw).unwrap().dataset;
        let stored: Value = serde_json::from_str(&dataset.to_json().unwrap()).unwrap();
        assert_eq!(Dataset::decode(&stored).unwrap().dataset, dataset);
    }
}
