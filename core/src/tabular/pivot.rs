use super::column::{ColumnId, ColumnLayout};
use crate::model::measurement::{scalar_to_f64, scalar_to_label};
use crate::model::Measurement;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

const STATION_ID: &str = "station_id";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// One station row of the editing grid. Cell text is kept as entered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotRow {
    pub station_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cells: BTreeMap<ColumnId, String>,
}

impl PivotRow {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    /// Parses one `GET /api/table` row. Keys that are not coordinates or
    /// `<parameter>_<timestamp>` fields are ignored, as are null cells.
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut row = Self::default();
        for (key, value) in object {
            match key.as_str() {
                STATION_ID => row.station_id = scalar_to_label(value),
                LATITUDE => row.latitude = scalar_to_f64(value),
                LONGITUDE => row.longitude = scalar_to_f64(value),
                field => {
                    if let (Some(id), Some(text)) =
                        (ColumnId::parse_field(field), scalar_to_label(value))
                    {
                        row.cells.insert(id, text);
                    }
                }
            }
        }
        row
    }

    pub fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        if let Some(id) = &self.station_id {
            object.insert(STATION_ID.into(), Value::String(id.clone()));
        }
        object.insert(LATITUDE.into(), coordinate(self.latitude));
        object.insert(LONGITUDE.into(), coordinate(self.longitude));
        for (id, text) in &self.cells {
            let value = match text.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(number) => Value::Number(number),
                None => Value::String(text.clone()),
            };
            object.insert(id.field(), value);
        }
        object
    }

    pub fn cell(&self, id: &ColumnId) -> Option<&str> {
        self.cells.get(id).map(String::as_str)
    }

    pub fn set_cell(&mut self, id: ColumnId, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            self.cells.remove(&id);
        } else {
            self.cells.insert(id, text);
        }
    }

    /// True when nothing in the row carries content.
    pub fn is_blank(&self) -> bool {
        self.station_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.cells.values().all(|text| text.trim().is_empty())
    }

    fn has_location(&self) -> bool {
        matches!((self.latitude, self.longitude), (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite())
    }
}

fn coordinate(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Flat record as exchanged with `POST /api/table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(flatten)]
    pub measurement: Measurement,
}

impl From<Measurement> for FlatRecord {
    fn from(measurement: Measurement) -> Self {
        Self {
            station_id: None,
            measurement,
        }
    }
}

/// Non-blank cell whose text is not a finite number.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCell {
    pub row: usize,
    pub column: ColumnId,
    pub text: String,
}

/// Result of un-pivoting grid rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotOutcome {
    pub records: Vec<FlatRecord>,
    /// Rows dropped for missing latitude or longitude.
    pub skipped_rows: usize,
    /// Cells left out of `records`; they never reach the server as empty values.
    pub rejected_cells: Vec<RejectedCell>,
}

impl PivotOutcome {
    pub fn measurements(&self) -> Vec<Measurement> {
        self.records.iter().map(|r| r.measurement.clone()).collect()
    }
}

/// Un-pivots grid rows into flat records, one per non-blank numeric cell of a
/// column in `layout`. Rows without both coordinates are skipped and cells
/// that do not parse as a finite number are rejected.
pub fn pivot_to_flat(rows: &[PivotRow], layout: &ColumnLayout) -> PivotOutcome {
    let mut outcome = PivotOutcome::default();
    for (index, row) in rows.iter().enumerate() {
        let (Some(latitude), Some(longitude)) = (row.latitude, row.longitude) else {
            warn!("skipping row {index} with missing latitude/longitude");
            outcome.skipped_rows += 1;
            continue;
        };
        if !row.has_location() {
            warn!("skipping row {index} with non-finite coordinates");
            outcome.skipped_rows += 1;
            continue;
        }
        let station_id = row
            .station_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("station_{index}"));
        for id in layout.columns() {
            let Some(text) = row.cell(id).map(str::trim).filter(|t| !t.is_empty()) else {
                continue;
            };
            let Some(value) = text.parse::<f64>().ok().filter(|v| v.is_finite()) else {
                warn!("row {index}: {:?} in {} is not a number", text, id.field());
                outcome.rejected_cells.push(RejectedCell {
                    row: index,
                    column: id.clone(),
                    text: text.to_owned(),
                });
                continue;
            };
            outcome.records.push(FlatRecord {
                station_id: Some(station_id.clone()),
                measurement: Measurement::new(
                    latitude,
                    longitude,
                    id.parameter.clone(),
                    id.timestamp.clone(),
                    value,
                ),
            });
        }
    }
    outcome
}

/// Column layout covering every (parameter, timestamp) in `records`.
pub fn flat_to_column_groups(records: &[Measurement]) -> ColumnLayout {
    let ids: Vec<ColumnId> = records
        .iter()
        .map(|m| ColumnId::new(m.parameter.clone(), m.timestamp.clone()))
        .collect();
    ColumnLayout::from_ids(&ids)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Station(String),
    Location(u64, u64),
}

/// Pivots flat records into one row per station id, or per location for
/// records without one. Rows keep first-appearance order; a repeated
/// (row, column) pair keeps the last value.
pub fn flat_to_rows(records: &[FlatRecord]) -> Vec<PivotRow> {
    let mut keys: Vec<RowKey> = Vec::new();
    let mut rows: Vec<PivotRow> = Vec::new();
    for record in records {
        let m = &record.measurement;
        let key = match &record.station_id {
            Some(id) => RowKey::Station(id.clone()),
            None => RowKey::Location(m.latitude.to_bits(), m.longitude.to_bits()),
        };
        let position = match keys.iter().position(|k| *k == key) {
            Some(position) => position,
            None => {
                keys.push(key);
                let mut row = PivotRow::at(m.latitude, m.longitude);
                row.station_id = record.station_id.clone();
                rows.push(row);
                rows.len() - 1
            }
        };
        if m.value.is_finite() {
            rows[position].cells.insert(
                ColumnId::new(m.parameter.clone(), m.timestamp.clone()),
                m.value.to_string(),
            );
        }
    }
    rows
}
