//! Renderable description of the map, shared between the session host and viewers.

use crate::model::{BoundaryShape, GeoBounds, GeoPoint, Measurement, ValueBounds};
use crate::prelude::StatusMessage;
use crate::state::ViewMode;
use crate::telemetry::OperationCounts;
use crate::wire::EncodedImage;
use serde::{Deserialize, Serialize};

const MIN_RADIUS: f64 = 5.0;
const RADIUS_SPAN: f64 = 15.0;
const RADIUS_FLOOR: f64 = 2.0;

/// Point marker for one measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkerSpec {
    pub measurement: Measurement,
    pub radius: f64,
}

impl MarkerSpec {
    pub fn new(measurement: Measurement, global_max: f64) -> Self {
        let radius = Self::radius_for(measurement.value, global_max);
        Self {
            measurement,
            radius,
        }
    }

    /// Radius grows linearly from 5 at value 1 to 20 at the global maximum.
    /// Zero or missing values count as 1.
    pub fn radius_for(value: f64, global_max: f64) -> f64 {
        let value = if value.is_finite() && value != 0.0 {
            value
        } else {
            1.0
        };
        let max = if global_max.is_finite() && global_max != 0.0 {
            global_max
        } else {
            1.0
        };
        let denominator = if max > 1.0 { max - 1.0 } else { 1.0 };
        (MIN_RADIUS + RADIUS_SPAN * ((value - 1.0) / denominator)).max(RADIUS_FLOOR)
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.measurement.latitude,
            longitude: self.measurement.longitude,
        }
    }
}

/// Colour bar shown beside the active overlay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegendSpec {
    pub timestamp: String,
    pub range: ValueBounds,
    pub colormap: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayView {
    pub timestamp: String,
    pub image: EncodedImage,
    pub bounds: GeoBounds,
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoView {
    pub location: String,
    pub bounds: GeoBounds,
    pub opacity: f64,
}

/// Everything a viewer needs to draw the current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneSnapshot {
    pub bounds: GeoBounds,
    #[serde(default)]
    pub boundary: BoundaryShape,
    #[serde(default)]
    pub markers: Vec<MarkerSpec>,
    pub marker_opacity: f64,
    #[serde(default)]
    pub reference_points: Vec<GeoPoint>,
    #[serde(default)]
    pub tiles: Vec<String>,
    pub active_tile: Option<String>,
    /// The overlay currently drawn with non-zero opacity, if any.
    pub visible_overlay: Option<OverlayView>,
    pub overlay_count: usize,
    pub legend: Option<LegendSpec>,
    pub video: Option<VideoView>,
    pub view_mode: ViewMode,
    pub opacity: f64,
    pub bandwidth: f64,
    pub status: Option<StatusMessage>,
    #[serde(default)]
    pub counts: OperationCounts,
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        Self {
            bounds: GeoBounds::FALLBACK,
            boundary: BoundaryShape::default(),
            markers: Vec::new(),
            marker_opacity: 1.0,
            reference_points: Vec::new(),
            tiles: Vec::new(),
            active_tile: None,
            visible_overlay: None,
            overlay_count: 0,
            legend: None,
            video: None,
            view_mode: ViewMode::Markers,
            opacity: 0.7,
            bandwidth: 0.15,
            status: None,
            counts: OperationCounts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_spans_five_to_twenty() {
        assert_eq!(MarkerSpec::radius_for(1.0, 9.0), 5.0);
        assert_eq!(MarkerSpec::radius_for(9.0, 9.0), 20.0);
        assert_eq!(MarkerSpec::radius_for(5.0, 9.0), 12.5);
    }

    #[test]
    fn missing_values_use_base_radius() {
        assert_eq!(MarkerSpec::radius_for(f64::NAN, 9.0), 5.0);
        assert_eq!(MarkerSpec::radius_for(0.0, 9.0), 5.0);
    }

    #[test]
    fn small_maximum_does_not_divide_by_zero() {
        assert_eq!(MarkerSpec::radius_for(1.0, 1.0), 5.0);
        assert_eq!(MarkerSpec::radius_for(0.5, 0.8), RADIUS_FLOOR.max(5.0 - 7.5));
    }
}
