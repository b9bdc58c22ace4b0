use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Axis-aligned geographic rectangle an overlay is stretched over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Default lake extent used when no usable boundary is loaded.
    pub const FALLBACK: GeoBounds = GeoBounds {
        south: 19.63,
        west: 85.30,
        north: 19.71,
        east: 85.36,
    };

    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        points
            .into_iter()
            .filter(|p| p.latitude.is_finite() && p.longitude.is_finite())
            .fold(None, |bounds: Option<GeoBounds>, p| {
                Some(match bounds {
                    None => GeoBounds {
                        south: p.latitude,
                        west: p.longitude,
                        north: p.latitude,
                        east: p.longitude,
                    },
                    Some(b) => GeoBounds {
                        south: b.south.min(p.latitude),
                        west: b.west.min(p.longitude),
                        north: b.north.max(p.latitude),
                        east: b.east.max(p.longitude),
                    },
                })
            })
    }

    /// True when the rectangle has a non-zero extent on both axes.
    pub fn is_usable(&self) -> bool {
        self.north > self.south && self.east > self.west
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude)
            && (self.west..=self.east).contains(&point.longitude)
    }
}

/// Outline rings of a GeoJSON document plus their bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundaryShape {
    pub rings: Vec<Vec<GeoPoint>>,
}

impl BoundaryShape {
    /// Collects every coordinate ring of a Feature, FeatureCollection or bare
    /// geometry. GeoJSON positions are `[longitude, latitude]`.
    pub fn from_geojson(document: &Value) -> Self {
        let mut rings = Vec::new();
        collect_rings(document, &mut rings);
        Self { rings }
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::from_points(self.rings.iter().flatten().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(Vec::is_empty)
    }
}

fn position(value: &Value) -> Option<GeoPoint> {
    let coords = value.as_array()?;
    let longitude = coords.first()?.as_f64()?;
    let latitude = coords.get(1)?.as_f64()?;
    Some(GeoPoint {
        latitude,
        longitude,
    })
}

fn collect_coordinates(value: &Value, rings: &mut Vec<Vec<GeoPoint>>) {
    let Some(items) = value.as_array() else {
        return;
    };
    if items.iter().all(Value::is_number) {
        if let Some(point) = position(value) {
            rings.push(vec![point]);
        }
        return;
    }
    if items.iter().all(|item| position(item).is_some()) {
        rings.push(items.iter().filter_map(position).collect());
        return;
    }
    for item in items {
        collect_coordinates(item, rings);
    }
}

fn collect_rings(document: &Value, rings: &mut Vec<Vec<GeoPoint>>) {
    match document.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            if let Some(features) = document.get("features").and_then(Value::as_array) {
                for feature in features {
                    collect_rings(feature, rings);
                }
            }
        }
        Some("Feature") => {
            if let Some(geometry) = document.get("geometry") {
                collect_rings(geometry, rings);
            }
        }
        Some("GeometryCollection") => {
            if let Some(geometries) = document.get("geometries").and_then(Value::as_array) {
                for geometry in geometries {
                    collect_rings(geometry, rings);
                }
            }
        }
        Some(_) => {
            if let Some(coordinates) = document.get("coordinates") {
                collect_coordinates(coordinates, rings);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn polygon_feature_bounds() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[85.30, 19.63], [85.36, 19.63], [85.36, 19.71], [85.30, 19.63]]]
                }
            }]
        });
        let shape = BoundaryShape::from_geojson(&doc);
        assert_eq!(shape.rings.len(), 1);
        assert_eq!(shape.bounds(), Some(GeoBounds::FALLBACK));
    }

    #[test]
    fn multipolygon_rings_are_flattened() {
        let doc = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]],
                [[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0]]]
            ]
        });
        let shape = BoundaryShape::from_geojson(&doc);
        assert_eq!(shape.rings.len(), 2);
        let bounds = shape.bounds().unwrap();
        assert_eq!((bounds.south, bounds.east), (0.0, 3.0));
    }

    #[test]
    fn single_point_is_not_usable() {
        let doc = json!({"type": "Point", "coordinates": [85.3, 19.6]});
        let bounds = BoundaryShape::from_geojson(&doc).bounds().unwrap();
        assert!(!bounds.is_usable());
    }

    #[test]
    fn unknown_documents_have_no_bounds() {
        assert!(BoundaryShape::from_geojson(&json!({"foo": 1})).bounds().is_none());
    }
}
