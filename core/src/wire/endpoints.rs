//! Server routes consumed by the front end.

pub const UPLOAD: &str = "/upload";
pub const GENERATE_HEATMAP: &str = "/generate-heatmap";
pub const ANIMATE: &str = "/api/animate";
pub const MEASUREMENT: &str = "/api/measurement";
pub const UPLOAD_BOUNDARY: &str = "/upload-boundary";
pub const TABLE: &str = "/api/table";
pub const LEGEND_PREFIX: &str = "/legend";
pub const DEFAULT_BOUNDARY: &str = "/static/data/export.geojson";

/// Boundary path sent with heatmap requests when none was uploaded.
pub const DEFAULT_HEATMAP_BOUNDARY_PATH: &str = "/static/data/export.geojson";
/// Boundary path sent with animation requests when none was uploaded.
pub const DEFAULT_ANIMATION_BOUNDARY_PATH: &str = "static/data/export.geojson";
