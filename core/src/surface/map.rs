use crate::model::{BoundaryShape, GeoBounds, GeoPoint};
use crate::prelude::VizResult;
use crate::scene::{LegendSpec, MarkerSpec};
use crate::wire::EncodedImage;
use serde::{Deserialize, Serialize};

/// Handle of an image overlay registered on the map.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

/// Handle of an attached video resource; must be released before replacement.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoHandle(pub u64);

/// Geographic map widget the controller drives.
pub trait MapSurface {
    fn draw_boundary(&mut self, shape: &BoundaryShape, bounds: GeoBounds);
    /// Replaces every point marker.
    fn draw_markers(&mut self, markers: &[MarkerSpec], opacity: f64);
    fn set_marker_opacity(&mut self, opacity: f64);
    fn add_image_overlay(
        &mut self,
        timestamp: &str,
        image: &EncodedImage,
        bounds: GeoBounds,
        opacity: f64,
    ) -> OverlayId;
    fn set_overlay_opacity(&mut self, id: OverlayId, opacity: f64);
    fn remove_overlay(&mut self, id: OverlayId);
    /// Rebuilds the timestamp tile strip.
    fn set_tiles(&mut self, timestamps: &[String]);
    fn highlight_tile(&mut self, timestamp: Option<&str>);
    fn show_legend(&mut self, legend: &LegendSpec);
    /// Replaces the reference dots; an empty slice clears them.
    fn set_reference_points(&mut self, points: &[GeoPoint]);
    fn attach_video(
        &mut self,
        video: &[u8],
        bounds: GeoBounds,
        opacity: f64,
    ) -> VizResult<VideoHandle>;
    fn release_video(&mut self, handle: VideoHandle);
    /// Export of the current map view in whatever format the surface renders.
    fn export_snapshot(&mut self) -> VizResult<Vec<u8>>;
}
