use crate::model::{BoundaryShape, GeoBounds, GeoPoint};
use crate::prelude::VizResult;
use crate::scene::{LegendSpec, MarkerSpec};
use crate::surface::{MapSurface, OverlayId, VideoHandle};
use crate::wire::EncodedImage;
use std::collections::BTreeMap;

/// Map surface that only records what it was asked to draw.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSurface {
    pub overlays: BTreeMap<OverlayId, (String, f64)>,
    pub removed: Vec<OverlayId>,
    pub created: u64,
    pub markers: Vec<MarkerSpec>,
    pub marker_opacity: f64,
    pub tiles: Vec<String>,
    pub highlighted: Option<String>,
    pub legend: Option<LegendSpec>,
    pub reference_points: Vec<GeoPoint>,
    pub live_videos: Vec<VideoHandle>,
    pub released_videos: Vec<VideoHandle>,
    pub boundary: Option<(BoundaryShape, GeoBounds)>,
    next_video: u64,
}

impl MapSurface for RecordingSurface {
    fn draw_boundary(&mut self, shape: &BoundaryShape, bounds: GeoBounds) {
        self.boundary = Some((shape.clone(), bounds));
    }

    fn draw_markers(&mut self, markers: &[MarkerSpec], opacity: f64) {
        self.markers = markers.to_vec();
        self.marker_opacity = opacity;
    }

    fn set_marker_opacity(&mut self, opacity: f64) {
        self.marker_opacity = opacity;
    }

    fn add_image_overlay(
        &mut self,
        timestamp: &str,
        _image: &EncodedImage,
        _bounds: GeoBounds,
        opacity: f64,
    ) -> OverlayId {
        self.created += 1;
        let id = OverlayId(self.created);
        self.overlays.insert(id, (timestamp.to_owned(), opacity));
        id
    }

    fn set_overlay_opacity(&mut self, id: OverlayId, opacity: f64) {
        if let Some(entry) = self.overlays.get_mut(&id) {
            entry.1 = opacity;
        }
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        if self.overlays.remove(&id).is_some() {
            self.removed.push(id);
        }
    }

    fn set_tiles(&mut self, timestamps: &[String]) {
        self.tiles = timestamps.to_vec();
    }

    fn highlight_tile(&mut self, timestamp: Option<&str>) {
        self.highlighted = timestamp.map(str::to_owned);
    }

    fn show_legend(&mut self, legend: &LegendSpec) {
        self.legend = Some(legend.clone());
    }

    fn set_reference_points(&mut self, points: &[GeoPoint]) {
        self.reference_points = points.to_vec();
    }

    fn attach_video(
        &mut self,
        _video: &[u8],
        _bounds: GeoBounds,
        _opacity: f64,
    ) -> VizResult<VideoHandle> {
        self.next_video += 1;
        let handle = VideoHandle(self.next_video);
        self.live_videos.push(handle);
        Ok(handle)
    }

    fn release_video(&mut self, handle: VideoHandle) {
        self.live_videos.retain(|live| *live != handle);
        self.released_videos.push(handle);
    }

    fn export_snapshot(&mut self) -> VizResult<Vec<u8>> {
        Ok(Vec::new())
    }
}
