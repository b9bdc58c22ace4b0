use limnocore::model::{BoundaryShape, GeoBounds, GeoPoint};
use limnocore::scene::{LegendSpec, MarkerSpec, OverlayView, SceneSnapshot, VideoView};
use limnocore::surface::{MapSurface, OverlayId, VideoHandle};
use limnocore::telemetry::OperationCounts;
use limnocore::wire::EncodedImage;
use limnocore::{StatusMessage, ViewMode, VizError, VizResult};
use log::debug;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::{Builder, TempPath};

#[derive(Debug, Clone)]
struct OverlayLayer {
    timestamp: String,
    image: EncodedImage,
    bounds: GeoBounds,
    opacity: f64,
}

#[derive(Debug)]
struct VideoLayer {
    handle: VideoHandle,
    file: TempPath,
    bounds: GeoBounds,
    opacity: f64,
}

/// Controller-side values the viewer shows next to the map.
#[derive(Debug, Clone)]
pub struct Controls {
    pub view_mode: ViewMode,
    pub opacity: f64,
    pub bandwidth: f64,
    pub status: Option<StatusMessage>,
    pub counts: OperationCounts,
}

impl Default for Controls {
    fn default() -> Self {
        let snapshot = SceneSnapshot::default();
        Self {
            view_mode: snapshot.view_mode,
            opacity: snapshot.opacity,
            bandwidth: snapshot.bandwidth,
            status: None,
            counts: OperationCounts::default(),
        }
    }
}

#[derive(Debug, Default)]
struct SceneState {
    boundary: Option<(BoundaryShape, GeoBounds)>,
    markers: Vec<MarkerSpec>,
    marker_opacity: f64,
    overlays: BTreeMap<OverlayId, OverlayLayer>,
    next_overlay: u64,
    tiles: Vec<String>,
    active_tile: Option<String>,
    legend: Option<LegendSpec>,
    reference_points: Vec<GeoPoint>,
    video: Option<VideoLayer>,
    next_video: u64,
    controls: Controls,
}

impl SceneState {
    fn snapshot(&self) -> SceneSnapshot {
        let visible_overlay = self
            .overlays
            .values()
            .find(|layer| layer.opacity > 0.0)
            .map(|layer| OverlayView {
                timestamp: layer.timestamp.clone(),
                image: layer.image.clone(),
                bounds: layer.bounds,
                opacity: layer.opacity,
            });
        SceneSnapshot {
            bounds: self
                .boundary
                .as_ref()
                .map(|(_, bounds)| *bounds)
                .unwrap_or(GeoBounds::FALLBACK),
            boundary: self
                .boundary
                .as_ref()
                .map(|(shape, _)| shape.clone())
                .unwrap_or_default(),
            markers: self.markers.clone(),
            marker_opacity: self.marker_opacity,
            reference_points: self.reference_points.clone(),
            tiles: self.tiles.clone(),
            active_tile: self.active_tile.clone(),
            visible_overlay,
            overlay_count: self.overlays.len(),
            legend: self.legend.clone(),
            video: self.video.as_ref().map(|video| VideoView {
                location: video.file.display().to_string(),
                bounds: video.bounds,
                opacity: video.opacity,
            }),
            view_mode: self.controls.view_mode,
            opacity: self.controls.opacity,
            bandwidth: self.controls.bandwidth,
            status: self.controls.status.clone(),
            counts: self.controls.counts,
        }
    }

    /// GeoJSON of the boundary rings and the drawn markers.
    fn to_geojson(&self) -> Value {
        let mut features = Vec::new();
        if let Some((shape, _)) = &self.boundary {
            let rings: Vec<Vec<[f64; 2]>> = shape
                .rings
                .iter()
                .map(|ring| ring.iter().map(|p| [p.longitude, p.latitude]).collect())
                .collect();
            features.push(json!({
                "type": "Feature",
                "properties": {"kind": "boundary"},
                "geometry": {"type": "MultiLineString", "coordinates": rings}
            }));
        }
        for marker in &self.markers {
            let m = &marker.measurement;
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "parameter": m.parameter,
                    "timestamp": m.timestamp,
                    "value": m.value,
                    "radius": marker.radius
                },
                "geometry": {"type": "Point", "coordinates": [m.longitude, m.latitude]}
            }));
        }
        json!({"type": "FeatureCollection", "features": features})
    }
}

/// In-process map model shared between the session and the viewer bridge.
#[derive(Clone, Debug, Default)]
pub struct SceneSurface {
    state: Arc<RwLock<SceneState>>,
}

impl SceneSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SceneState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SceneState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.read().snapshot()
    }

    pub fn publish_controls(&self, controls: Controls) {
        self.write().controls = controls;
    }

    pub fn overlay_count(&self) -> usize {
        self.read().overlays.len()
    }
}

impl MapSurface for SceneSurface {
    fn draw_boundary(&mut self, shape: &BoundaryShape, bounds: GeoBounds) {
        self.write().boundary = Some((shape.clone(), bounds));
    }

    fn draw_markers(&mut self, markers: &[MarkerSpec], opacity: f64) {
        let mut state = self.write();
        state.markers = markers.to_vec();
        state.marker_opacity = opacity;
    }

    fn set_marker_opacity(&mut self, opacity: f64) {
        self.write().marker_opacity = opacity;
    }

    fn add_image_overlay(
        &mut self,
        timestamp: &str,
        image: &EncodedImage,
        bounds: GeoBounds,
        opacity: f64,
    ) -> OverlayId {
        let mut state = self.write();
        state.next_overlay += 1;
        let id = OverlayId(state.next_overlay);
        state.overlays.insert(
            id,
            OverlayLayer {
                timestamp: timestamp.to_owned(),
                image: image.clone(),
                bounds,
                opacity,
            },
        );
        id
    }

    fn set_overlay_opacity(&mut self, id: OverlayId, opacity: f64) {
        if let Some(layer) = self.write().overlays.get_mut(&id) {
            layer.opacity = opacity;
        }
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        self.write().overlays.remove(&id);
    }

    fn set_tiles(&mut self, timestamps: &[String]) {
        self.write().tiles = timestamps.to_vec();
    }

    fn highlight_tile(&mut self, timestamp: Option<&str>) {
        self.write().active_tile = timestamp.map(str::to_owned);
    }

    fn show_legend(&mut self, legend: &LegendSpec) {
        self.write().legend = Some(legend.clone());
    }

    fn set_reference_points(&mut self, points: &[GeoPoint]) {
        self.write().reference_points = points.to_vec();
    }

    /// Writes the clip to a temporary file that lives until release.
    fn attach_video(
        &mut self,
        video: &[u8],
        bounds: GeoBounds,
        opacity: f64,
    ) -> VizResult<VideoHandle> {
        let storage = |err: std::io::Error| VizError::Storage(format!("staging video: {err}"));
        let mut file = Builder::new()
            .prefix("limnoview-")
            .suffix(".mp4")
            .tempfile()
            .map_err(storage)?;
        file.write_all(video).map_err(storage)?;
        let path = file.into_temp_path();

        let mut state = self.write();
        state.next_video += 1;
        let handle = VideoHandle(state.next_video);
        debug!("video {:?} staged at {}", handle, path.display());
        state.video = Some(VideoLayer {
            handle,
            file: path,
            bounds,
            opacity,
        });
        Ok(handle)
    }

    fn release_video(&mut self, handle: VideoHandle) {
        let mut state = self.write();
        if state.video.as_ref().map(|v| v.handle) == Some(handle) {
            // dropping the TempPath deletes the file
            state.video = None;
        }
    }

    fn export_snapshot(&mut self) -> VizResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.read().to_geojson())
            .map_err(|e| VizError::Storage(format!("encoding map export: {e}")))
    }
}

impl SceneSurface {
    /// Bytes of the attached video, if any.
    pub fn video_bytes(&self) -> VizResult<Option<Vec<u8>>> {
        let state = self.read();
        match &state.video {
            Some(video) => std::fs::read(&video.file)
                .map(Some)
                .map_err(|e| VizError::Storage(format!("reading staged video: {e}"))),
            None => Ok(None),
        }
    }
}
