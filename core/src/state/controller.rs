use crate::model::{
    BoundaryShape, Dataset, GeoBounds, GeoPoint, Measurement, MeasurementKey, TimestampIndex,
    ValueBounds,
};
use crate::prelude::{StatusLevel, StatusMessage, VizError, VizResult};
use crate::scene::{LegendSpec, MarkerSpec};
use crate::state::{CarouselEntry, Direction, OverlayCarousel, ViewMode};
use crate::surface::{session_keys, Confirmer, MapSurface, SessionStore, VideoHandle};
use crate::telemetry::{LogManager, MetricsRecorder, OperationCounts};
use crate::wire::endpoints::{DEFAULT_ANIMATION_BOUNDARY_PATH, DEFAULT_HEATMAP_BOUNDARY_PATH};
use crate::wire::{
    AnimationParams, AnimationRequest, EncodedImage, HeatmapRequest, HeatmapResponse,
    HeatmapStyle,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Slider ranges and starting values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSettings {
    pub opacity: f64,
    pub bandwidth: f64,
    pub opacity_range: (f64, f64),
    pub bandwidth_range: (f64, f64),
    pub style: HeatmapStyle,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            opacity: 0.7,
            bandwidth: 0.15,
            opacity_range: (0.0, 1.0),
            bandwidth_range: (0.01, 1.0),
            style: HeatmapStyle::default(),
        }
    }
}

/// What `export_snapshot` produced, in order of preference.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotExport {
    Video(VideoHandle),
    HeatmapImage { timestamp: String, png: Vec<u8> },
    MapRender(Vec<u8>),
}

fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.max(lo).min(hi)
    }
}

/// Owns the uploaded dataset, its timestamp index and the overlay carousel,
/// and keeps the map surface consistent with them.
///
/// The controller is driven purely by method calls; every failure is also
/// written to the status line and never leaves the controller unusable.
pub struct VisualizationController<S: SessionStore, M: MapSurface> {
    store: S,
    surface: M,
    settings: ControllerSettings,
    dataset: Option<Dataset>,
    index: TimestampIndex,
    carousel: OverlayCarousel,
    view_mode: ViewMode,
    opacity: f64,
    bandwidth: f64,
    boundary: Option<(BoundaryShape, GeoBounds)>,
    markers: Vec<MarkerSpec>,
    reference_points_visible: bool,
    video: Option<VideoHandle>,
    status: Option<StatusMessage>,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl<S: SessionStore, M: MapSurface> VisualizationController<S, M> {
    pub fn new(store: S, surface: M, settings: ControllerSettings) -> Self {
        let opacity = clamp_to(settings.opacity, settings.opacity_range);
        let bandwidth = clamp_to(settings.bandwidth, settings.bandwidth_range);
        Self {
            store,
            surface,
            settings,
            dataset: None,
            index: TimestampIndex::default(),
            carousel: OverlayCarousel::default(),
            view_mode: ViewMode::Markers,
            opacity,
            bandwidth,
            boundary: None,
            markers: Vec::new(),
            reference_points_visible: false,
            video: None,
            status: None,
            logger: LogManager::new("controller"),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn surface(&self) -> &M {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut M {
        &mut self.surface
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn index(&self) -> &TimestampIndex {
        &self.index
    }

    pub fn carousel(&self) -> &OverlayCarousel {
        &self.carousel
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn style(&self) -> &HeatmapStyle {
        &self.settings.style
    }

    pub fn set_style(&mut self, style: HeatmapStyle) {
        self.settings.style = style;
    }

    pub fn markers(&self) -> &[MarkerSpec] {
        &self.markers
    }

    pub fn video(&self) -> Option<VideoHandle> {
        self.video
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn counts(&self) -> OperationCounts {
        self.metrics.snapshot()
    }

    pub fn reference_points_visible(&self) -> bool {
        self.reference_points_visible
    }

    /// Writes `err` to the status line (unless it is a silent cancellation).
    pub fn report_error(&mut self, err: &VizError) {
        if err.is_informational() {
            self.metrics.record_informational();
        } else if !matches!(err, VizError::UserCancelled) {
            self.metrics.record_failure();
            self.logger.caution(&err.to_string());
        }
        if let Some(status) = StatusMessage::from_error(err) {
            self.status = Some(status);
        }
    }

    pub fn report_success(&mut self, text: impl Into<String>) {
        self.metrics.record_success();
        self.status = Some(StatusMessage::new(StatusLevel::Success, text));
    }

    pub fn report_info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage::new(StatusLevel::Info, text));
    }

    fn settle<T>(&mut self, result: VizResult<T>) -> VizResult<T> {
        if let Err(err) = &result {
            self.report_error(err);
        }
        result
    }

    /// Replaces the dataset with a decoded upload response and persists it.
    /// Returns the number of measurements ingested.
    pub fn ingest_upload(&mut self, raw: &Value) -> VizResult<usize> {
        let decoded = Dataset::decode(raw);
        let decoded = self.settle(decoded)?;
        if decoded.skipped_records > 0 {
            self.logger.caution(&format!(
                "dropped {} undecodable upload records",
                decoded.skipped_records
            ));
        }
        let dataset = decoded.dataset;
        let persisted = self.persist(&dataset);
        self.settle(persisted)?;

        let count = dataset.measurements.len();
        let index = TimestampIndex::build(&dataset.measurements);
        self.logger.record(&format!(
            "ingested {} measurements across {} timestamps (bounds {:.3}..{:.3})",
            count,
            index.len(),
            dataset.global_min,
            dataset.global_max
        ));
        self.dataset = Some(dataset);
        self.index = index;
        self.redraw_full_dataset();
        self.report_success(format!("Successfully processed {count} data points."));
        Ok(count)
    }

    fn persist(&mut self, dataset: &Dataset) -> VizResult<()> {
        let json = dataset.to_json()?;
        self.store.set(session_keys::UPLOADED_DATA, &json)?;
        if let Some(filename) = &dataset.filename {
            self.store.set(session_keys::UPLOADED_FILENAME, filename)?;
        }
        Ok(())
    }

    /// Reloads a dataset persisted by an earlier session, if any.
    pub fn restore_session(&mut self) -> VizResult<Option<usize>> {
        let stored = self.store.get(session_keys::UPLOADED_DATA);
        let Some(stored) = self.settle(stored)? else {
            return Ok(None);
        };
        let decoded = serde_json::from_str::<Value>(&stored)
            .map_err(|e| VizError::invalid(format!("stored session data: {e}")))
            .and_then(|raw| Dataset::decode(&raw));
        let mut dataset = match decoded {
            Ok(decoded) => decoded.dataset,
            Err(err) => {
                if let Err(clear_err) = self.store.clear(session_keys::UPLOADED_DATA) {
                    self.logger
                        .caution(&format!("corrupt session data could not be cleared: {clear_err}"));
                }
                self.report_error(&err);
                return Err(err);
            }
        };
        if dataset.filename.is_none() {
            dataset.filename = self.store.get(session_keys::UPLOADED_FILENAME)?;
        }
        let count = dataset.measurements.len();
        self.index = TimestampIndex::build(&dataset.measurements);
        self.dataset = Some(dataset);
        self.redraw_full_dataset();
        self.logger
            .record(&format!("restored {count} measurements from session"));
        self.report_success("Session data restored. You can continue working.");
        Ok(Some(count))
    }

    /// Measurements for `timestamp`: index lookup first, then a string-equality
    /// scan of the full dataset.
    pub fn select_timestamp_slice(&self, timestamp: &str) -> VizResult<Vec<Measurement>> {
        if let Some(slice) = self.index.get(timestamp).filter(|s| !s.is_empty()) {
            return Ok(slice.to_vec());
        }
        let fallback = self
            .dataset
            .as_ref()
            .map(|d| d.filter_timestamp(timestamp))
            .unwrap_or_default();
        if fallback.is_empty() {
            Err(VizError::NoDataForTimestamp(timestamp.to_owned()))
        } else {
            Ok(fallback)
        }
    }

    /// Resolves and draws the markers for `timestamp`.
    pub fn show_slice(&mut self, timestamp: &str) -> VizResult<usize> {
        let slice = self.select_timestamp_slice(timestamp);
        let slice = self.settle(slice)?;
        let count = slice.len();
        self.draw_markers(slice);
        self.report_success(format!("{count} points @ {timestamp}"));
        Ok(count)
    }

    fn global_max(&self) -> f64 {
        self.dataset.as_ref().map(|d| d.global_max).unwrap_or(1.0)
    }

    fn marker_opacity(&self) -> f64 {
        match self.view_mode {
            ViewMode::Markers => 1.0,
            ViewMode::Heatmap => 0.0,
        }
    }

    fn overlay_opacity(&self) -> f64 {
        match self.view_mode {
            ViewMode::Markers => 0.0,
            ViewMode::Heatmap => self.opacity,
        }
    }

    fn draw_markers(&mut self, measurements: Vec<Measurement>) {
        let global_max = self.global_max();
        self.markers = measurements
            .into_iter()
            .filter(|m| m.latitude.is_finite() && m.longitude.is_finite())
            .map(|m| MarkerSpec::new(m, global_max))
            .collect();
        let opacity = self.marker_opacity();
        self.surface.draw_markers(&self.markers, opacity);
    }

    fn redraw_full_dataset(&mut self) {
        let all = self
            .dataset
            .as_ref()
            .map(|d| d.measurements.clone())
            .unwrap_or_default();
        self.draw_markers(all);
        if self.reference_points_visible {
            self.set_reference_points(true);
        }
    }

    /// Draws a GeoJSON boundary and adopts its extent for overlays. A missing
    /// or degenerate extent falls back to the default lake bounds.
    pub fn set_boundary(&mut self, document: &Value) -> GeoBounds {
        let shape = BoundaryShape::from_geojson(document);
        let bounds = match shape.bounds() {
            Some(bounds) if bounds.is_usable() => bounds,
            _ => {
                self.logger
                    .caution("invalid or zero-size boundary, using default extent");
                GeoBounds::FALLBACK
            }
        };
        self.surface.draw_boundary(&shape, bounds);
        self.boundary = Some((shape, bounds));
        bounds
    }

    /// Draws the default lake rectangle after a boundary fetch failed.
    pub fn use_fallback_boundary(&mut self, reason: &VizError) -> GeoBounds {
        let b = GeoBounds::FALLBACK;
        let ring = vec![
            GeoPoint { latitude: b.south, longitude: b.west },
            GeoPoint { latitude: b.south, longitude: b.east },
            GeoPoint { latitude: b.north, longitude: b.east },
            GeoPoint { latitude: b.north, longitude: b.west },
        ];
        let shape = BoundaryShape { rings: vec![ring] };
        self.surface.draw_boundary(&shape, b);
        self.boundary = Some((shape, b));
        self.report_error(reason);
        self.status = Some(StatusMessage::new(
            StatusLevel::Error,
            "Lake boundary failed to load. Map will be shown without boundary.",
        ));
        b
    }

    pub fn record_boundary_path(&mut self, path: &str) -> VizResult<()> {
        let stored = self.store.set(session_keys::BOUNDARY_PATH, path);
        self.settle(stored)?;
        self.report_success("Boundary loaded.");
        Ok(())
    }

    pub fn boundary_path(&self) -> Option<String> {
        self.store.get(session_keys::BOUNDARY_PATH).ok().flatten()
    }

    pub fn overlay_bounds(&self) -> GeoBounds {
        self.boundary
            .as_ref()
            .map(|(_, bounds)| *bounds)
            .unwrap_or(GeoBounds::FALLBACK)
    }

    pub fn boundary(&self) -> Option<&BoundaryShape> {
        self.boundary.as_ref().map(|(shape, _)| shape)
    }

    /// Body for `POST /generate-heatmap` built from the current dataset and
    /// slider values. Clears the reference dots.
    pub fn heatmap_request(&mut self) -> VizResult<HeatmapRequest> {
        self.set_reference_points(false);
        let request = match &self.dataset {
            Some(dataset) => Ok(HeatmapRequest {
                data: dataset.measurements.clone(),
                bandwidth: self.bandwidth,
                opacity: self.opacity,
                timestamp_columns: dataset.timestamp_columns.clone(),
                global_min: dataset.global_min,
                global_max: dataset.global_max,
                colormap: self.settings.style.colormap.clone(),
                method: self.settings.style.method.clone(),
                boundary_path: self
                    .boundary_path()
                    .unwrap_or_else(|| DEFAULT_HEATMAP_BOUNDARY_PATH.to_owned()),
            }),
            None => Err(VizError::NotReady("Please upload a file first.".into())),
        };
        self.settle(request)
    }

    /// Applies a heatmap response. `bounds` must be the overlay bounds captured
    /// when the request was dispatched.
    pub fn apply_heatmap(&mut self, response: HeatmapResponse, bounds: GeoBounds) -> VizResult<usize> {
        if response.images.is_empty() {
            return self.settle(Err(VizError::EmptyImageSet));
        }
        if let (Some(min), Some(max)) = (response.global_min, response.global_max) {
            if min.is_finite() && max.is_finite() && min <= max {
                if let Some(dataset) = self.dataset.as_mut() {
                    dataset.set_bounds(ValueBounds { min, max });
                }
            }
        }
        let count = self.build_carousel(response.images, bounds)?.len();
        self.set_view_mode(ViewMode::Heatmap);
        self.report_success("Heatmaps generated successfully.");
        Ok(count)
    }

    /// Replaces every registered overlay with one per image; the first is
    /// shown at the configured opacity, the rest are created invisible.
    pub fn build_carousel(
        &mut self,
        images: Vec<(String, EncodedImage)>,
        bounds: GeoBounds,
    ) -> VizResult<&OverlayCarousel> {
        if images.is_empty() {
            self.settle::<()>(Err(VizError::EmptyImageSet))?;
        }
        for id in self.carousel.overlay_ids().collect::<Vec<_>>() {
            self.surface.remove_overlay(id);
        }

        let mut entries: Vec<CarouselEntry> = Vec::with_capacity(images.len());
        for (timestamp, image) in images {
            if entries.iter().any(|e| e.timestamp == timestamp) {
                continue;
            }
            let opacity = if entries.is_empty() { self.opacity } else { 0.0 };
            let overlay = self
                .surface
                .add_image_overlay(&timestamp, &image, bounds, opacity);
            entries.push(CarouselEntry {
                timestamp,
                image,
                overlay,
            });
        }
        self.carousel = OverlayCarousel::new(entries);

        let order = self.carousel.order();
        self.surface.set_tiles(&order);
        self.surface.highlight_tile(order.first().map(String::as_str));
        if let Some(first) = order.first() {
            let legend = self.legend_for(first);
            self.surface.show_legend(&legend);
        }
        self.logger
            .record(&format!("carousel rebuilt with {} overlays", order.len()));
        Ok(&self.carousel)
    }

    /// Moves the active overlay one step with wrap-around.
    pub fn advance_carousel(&mut self, direction: Direction) -> VizResult<String> {
        let Some((previous, next)) = self.carousel.step(direction) else {
            return self.settle(Err(VizError::NoTimestamps));
        };
        Ok(self.activate(previous, next))
    }

    /// Jumps to the tile for `timestamp`.
    pub fn select_tile(&mut self, timestamp: &str) -> VizResult<String> {
        let jumped = self
            .carousel
            .position(timestamp)
            .and_then(|idx| self.carousel.jump(idx).map(|prev| (prev, idx)))
            .ok_or_else(|| VizError::NoDataForTimestamp(timestamp.to_owned()));
        let (previous, next) = self.settle(jumped)?;
        Ok(self.activate(previous, next))
    }

    fn activate(&mut self, previous: usize, next: usize) -> String {
        if let Some(entry) = self.carousel.get(previous) {
            if previous != next {
                self.surface.set_overlay_opacity(entry.overlay, 0.0);
            }
        }
        let opacity = self.overlay_opacity();
        let (overlay, timestamp) = match self.carousel.get(next) {
            Some(entry) => (entry.overlay, entry.timestamp.clone()),
            None => return String::new(),
        };
        self.surface.set_overlay_opacity(overlay, opacity);
        self.surface.highlight_tile(Some(&timestamp));
        let legend = self.legend_for(&timestamp);
        self.surface.show_legend(&legend);

        if self.view_mode == ViewMode::Markers {
            match self.select_timestamp_slice(&timestamp) {
                Ok(slice) => self.draw_markers(slice),
                Err(err) => self.report_error(&err),
            }
        }
        self.logger
            .record(&format!("active timestamp {timestamp} ({}/{})", next + 1, self.carousel.len()));
        timestamp
    }

    /// Toggles which layer set is visible without destroying either one.
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        let marker_opacity = self.marker_opacity();
        self.surface.set_marker_opacity(marker_opacity);
        if let Some(entry) = self.carousel.current() {
            let overlay = entry.overlay;
            let opacity = self.overlay_opacity();
            self.surface.set_overlay_opacity(overlay, opacity);
        }
        if mode == ViewMode::Markers {
            if let Some(timestamp) = self.carousel.current_timestamp().map(str::to_owned) {
                let slice = self
                    .select_timestamp_slice(&timestamp)
                    .unwrap_or_else(|_| {
                        self.logger.caution(&format!(
                            "no data for {timestamp}, showing the full dataset"
                        ));
                        self.dataset
                            .as_ref()
                            .map(|d| d.measurements.clone())
                            .unwrap_or_default()
                    });
                self.draw_markers(slice);
            }
        }
    }

    /// Live opacity preview on the active overlay; no effect in marker mode.
    /// Returns whether the surface was touched.
    pub fn apply_opacity(&mut self, value: f64) -> bool {
        self.opacity = clamp_to(value, self.settings.opacity_range);
        self.preview_active_overlay()
    }

    /// Records the bandwidth for the next generation and refreshes the live
    /// preview of the active overlay.
    pub fn apply_bandwidth(&mut self, value: f64) -> bool {
        self.bandwidth = clamp_to(value, self.settings.bandwidth_range);
        self.preview_active_overlay()
    }

    fn preview_active_overlay(&mut self) -> bool {
        if self.view_mode != ViewMode::Heatmap {
            return false;
        }
        match self.carousel.current() {
            Some(entry) => {
                let overlay = entry.overlay;
                self.surface.set_overlay_opacity(overlay, self.opacity);
                true
            }
            None => false,
        }
    }

    /// Shows or clears a dot at every measurement location.
    pub fn set_reference_points(&mut self, visible: bool) {
        self.reference_points_visible = visible;
        let points: Vec<GeoPoint> = match (&self.dataset, visible) {
            (Some(dataset), true) => dataset
                .measurements
                .iter()
                .map(|m| GeoPoint {
                    latitude: m.latitude,
                    longitude: m.longitude,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.surface.set_reference_points(&points);
    }

    /// Legend range: global bounds when finite, else the extent of the slice
    /// (or of the whole dataset), else `{0, 1}`.
    pub fn legend_range(&self, timestamp: &str) -> ValueBounds {
        let Some(dataset) = &self.dataset else {
            return ValueBounds::UNIT;
        };
        let global = dataset.bounds();
        if global.is_finite() {
            return global;
        }
        match self.index.get(timestamp) {
            Some(slice) if !slice.is_empty() => ValueBounds::derive(slice),
            _ => ValueBounds::derive(&dataset.measurements),
        }
    }

    pub fn legend_for(&self, timestamp: &str) -> LegendSpec {
        LegendSpec {
            timestamp: timestamp.to_owned(),
            range: self.legend_range(timestamp),
            colormap: self.settings.style.colormap.clone(),
        }
    }

    /// Body for `POST /api/animate`.
    pub fn animation_request(&mut self, params: &AnimationParams) -> VizResult<AnimationRequest> {
        let request = self.build_animation_request(params);
        self.settle(request)
    }

    fn build_animation_request(&self, params: &AnimationParams) -> VizResult<AnimationRequest> {
        if self.dataset.is_none() {
            return Err(VizError::NotReady("Please upload data first.".into()));
        }
        let filename = self
            .store
            .get(session_keys::UPLOADED_FILENAME)?
            .ok_or_else(|| VizError::NotReady("Missing uploaded filename in session.".into()))?;
        Ok(AnimationRequest {
            parameter: params.parameter.clone(),
            start_date: params.start_date.clone(),
            end_date: params.end_date.clone(),
            fps: params.fps,
            frames_per_transition: params.frames_per_transition,
            colormap: params.colormap.clone(),
            filename,
            boundary_path: self
                .boundary_path()
                .unwrap_or_else(|| DEFAULT_ANIMATION_BOUNDARY_PATH.to_owned()),
        })
    }

    /// Attaches a rendered video over the overlay bounds, releasing the
    /// previous one first.
    pub fn attach_video(&mut self, video: &[u8]) -> VizResult<VideoHandle> {
        self.release_video();
        let attached = self
            .surface
            .attach_video(video, self.overlay_bounds(), self.opacity);
        let handle = self.settle(attached)?;
        self.video = Some(handle);
        self.set_view_mode(ViewMode::Heatmap);
        self.report_success("Video generated successfully.");
        Ok(handle)
    }

    fn release_video(&mut self) {
        if let Some(handle) = self.video.take() {
            self.surface.release_video(handle);
        }
    }

    /// Video if one is attached, else the active heatmap image, else a render
    /// of the map.
    pub fn export_snapshot(&mut self) -> VizResult<SnapshotExport> {
        if let Some(handle) = self.video {
            self.report_success("Video downloaded.");
            return Ok(SnapshotExport::Video(handle));
        }
        if let Some(entry) = self.carousel.current() {
            let timestamp = entry.timestamp.clone();
            let decoded = entry.image.decode();
            let png = self.settle(decoded)?;
            self.report_success(format!("Heatmap for {timestamp} exported."));
            return Ok(SnapshotExport::HeatmapImage { timestamp, png });
        }
        let rendered = self.surface.export_snapshot();
        let png = self.settle(rendered)?;
        self.report_success("Map snapshot exported.");
        Ok(SnapshotExport::MapRender(png))
    }

    /// Asks for confirmation before a measurement is deleted server-side.
    pub fn begin_delete(
        &mut self,
        key: MeasurementKey,
        confirmer: &mut dyn Confirmer,
    ) -> VizResult<MeasurementKey> {
        let prompt = format!(
            "Are you sure you want to delete the measurement for '{}' at this location?",
            key.parameter
        );
        if confirmer.confirm(&prompt) {
            Ok(key)
        } else {
            self.settle(Err(VizError::UserCancelled))
        }
    }

    /// Re-resolves the displayed slice after a successful server-side delete.
    /// The dataset itself is not edited locally.
    pub fn complete_delete(&mut self) -> VizResult<Option<usize>> {
        self.logger.record("measurement deleted on the server");
        let Some(timestamp) = self.carousel.current_timestamp().map(str::to_owned) else {
            self.metrics.record_success();
            self.report_info("No timestamp available. Generate a heatmap first.");
            return Ok(None);
        };
        let refreshed = self.show_slice(&timestamp)?;
        self.report_success("Measurement deleted successfully.");
        Ok(Some(refreshed))
    }

    /// Releases the video and every registered overlay.
    pub fn teardown(&mut self) {
        self.release_video();
        for id in self.carousel.overlay_ids().collect::<Vec<_>>() {
            self.surface.remove_overlay(id);
        }
        self.carousel = OverlayCarousel::default();
    }
}

impl<S: SessionStore, M: MapSurface> Drop for VisualizationController<S, M> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::RecordingSurface;
    use crate::surface::{FixedAnswer, InMemorySessionStore};
    use serde_json::json;

    type Controller = VisualizationController<InMemorySessionStore, RecordingSurface>;

    fn controller() -> Controller {
        VisualizationController::new(
            InMemorySessionStore::new(),
            RecordingSurface::default(),
            ControllerSettings::default(),
        )
    }

    fn upload() -> Value {
        json!({
            "filename": "lake.csv",
            "data": [
                {"latitude": 19.65, "longitude": 85.31, "parameter": "chl", "timestamp": "2024-01-01", "value": 3.0},
                {"latitude": 19.66, "longitude": 85.32, "parameter": "chl", "timestamp": "2024-02-01", "value": 7.0},
                {"latitude": 19.67, "longitude": 85.33, "parameter": "chl", "timestamp": "2024-01-01", "value": 1.0},
                {"latitude": 19.68, "longitude": 85.34, "parameter": "chl", "timestamp": "2024-03-01", "value": 9.0}
            ],
            "timestamp_columns": ["2024-01-01", "2024-02-01", "2024-03-01"]
        })
    }

    fn images(labels: &[&str]) -> Vec<(String, EncodedImage)> {
        labels
            .iter()
            .map(|ts| (ts.to_string(), EncodedImage("aGVsbG8=".into())))
            .collect()
    }

    #[test]
    fn ingest_derives_bounds_and_persists() {
        let mut c = controller();
        assert_eq!(c.ingest_upload(&upload()).unwrap(), 4);
        let dataset = c.dataset().unwrap();
        assert_eq!((dataset.global_min, dataset.global_max), (1.0, 9.0));
        assert_eq!(c.surface().markers.len(), 4);
        assert!(c.store().get(session_keys::UPLOADED_DATA).unwrap().is_some());
        assert_eq!(
            c.store().get(session_keys::UPLOADED_FILENAME).unwrap().as_deref(),
            Some("lake.csv")
        );
        assert_eq!(c.status().unwrap().level, StatusLevel::Success);
    }

    #[test]
    fn single_record_scenario() {
        let mut c = controller();
        let raw = json!({"data": [{"latitude": 1, "longitude": 2, "parameter": "chl",
                                   "timestamp": "2024-01-01", "value": 5}]});
        c.ingest_upload(&raw).unwrap();
        let dataset = c.dataset().unwrap();
        assert_eq!((dataset.global_min, dataset.global_max), (5.0, 5.0));
        assert_eq!(c.index().timestamps(), &["2024-01-01"]);
        assert_eq!(c.index().get("2024-01-01").unwrap(), dataset.measurements.as_slice());
    }

    #[test]
    fn invalid_upload_keeps_previous_dataset() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        let err = c.ingest_upload(&json!({"data": "oops"})).unwrap_err();
        assert!(matches!(err, VizError::InvalidPayload(_)));
        assert_eq!(c.dataset().unwrap().measurements.len(), 4);
        assert_eq!(c.status().unwrap().level, StatusLevel::Error);
    }

    #[test]
    fn restore_rebuilds_index_from_store() {
        let mut first = controller();
        first.ingest_upload(&upload()).unwrap();
        let store = first.store().clone();

        let mut second =
            VisualizationController::new(store, RecordingSurface::default(), ControllerSettings::default());
        assert_eq!(second.restore_session().unwrap(), Some(4));
        assert_eq!(second.index().len(), 3);
        assert_eq!(second.dataset().unwrap().filename.as_deref(), Some("lake.csv"));
    }

    #[test]
    fn corrupt_session_is_cleared() {
        let mut store = InMemorySessionStore::new();
        store.set(session_keys::UPLOADED_DATA, "{not json").unwrap();
        let mut c = VisualizationController::new(store, RecordingSurface::default(), ControllerSettings::default());
        assert!(c.restore_session().is_err());
        assert!(c.store().get(session_keys::UPLOADED_DATA).unwrap().is_none());
        assert_eq!(c.restore_session().unwrap(), None);
    }

    /// Store whose values cannot be removed.
    struct StickyStore(InMemorySessionStore);

    impl SessionStore for StickyStore {
        fn get(&self, key: &str) -> VizResult<Option<String>> {
            self.0.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> VizResult<()> {
            self.0.set(key, value)
        }

        fn clear(&mut self, _key: &str) -> VizResult<()> {
            Err(VizError::Storage("read-only session".into()))
        }
    }

    #[test]
    fn corrupt_session_that_cannot_be_cleared_still_reports() {
        let mut inner = InMemorySessionStore::new();
        inner.set(session_keys::UPLOADED_DATA, "{not json").unwrap();
        let mut c = VisualizationController::new(
            StickyStore(inner),
            RecordingSurface::default(),
            ControllerSettings::default(),
        );
        let err = c.restore_session().unwrap_err();
        assert!(matches!(err, VizError::InvalidPayload(_)));
        assert_eq!(c.status().unwrap().level, StatusLevel::Error);
        assert!(c.dataset().is_none());
    }

    #[test]
    fn slice_falls_back_to_dataset_scan() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        assert_eq!(c.select_timestamp_slice("2024-01-01").unwrap().len(), 2);
        assert!(matches!(
            c.select_timestamp_slice("1999-01-01"),
            Err(VizError::NoDataForTimestamp(_))
        ));
    }

    #[test]
    fn empty_image_set_leaves_active_overlay_untouched() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.build_carousel(images(&["a", "b"]), GeoBounds::FALLBACK).unwrap();
        let before = c.surface().clone();
        let err = c.build_carousel(Vec::new(), GeoBounds::FALLBACK).unwrap_err();
        assert_eq!(err, VizError::EmptyImageSet);
        assert_eq!(c.carousel().current_timestamp(), Some("a"));
        assert_eq!(c.surface().overlays, before.overlays);
        assert_eq!(c.status().unwrap().level, StatusLevel::Info);
    }

    #[test]
    fn rebuild_removes_previous_overlays() {
        let mut c = controller();
        c.build_carousel(images(&["a", "b"]), GeoBounds::FALLBACK).unwrap();
        c.build_carousel(images(&["c"]), GeoBounds::FALLBACK).unwrap();
        assert_eq!(c.surface().overlays.len(), 1);
        assert_eq!(c.surface().removed.len(), 2);
    }

    #[test]
    fn carousel_first_overlay_visible_rest_hidden() {
        let mut c = controller();
        c.build_carousel(images(&["a", "b", "c"]), GeoBounds::FALLBACK).unwrap();
        let opacities: Vec<f64> = c
            .carousel()
            .overlay_ids()
            .map(|id| c.surface().overlays[&id].1)
            .collect();
        assert_eq!(opacities, vec![0.7, 0.0, 0.0]);
        assert_eq!(c.surface().highlighted.as_deref(), Some("a"));
    }

    #[test]
    fn advance_wraps_and_swaps_visibility() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        let response = HeatmapResponse {
            images: images(&["2024-01-01", "2024-02-01", "2024-03-01"]),
            global_min: None,
            global_max: None,
        };
        c.apply_heatmap(response, GeoBounds::FALLBACK).unwrap();
        assert_eq!(c.advance_carousel(Direction::Backward).unwrap(), "2024-03-01");
        let visible: Vec<String> = c
            .carousel()
            .entries()
            .iter()
            .filter(|e| c.surface().overlays[&e.overlay].1 > 0.0)
            .map(|e| e.timestamp.clone())
            .collect();
        assert_eq!(visible, vec!["2024-03-01".to_string()]);
        assert_eq!(c.advance_carousel(Direction::Forward).unwrap(), "2024-01-01");
    }

    #[test]
    fn advance_without_carousel_is_reported() {
        let mut c = controller();
        assert_eq!(c.advance_carousel(Direction::Forward), Err(VizError::NoTimestamps));
        assert_eq!(c.status().unwrap().level, StatusLevel::Info);
    }

    #[test]
    fn advance_in_marker_mode_reresolves_slice() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.build_carousel(images(&["2024-01-01", "2024-02-01"]), GeoBounds::FALLBACK)
            .unwrap();
        c.set_view_mode(ViewMode::Markers);
        assert_eq!(c.markers().len(), 2);
        c.advance_carousel(Direction::Forward).unwrap();
        assert_eq!(c.markers().len(), 1);
        assert_eq!(c.markers()[0].measurement.timestamp, "2024-02-01");
        let active = c.carousel().current().unwrap().overlay;
        assert_eq!(c.surface().overlays[&active].1, 0.0);
    }

    #[test]
    fn view_toggle_never_destroys_layers() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.apply_heatmap(
            HeatmapResponse {
                images: images(&["2024-01-01", "2024-02-01"]),
                ..Default::default()
            },
            GeoBounds::FALLBACK,
        )
        .unwrap();
        let created = c.surface().created;
        c.set_view_mode(ViewMode::Markers);
        c.set_view_mode(ViewMode::Heatmap);
        c.set_view_mode(ViewMode::Markers);
        assert_eq!(c.surface().created, created);
        assert!(c.surface().removed.is_empty());
        assert_eq!(c.surface().marker_opacity, 1.0);
        let active = c.carousel().current().unwrap().overlay;
        assert_eq!(c.surface().overlays[&active].1, 0.0);
    }

    #[test]
    fn opacity_preview_only_in_heatmap_mode() {
        let mut c = controller();
        c.build_carousel(images(&["a", "b"]), GeoBounds::FALLBACK).unwrap();
        c.set_view_mode(ViewMode::Markers);
        assert!(!c.apply_opacity(0.3));
        let active = c.carousel().current().unwrap().overlay;
        assert_eq!(c.surface().overlays[&active].1, 0.0);

        c.set_view_mode(ViewMode::Heatmap);
        assert_eq!(c.surface().overlays[&active].1, 0.3);
        assert!(c.apply_opacity(0.9));
        assert_eq!(c.surface().overlays[&active].1, 0.9);
        let hidden = c.carousel().get(1).unwrap().overlay;
        assert_eq!(c.surface().overlays[&hidden].1, 0.0);
    }

    #[test]
    fn slider_values_are_clamped() {
        let mut c = controller();
        c.apply_opacity(4.0);
        c.apply_bandwidth(-1.0);
        assert_eq!(c.opacity(), 1.0);
        assert_eq!(c.bandwidth(), 0.01);
    }

    #[test]
    fn heatmap_request_requires_upload() {
        let mut c = controller();
        assert!(matches!(c.heatmap_request(), Err(VizError::NotReady(_))));
        c.ingest_upload(&upload()).unwrap();
        c.store_mut()
            .set(session_keys::BOUNDARY_PATH, "/static/uploads/b.geojson")
            .unwrap();
        let request = c.heatmap_request().unwrap();
        assert_eq!(request.data.len(), 4);
        assert_eq!(request.boundary_path, "/static/uploads/b.geojson");
        assert_eq!(request.colormap, "turbo");
    }

    #[test]
    fn heatmap_response_bounds_are_adopted() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.apply_heatmap(
            HeatmapResponse {
                images: images(&["2024-01-01"]),
                global_min: Some(0.0),
                global_max: Some(12.0),
            },
            GeoBounds::FALLBACK,
        )
        .unwrap();
        assert_eq!(c.legend_range("2024-01-01"), ValueBounds { min: 0.0, max: 12.0 });
        assert_eq!(c.view_mode(), ViewMode::Heatmap);
    }

    #[test]
    fn select_tile_jumps() {
        let mut c = controller();
        c.build_carousel(images(&["a", "b", "c"]), GeoBounds::FALLBACK).unwrap();
        assert_eq!(c.select_tile("c").unwrap(), "c");
        assert_eq!(c.carousel().current_index(), Some(2));
        assert!(c.select_tile("zzz").is_err());
        assert_eq!(c.carousel().current_index(), Some(2));
    }

    #[test]
    fn declined_delete_is_silent() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        let status_before = c.status().cloned();
        let key = c.dataset().unwrap().measurements[0].key();
        let err = c.begin_delete(key, &mut FixedAnswer(false)).unwrap_err();
        assert_eq!(err, VizError::UserCancelled);
        assert_eq!(c.status().cloned(), status_before);
    }

    #[test]
    fn completed_delete_refreshes_current_slice() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.build_carousel(images(&["2024-01-01"]), GeoBounds::FALLBACK).unwrap();
        let key = c.dataset().unwrap().measurements[0].key();
        c.begin_delete(key, &mut FixedAnswer(true)).unwrap();
        assert_eq!(c.complete_delete().unwrap(), Some(2));
        assert_eq!(c.dataset().unwrap().measurements.len(), 4);
    }

    #[test]
    fn delete_without_active_timestamp_asks_for_heatmap() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        let key = c.dataset().unwrap().measurements[0].key();
        c.begin_delete(key, &mut FixedAnswer(true)).unwrap();
        assert_eq!(c.complete_delete().unwrap(), None);
        let status = c.status().unwrap();
        assert_eq!(status.level, StatusLevel::Info);
        assert_eq!(status.text, "No timestamp available. Generate a heatmap first.");
    }

    #[test]
    fn video_replacement_releases_previous() {
        let mut c = controller();
        let first = c.attach_video(b"one").unwrap();
        let second = c.attach_video(b"two").unwrap();
        assert_ne!(first, second);
        assert_eq!(c.surface().released_videos, vec![first]);
        c.teardown();
        assert_eq!(c.surface().released_videos, vec![first, second]);
    }

    #[test]
    fn export_prefers_video_then_heatmap_then_render() {
        let mut c = controller();
        assert!(matches!(c.export_snapshot().unwrap(), SnapshotExport::MapRender(_)));
        c.build_carousel(images(&["a"]), GeoBounds::FALLBACK).unwrap();
        match c.export_snapshot().unwrap() {
            SnapshotExport::HeatmapImage { timestamp, png } => {
                assert_eq!(timestamp, "a");
                assert_eq!(png, b"hello");
            }
            other => panic!("unexpected export {other:?}"),
        }
        c.attach_video(b"clip").unwrap();
        assert!(matches!(c.export_snapshot().unwrap(), SnapshotExport::Video(_)));
    }

    #[test]
    fn animation_request_needs_filename() {
        let mut c = controller();
        let params = AnimationParams::default();
        assert!(matches!(c.animation_request(&params), Err(VizError::NotReady(_))));
        c.ingest_upload(&upload()).unwrap();
        let request = c.animation_request(&params).unwrap();
        assert_eq!(request.filename, "lake.csv");
        assert_eq!(request.boundary_path, DEFAULT_ANIMATION_BOUNDARY_PATH);
    }

    #[test]
    fn degenerate_boundary_falls_back() {
        let mut c = controller();
        let bounds = c.set_boundary(&json!({"type": "Point", "coordinates": [85.3, 19.6]}));
        assert_eq!(bounds, GeoBounds::FALLBACK);
        let bounds = c.set_boundary(&json!({
            "type": "Polygon",
            "coordinates": [[[85.0, 19.0], [86.0, 19.0], [86.0, 20.0], [85.0, 19.0]]]
        }));
        assert_eq!(c.overlay_bounds(), bounds);
        assert_eq!(bounds.north, 20.0);
    }

    #[test]
    fn reference_points_follow_dataset() {
        let mut c = controller();
        c.ingest_upload(&upload()).unwrap();
        c.set_reference_points(true);
        assert_eq!(c.surface().reference_points.len(), 4);
        c.heatmap_request().unwrap();
        assert!(c.surface().reference_points.is_empty());
    }
}
