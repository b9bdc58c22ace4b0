use crate::api::ApiClient;
use crate::surface::{Controls, FileSessionStore, SceneSurface};
use crate::workflow::config::ClientConfig;
use limnocore::model::{GeoBounds, MeasurementKey};
use limnocore::state::SnapshotExport;
use limnocore::surface::{session_keys, Confirmer, SessionStore};
use limnocore::tabular::TableSheet;
use limnocore::telemetry::LogManager;
use limnocore::wire::endpoints::DEFAULT_BOUNDARY;
use limnocore::wire::{AnimationParams, HeatmapRequest, HeatmapResponse};
use limnocore::{Direction, VisualizationController, ViewMode, VizError, VizResult};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub type Controller = VisualizationController<FileSessionStore, SceneSurface>;

/// A heatmap request in flight and the overlay extent captured with it.
#[derive(Debug)]
pub struct PendingHeatmap {
    pub request: HeatmapRequest,
    pub bounds: GeoBounds,
}

/// One client session: the controller plus the server it talks to.
///
/// Each operation awaits its own request and hands the response to the
/// controller together with whatever it captured before dispatch.
pub struct Session {
    controller: Controller,
    api: ApiClient,
    scene: SceneSurface,
    config: ClientConfig,
    logger: LogManager,
}

impl Session {
    /// Opens the session file and restores any dataset stored in it.
    pub fn open(config: ClientConfig) -> VizResult<Self> {
        let api = ApiClient::new(&config.server_url)?;
        let store = FileSessionStore::open(&config.session_file)?;
        let scene = SceneSurface::new();
        let controller =
            VisualizationController::new(store, scene.clone(), config.to_controller_settings());
        let mut session = Self {
            controller,
            api,
            scene,
            config,
            logger: LogManager::new("session"),
        };
        if let Err(err) = session.controller.restore_session() {
            session
                .logger
                .caution(&format!("stored session could not be restored: {err}"));
        }
        session.publish();
        Ok(session)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn scene(&self) -> SceneSurface {
        self.scene.clone()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Copies the controller's slider values and status into the scene.
    pub fn publish(&self) {
        let c = &self.controller;
        self.scene.publish_controls(Controls {
            view_mode: c.view_mode(),
            opacity: c.opacity(),
            bandwidth: c.bandwidth(),
            status: c.status().cloned(),
            counts: c.counts(),
        });
    }

    /// Reports `result` on the status line if the controller has not already.
    fn settle<T>(&mut self, result: VizResult<T>, reported: bool) -> VizResult<T> {
        if let Err(err) = &result {
            if !reported {
                self.controller.report_error(err);
            }
        }
        self.publish();
        result
    }

    /// Loads the session boundary, or the server's default lake outline.
    pub async fn load_boundary(&mut self) -> GeoBounds {
        let path = self
            .controller
            .boundary_path()
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_owned());
        let bounds = match self.api.fetch_boundary(&path).await {
            Ok(document) => self.controller.set_boundary(&document),
            Err(err) => self.controller.use_fallback_boundary(&err),
        };
        self.publish();
        bounds
    }

    pub async fn upload(&mut self, file: &Path) -> VizResult<usize> {
        let (name, contents) = match read_named(file).await {
            Ok(read) => read,
            Err(err) => return self.settle(Err(err), false),
        };
        let raw = match self.api.upload(&name, contents).await {
            Ok(raw) => raw,
            Err(err) => return self.settle(Err(err), false),
        };
        let ingested = self.controller.ingest_upload(&raw);
        self.settle(ingested, true)
    }

    pub async fn upload_boundary(&mut self, file: &Path) -> VizResult<GeoBounds> {
        let uploaded = async {
            let (name, contents) = read_named(file).await?;
            self.api.upload_boundary(&name, contents).await
        }
        .await;
        let response = match uploaded {
            Ok(response) => response,
            Err(err) => return self.settle(Err(err), false),
        };
        let document = match self.api.fetch_boundary(&response.path).await {
            Ok(document) => document,
            Err(err) => return self.settle(Err(err), false),
        };
        let bounds = self.controller.set_boundary(&document);
        let recorded = self.controller.record_boundary_path(&response.path);
        self.settle(recorded, true)?;
        Ok(bounds)
    }

    /// Requests heatmaps for the whole dataset and rebuilds the carousel.
    pub async fn generate(&mut self) -> VizResult<usize> {
        let pending = self.prepare_generate()?;
        let response = self.api.generate_heatmap(&pending.request).await;
        self.finish_generate(pending, response)
    }

    /// Builds the heatmap request and captures the overlay extent it will
    /// be drawn over. The session is not touched again until
    /// [`Session::finish_generate`].
    pub fn prepare_generate(&mut self) -> VizResult<PendingHeatmap> {
        let request = self.controller.heatmap_request();
        let request = self.settle(request, true)?;
        let bounds = self.controller.overlay_bounds();
        self.logger.record(&format!(
            "requesting heatmaps for {} measurements",
            request.data.len()
        ));
        Ok(PendingHeatmap { request, bounds })
    }

    /// Applies a heatmap response over the bounds captured when it was requested.
    pub fn finish_generate(
        &mut self,
        pending: PendingHeatmap,
        response: VizResult<HeatmapResponse>,
    ) -> VizResult<usize> {
        let response = match response {
            Ok(response) => response,
            Err(err) => return self.settle(Err(err), false),
        };
        let applied = self.controller.apply_heatmap(response, pending.bounds);
        self.settle(applied, true)
    }

    pub fn show_slice(&mut self, timestamp: &str) -> VizResult<usize> {
        let shown = self.controller.show_slice(timestamp);
        self.settle(shown, true)
    }

    pub fn step(&mut self, direction: Direction) -> VizResult<String> {
        let stepped = self.controller.advance_carousel(direction);
        self.settle(stepped, true)
    }

    pub fn select_tile(&mut self, timestamp: &str) -> VizResult<String> {
        let selected = self.controller.select_tile(timestamp);
        self.settle(selected, true)
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.controller.set_view_mode(mode);
        self.publish();
    }

    pub fn apply_opacity(&mut self, value: f64) -> bool {
        let applied = self.controller.apply_opacity(value);
        self.publish();
        applied
    }

    pub fn apply_bandwidth(&mut self, value: f64) -> bool {
        let applied = self.controller.apply_bandwidth(value);
        self.publish();
        applied
    }

    pub fn set_reference_points(&mut self, visible: bool) {
        self.controller.set_reference_points(visible);
        self.publish();
    }

    /// Confirms, deletes server-side, then refreshes the displayed slice.
    pub async fn delete(
        &mut self,
        key: MeasurementKey,
        confirmer: &mut (dyn Confirmer + Send),
    ) -> VizResult<Option<usize>> {
        let key = self.prepare_delete(key, confirmer)?;
        let sent = self.api.delete_measurement(&key).await;
        self.finish_delete(sent)
    }

    /// Asks for confirmation; the returned key is what gets sent.
    pub fn prepare_delete(
        &mut self,
        key: MeasurementKey,
        confirmer: &mut dyn Confirmer,
    ) -> VizResult<MeasurementKey> {
        let key = self.controller.begin_delete(key, confirmer);
        self.settle(key, true)
    }

    pub fn finish_delete(&mut self, sent: VizResult<()>) -> VizResult<Option<usize>> {
        if let Err(err) = sent {
            return self.settle(Err(err), false);
        }
        let refreshed = self.controller.complete_delete();
        self.settle(refreshed, true)
    }

    /// Renders a video server-side and attaches it over the lake.
    pub async fn animate(&mut self, params: &AnimationParams) -> VizResult<Vec<u8>> {
        let request = self.controller.animation_request(params);
        let request = self.settle(request, true)?;
        let video = match self.api.animate(&request).await {
            Ok(video) => video,
            Err(err) => return self.settle(Err(err), false),
        };
        let attached = self.controller.attach_video(&video);
        self.settle(attached, true)?;
        Ok(video)
    }

    /// Legend image for `timestamp` over the current value range.
    pub async fn legend(&mut self, timestamp: &str) -> VizResult<Vec<u8>> {
        let legend = self.controller.legend_for(timestamp);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let fetched = match self.api.legend_url(&legend, millis) {
            Ok(url) => self.api.fetch_bytes(url).await,
            Err(err) => Err(err),
        };
        self.settle(fetched, false)
    }

    pub async fn pull_table(&mut self) -> VizResult<TableSheet> {
        let sheet = match self.api.fetch_table().await {
            Ok(raw) => TableSheet::from_json(&raw),
            Err(err) => Err(err),
        };
        let sheet = self.settle(sheet, false)?;
        self.controller
            .report_success(format!("Loaded {} records.", sheet.rows().len()));
        self.publish();
        Ok(sheet)
    }

    /// Un-pivots the sheet and saves it. Returns the number of measurements sent.
    pub async fn push_table(&mut self, sheet: &TableSheet) -> VizResult<usize> {
        let outcome = sheet.to_flat();
        if outcome.skipped_rows > 0 {
            self.logger.caution(&format!(
                "{} rows without latitude/longitude were not saved",
                outcome.skipped_rows
            ));
        }
        if let Some(first) = outcome.rejected_cells.first() {
            self.logger.caution(&format!(
                "{} non-numeric cells were not saved, first {:?} in {}",
                outcome.rejected_cells.len(),
                first.text,
                first.column.field()
            ));
        }
        if outcome.records.is_empty() {
            return self.settle(Err(VizError::NotReady("No valid data to save.".into())), false);
        }
        let saved = self.api.save_table(&outcome.records).await;
        self.settle(saved, false)?;
        match outcome.rejected_cells.len() {
            0 => self.controller.report_success("Data saved successfully!"),
            n => self.controller.report_success(format!(
                "Data saved successfully! Skipped {n} non-numeric cells."
            )),
        }
        self.publish();
        Ok(outcome.records.len())
    }

    pub fn export(&mut self) -> VizResult<SnapshotExport> {
        let exported = self.controller.export_snapshot();
        self.settle(exported, true)
    }

    /// Export plus a file name matching its format.
    pub fn export_file(&mut self) -> VizResult<(String, Vec<u8>)> {
        let file = match self.export()? {
            SnapshotExport::Video(_) => self
                .scene
                .video_bytes()
                .and_then(|bytes| {
                    bytes.ok_or_else(|| VizError::NotReady("the video is no longer attached".into()))
                })
                .map(|bytes| ("limnoview-video.mp4".to_owned(), bytes)),
            SnapshotExport::HeatmapImage { timestamp, png } => {
                Ok((format!("heatmap-{}.png", file_safe(&timestamp)), png))
            }
            SnapshotExport::MapRender(geojson) => Ok(("lake-map.geojson".to_owned(), geojson)),
        };
        self.settle(file, false)
    }

    /// Clears every persisted session key.
    pub fn forget(&mut self) -> VizResult<()> {
        let cleared = [
            session_keys::UPLOADED_DATA,
            session_keys::UPLOADED_FILENAME,
            session_keys::BOUNDARY_PATH,
        ]
        .into_iter()
        .try_for_each(|key| self.controller.store_mut().clear(key));
        self.settle(cleared, false)
    }
}

fn file_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

async fn read_named(path: &Path) -> VizResult<(String, Vec<u8>)> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| VizError::Storage(format!("reading {}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned());
    Ok((name, contents))
}
