use crate::gui_bridge::model::{Attachment, BridgeCommand, CommandReply, ReplyStatus};
use crate::surface::SceneSurface;
use crate::workflow::runner::Session;
use anyhow::Context;
use base64::Engine as _;
use limnocore::surface::FixedAnswer;
use limnocore::model::MeasurementKey;
use limnocore::telemetry::OperationCounts;
use limnocore::{Direction, StatusMessage, VizError, VizResult};
use log::info;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::{Filter, Rejection, Reply};

pub type SharedSession = Arc<Mutex<Session>>;

/// Local HTTP endpoint the viewer polls for the scene and posts events to.
///
/// Commands take the session lock only between network round trips;
/// snapshots are served from the scene without taking it at all.
pub struct GuiBridge {
    session: SharedSession,
    scene: SceneSurface,
}

impl GuiBridge {
    pub fn new(session: Session) -> Self {
        let scene = session.scene();
        Self {
            session: Arc::new(Mutex::new(session)),
            scene,
        }
    }

    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let scene = self.scene.clone();
        let scene_filter = warp::any().map(move || scene.clone());
        let session = self.session.clone();
        let session_filter = warp::any().map(move || session.clone());

        let snapshot_route = warp::path("snapshot")
            .and(warp::get())
            .and(scene_filter)
            .map(|scene: SceneSurface| warp::reply::json(&scene.snapshot()));

        let command_route = warp::path("command")
            .and(warp::post())
            .and(warp::body::json())
            .and(session_filter)
            .and_then(|command: BridgeCommand, session: SharedSession| async move {
                let reply = dispatch(&session, command).await;
                Ok::<_, Infallible>(warp::reply::json(&reply))
            });

        snapshot_route.or(command_route)
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("binding viewer bridge to {addr}"))?;
        info!("viewer bridge listening on http://{bound}");
        server.await;
        Ok(())
    }
}

/// Runs one viewer command and describes the outcome.
///
/// The session is locked only while it is read or updated. Heatmap and
/// delete requests are awaited without the lock, so sliders and stepping
/// keep working while the server renders.
pub async fn dispatch(session: &SharedSession, command: BridgeCommand) -> CommandReply {
    let before = observe(&*session.lock().await);
    let outcome: Result<Option<Attachment>, VizError> = match command {
        BridgeCommand::Generate => generate(session).await.map(|_| None),
        BridgeCommand::Delete { key, confirmed } => {
            delete(session, key, confirmed).await.map(|_| None)
        }
        BridgeCommand::Next => session.lock().await.step(Direction::Forward).map(|_| None),
        BridgeCommand::Prev => session.lock().await.step(Direction::Backward).map(|_| None),
        BridgeCommand::SelectTile { timestamp } => {
            session.lock().await.select_tile(&timestamp).map(|_| None)
        }
        BridgeCommand::ViewMode { mode } => {
            session.lock().await.set_view_mode(mode);
            Ok(None)
        }
        BridgeCommand::Opacity { value } => {
            session.lock().await.apply_opacity(value);
            Ok(None)
        }
        BridgeCommand::Bandwidth { value } => {
            session.lock().await.apply_bandwidth(value);
            Ok(None)
        }
        BridgeCommand::ReferencePoints { visible } => {
            session.lock().await.set_reference_points(visible);
            Ok(None)
        }
        BridgeCommand::Export => session.lock().await.export_file().map(|(file_name, bytes)| {
            Some(Attachment {
                file_name,
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            })
        }),
    };

    let status = match &outcome {
        Ok(_) => ReplyStatus::Ok,
        Err(VizError::UserCancelled) => ReplyStatus::Cancelled,
        Err(_) => ReplyStatus::Error,
    };
    let after = observe(&*session.lock().await);
    let message = if after != before { after.0.as_ref() } else { None };
    let reply = CommandReply::from_status(status, message);
    match outcome {
        Ok(Some(attachment)) => reply.with_attachment(attachment),
        _ => reply,
    }
}

fn observe(session: &Session) -> (Option<StatusMessage>, OperationCounts) {
    (
        session.controller().status().cloned(),
        session.controller().counts(),
    )
}

async fn generate(session: &SharedSession) -> VizResult<usize> {
    let (pending, api) = {
        let mut guard = session.lock().await;
        (guard.prepare_generate()?, guard.api().clone())
    };
    let response = api.generate_heatmap(&pending.request).await;
    session.lock().await.finish_generate(pending, response)
}

async fn delete(
    session: &SharedSession,
    key: MeasurementKey,
    confirmed: bool,
) -> VizResult<Option<usize>> {
    let (key, api) = {
        let mut guard = session.lock().await;
        let key = guard.prepare_delete(key, &mut FixedAnswer(confirmed))?;
        (key, guard.api().clone())
    };
    let sent = api.delete_measurement(&key).await;
    session.lock().await.finish_delete(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::ClientConfig;
    use limnocore::scene::SceneSnapshot;
    use limnocore::{StatusLevel, ViewMode};
    use limnocore::model::GeoBounds;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::Notify;
    use tokio::time::timeout;

    fn bridge_at(server_url: String) -> (GuiBridge, TempDir) {
        let dir = tempdir().unwrap();
        let config = ClientConfig {
            server_url,
            session_file: dir.path().join("session.json"),
            ..ClientConfig::default()
        };
        (GuiBridge::new(Session::open(config).unwrap()), dir)
    }

    fn bridge() -> (GuiBridge, TempDir) {
        bridge_at("http://127.0.0.1:9".into())
    }

    /// Heatmap server whose first request is held until `release` fires.
    #[derive(Default)]
    struct HeldRenderer {
        requests: AtomicUsize,
        received: Notify,
        release: Notify,
    }

    fn held_renderer() -> (Arc<HeldRenderer>, SocketAddr) {
        let renderer = Arc::new(HeldRenderer::default());
        let shared = renderer.clone();
        let route = warp::path("generate-heatmap")
            .and(warp::post())
            .and_then(move || {
                let renderer = shared.clone();
                async move {
                    let n = renderer.requests.fetch_add(1, Ordering::SeqCst);
                    renderer.received.notify_one();
                    if n == 0 {
                        renderer.release.notified().await;
                    }
                    let timestamp = if n == 0 { "2024-01-01" } else { "2024-02-01" };
                    let mut images = serde_json::Map::new();
                    images.insert(timestamp.into(), json!("AA=="));
                    let body = json!({"images": images, "global_min": 0.0, "global_max": 10.0});
                    Ok::<_, Infallible>(warp::reply::json(&body))
                }
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (renderer, addr)
    }

    fn upload_body() -> serde_json::Value {
        json!({
            "filename": "lake.csv",
            "data": [
                {"latitude": 19.65, "longitude": 85.31, "parameter": "chl", "timestamp": "2024-01-01", "value": 2.0},
                {"latitude": 19.66, "longitude": 85.32, "parameter": "chl", "timestamp": "2024-02-01", "value": 6.0}
            ]
        })
    }

    async fn post(bridge: &GuiBridge, body: serde_json::Value) -> CommandReply {
        let response = warp::test::request()
            .method("POST")
            .path("/command")
            .json(&body)
            .reply(&bridge.routes())
            .await;
        assert_eq!(response.status(), 200);
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn snapshot_route_serves_scene() {
        let (bridge, _dir) = bridge();
        let response = warp::test::request()
            .method("GET")
            .path("/snapshot")
            .reply(&bridge.routes())
            .await;
        assert_eq!(response.status(), 200);
        let snapshot: SceneSnapshot = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(snapshot.view_mode, ViewMode::Markers);
        assert_eq!(snapshot.overlay_count, 0);
    }

    #[tokio::test]
    async fn stepping_without_heatmaps_is_informational() {
        let (bridge, _dir) = bridge();
        let reply = post(&bridge, json!({"command": "next"})).await;
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.level, Some(StatusLevel::Info));
    }

    #[tokio::test]
    async fn view_mode_command_updates_snapshot() {
        let (bridge, _dir) = bridge();
        let reply = post(&bridge, json!({"command": "view_mode", "mode": "heatmap"})).await;
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(bridge.scene.snapshot().view_mode, ViewMode::Heatmap);

        post(&bridge, json!({"command": "opacity", "value": 0.25})).await;
        assert_eq!(bridge.scene.snapshot().opacity, 0.25);
    }

    #[tokio::test]
    async fn unconfirmed_delete_is_cancelled_without_request() {
        let (bridge, _dir) = bridge();
        let reply = post(
            &bridge,
            json!({"command": "delete", "latitude": 19.65, "longitude": 85.31,
                   "parameter": "chl", "timestamp": "2024-01-01", "confirmed": false}),
        )
        .await;
        assert_eq!(reply.status, ReplyStatus::Cancelled);
        assert_eq!(reply.text, "");
    }

    #[tokio::test]
    async fn export_attaches_map_render() {
        let (bridge, _dir) = bridge();
        let reply = post(&bridge, json!({"command": "export"})).await;
        assert_eq!(reply.status, ReplyStatus::Ok);
        let attachment = reply.attachment.unwrap();
        assert_eq!(attachment.file_name, "lake-map.geojson");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(attachment.data)
            .unwrap();
        let geojson: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(geojson["type"], "FeatureCollection");
    }

    #[tokio::test]
    async fn malformed_command_is_rejected() {
        let (bridge, _dir) = bridge();
        let response = warp::test::request()
            .method("POST")
            .path("/command")
            .json(&json!({"command": "explode"}))
            .reply(&bridge.routes())
            .await;
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn sliders_respond_while_heatmaps_render() {
        let (renderer, addr) = held_renderer();
        let (bridge, _dir) = bridge_at(format!("http://{addr}"));
        let session = bridge.session();
        session.lock().await.controller_mut().ingest_upload(&upload_body()).unwrap();

        let pending = tokio::spawn({
            let session = session.clone();
            async move { dispatch(&session, BridgeCommand::Generate).await }
        });
        renderer.received.notified().await;

        let reply = timeout(
            Duration::from_secs(5),
            dispatch(&session, BridgeCommand::Opacity { value: 0.3 }),
        )
        .await
        .expect("opacity waited for the heatmap request");
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(bridge.scene.snapshot().opacity, 0.3);

        renderer.release.notify_one();
        assert_eq!(pending.await.unwrap().status, ReplyStatus::Ok);
        assert_eq!(bridge.scene.snapshot().tiles, vec!["2024-01-01"]);
    }

    #[tokio::test]
    async fn overlapping_generates_use_their_own_extent() {
        let (renderer, addr) = held_renderer();
        let (bridge, _dir) = bridge_at(format!("http://{addr}"));
        let session = bridge.session();
        session.lock().await.controller_mut().ingest_upload(&upload_body()).unwrap();

        let slow = tokio::spawn({
            let session = session.clone();
            async move { dispatch(&session, BridgeCommand::Generate).await }
        });
        renderer.received.notified().await;

        let lake = session.lock().await.controller_mut().set_boundary(&json!({
            "type": "Polygon",
            "coordinates": [[[20.0, 10.0], [21.0, 10.0], [21.0, 11.0], [20.0, 11.0], [20.0, 10.0]]]
        }));
        let fast = dispatch(&session, BridgeCommand::Generate).await;
        assert_eq!(fast.status, ReplyStatus::Ok);
        let overlay = bridge.scene.snapshot().visible_overlay.unwrap();
        assert_eq!(overlay.timestamp, "2024-02-01");
        assert_eq!(overlay.bounds, lake);

        renderer.release.notify_one();
        assert_eq!(slow.await.unwrap().status, ReplyStatus::Ok);
        let snapshot = bridge.scene.snapshot();
        let overlay = snapshot.visible_overlay.unwrap();
        assert_eq!(overlay.timestamp, "2024-01-01");
        assert_eq!(overlay.bounds, GeoBounds::FALLBACK);
        assert_eq!(snapshot.overlay_count, 1);
    }
}
