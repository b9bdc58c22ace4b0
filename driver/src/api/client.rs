use limnocore::model::MeasurementKey;
use limnocore::scene::LegendSpec;
use limnocore::tabular::FlatRecord;
use limnocore::wire::endpoints;
use limnocore::wire::{
    AnimationRequest, BoundaryUploadResponse, HeatmapRequest, HeatmapResponse, ServerErrorBody,
};
use limnocore::{VizError, VizResult};
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// HTTP client for the monitoring server.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(server_url: &str) -> VizResult<Self> {
        let mut base = Url::parse(server_url)
            .map_err(|e| VizError::invalid(format!("server url {server_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(VizError::invalid(format!("server url {server_url} cannot be a base")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> VizResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| VizError::invalid(format!("route {path}: {e}")))
    }

    /// `POST /upload`; returns the raw body for the controller to decode.
    pub async fn upload(&self, file_name: &str, contents: Vec<u8>) -> VizResult<Value> {
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name.to_owned()));
        let response = self
            .http
            .post(self.url(endpoints::UPLOAD)?)
            .multipart(form)
            .send()
            .await
            .map_err(VizError::network)?;
        json_body(checked(endpoints::UPLOAD, response).await?).await
    }

    pub async fn generate_heatmap(&self, request: &HeatmapRequest) -> VizResult<HeatmapResponse> {
        let response = self
            .http
            .post(self.url(endpoints::GENERATE_HEATMAP)?)
            .json(request)
            .send()
            .await
            .map_err(VizError::network)?;
        let raw: Value = json_body(checked(endpoints::GENERATE_HEATMAP, response).await?).await?;
        HeatmapResponse::decode(&raw)
    }

    /// `POST /api/animate`; the body is the encoded video.
    pub async fn animate(&self, request: &AnimationRequest) -> VizResult<Vec<u8>> {
        let response = self
            .http
            .post(self.url(endpoints::ANIMATE)?)
            .json(request)
            .send()
            .await
            .map_err(VizError::network)?;
        let bytes = checked(endpoints::ANIMATE, response)
            .await?
            .bytes()
            .await
            .map_err(VizError::network)?;
        Ok(bytes.to_vec())
    }

    pub async fn delete_measurement(&self, key: &MeasurementKey) -> VizResult<()> {
        let response = self
            .http
            .delete(self.url(endpoints::MEASUREMENT)?)
            .json(key)
            .send()
            .await
            .map_err(VizError::network)?;
        checked(endpoints::MEASUREMENT, response).await?;
        Ok(())
    }

    pub async fn upload_boundary(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> VizResult<BoundaryUploadResponse> {
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name.to_owned()));
        let response = self
            .http
            .post(self.url(endpoints::UPLOAD_BOUNDARY)?)
            .multipart(form)
            .send()
            .await
            .map_err(VizError::network)?;
        json_body(checked(endpoints::UPLOAD_BOUNDARY, response).await?).await
    }

    /// GeoJSON at `path`, relative to the server root.
    pub async fn fetch_boundary(&self, path: &str) -> VizResult<Value> {
        self.get_json(path).await
    }

    pub async fn fetch_table(&self) -> VizResult<Value> {
        self.get_json(endpoints::TABLE).await
    }

    /// `POST /api/table`. Each record also carries its timestamp as
    /// `sampled_at`, the key the table endpoint reads.
    pub async fn save_table(&self, records: &[FlatRecord]) -> VizResult<Value> {
        let body = table_body(records)?;
        let response = self
            .http
            .post(self.url(endpoints::TABLE)?)
            .json(&body)
            .send()
            .await
            .map_err(VizError::network)?;
        json_body(checked(endpoints::TABLE, response).await?).await
    }

    /// `/legend/<timestamp>.png?min&max&colormap&t`, with `t` busting caches.
    pub fn legend_url(&self, legend: &LegendSpec, cache_buster: u128) -> VizResult<Url> {
        let mut url = self.url(endpoints::LEGEND_PREFIX)?;
        url.path_segments_mut()
            .map_err(|_| VizError::invalid("server url cannot be a base"))?
            .push(&format!("{}.png", legend.timestamp));
        url.query_pairs_mut()
            .append_pair("min", &legend.range.min.to_string())
            .append_pair("max", &legend.range.max.to_string())
            .append_pair("colormap", &legend.colormap)
            .append_pair("t", &cache_buster.to_string());
        Ok(url)
    }

    pub async fn fetch_bytes(&self, url: Url) -> VizResult<Vec<u8>> {
        let route = url.path().to_owned();
        let response = self.http.get(url).send().await.map_err(VizError::network)?;
        let bytes = checked(&route, response)
            .await?
            .bytes()
            .await
            .map_err(VizError::network)?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> VizResult<T> {
        let response = self
            .http
            .get(self.url(path)?)
            .send()
            .await
            .map_err(VizError::network)?;
        json_body(checked(path, response).await?).await
    }
}

fn table_body(records: &[FlatRecord]) -> VizResult<Vec<Value>> {
    records
        .iter()
        .map(|record| {
            let mut value = serde_json::to_value(record)
                .map_err(|e| VizError::invalid(format!("encoding table row: {e}")))?;
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "sampled_at".into(),
                    Value::String(record.measurement.timestamp.clone()),
                );
            }
            Ok(value)
        })
        .collect()
}

/// Turns a non-2xx reply into a `NetworkFailure` carrying the server's
/// `error` text when it sent one.
async fn checked(route: &str, response: Response) -> VizResult<Response> {
    let status = response.status();
    debug!("{route} -> {status}");
    if status.is_success() {
        return Ok(response);
    }
    let body: ServerErrorBody = response.json().await.unwrap_or_default();
    let detail = body
        .error
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    info!("{route} failed with {status}: {detail}");
    Err(VizError::NetworkFailure(format!("{route} returned {}: {detail}", status.as_u16())))
}

async fn json_body<T: DeserializeOwned>(response: Response) -> VizResult<T> {
    response
        .json()
        .await
        .map_err(|e| VizError::invalid(format!("server returned an invalid response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use limnocore::model::{Measurement, ValueBounds};
    use serde_json::json;
    use std::net::SocketAddr;
    use warp::http::StatusCode;
    use warp::Filter;

    macro_rules! serve {
        ($routes:expr) => {{
            let (addr, server) = warp::serve($routes).bind_ephemeral(([127, 0, 0, 1], 0));
            tokio::spawn(server);
            addr
        }};
    }

    fn client(addr: SocketAddr) -> ApiClient {
        ApiClient::new(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn heatmap_images_keep_server_order() {
        let route = warp::path("generate-heatmap")
            .and(warp::post())
            .and(warp::body::json())
            .map(|body: Value| {
                assert_eq!(body["colormap"], json!("turbo"));
                warp::reply::json(&json!({
                    "images": {"2024-03-01": "AA==", "2024-01-01": "AA=="},
                    "global_min": 1.0,
                    "global_max": 9.0
                }))
            });
        let api = client(serve!(route));
        let request = HeatmapRequest {
            data: vec![Measurement::new(19.65, 85.31, "chl", "2024-01-01", 3.0)],
            bandwidth: 0.15,
            opacity: 0.7,
            timestamp_columns: vec!["2024-01-01".into()],
            global_min: 3.0,
            global_max: 3.0,
            colormap: "turbo".into(),
            method: "idw".into(),
            boundary_path: endpoints::DEFAULT_HEATMAP_BOUNDARY_PATH.into(),
        };
        let response = api.generate_heatmap(&request).await.unwrap();
        let order: Vec<&str> = response.images.iter().map(|(ts, _)| ts.as_str()).collect();
        assert_eq!(order, vec!["2024-03-01", "2024-01-01"]);
        assert_eq!(response.global_max, Some(9.0));
    }

    #[tokio::test]
    async fn server_error_text_is_surfaced() {
        let route = warp::path("upload").and(warp::post()).map(|| {
            warp::reply::with_status(
                warp::reply::json(&json!({"error": "No selected file"})),
                StatusCode::BAD_REQUEST,
            )
        });
        let api = client(serve!(route));
        let err = api.upload("lake.csv", b"a,b\n".to_vec()).await.unwrap_err();
        match err {
            VizError::NetworkFailure(text) => assert!(text.contains("No selected file")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_returns_raw_body() {
        let route = warp::path("upload")
            .and(warp::post())
            .and(warp::body::bytes())
            .map(|body: warp::hyper::body::Bytes| {
                let text = String::from_utf8_lossy(&body).to_string();
                assert!(text.contains("filename=\"lake.csv\""));
                warp::reply::json(&json!({"filename": "lake.csv", "data": []}))
            });
        let api = client(serve!(route));
        let raw = api.upload("lake.csv", b"lat,lon\n".to_vec()).await.unwrap();
        assert_eq!(raw["filename"], json!("lake.csv"));
    }

    #[tokio::test]
    async fn animation_returns_video_bytes() {
        let route = warp::path!("api" / "animate")
            .and(warp::post())
            .map(|| warp::http::Response::builder().body(vec![0u8, 1, 2, 3]));
        let api = client(serve!(route));
        let request = AnimationRequest {
            parameter: "UploadedParameter".into(),
            start_date: None,
            end_date: None,
            fps: 15,
            frames_per_transition: 10,
            colormap: "turbo".into(),
            filename: "lake.csv".into(),
            boundary_path: endpoints::DEFAULT_ANIMATION_BOUNDARY_PATH.into(),
        };
        assert_eq!(api.animate(&request).await.unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn table_rows_carry_sampled_at() {
        let route = warp::path!("api" / "table")
            .and(warp::post())
            .and(warp::body::json())
            .map(|rows: Vec<Value>| {
                assert_eq!(rows[0]["sampled_at"], json!("2024-01-01"));
                assert_eq!(rows[0]["station_id"], json!("station_0"));
                warp::reply::json(&json!({"rows_processed": rows.len()}))
            });
        let api = client(serve!(route));
        let records = vec![FlatRecord {
            station_id: Some("station_0".into()),
            measurement: Measurement::new(1.0, 2.0, "chl", "2024-01-01", 3.0),
        }];
        let ack = api.save_table(&records).await.unwrap();
        assert_eq!(ack["rows_processed"], json!(1));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_failure() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            api.fetch_table().await,
            Err(VizError::NetworkFailure(_))
        ));
    }

    #[test]
    fn legend_url_encodes_timestamp() {
        let api = ApiClient::new("http://lake.local:5000/app").unwrap();
        let legend = LegendSpec {
            timestamp: "2024/01 01".into(),
            range: ValueBounds { min: 1.0, max: 9.5 },
            colormap: "turbo".into(),
        };
        let url = api.legend_url(&legend, 42).unwrap();
        assert_eq!(
            url.as_str(),
            "http://lake.local:5000/app/legend/2024%2F01%2001.png?min=1&max=9.5&colormap=turbo&t=42"
        );
    }

    #[test]
    fn relative_and_rooted_paths_resolve_alike() {
        let api = ApiClient::new("http://lake.local:5000").unwrap();
        assert_eq!(
            api.url(endpoints::DEFAULT_ANIMATION_BOUNDARY_PATH).unwrap(),
            api.url(endpoints::DEFAULT_HEATMAP_BOUNDARY_PATH).unwrap()
        );
    }
}
