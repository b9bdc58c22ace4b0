use crate::model::measurement::scalar_to_f64;
use crate::model::Measurement;
use crate::prelude::{VizError, VizResult};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Base64-encoded PNG as returned by the server (no data-URL prefix).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EncodedImage(pub String);

impl EncodedImage {
    const DATA_URL_PREFIX: &'static str = "data:image/png;base64,";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn data_url(&self) -> String {
        format!("{}{}", Self::DATA_URL_PREFIX, self.payload())
    }

    pub fn decode(&self) -> VizResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.payload())
            .map_err(|e| VizError::Decode(e.to_string()))
    }

    fn payload(&self) -> &str {
        self.0
            .strip_prefix(Self::DATA_URL_PREFIX)
            .unwrap_or(&self.0)
            .trim()
    }
}

/// Rendering knobs chosen in the sidebar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatmapStyle {
    pub colormap: String,
    pub method: String,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        Self {
            colormap: "turbo".into(),
            method: "idw".into(),
        }
    }
}

/// Body of `POST /generate-heatmap`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeatmapRequest {
    pub data: Vec<Measurement>,
    pub bandwidth: f64,
    pub opacity: f64,
    pub timestamp_columns: Vec<String>,
    pub global_min: f64,
    pub global_max: f64,
    pub colormap: String,
    pub method: String,
    pub boundary_path: String,
}

/// Decoded `POST /generate-heatmap` response.
#[derive(Debug, Clone, Default)]
pub struct HeatmapResponse {
    /// Images in the server's enumeration order.
    pub images: Vec<(String, EncodedImage)>,
    pub global_min: Option<f64>,
    pub global_max: Option<f64>,
}

impl HeatmapResponse {
    pub fn decode(raw: &Value) -> VizResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| VizError::invalid("heatmap response is not a JSON object"))?;
        let images = match object.get("images") {
            Some(Value::Object(images)) => collect_images(images)?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(VizError::invalid("`images` is not a mapping")),
        };
        Ok(Self {
            images,
            global_min: object.get("global_min").and_then(scalar_to_f64),
            global_max: object.get("global_max").and_then(scalar_to_f64),
        })
    }
}

fn collect_images(images: &Map<String, Value>) -> VizResult<Vec<(String, EncodedImage)>> {
    images
        .iter()
        .map(|(timestamp, image)| match image {
            Value::String(encoded) => Ok((timestamp.clone(), EncodedImage(encoded.clone()))),
            _ => Err(VizError::invalid(format!(
                "image for {timestamp} is not a base64 string"
            ))),
        })
        .collect()
}
