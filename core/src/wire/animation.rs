use serde::{Deserialize, Serialize};

/// User-chosen video settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationParams {
    pub parameter: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub fps: u32,
    pub frames_per_transition: u32,
    pub colormap: String,
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            parameter: "UploadedParameter".into(),
            start_date: None,
            end_date: None,
            fps: 15,
            frames_per_transition: 10,
            colormap: "turbo".into(),
        }
    }
}

/// Body of `POST /api/animate`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnimationRequest {
    pub parameter: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub fps: u32,
    pub frames_per_transition: u32,
    pub colormap: String,
    pub filename: String,
    pub boundary_path: String,
}

/// `POST /upload-boundary` reply.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BoundaryUploadResponse {
    pub path: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body the server attaches to non-2xx replies.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
