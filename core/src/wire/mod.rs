pub mod animation;
pub mod endpoints;
pub mod heatmap;

pub use animation::{AnimationParams, AnimationRequest, BoundaryUploadResponse, ServerErrorBody};
pub use heatmap::{EncodedImage, HeatmapRequest, HeatmapResponse, HeatmapStyle};
