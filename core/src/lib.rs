//! State-synchronization core for the limnoview monitoring front end.
//!
//! The controller mirrors server responses (uploads, rendered heatmaps) into a
//! dataset, a timestamp index and an overlay carousel, and drives a map
//! surface through explicit method calls. The tabular adapter pivots between
//! spreadsheet rows and flat measurements.

pub mod math;
pub mod model;
pub mod prelude;
pub mod scene;
pub mod state;
pub mod surface;
pub mod tabular;
pub mod telemetry;
pub mod wire;

pub use prelude::{StatusLevel, StatusMessage, VizError, VizResult};
pub use state::{ControllerSettings, Direction, VisualizationController, ViewMode};
