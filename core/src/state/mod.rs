pub mod carousel;
pub mod controller;
pub mod view;

pub use carousel::{CarouselEntry, OverlayCarousel};
pub use controller::{ControllerSettings, SnapshotExport, VisualizationController};
pub use view::{Direction, ViewMode};
