pub mod dataset;
pub mod geo;
pub mod index;
pub mod measurement;

pub use dataset::{Dataset, DecodedUpload, ValueBounds};
pub use geo::{BoundaryShape, GeoBounds, GeoPoint};
pub use index::TimestampIndex;
pub use measurement::{Measurement, MeasurementKey};
