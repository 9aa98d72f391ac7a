pub mod models;
pub mod pegelonline;
pub mod source;
pub mod window;

pub use models::{Measurement, Sample, Station, StationData, StationId, Window};
pub use source::{MeasurementSource, UpstreamError};
