use serde::Serialize;

use crate::detection::ScoredMeasurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    NoNewMeasurements,
    Detected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResponse {
    pub station: String,
    pub status: DetectionStatus,
    pub message: &'static str,
    pub detector: &'static str,
    pub reference_window: String,
    pub prediction_window: String,
    pub reference_rows: usize,
    pub rows: usize,
    pub outliers: usize,
    pub measurements: Vec<ScoredMeasurement>,
}
