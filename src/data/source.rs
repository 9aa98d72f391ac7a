use async_trait::async_trait;
use chrono::TimeDelta;
use thiserror::Error;

use super::models::{Station, StationData, StationId};

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Upstream returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Failed to decode upstream response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Where station listings and measurements come from.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Lists the stations that can be selected.
    async fn list_stations(&self) -> Result<Vec<Station>, UpstreamError>;

    /// Fetches the reference and prediction windows for `station`.
    ///
    /// Returns `Ok(None)` when there are no new measurements.
    async fn fetch(
        &self,
        station: &StationId,
        reference: TimeDelta,
        prediction: TimeDelta,
    ) -> Result<Option<StationData>, UpstreamError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::data::models::{Measurement, Sample};
    use chrono::{FixedOffset, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source returning the same data for every station.
    pub struct StaticSource {
        pub stations: Vec<Station>,
        pub data: Option<StationData>,
        pub fetches: AtomicUsize,
    }

    impl StaticSource {
        pub fn new(data: Option<StationData>) -> Self {
            Self {
                stations: vec![Station {
                    uuid: "a6ee8177-107b-47dd-bcfd-30960ccc6e9c".to_string(),
                    shortname: "KÖLN".to_string(),
                    longname: "KÖLN".to_string(),
                    water: None,
                }],
                data,
                fetches: AtomicUsize::new(0),
            }
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MeasurementSource for StaticSource {
        async fn list_stations(&self) -> Result<Vec<Station>, UpstreamError> {
            Ok(self.stations.clone())
        }

        async fn fetch(
            &self,
            _station: &StationId,
            _reference: TimeDelta,
            _prediction: TimeDelta,
        ) -> Result<Option<StationData>, UpstreamError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.data.clone())
        }
    }

    /// Builds a sample with one reading every 15 minutes starting at 08:00 +02:00.
    pub fn sample(values: &[f64]) -> Sample {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = offset.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Measurement::new(start + TimeDelta::minutes(15 * i as i64), v))
            .collect()
    }

    pub fn station_data(reference: &[f64], prediction: &[f64]) -> StationData {
        StationData {
            reference: sample(reference),
            prediction: sample(prediction),
        }
    }

    pub fn station_id() -> StationId {
        "a6ee8177-107b-47dd-bcfd-30960ccc6e9c".parse().unwrap()
    }
}
