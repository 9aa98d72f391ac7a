use chrono::TimeDelta;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::data::{MeasurementSource, Sample, Station, StationData, StationId, UpstreamError};
use crate::detection::{self, DetectionError, NoveltyDetector, ScoredSample};
use crate::server::cache::{CacheKey, TtlCache};

pub const NO_NEW_MEASUREMENTS: &str =
    "There are no new measurements for the requested station. Please try again later!";
pub const FETCH_SUCCESSFUL: &str = "Fetching new measurements successful!";

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Result of one dashboard interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardOutcome {
    NoNewMeasurements,
    Detected {
        reference: Sample,
        scored: ScoredSample,
    },
}

impl DashboardOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            DashboardOutcome::NoNewMeasurements => NO_NEW_MEASUREMENTS,
            DashboardOutcome::Detected { .. } => FETCH_SUCCESSFUL,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSizes {
    pub reference: TimeDelta,
    pub prediction: TimeDelta,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub station_data: Duration,
    pub detection: Duration,
}

/// Wires station selection to data retrieval and detection, memoising both.
pub struct DashboardService {
    source: Arc<dyn MeasurementSource>,
    detector: Arc<dyn NoveltyDetector>,
    windows: WindowSizes,
    stations_cache: TtlCache<Vec<Station>>,
    station_data_cache: TtlCache<Option<StationData>>,
    detection_cache: TtlCache<ScoredSample>,
}

impl DashboardService {
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        detector: Arc<dyn NoveltyDetector>,
        windows: WindowSizes,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            source,
            detector,
            windows,
            stations_cache: TtlCache::new(ttls.station_data),
            station_data_cache: TtlCache::new(ttls.station_data),
            detection_cache: TtlCache::new(ttls.detection),
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub async fn stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.stations_cache
            .get_or_try_insert_with(CacheKey::new("get_stations", ""), || async {
                info!("Getting station list ...");
                self.source.list_stations().await
            })
            .await
    }

    pub async fn station_data(&self, station: &StationId) -> Result<Option<StationData>, UpstreamError> {
        let key = CacheKey::new("get_station_data", station.to_string());
        self.station_data_cache
            .get_or_try_insert_with(key, || async {
                info!(station = %station, "Getting latest station data ...");
                self.source
                    .fetch(station, self.windows.reference, self.windows.prediction)
                    .await
            })
            .await
    }

    pub async fn detection(&self, data: &StationData) -> Result<ScoredSample, DetectionError> {
        let key = CacheKey::new(
            "detection",
            format!("{}:{}", self.detector.name(), fingerprint(data)),
        );
        self.detection_cache
            .get_or_try_insert_with(key, || async {
                info!(
                    reference_rows = data.reference.len(),
                    prediction_rows = data.prediction.len(),
                    "Running detection ..."
                );
                detection::detect(self.detector.as_ref(), &data.reference, &data.prediction)
            })
            .await
    }

    /// Drops expired entries from every cache, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.stations_cache.purge_expired()
            + self.station_data_cache.purge_expired()
            + self.detection_cache.purge_expired()
    }

    /// Fetches the station's windows and scores the prediction window.
    /// Detection is skipped entirely when there is nothing new to score.
    pub async fn run(&self, station: &StationId) -> Result<DashboardOutcome, DashboardError> {
        match self.station_data(station).await? {
            None => {
                info!(station = %station, "No new measurements for station.");
                Ok(DashboardOutcome::NoNewMeasurements)
            }
            Some(data) => {
                let scored = self.detection(&data).await?;
                info!(
                    station = %station,
                    rows = scored.len(),
                    outliers = scored.outlier_count(),
                    "Detection finished."
                );
                Ok(DashboardOutcome::Detected {
                    reference: data.reference,
                    scored,
                })
            }
        }
    }
}

/// Stable digest of both windows, used as the detection cache argument.
fn fingerprint(data: &StationData) -> String {
    let mut hasher = DefaultHasher::new();
    for sample in [&data.reference, &data.prediction] {
        sample.len().hash(&mut hasher);
        for measurement in sample.iter() {
            measurement.timestamp.timestamp_millis().hash(&mut hasher);
            measurement.value.map(f64::to_bits).hash(&mut hasher);
        }
    }
    format!(
        "{}+{}:{:016x}",
        data.reference.len(),
        data.prediction.len(),
        hasher.finish()
    )
}
