use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::models::{Measurement, Station, StationData, StationId};
use super::source::{MeasurementSource, UpstreamError};
use super::window::{format_iso8601_duration, split_windows};

pub const DEFAULT_BASE_URL: &str = "https://www.pegelonline.wsv.de/webservices/rest-api/v2";

/// Client for the PEGELONLINE gauge REST API.
pub struct PegelonlineClient {
    client: Client,
    base_url: String,
    timeseries: String,
}

impl PegelonlineClient {
    pub fn new(
        base_url: impl Into<String>,
        timeseries: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeseries: timeseries.into(),
        })
    }

    pub fn stations_url(&self) -> String {
        format!("{}/stations.json", self.base_url)
    }

    pub fn measurements_url(&self, station: &StationId, start: &str) -> String {
        format!(
            "{}/stations/{}/{}/measurements.json?start={}",
            self.base_url,
            station,
            urlencoding::encode(&self.timeseries),
            urlencoding::encode(start)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MeasurementSource for PegelonlineClient {
    async fn list_stations(&self) -> Result<Vec<Station>, UpstreamError> {
        let url = self.stations_url();
        let stations: Vec<Station> = self.get_json(&url).await?;
        debug!(count = stations.len(), "Fetched station list.");
        Ok(stations)
    }

    async fn fetch(
        &self,
        station: &StationId,
        reference: TimeDelta,
        prediction: TimeDelta,
    ) -> Result<Option<StationData>, UpstreamError> {
        let start = format_iso8601_duration(reference + prediction);
        let url = self.measurements_url(station, &start);
        let measurements: Vec<Measurement> = self.get_json(&url).await?;
        debug!(
            station = %station,
            rows = measurements.len(),
            start = %start,
            "Fetched raw measurements."
        );

        Ok(split_windows(measurements, Utc::now(), reference, prediction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PegelonlineClient {
        PegelonlineClient::new(
            "https://example.invalid/rest-api/v2/",
            "W",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        let station: StationId = "a6ee8177-107b-47dd-bcfd-30960ccc6e9c".parse().unwrap();

        assert_eq!(
            client.stations_url(),
            "https://example.invalid/rest-api/v2/stations.json"
        );
        assert_eq!(
            client.measurements_url(&station, "PT7H"),
            "https://example.invalid/rest-api/v2/stations/a6ee8177-107b-47dd-bcfd-30960ccc6e9c/W/measurements.json?start=PT7H"
        );
    }

    #[test]
    fn test_station_listing_payload() {
        let json = r#"[{
            "uuid": "a6ee8177-107b-47dd-bcfd-30960ccc6e9c",
            "number": "2730010",
            "shortname": "KÖLN",
            "longname": "KÖLN",
            "km": 688.0,
            "agency": "WSA RHEIN",
            "longitude": 6.963,
            "latitude": 50.937,
            "water": {"shortname": "RHEIN", "longname": "RHEIN"}
        }]"#;
        let stations: Vec<Station> = serde_json::from_str(json).unwrap();

        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].uuid, "a6ee8177-107b-47dd-bcfd-30960ccc6e9c");
        assert_eq!(stations[0].label(), "KÖLN (RHEIN)");
    }
}
