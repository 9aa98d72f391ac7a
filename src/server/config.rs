use chrono::TimeDelta;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::data::pegelonline::DEFAULT_BASE_URL;
use crate::data::window::parse_iso8601_duration;
use crate::detection::{DetectionMethod, DetectionSettings, lof, zscore};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub upstream_url: String,
    /// PEGELONLINE timeseries short name. `W` reports water level in
    /// centimetres, which is the unit the default detection `resolution` of
    /// `1.0` assumes. Series in metres or other fine-grained units need a
    /// matching `resolution` (e.g. `0.01`) or tight clusters lose sensitivity.
    pub timeseries: String,
    pub reference_window: TimeDelta,
    pub prediction_window: TimeDelta,
    pub request_timeout: Duration,
    pub station_data_ttl: Duration,
    pub detection_ttl: Duration,
    pub detection: DetectionSettings,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug, Clone)]
pub struct PartialServerConfig {
    pub listen_addr: Option<String>,
    pub upstream_url: Option<String>,
    pub timeseries: Option<String>,
    pub reference_window: Option<String>,
    pub prediction_window: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub station_data_ttl_seconds: Option<u64>,
    pub detection_ttl_seconds: Option<u64>,
    pub detection_method: Option<String>,
    pub n_neighbors: Option<usize>,
    pub resolution: Option<f64>,
    pub zscore_threshold: Option<f64>,
    pub log_dir: Option<String>,
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8501";
const DEFAULT_TIMESERIES: &str = "W";
const DEFAULT_REFERENCE_WINDOW: &str = "PT6H";
const DEFAULT_PREDICTION_WINDOW: &str = "PT1H";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_STATION_DATA_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_DETECTION_TTL_SECONDS: u64 = 20 * 60;

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    /// Loads the configuration: `.env`, then the optional TOML file, then
    /// environment variables, later layers winning.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => PartialServerConfig::from_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        Self::from_layers(env_config, file_config)
    }

    /// Merges two layers; `primary` overrides `fallback`, defaults fill the rest.
    pub fn from_layers(
        primary: PartialServerConfig,
        fallback: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let listen_addr = primary
            .listen_addr
            .or(fallback.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = listen_addr.parse().map_err(|e| ConfigError::Invalid {
            field: "listen_addr",
            reason: format!("{listen_addr:?}: {e}"),
        })?;

        let reference_window = parse_window(
            "reference_window",
            primary.reference_window.or(fallback.reference_window),
            DEFAULT_REFERENCE_WINDOW,
        )?;
        let prediction_window = parse_window(
            "prediction_window",
            primary.prediction_window.or(fallback.prediction_window),
            DEFAULT_PREDICTION_WINDOW,
        )?;

        let method = match primary.detection_method.or(fallback.detection_method) {
            Some(method) => method
                .parse::<DetectionMethod>()
                .map_err(|reason| ConfigError::Invalid {
                    field: "detection_method",
                    reason,
                })?,
            None => DetectionMethod::default(),
        };
        let detection = DetectionSettings {
            method,
            n_neighbors: primary
                .n_neighbors
                .or(fallback.n_neighbors)
                .unwrap_or(lof::DEFAULT_N_NEIGHBORS),
            resolution: primary
                .resolution
                .or(fallback.resolution)
                .unwrap_or(lof::DEFAULT_RESOLUTION),
            zscore_threshold: primary
                .zscore_threshold
                .or(fallback.zscore_threshold)
                .unwrap_or(zscore::DEFAULT_THRESHOLD),
        };
        // Surface bad detector parameters at startup rather than on first request.
        detection
            .build_detector()
            .map_err(|e| ConfigError::Invalid {
                field: "detection",
                reason: e.to_string(),
            })?;

        let upstream_url = primary
            .upstream_url
            .or(fallback.upstream_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "upstream_url",
                reason: format!("{upstream_url:?} is not an http(s) URL"),
            });
        }

        Ok(ServerConfig {
            listen_addr,
            upstream_url,
            timeseries: primary
                .timeseries
                .or(fallback.timeseries)
                .unwrap_or_else(|| DEFAULT_TIMESERIES.to_string()),
            reference_window,
            prediction_window,
            request_timeout: Duration::from_secs(
                primary
                    .request_timeout_seconds
                    .or(fallback.request_timeout_seconds)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
                    .max(1),
            ),
            station_data_ttl: Duration::from_secs(
                primary
                    .station_data_ttl_seconds
                    .or(fallback.station_data_ttl_seconds)
                    .unwrap_or(DEFAULT_STATION_DATA_TTL_SECONDS),
            ),
            detection_ttl: Duration::from_secs(
                primary
                    .detection_ttl_seconds
                    .or(fallback.detection_ttl_seconds)
                    .unwrap_or(DEFAULT_DETECTION_TTL_SECONDS),
            ),
            detection,
            log_dir: primary
                .log_dir
                .or(fallback.log_dir)
                .unwrap_or_else(default_log_dir),
        })
    }
}

impl PartialServerConfig {
    /// A missing file is treated as an empty layer.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_window(
    field: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<TimeDelta, ConfigError> {
    let text = value.unwrap_or_else(|| default.to_string());
    let window = parse_iso8601_duration(&text).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    if window <= TimeDelta::zero() {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{text:?} must be longer than zero"),
        });
    }
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config =
            ServerConfig::from_layers(PartialServerConfig::default(), PartialServerConfig::default())
                .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8501".parse().unwrap());
        assert_eq!(config.upstream_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeseries, "W");
        assert_eq!(config.reference_window, TimeDelta::hours(6));
        assert_eq!(config.prediction_window, TimeDelta::hours(1));
        assert_eq!(config.station_data_ttl, Duration::from_secs(1800));
        assert_eq!(config.detection_ttl, Duration::from_secs(1200));
        assert_eq!(config.detection, DetectionSettings::default());
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn test_primary_layer_overrides_fallback() {
        let primary = PartialServerConfig {
            reference_window: Some("PT12H".to_string()),
            n_neighbors: Some(5),
            ..Default::default()
        };
        let fallback = PartialServerConfig {
            reference_window: Some("PT3H".to_string()),
            prediction_window: Some("PT30M".to_string()),
            detection_method: Some("zscore".to_string()),
            ..Default::default()
        };

        let config = ServerConfig::from_layers(primary, fallback).unwrap();

        assert_eq!(config.reference_window, TimeDelta::hours(12));
        assert_eq!(config.prediction_window, TimeDelta::minutes(30));
        assert_eq!(config.detection.n_neighbors, 5);
        assert_eq!(config.detection.method, DetectionMethod::Zscore);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            PartialServerConfig {
                reference_window: Some("six hours".to_string()),
                ..Default::default()
            },
            PartialServerConfig {
                prediction_window: Some("PT0S".to_string()),
                ..Default::default()
            },
            PartialServerConfig {
                listen_addr: Some("nowhere".to_string()),
                ..Default::default()
            },
            PartialServerConfig {
                detection_method: Some("magic".to_string()),
                ..Default::default()
            },
            PartialServerConfig {
                n_neighbors: Some(0),
                ..Default::default()
            },
            PartialServerConfig {
                upstream_url: Some("ftp://example.org".to_string()),
                ..Default::default()
            },
        ];

        for case in cases {
            let result = ServerConfig::from_layers(case.clone(), PartialServerConfig::default());
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "expected {case:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
reference_window = "PT8H"
detection_ttl_seconds = 60
resolution = 0.5
"#
        )
        .unwrap();

        let layer = PartialServerConfig::from_file(file.path()).unwrap();
        assert_eq!(layer.reference_window.as_deref(), Some("PT8H"));
        assert_eq!(layer.detection_ttl_seconds, Some(60));
        assert_eq!(layer.resolution, Some(0.5));

        let config = ServerConfig::from_layers(PartialServerConfig::default(), layer).unwrap();
        assert_eq!(config.reference_window, TimeDelta::hours(8));
        assert_eq!(config.detection_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_is_empty_layer() {
        let layer = PartialServerConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap();
        assert!(layer.listen_addr.is_none());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reference_window = [").unwrap();

        assert!(matches!(
            PartialServerConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
