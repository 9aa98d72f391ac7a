//! Novelty detection on water level samples.
//!
//! A [`NoveltyDetector`] is fitted on the reference window and yields a
//! [`NoveltyModel`], which scores and labels the prediction window. [`detect`]
//! ties this to [`Sample`]s and returns a fresh [`ScoredSample`]; the input
//! samples are never modified.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::data::{Sample, Window};

mod error;
pub mod lof;
pub mod zscore;

pub use error::{DetectionError, Result};
pub use lof::LocalOutlierFactor;
pub use zscore::ZScoreDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Novelty {
    Normal,
    Outlier,
}

impl Novelty {
    /// One-class classifier convention: `1` for inliers, `-1` for outliers.
    pub fn code(self) -> i8 {
        match self {
            Novelty::Normal => 1,
            Novelty::Outlier => -1,
        }
    }

    pub fn is_outlier(self) -> bool {
        self == Novelty::Outlier
    }
}

impl fmt::Display for Novelty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Novelty::Normal => write!(f, "normal"),
            Novelty::Outlier => write!(f, "outlier"),
        }
    }
}

/// A model fitted on a reference window.
pub trait NoveltyModel: Send + Sync {
    /// Raw outlier scores, higher means more anomalous.
    fn score(&self, sample: &[f64]) -> Result<Vec<f64>>;

    /// Turns a score into a label.
    fn label(&self, score: f64) -> Novelty;

    fn predict(&self, sample: &[f64]) -> Result<Vec<Novelty>> {
        Ok(self
            .score(sample)?
            .into_iter()
            .map(|score| self.label(score))
            .collect())
    }
}

/// Detection policy. Swappable without touching data retrieval or rendering.
pub trait NoveltyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&self, reference: &[f64]) -> Result<Box<dyn NoveltyModel>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMeasurement {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub novelty: Novelty,
    pub score: f64,
}

/// The prediction window with one novelty label per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredSample {
    pub rows: Vec<ScoredMeasurement>,
}

impl ScoredSample {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<Novelty> {
        self.rows.iter().map(|row| row.novelty).collect()
    }

    pub fn outlier_count(&self) -> usize {
        self.rows.iter().filter(|row| row.novelty.is_outlier()).count()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.rows.first().map(|row| row.timestamp)
    }
}

/// Fits `detector` on the reference sample and labels every prediction row.
///
/// Both samples must carry a finite value on every row.
pub fn detect(
    detector: &dyn NoveltyDetector,
    reference: &Sample,
    prediction: &Sample,
) -> Result<ScoredSample> {
    let reference_values = require_values(reference, Window::Reference)?;
    let prediction_values = require_values(prediction, Window::Prediction)?;

    let model = detector.fit(&reference_values)?;
    let scores = model.score(&prediction_values)?;

    let rows = prediction
        .iter()
        .zip(prediction_values)
        .zip(scores)
        .map(|((measurement, value), score)| ScoredMeasurement {
            timestamp: measurement.timestamp,
            value,
            novelty: model.label(score),
            score,
        })
        .collect();

    Ok(ScoredSample { rows })
}

fn require_values(sample: &Sample, window: Window) -> Result<Vec<f64>> {
    sample
        .iter()
        .enumerate()
        .map(|(row, measurement)| match measurement.value {
            None => Err(DetectionError::MissingValue { window, row }),
            Some(value) if !value.is_finite() => Err(DetectionError::NotFinite { window, row }),
            Some(value) => Ok(value),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    #[default]
    Lof,
    Zscore,
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lof" => Ok(DetectionMethod::Lof),
            "zscore" | "z-score" => Ok(DetectionMethod::Zscore),
            other => Err(format!("unknown detection method '{other}', expected 'lof' or 'zscore'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub method: DetectionMethod,
    pub n_neighbors: usize,
    pub resolution: f64,
    pub zscore_threshold: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Lof,
            n_neighbors: lof::DEFAULT_N_NEIGHBORS,
            resolution: lof::DEFAULT_RESOLUTION,
            zscore_threshold: zscore::DEFAULT_THRESHOLD,
        }
    }
}

impl DetectionSettings {
    pub fn build_detector(&self) -> Result<Arc<dyn NoveltyDetector>> {
        let detector: Arc<dyn NoveltyDetector> = match self.method {
            DetectionMethod::Lof => Arc::new(LocalOutlierFactor::new(self.n_neighbors, self.resolution)?),
            DetectionMethod::Zscore => {
                Arc::new(ZScoreDetector::new(self.zscore_threshold, self.resolution)?)
            }
        };
        Ok(detector)
    }
}
