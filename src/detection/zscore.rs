//! Z-score novelty detector, a cheaper alternative to LOF.

use super::error::{DetectionError, Result};
use super::{Novelty, NoveltyDetector, NoveltyModel};

pub const DEFAULT_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    threshold: f64,
    resolution: f64,
}

impl ZScoreDetector {
    pub fn new(threshold: f64, resolution: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(DetectionError::InvalidParameter {
                name: "zscore_threshold".to_string(),
                reason: format!("must be a positive number, got {threshold}"),
            });
        }
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(DetectionError::InvalidParameter {
                name: "resolution".to_string(),
                reason: format!("must be a finite, non-negative number, got {resolution}"),
            });
        }
        Ok(Self {
            threshold,
            resolution,
        })
    }
}

impl NoveltyDetector for ZScoreDetector {
    fn name(&self) -> &'static str {
        "zscore"
    }

    fn fit(&self, reference: &[f64]) -> Result<Box<dyn NoveltyModel>> {
        if reference.is_empty() {
            return Err(DetectionError::InsufficientData { required: 1, got: 0 });
        }
        let n = reference.len() as f64;
        let mean = reference.iter().sum::<f64>() / n;
        let std_dev = (reference.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

        Ok(Box::new(ZScoreModel {
            mean,
            // Spread below the gauge resolution is noise.
            scale: std_dev.max(self.resolution).max(f64::EPSILON),
            threshold: self.threshold,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ZScoreModel {
    mean: f64,
    scale: f64,
    threshold: f64,
}

impl NoveltyModel for ZScoreModel {
    fn score(&self, sample: &[f64]) -> Result<Vec<f64>> {
        Ok(sample.iter().map(|&x| (x - self.mean).abs() / self.scale).collect())
    }

    fn label(&self, score: f64) -> Novelty {
        if score > self.threshold {
            Novelty::Outlier
        } else {
            Novelty::Normal
        }
    }
}
