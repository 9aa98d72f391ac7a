//! Local Outlier Factor in novelty mode.
//!
//! The model is fitted on the reference values only. A new value is compared
//! with its `k` nearest reference values: if its local reachability density is
//! much lower than theirs, it is an outlier.

use super::error::{DetectionError, Result};
use super::{Novelty, NoveltyDetector, NoveltyModel};

pub const DEFAULT_N_NEIGHBORS: usize = 2;
pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// Factors above this are outliers. Matches the offset used by the classic
/// novelty LOF when contamination is left on automatic.
pub const OUTLIER_THRESHOLD: f64 = 1.5;

const LRD_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct LocalOutlierFactor {
    n_neighbors: usize,
    resolution: f64,
}

impl LocalOutlierFactor {
    /// `resolution` floors every reachability distance. Readings closer than
    /// the gauge resolution are indistinguishable, so a perfectly flat
    /// reference window does not collapse the density scale to zero.
    pub fn new(n_neighbors: usize, resolution: f64) -> Result<Self> {
        if n_neighbors == 0 {
            return Err(DetectionError::InvalidParameter {
                name: "n_neighbors".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(DetectionError::InvalidParameter {
                name: "resolution".to_string(),
                reason: format!("must be a finite, non-negative number, got {resolution}"),
            });
        }
        Ok(Self {
            n_neighbors,
            resolution,
        })
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }
}

impl Default for LocalOutlierFactor {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl NoveltyDetector for LocalOutlierFactor {
    fn name(&self) -> &'static str {
        "lof"
    }

    fn fit(&self, reference: &[f64]) -> Result<Box<dyn NoveltyModel>> {
        Ok(Box::new(LofModel::fit(reference, self.n_neighbors, self.resolution)?))
    }
}

/// A fitted LOF model.
#[derive(Debug, Clone)]
pub struct LofModel {
    points: Vec<f64>,
    k: usize,
    resolution: f64,
    k_distances: Vec<f64>,
    lrd: Vec<f64>,
}

impl LofModel {
    pub fn fit(reference: &[f64], n_neighbors: usize, resolution: f64) -> Result<Self> {
        let n = reference.len();
        if n < 2 {
            return Err(DetectionError::InsufficientData { required: 2, got: n });
        }
        let k = n_neighbors.min(n - 1);

        // A point is not its own neighbour, but duplicates of it are.
        let neighborhoods: Vec<Vec<(usize, f64)>> = reference
            .iter()
            .enumerate()
            .map(|(i, &p)| nearest(reference, p, k, Some(i)))
            .collect();

        let k_distances: Vec<f64> = neighborhoods
            .iter()
            .map(|neighbors| neighbors.last().map_or(0.0, |&(_, d)| d))
            .collect();

        let lrd = neighborhoods
            .iter()
            .map(|neighbors| local_reachability_density(neighbors, &k_distances, resolution))
            .collect();

        Ok(Self {
            points: reference.to_vec(),
            k,
            resolution,
            k_distances,
            lrd,
        })
    }

    /// Effective neighbour count after clamping to the reference size.
    pub fn k(&self) -> usize {
        self.k
    }

    fn factor(&self, x: f64) -> f64 {
        let neighbors = nearest(&self.points, x, self.k, None);
        let lrd_x = local_reachability_density(&neighbors, &self.k_distances, self.resolution);
        let neighbor_lrd: f64 =
            neighbors.iter().map(|&(j, _)| self.lrd[j]).sum::<f64>() / neighbors.len() as f64;
        neighbor_lrd / lrd_x
    }
}

impl NoveltyModel for LofModel {
    fn score(&self, sample: &[f64]) -> Result<Vec<f64>> {
        Ok(sample.iter().map(|&x| self.factor(x)).collect())
    }

    fn label(&self, score: f64) -> Novelty {
        if score > OUTLIER_THRESHOLD {
            Novelty::Outlier
        } else {
            Novelty::Normal
        }
    }
}

/// The `k` points closest to `x`, ties broken by index.
fn nearest(points: &[f64], x: f64, k: usize, exclude: Option<usize>) -> Vec<(usize, f64)> {
    let mut candidates: Vec<(usize, f64)> = points
        .iter()
        .enumerate()
        .filter(|&(i, _)| Some(i) != exclude)
        .map(|(i, &p)| (i, (p - x).abs()))
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    candidates.truncate(k);
    candidates
}

fn local_reachability_density(neighbors: &[(usize, f64)], k_distances: &[f64], resolution: f64) -> f64 {
    let mean_reach = neighbors
        .iter()
        .map(|&(j, d)| d.max(k_distances[j]).max(resolution))
        .sum::<f64>()
        / neighbors.len() as f64;
    1.0 / (mean_reach + LRD_EPSILON)
}
