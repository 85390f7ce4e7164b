//! Full-covariance Gaussian mixture colour models
//!
//! Initialisation is deterministic: farthest-point seeding followed by a
//! fixed number of Lloyd iterations, so identical samples always produce
//! identical models.

#![allow(clippy::indexing_slicing)]

pub(crate) type Color = [f64; 3];

const COVARIANCE_REGULARIZATION: f64 = 0.01;
const KMEANS_ROUNDS: usize = 10;
const KMEANS_MAX_SAMPLES: usize = 20_000;

#[derive(Debug, Clone)]
struct Component {
    mean: Color,
    inverse: [[f64; 3]; 3],
    /// ln(weight) - 0.5 * ln(det)
    log_scale: f64,
}

impl Component {
    fn log_density(&self, x: &Color) -> f64 {
        let d = [x[0] - self.mean[0], x[1] - self.mean[1], x[2] - self.mean[2]];
        let mut m = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            m += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        self.log_scale - 0.5 * m
    }
}

/// Mixture of up to `k` Gaussians over RGB colours
#[derive(Debug, Clone)]
pub(crate) struct Gmm {
    /// Indexed by component; `None` for components without samples
    components: Vec<Option<Component>>,
}

impl Gmm {
    /// Fit a model from samples and their component assignments
    ///
    /// Returns `None` when there are no samples.
    pub(crate) fn fit(samples: &[Color], assignment: &[usize], k: usize) -> Option<Self> {
        if samples.is_empty() || k == 0 {
            return None;
        }

        let mut counts = vec![0usize; k];
        let mut sums = vec![[0.0f64; 3]; k];
        let mut prods = vec![[[0.0f64; 3]; 3]; k];

        for (x, &c) in samples.iter().zip(assignment) {
            let c = c.min(k - 1);
            counts[c] += 1;
            for i in 0..3 {
                sums[c][i] += x[i];
                for j in 0..3 {
                    prods[c][i][j] += x[i] * x[j];
                }
            }
        }

        let total = samples.len() as f64;
        let components = (0..k)
            .map(|c| {
                if counts[c] == 0 {
                    return None;
                }
                let n = counts[c] as f64;
                let mean = [sums[c][0] / n, sums[c][1] / n, sums[c][2] / n];
                let mut cov = [[0.0; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        cov[i][j] = prods[c][i][j] / n - mean[i] * mean[j];
                    }
                    cov[i][i] += COVARIANCE_REGULARIZATION;
                }
                let (inverse, det) = invert(&cov)?;
                Some(Component {
                    mean,
                    inverse,
                    log_scale: (n / total).ln() - 0.5 * det.ln(),
                })
            })
            .collect();

        Some(Self { components })
    }

    /// Deterministic k-means clustering used to seed the first fit
    pub(crate) fn kmeans_assignment(samples: &[Color], k: usize) -> Vec<usize> {
        if samples.is_empty() || k <= 1 {
            return vec![0; samples.len()];
        }

        let stride = samples.len().div_ceil(KMEANS_MAX_SAMPLES).max(1);
        let subset: Vec<Color> = samples.iter().step_by(stride).copied().collect();

        let mut centers = farthest_point_seeds(&subset, k);
        let mut labels = vec![0usize; subset.len()];
        for _ in 0..KMEANS_ROUNDS {
            for (label, x) in labels.iter_mut().zip(&subset) {
                *label = nearest(&centers, x);
            }
            let mut sums = vec![[0.0f64; 3]; centers.len()];
            let mut counts = vec![0usize; centers.len()];
            for (label, x) in labels.iter().zip(&subset) {
                counts[*label] += 1;
                for i in 0..3 {
                    sums[*label][i] += x[i];
                }
            }
            for (c, center) in centers.iter_mut().enumerate() {
                if counts[c] > 0 {
                    let n = counts[c] as f64;
                    *center = [sums[c][0] / n, sums[c][1] / n, sums[c][2] / n];
                }
            }
        }

        samples.iter().map(|x| nearest(&centers, x)).collect()
    }

    /// Most likely component for each sample
    pub(crate) fn assign(&self, samples: &[Color]) -> Vec<usize> {
        samples.iter().map(|x| self.most_likely(x)).collect()
    }

    fn most_likely(&self, x: &Color) -> usize {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, comp) in self.components.iter().enumerate() {
            if let Some(comp) = comp {
                let score = comp.log_density(x);
                if score > best_score {
                    best_score = score;
                    best = i;
                }
            }
        }
        best
    }

    /// Negative log of the (unnormalised) mixture density
    pub(crate) fn neg_log_likelihood(&self, x: &Color) -> f64 {
        let mut max = f64::NEG_INFINITY;
        let mut terms = [f64::NEG_INFINITY; 16];
        let mut n = 0;
        for comp in self.components.iter().flatten() {
            if n == terms.len() {
                break;
            }
            let t = comp.log_density(x);
            terms[n] = t;
            n += 1;
            max = max.max(t);
        }
        if !max.is_finite() {
            return 1e6;
        }
        let sum: f64 = terms[..n].iter().map(|t| (t - max).exp()).sum();
        -(max + sum.ln())
    }

    #[cfg(test)]
    pub(crate) fn active_components(&self) -> usize {
        self.components.iter().flatten().count()
    }
}

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(centers: &[Color], x: &Color) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = distance_sq(c, x);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Up to `k` distinct seeds, starting from the sample closest to the mean
fn farthest_point_seeds(samples: &[Color], k: usize) -> Vec<Color> {
    let n = samples.len() as f64;
    let mut mean = [0.0; 3];
    for x in samples {
        for i in 0..3 {
            mean[i] += x[i] / n;
        }
    }
    let first = samples[nearest(samples, &mean)];

    let mut centers = vec![first];
    let mut min_d: Vec<f64> = samples.iter().map(|x| distance_sq(x, &first)).collect();
    while centers.len() < k {
        let (idx, &d) = min_d
            .iter()
            .enumerate()
            .fold((0, &f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if d <= 0.0 {
            break;
        }
        let next = samples[idx];
        centers.push(next);
        for (m, x) in min_d.iter_mut().zip(samples) {
            *m = m.min(distance_sq(x, &next));
        }
    }
    centers
}

/// Inverse and determinant of a symmetric 3x3 matrix
fn invert(m: &[[f64; 3]; 3]) -> Option<([[f64; 3]; 3], f64)> {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if !det.is_finite() || det <= f64::MIN_POSITIVE {
        return None;
    }
    let inv_det = 1.0 / det;
    let inverse = [
        [
            c00 * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            c01 * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            c02 * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ];
    Some((inverse, det))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_diagonal() {
        let m = [[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 0.5]];
        let (inv, det) = invert(&m).unwrap();
        assert!((det - 4.0).abs() < 1e-12);
        assert!((inv[0][0] - 0.5).abs() < 1e-12);
        assert!((inv[1][1] - 0.25).abs() < 1e-12);
        assert!((inv[2][2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_invert_general_symmetric() {
        let m = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let (inv, _) = invert(&m).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| m[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-9, "({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn test_kmeans_separates_two_colours() {
        let mut samples = vec![[10.0, 10.0, 10.0]; 50];
        samples.extend(vec![[240.0, 20.0, 20.0]; 50]);
        let labels = Gmm::kmeans_assignment(&samples, 5);
        assert!(labels[..50].iter().all(|l| *l == labels[0]));
        assert!(labels[50..].iter().all(|l| *l == labels[50]));
        assert_ne!(labels[0], labels[50]);

        let gmm = Gmm::fit(&samples, &labels, 5).unwrap();
        assert_eq!(gmm.active_components(), 2);
    }

    #[test]
    fn test_likelihood_prefers_own_colour() {
        let dark = vec![[20.0, 20.0, 20.0]; 30];
        let bright = vec![[220.0, 220.0, 220.0]; 30];
        let dark_model = Gmm::fit(&dark, &vec![0; 30], 1).unwrap();
        let bright_model = Gmm::fit(&bright, &vec![0; 30], 1).unwrap();

        let x = [25.0, 22.0, 18.0];
        assert!(dark_model.neg_log_likelihood(&x) < bright_model.neg_log_likelihood(&x));
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let samples: Vec<Color> = (0..500)
            .map(|i| {
                let v = f64::from(i * 37 % 255);
                [v, 255.0 - v, f64::from(i % 7) * 30.0]
            })
            .collect();
        assert_eq!(
            Gmm::kmeans_assignment(&samples, 5),
            Gmm::kmeans_assignment(&samples, 5)
        );
    }

    #[test]
    fn test_fit_empty_is_none() {
        assert!(Gmm::fit(&[], &[], 5).is_none());
    }
}
