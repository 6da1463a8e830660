//! Direction generation for directional sampling.

use nalgebra::DMatrix;
use ns_core::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

/// How a set of unit directions is drawn for one directional realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// A uniform direction `u` and its opposite `-u`.
    #[default]
    RandomDirection,
    /// A random orthonormal basis; every `order`-subset of its vectors combined with
    /// every sign pattern, normalised. Yields `C(d, order) * 2^order` directions.
    OrthogonalDirection {
        /// Number of basis vectors combined per direction.
        order: usize,
    },
}

impl SamplingStrategy {
    /// Validate against the input dimension.
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(Error::Validation("dimension must be > 0".into()));
        }
        if let SamplingStrategy::OrthogonalDirection { order } = *self {
            if order == 0 || order > dimension {
                return Err(Error::Validation(format!(
                    "orthogonal direction order must be in [1, {}], got {}",
                    dimension, order
                )));
            }
        }
        Ok(())
    }

    /// Draw one set of unit directions.
    pub fn generate<R: Rng + ?Sized>(&self, dimension: usize, rng: &mut R) -> Vec<Vec<f64>> {
        match *self {
            SamplingStrategy::RandomDirection => {
                let u = uniform_direction(dimension, rng);
                let minus: Vec<f64> = u.iter().map(|v| -v).collect();
                vec![u, minus]
            }
            SamplingStrategy::OrthogonalDirection { order } => {
                let basis = random_orthonormal_basis(dimension, rng);
                let scale = 1.0 / (order as f64).sqrt();
                let mut out = Vec::new();
                for subset in combinations(dimension, order) {
                    for signs in 0..(1usize << order) {
                        let mut v = vec![0.0; dimension];
                        for (j, &col) in subset.iter().enumerate() {
                            let s = if signs & (1 << j) != 0 { -scale } else { scale };
                            for (k, vk) in v.iter_mut().enumerate() {
                                *vk += s * basis[(k, col)];
                            }
                        }
                        out.push(v);
                    }
                }
                out
            }
        }
    }
}

/// Uniform point of the unit sphere of `R^dimension`.
pub(crate) fn uniform_direction<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> Vec<f64> {
    loop {
        let v: Vec<f64> = (0..dimension).map(|_| StandardNormal.sample(rng)).collect();
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            return v.into_iter().map(|x| x / norm).collect();
        }
    }
}

fn random_orthonormal_basis<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> DMatrix<f64> {
    let g: DMatrix<f64> = DMatrix::from_fn(dimension, dimension, |_, _| StandardNormal.sample(rng));
    g.qr().q()
}

/// All `k`-subsets of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return out;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::block_rng;
    use approx::assert_relative_eq;

    fn norm(v: &[f64]) -> f64 {
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    #[test]
    fn test_random_direction_pair() {
        let mut rng = block_rng(1, 0);
        let dirs = SamplingStrategy::RandomDirection.generate(3, &mut rng);
        assert_eq!(dirs.len(), 2);
        assert_relative_eq!(norm(&dirs[0]), 1.0, epsilon = 1e-12);
        for k in 0..3 {
            assert_eq!(dirs[0][k], -dirs[1][k]);
        }
    }

    #[test]
    fn test_orthogonal_direction_count_and_norms() {
        let mut rng = block_rng(2, 0);
        let s = SamplingStrategy::OrthogonalDirection { order: 2 };
        let dirs = s.generate(4, &mut rng);
        // C(4,2) * 2^2
        assert_eq!(dirs.len(), 24);
        for d in &dirs {
            assert_relative_eq!(norm(d), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(4, 2).len(), 6);
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert_eq!(combinations(3, 1), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_order_validation() {
        assert!(SamplingStrategy::OrthogonalDirection { order: 0 }.validate(3).is_err());
        assert!(SamplingStrategy::OrthogonalDirection { order: 4 }.validate(3).is_err());
        assert!(SamplingStrategy::OrthogonalDirection { order: 3 }.validate(3).is_ok());
    }
}
