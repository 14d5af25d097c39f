//! Hand-rolled multi-feature linear regression via the normal equations.
//! No ML crate is pulled in for this: the feature count is small (at most
//! eight) and retraining is infrequent, so a direct Gauss-Jordan solve over
//! `X^T X` is cheap enough and keeps the dependency surface aligned with
//! the rest of the platform.

#[derive(Debug, Clone)]
pub struct LinearRegressor {
    weights: Vec<f64>,
    bias: f64,
    samples_seen: usize,
}

impl Default for LinearRegressor {
    fn default() -> Self {
        Self { weights: Vec::new(), bias: 0.0, samples_seen: 0 }
    }
}

impl LinearRegressor {
    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    pub fn is_trained(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Fits `y ~ bias + weights . features` over the given samples.
    /// No-ops (keeps prior weights) if the design matrix is singular.
    pub fn fit(&mut self, samples: &[(Vec<f64>, f64)]) {
        if samples.is_empty() {
            return;
        }
        let n_features = samples[0].0.len();
        let n_cols = n_features + 1; // + bias column

        // Build augmented [X^T X | X^T y] and solve by Gauss-Jordan elimination.
        let mut xtx = vec![vec![0.0; n_cols]; n_cols];
        let mut xty = vec![0.0; n_cols];
        for (features, target) in samples {
            let mut row = Vec::with_capacity(n_cols);
            row.push(1.0);
            row.extend_from_slice(features);
            for i in 0..n_cols {
                xty[i] += row[i] * target;
                for j in 0..n_cols {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        if let Some(solved) = gauss_jordan_solve(xtx, xty) {
            self.bias = solved[0];
            self.weights = solved[1..].to_vec();
        }
        self.samples_seen += samples.len();
    }

    pub fn predict(&self, features: &[f64]) -> Option<f64> {
        if self.weights.len() != features.len() {
            return None;
        }
        Some(self.bias + self.weights.iter().zip(features).map(|(w, f)| w * f).sum::<f64>())
    }

    /// Mean absolute error of the current model over `samples`.
    pub fn mae(&self, samples: &[(Vec<f64>, f64)]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut total = 0.0;
        let mut n = 0usize;
        for (features, actual) in samples {
            if let Some(pred) = self.predict(features) {
                total += (pred - actual).abs();
                n += 1;
            }
        }
        if n == 0 {
            None
        } else {
            Some(total / n as f64)
        }
    }

    /// Root-mean-square error over `samples`, used for forecast intervals.
    pub fn rmse(&self, samples: &[(Vec<f64>, f64)]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut total = 0.0;
        let mut n = 0usize;
        for (features, actual) in samples {
            if let Some(pred) = self.predict(features) {
                total += (pred - actual).powi(2);
                n += 1;
            }
        }
        if n == 0 {
            None
        } else {
            Some((total / n as f64).sqrt())
        }
    }
}

/// Solves `a * x = b` via Gauss-Jordan elimination with partial pivoting.
/// Returns `None` if `a` is (numerically) singular.
fn gauss_jordan_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| a[r1][col].abs().partial_cmp(&a[r2][col].abs()).unwrap())?;
        if a[pivot_row][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
        }
        b[col] /= pivot;

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_linear_relationship() {
        let mut model = LinearRegressor::default();
        let samples: Vec<(Vec<f64>, f64)> =
            (0..20).map(|i| (vec![i as f64, 2.0 * i as f64], 3.0 + 2.0 * i as f64 - (2.0 * i as f64))).collect();
        model.fit(&samples);
        assert!(model.is_trained());
        let pred = model.predict(&[5.0, 10.0]).unwrap();
        assert!((pred - 3.0).abs() < 1e-6, "pred={pred}");
    }

    #[test]
    fn mae_is_zero_for_perfect_fit() {
        let mut model = LinearRegressor::default();
        let samples: Vec<(Vec<f64>, f64)> = (0..10).map(|i| (vec![i as f64], 4.0 * i as f64 + 1.0)).collect();
        model.fit(&samples);
        assert!(model.mae(&samples).unwrap() < 1e-6);
    }
}
