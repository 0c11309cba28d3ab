//! Small dense-matrix helpers for correlated shock generation.

/// Strict lower Cholesky factorization: returns `L` with `L L^T = matrix`,
/// or `None` when the matrix is not positive-definite (which happens
/// routinely with defaulted data, e.g. two identical correlation rows).
/// Callers are expected to fall back to a diagonal factor in that case.
pub fn cholesky_lower(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return None;
    }

    let mut l = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if !sum.is_finite() || sum <= 1e-12 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
                if !l[i][j].is_finite() {
                    return None;
                }
            }
        }
    }
    Some(l)
}

/// Applies a lower-triangular factor to a vector of independent draws.
pub fn correlate(l: &[Vec<f64>], z: &[f64]) -> Vec<f64> {
    let n = l.len();
    let mut out = vec![0.0; n];
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..=i {
            sum += l[i][j] * z[j];
        }
        out[i] = sum;
    }
    out
}

/// Builds a covariance matrix from per-asset volatilities and a correlation
/// matrix: `C[i][j] = sigma[i] * sigma[j] * rho[i][j]`.
pub fn covariance_from(sigma: &[f64], correlation: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = sigma.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let rho = correlation.get(i).and_then(|r| r.get(j)).copied().unwrap_or(0.0);
            cov[i][j] = sigma[i] * sigma[j] * rho;
        }
    }
    cov
}

/// Identity matrix, the defaulted correlation structure.
pub fn identity(n: usize) -> Vec<Vec<f64>> {
    let mut m = vec![vec![0.0; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}
