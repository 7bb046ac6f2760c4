//! Periodic triangle-wave model and nonlinear least-squares fit.
//!
//! The calibration oscillator of the instrument modulates raw power with a
//! triangular wave of fixed period. The wave is parameterised by amplitude
//! `A`, sample offset `k`, and mean offset `C`; the period `M` is a domain
//! constant and is not a free parameter of the fit.

use crate::types::TriwaveFit;
use thiserror::Error;
use tracing::debug;

/// Maximum outer Levenberg-Marquardt iterations.
const MAX_ITERATIONS: usize = 200;

/// Relative decrease of the squared error below which the fit is converged.
const SSE_TOLERANCE: f64 = 1e-12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FitError {
    #[error("cannot fit a triangle wave to an empty level sequence")]
    EmptyInput,
    #[error("level sequence contains no finite values")]
    NoFiniteValues,
}

/// Triangle wave centred at `c`, evaluated at sample index `n`.
///
/// `a` is the half peak-to-peak amplitude, `m` the period in samples and `k`
/// the sample offset of the period origin.
pub fn general_triangle(n: f64, a: f64, m: f64, k: f64, c: f64) -> f64 {
    let frac = ((n + k).rem_euclid(m)) / m;
    a * (2.0 * (2.0 * (frac - (frac + 0.5).floor())).abs() - 1.0) + c
}

/// Fit `general_triangle` with fixed period `m` to `levels` (one value per
/// ping index 0..N).
///
/// Free parameters are amplitude, sample offset, and mean offset. Initial
/// guesses follow the original calibration procedure: the offset guess places
/// the wave peak on the largest observed level, the amplitude guess is 1 dB,
/// and the mean guess is the sequence mean. The result is normalised so the
/// amplitude is non-negative and the offset lies in `[0, m)`.
pub fn fit_triangle(levels: &[f64], m: f64) -> Result<TriwaveFit, FitError> {
    if levels.is_empty() {
        return Err(FitError::EmptyInput);
    }

    let mut argmax = None;
    let mut max = f64::NEG_INFINITY;
    for (i, &v) in levels.iter().enumerate() {
        if v.is_finite() && v > max {
            max = v;
            argmax = Some(i);
        }
    }
    let argmax = argmax.ok_or(FitError::NoFiniteValues)?;

    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    let guess = [1.0, m / 2.0 - argmax as f64, mean];

    let params = levenberg_marquardt(levels, m, guess);

    let ss_total: f64 = levels.iter().map(|&v| (v - mean).powi(2)).sum();
    let ss_err = sum_squared_error(levels, m, &params);
    let r_squared = if ss_total > 0.0 {
        1.0 - ss_err / ss_total
    } else if ss_err < 1e-12 {
        1.0
    } else {
        0.0
    };

    let (amplitude, period_offset) = normalize_fit(params[0], params[1], m);
    Ok(TriwaveFit {
        amplitude,
        period_offset,
        amplitude_offset: params[2],
        r_squared,
    })
}

/// Negative amplitude is equivalent to a half-period offset; fold it out and
/// wrap the offset into one period.
pub(crate) fn normalize_fit(amplitude: f64, period_offset: f64, m: f64) -> (f64, f64) {
    let (amplitude, period_offset) = if amplitude < 0.0 {
        (-amplitude, period_offset + m / 2.0)
    } else {
        (amplitude, period_offset)
    };
    (amplitude, period_offset.rem_euclid(m))
}

fn sum_squared_error(levels: &[f64], m: f64, p: &[f64; 3]) -> f64 {
    levels
        .iter()
        .enumerate()
        .map(|(n, &y)| {
            let r = y - general_triangle(n as f64, p[0], m, p[1], p[2]);
            r * r
        })
        .sum()
}

/// Damped Gauss-Newton (Levenberg-Marquardt) minimisation of the triangle
/// residuals with a forward-difference Jacobian, matching the behavior of
/// the reference least-squares solver on this model.
fn levenberg_marquardt(levels: &[f64], m: f64, guess: [f64; 3]) -> [f64; 3] {
    let mut p = guess;
    let mut sse = sum_squared_error(levels, m, &p);
    let mut lambda = 1e-3;

    for iteration in 0..MAX_ITERATIONS {
        // Model Jacobian by forward differences, and J^T r / J^T J built on
        // the fly to avoid materialising the full (N x 3) matrix.
        let mut jtj = [[0.0f64; 3]; 3];
        let mut jtr = [0.0f64; 3];
        let steps = [
            (p[0].abs().max(1.0)) * 1e-7,
            (p[1].abs().max(1.0)) * 1e-7,
            (p[2].abs().max(1.0)) * 1e-7,
        ];
        for (n, &y) in levels.iter().enumerate() {
            let n = n as f64;
            let f0 = general_triangle(n, p[0], m, p[1], p[2]);
            let jac = [
                (general_triangle(n, p[0] + steps[0], m, p[1], p[2]) - f0) / steps[0],
                (general_triangle(n, p[0], m, p[1] + steps[1], p[2]) - f0) / steps[1],
                (general_triangle(n, p[0], m, p[1], p[2] + steps[2]) - f0) / steps[2],
            ];
            let r = y - f0;
            for i in 0..3 {
                jtr[i] += jac[i] * r;
                for j in 0..3 {
                    jtj[i][j] += jac[i] * jac[j];
                }
            }
        }

        // Inner damping loop: grow lambda until a step reduces the error.
        let mut accepted = false;
        for _ in 0..16 {
            let mut a = jtj;
            for (i, row) in a.iter_mut().enumerate() {
                row[i] += lambda * jtj[i][i].max(1e-12);
            }
            let Some(delta) = solve_3x3(a, jtr) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = [p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]];
            let candidate_sse = sum_squared_error(levels, m, &candidate);
            if candidate_sse < sse {
                let improvement = sse - candidate_sse;
                p = candidate;
                sse = candidate_sse;
                lambda = (lambda / 10.0).max(1e-12);
                accepted = true;
                if improvement <= SSE_TOLERANCE * sse.max(1e-30) {
                    debug!(iteration, sse, "triangle fit converged");
                    return p;
                }
                break;
            }
            lambda *= 10.0;
        }
        if !accepted {
            debug!(iteration, sse, "triangle fit stalled, accepting best point");
            return p;
        }
    }
    p
}

/// Gaussian elimination with partial pivoting for the 3x3 normal equations.
fn solve_3x3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let mut pivot = col;
        for row in col + 1..3 {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-30 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0f64; 3];
    for col in (0..3).rev() {
        let mut sum = b[col];
        for k in col + 1..3 {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}
