//! Window function applied to each FFT vector.
//!
//! Generalized Blackman window with `a = 0.16`, plus the power figure used to
//! normalise the log-power output of the chain.

use std::f64::consts::PI;

/// Blackman `alpha` parameter.
const BLACKMAN_ALPHA: f64 = 0.16;

/// Generalized Blackman window of length `n`.
///
/// `w[i] = a0 - a1·cos(2πi/(n-1)) + a2·cos(4πi/(n-1))`
/// with `a0 = (1-α)/2`, `a1 = 1/2`, `a2 = α/2`.
#[must_use]
pub fn blackman_window(n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let a0 = (1.0 - BLACKMAN_ALPHA) / 2.0;
            let a1 = 0.5;
            let a2 = BLACKMAN_ALPHA / 2.0;
            let denom = (n - 1) as f64;

            (0..n)
                .map(|i| {
                    let x = i as f64 / denom;
                    (a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()) as f32
                })
                .collect()
        }
    }
}

/// Sum of squared window coefficients.
#[must_use]
pub fn window_power(window: &[f32]) -> f64 {
    window.iter().map(|&w| f64::from(w) * f64::from(w)).sum()
}

/// Additive constant of the `10·log10(x) + k` stage.
///
/// Removes the FFT gain (`20·log10(n)`) and the window's average power so a
/// full-scale tone reads the same regardless of FFT width.
#[must_use]
pub fn log_offset(n: usize, window_power: f64) -> f32 {
    let n = n as f64;
    (-20.0 * n.log10() - 10.0 * (window_power / n).log10()) as f32
}
