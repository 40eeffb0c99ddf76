//! Metropolis-Hastings acceptance and the Gaussian prior.

/// The largest exponent whose `exp` is finite in double precision.
pub const MAX_EXPONENT: f64 = 709.0;

/// Returns `min(1, exp(log_ratio))`, clamping the exponent so an overflowing ratio is accepted
/// with certainty. A ratio that is not a number is always rejected.
pub fn acceptance_probability(log_ratio: f64) -> f64 {
    if log_ratio.is_nan() {
        return 0.0;
    }

    log_ratio.min(MAX_EXPONENT).exp().min(1.0)
}

/// The log density of a zero mean isotropic Gaussian prior with the given variance, up to the
/// `2π` constant.
pub fn log_prior(params: &[f32], variance: f64) -> f64 {
    let d = params.len() as f64;
    let squares: f64 = params.iter().map(|&w| f64::from(w).powi(2)).sum();

    -0.5 * d * variance.ln() - squares / (2.0 * variance)
}
