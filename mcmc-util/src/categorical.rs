//! Categorical draws by inverse-CDF over unnormalized weights.
//!
//! States are identified by their position in the weight vector. A draw
//! `u ~ U[0, total)` selects the first state whose cumulative weight is
//! strictly greater than `u`, so zero-weight states are never chosen and
//! ties at a boundary go to the earlier state.

use rand::Rng;

/// Draw a state index from unnormalized, non-negative `weights`.
///
/// An all-zero (or non-finite) weight vector means the caller produced
/// an empty support; that is reported as an error rather than mapped to
/// some default state.
pub fn sample_categorical<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> anyhow::Result<usize> {
    let total: f64 = weights.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        return Err(anyhow::anyhow!(
            "empty sampling support: {} candidate states, total weight {}",
            weights.len(),
            total
        ));
    }

    let u: f64 = rng.random::<f64>() * total;
    let mut cum = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            cum += w;
            last_positive = i;
            if cum > u {
                return Ok(i);
            }
        }
    }

    // rounding can leave `u` just above the accumulated total
    Ok(last_positive)
}

/// Draw a state index from unnormalized log-weights.
///
/// Log-weights are shifted by their maximum before exponentiation;
/// `-inf` entries become exactly zero weight. `weights` is scratch
/// space and is resized to match.
pub fn sample_categorical_log<R: Rng + ?Sized>(
    log_weights: &[f64],
    weights: &mut Vec<f64>,
    rng: &mut R,
) -> anyhow::Result<usize> {
    log_to_weights(log_weights, weights);
    sample_categorical(weights, rng)
}

/// `weights[i] = exp(log_weights[i] - max)`, with `-inf` mapped to 0.
pub fn log_to_weights(log_weights: &[f64], weights: &mut Vec<f64>) {
    let max = log_weights
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);

    weights.clear();
    if max == f64::NEG_INFINITY || max.is_nan() {
        weights.resize(log_weights.len(), 0.0);
        return;
    }

    weights.extend(log_weights.iter().map(|&lw| {
        if lw == f64::NEG_INFINITY {
            0.0
        } else {
            (lw - max).exp()
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_weight_never_drawn() {
        let mut rng = SmallRng::seed_from_u64(42);
        let weights = vec![0.0, 1.0, 0.0, 3.0, 0.0];
        let mut counts = [0usize; 5];
        for _ in 0..2000 {
            counts[sample_categorical(&weights, &mut rng).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        assert_eq!(counts[4], 0);
        assert!(counts[3] > counts[1]);
    }

    #[test]
    fn test_frequencies_follow_weights() {
        let mut rng = SmallRng::seed_from_u64(7);
        let weights = vec![1.0, 2.0, 7.0];
        let n = 20_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            counts[sample_categorical(&weights, &mut rng).unwrap()] += 1;
        }
        let freq = counts[2] as f64 / n as f64;
        approx::assert_abs_diff_eq!(freq, 0.7, epsilon = 0.02);
    }

    #[test]
    fn test_empty_support_is_error() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(sample_categorical(&[0.0, 0.0], &mut rng).is_err());
        assert!(sample_categorical(&[], &mut rng).is_err());

        let mut scratch = vec![];
        let log_w = vec![f64::NEG_INFINITY, f64::NEG_INFINITY];
        assert!(sample_categorical_log(&log_w, &mut scratch, &mut rng).is_err());
    }

    #[test]
    fn test_log_weights_peaked() {
        let mut rng = SmallRng::seed_from_u64(42);
        let log_w = vec![-800.0, -100.0, f64::NEG_INFINITY];
        let mut scratch = vec![];
        for _ in 0..100 {
            let i = sample_categorical_log(&log_w, &mut scratch, &mut rng).unwrap();
            assert_eq!(i, 1);
        }
        assert_eq!(scratch[2], 0.0);
        approx::assert_abs_diff_eq!(scratch[1], 1.0);
    }

    #[test]
    fn test_single_state() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(sample_categorical(&[0.25], &mut rng).unwrap(), 0);
    }
}
