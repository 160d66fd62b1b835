//! # Probability Utilities

/// Check that `prob` is a valid probability in ``[0.0, 1.0]``.
pub fn is_probability(prob: f64) -> bool {
    (0.0..=1.0).contains(&prob)
}

/// Expect that `prob` is a valid probability.
///
/// # Returns
///
/// `prob`, unchanged.
///
/// # Panics
///
/// If `prob` is not in ``[0.0, 1.0]``.
#[inline]
pub fn expect_probability(prob: f64) -> f64 {
    assert!(is_probability(prob), "Expected probability in [0, 1]: {prob}");
    prob
}
