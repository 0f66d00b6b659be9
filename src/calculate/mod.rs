//! Population statistics.
//!
//! Everything here uses population (N) arithmetic so that client-side
//! normalization agrees with the source's `stddev` reduction. Degenerate
//! inputs return defined values instead of NaN:
//! - empty sample: mean 0, stddev 0
//! - zero spread: z-score 0 (percentile 50)

/// Mean and standard deviation of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PopulationStats {
    pub mean: f64,
    pub stddev: f64,
}

impl PopulationStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        Self {
            mean: average(samples),
            stddev: stddev(samples),
        }
    }

    pub fn z_score(&self, value: f64) -> f64 {
        z_score(value, self.mean, self.stddev)
    }
}

/// Arithmetic mean; 0 for an empty sample.
pub fn average(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Population standard deviation; 0 for an empty or constant sample.
pub fn stddev(samples: &[f64]) -> f64 {
    let Some(&first) = samples.first() else {
        return 0.0;
    };
    if samples.iter().all(|v| *v == first) {
        return 0.0;
    }
    // Shifted by the first sample; a common offset cancels exactly.
    let n = samples.len() as f64;
    let shifted_mean = samples.iter().map(|v| v - first).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|v| (v - first - shifted_mean).powi(2))
        .sum::<f64>()
        / n;
    variance.max(0.0).sqrt()
}

/// True when `stddev` is indistinguishable from rounding noise around `mean`.
pub fn is_zero_spread(mean: f64, stddev: f64) -> bool {
    !stddev.is_finite() || stddev <= f64::EPSILON * mean.abs().max(1.0) * 16.0
}

/// `(value - mean) / stddev`, or 0 when the population has no spread.
pub fn z_score(value: f64, mean: f64, stddev: f64) -> f64 {
    if is_zero_spread(mean, stddev) {
        return 0.0;
    }
    let z = (value - mean) / stddev;
    if z.is_nan() {
        0.0
    } else {
        z
    }
}

/// Win rate from wins/losses/draws; 0 when nothing was played.
pub fn win_rate(wins: u32, losses: u32, draws: u32) -> f64 {
    let total = wins + losses + draws;
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64
    }
}

/// Standard normal CDF at `z`, scaled to 0..=100.
pub fn z_score_to_percentile(z: f64) -> f64 {
    if z.is_nan() {
        return 50.0;
    }
    (50.0 * (1.0 + erf(z / std::f64::consts::SQRT_2))).clamp(0.0, 100.0)
}

/// Error function.
///
/// Maclaurin series near zero (exact at 0, odd by construction); the
/// complementary Chebyshev fit in the tails, where the series cancels badly.
fn erf(x: f64) -> f64 {
    if x.is_infinite() {
        return x.signum();
    }
    let ax = x.abs();
    if ax < 3.0 {
        erf_series(x)
    } else {
        x.signum() * (1.0 - erfc_tail(ax))
    }
}

fn erf_series(x: f64) -> f64 {
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    let mut n = 0.0;
    loop {
        n += 1.0;
        term *= -x2 / n;
        let contribution = term / (2.0 * n + 1.0);
        sum += contribution;
        if contribution.abs() <= f64::EPSILON * sum.abs() || n > 200.0 {
            break;
        }
    }
    sum * std::f64::consts::FRAC_2_SQRT_PI
}

/// erfc for x >= 0, fractional error below 1.2e-7.
fn erfc_tail(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * x);
    let poly = -x * x - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    t * poly.exp()
}
