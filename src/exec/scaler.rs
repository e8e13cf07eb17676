//! # Statistical Scaler
//!
//! Lifts a per-sample [`Reduction`] to a population estimate with a
//! CLT-based confidence interval, and decides the stability status of an
//! approximate answer.
//!
//! ## Estimation
//!
//! Given `(n, Σx, Σx²)` from a `p`-percent sample:
//!
//! ```text
//! x̄  = Σx / n
//! s²  = (Σx² − (Σx)² / n) / (n − 1)        requires n >= 2
//! SE  = sqrt(s² / n)
//! h   = z · SE                              z from the confidence level
//! ```
//!
//! SUM and COUNT report the lifted total `n * (100 / p) * x̄`; the margin
//! lifts by the same `n * 100 / p` factor so the interval stays calibrated
//! on the total. AVG is a ratio of two scaled quantities, so the scale
//! cancels and it reports the sample mean with the plain `z * SE` margin.
//!
//! ## Stability
//!
//! The fast estimate is cross-checked against the mean of the slow
//! validation stream: `STABLE` when the relative difference is within the
//! error threshold and the confidence reached the target, `DRIFTING` when
//! at least two slow estimates exist but the check fails,
//! `INSUFFICIENT_DATA` otherwise.

use super::reduction::Reduction;
use crate::config::z_score;

/// Aggregate function applied to the `amount` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
}

impl Aggregate {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Count => "COUNT",
            Aggregate::Avg => "AVG",
        }
    }
}

/// Outcome classification of an approximate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stable,
    Drifting,
    InsufficientData,
    Error,
}

/// A scaled population estimate. `half_width` is meaningful only when
/// `has_ci` is set; a single-sample reduction still yields a point value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub half_width: f64,
    pub has_ci: bool,
    pub samples_used: u64,
}

impl Estimate {
    pub fn interval(&self) -> (f64, f64) {
        (self.value - self.half_width, self.value + self.half_width)
    }
}

/// Scales a raw reduction to the population. `sample_percent` must be the
/// fraction the reduction was actually drawn at; callers on the exact path
/// pass 100.
pub fn estimate(
    reduction: &Reduction,
    aggregate: Aggregate,
    sample_percent: f64,
    confidence_level: f64,
) -> Estimate {
    let scale = if sample_percent > 0.0 {
        100.0 / sample_percent
    } else {
        1.0
    };
    let n = reduction.count;

    let raw_value = match aggregate {
        Aggregate::Sum => reduction.sum * scale,
        Aggregate::Count => n as f64 * scale,
        Aggregate::Avg => reduction.mean().unwrap_or(0.0),
    };

    match reduction.variance() {
        Some(variance) => {
            let standard_error = (variance / n as f64).sqrt();
            let mut half_width = z_score(confidence_level) * standard_error;
            if matches!(aggregate, Aggregate::Sum | Aggregate::Count) {
                // The SE is on the sample mean; the reported total is
                // n * scale * mean, so the margin lifts by the same factor.
                half_width *= n as f64 * scale;
            }
            Estimate {
                value: raw_value,
                half_width,
                has_ci: true,
                samples_used: n,
            }
        }
        None => Estimate {
            value: raw_value,
            half_width: 0.0,
            has_ci: false,
            samples_used: n,
        },
    }
}

/// Confidence heuristic used when CLT statistics were not actively computed:
/// a step function of the absolute sample size.
pub fn confidence_for_sample_size(samples: u64) -> f64 {
    if samples >= 1000 {
        0.95
    } else if samples >= 500 {
        0.90
    } else if samples >= 100 {
        0.85
    } else if samples >= 50 {
        0.80
    } else {
        0.70
    }
}

/// Decides the stability status from the fast estimate and the slow
/// validation stream.
pub fn stability_status(
    fast_value: f64,
    slow_estimates: &[f64],
    error_threshold: f64,
    confidence: f64,
    confidence_target: f64,
) -> Status {
    if slow_estimates.len() < 2 {
        return Status::InsufficientData;
    }

    let slow_mean = slow_estimates.iter().sum::<f64>() / slow_estimates.len() as f64;
    let stable = if fast_value == 0.0 {
        slow_mean == 0.0
    } else {
        (fast_value - slow_mean).abs() / fast_value.abs() <= error_threshold
    };

    if stable && confidence >= confidence_target {
        Status::Stable
    } else {
        Status::Drifting
    }
}
