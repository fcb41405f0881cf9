//! Poisson upper-tail quantiles.
//!
//! The exact path sums the tail downward in log space, so it neither
//! underflows for tiny expected counts nor loses precision for tiny
//! probabilities. Above [`GAUSSIAN_APPROXIMATION_MIN_EXPECTED`] the normal
//! approximation with continuity correction takes over.

use std::f64::consts::PI;

use crate::invariants::{GAUSSIAN_APPROXIMATION_MIN_EXPECTED, MIN_FALSE_ALARM_PROBABILITY};

/// Log-probability below which a Poisson term no longer affects any budget.
const NEGLIGIBLE_LOG_PMF: f64 = -71.4;

/// Smallest count `k` with `P(X >= k) <= p` for `X ~ Poisson(lambda)`.
///
/// `lambda <= 0` yields 1 (any count is anomalous); `p >= 1` yields 0.
/// For a fixed `lambda` the result never decreases as `p` shrinks.
pub fn upper_tail_threshold(lambda: f64, p: f64) -> u64 {
    if p >= 1.0 {
        return 0;
    }
    if !(lambda > 0.0) {
        return 1;
    }
    let p = p.max(MIN_FALSE_ALARM_PROBABILITY);
    if lambda > GAUSSIAN_APPROXIMATION_MIN_EXPECTED {
        gaussian_upper_tail_threshold(lambda, p)
    } else {
        poisson_upper_tail_threshold(lambda, p)
    }
}

/// Exact Poisson quantile by downward log-space tail summation.
pub fn poisson_upper_tail_threshold(lambda: f64, p: f64) -> u64 {
    if p >= 1.0 {
        return 0;
    }
    if !(lambda > 0.0) {
        return 1;
    }
    let log_p = p.max(MIN_FALSE_ALARM_PROBABILITY).ln();
    let ln_lambda = lambda.ln();

    // The starting point depends only on lambda, which keeps the result
    // monotone in p.
    let step = lambda.sqrt().ceil() as u64 + 1;
    let mut upper = (lambda + 12.0 * lambda.sqrt() + 30.0).ceil() as u64;
    while log_pmf(lambda, ln_lambda, upper) >= NEGLIGIBLE_LOG_PMF {
        upper += step;
    }

    let mut log_term = log_pmf(lambda, ln_lambda, upper);
    let mut log_tail = log_term;
    let mut k = upper;
    loop {
        if log_tail > log_p {
            return k + 1;
        }
        if k == 0 {
            return 0;
        }
        // pmf(k - 1) = pmf(k) * k / lambda
        log_term += (k as f64).ln() - ln_lambda;
        k -= 1;
        log_tail = log_add_exp(log_tail, log_term);
    }
}

/// Normal approximation with continuity correction: `ceil(lambda + 0.5 + z * sqrt(lambda))`.
pub fn gaussian_upper_tail_threshold(lambda: f64, p: f64) -> u64 {
    if p >= 1.0 {
        return 0;
    }
    if !(lambda > 0.0) {
        return 1;
    }
    let z = -inv_normal_cdf(p.max(MIN_FALSE_ALARM_PROBABILITY));
    let k = (lambda + 0.5 + z * lambda.sqrt()).ceil();
    if k < 1.0 {
        1
    } else {
        k as u64
    }
}

/// `P(X >= k)` for `X ~ Poisson(lambda)`.
pub fn poisson_survival(lambda: f64, k: u64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    if !(lambda > 0.0) {
        return 0.0;
    }
    let ln_lambda = lambda.ln();
    let mut upper = k.max((lambda + 12.0 * lambda.sqrt() + 30.0).ceil() as u64);
    while log_pmf(lambda, ln_lambda, upper) >= NEGLIGIBLE_LOG_PMF {
        upper += lambda.sqrt().ceil() as u64 + 1;
    }
    let mut log_term = log_pmf(lambda, ln_lambda, upper);
    let mut log_tail = log_term;
    let mut j = upper;
    while j > k {
        log_term += (j as f64).ln() - ln_lambda;
        j -= 1;
        log_tail = log_add_exp(log_tail, log_term);
    }
    log_tail.exp().min(1.0)
}

fn log_pmf(lambda: f64, ln_lambda: f64, k: u64) -> f64 {
    k as f64 * ln_lambda - lambda - ln_gamma(k as f64 + 1.0)
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Natural log of the gamma function (Lanczos, g = 7, n = 9).
pub(crate) fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x) = π / (sin(πx) · Γ(1-x))
        let reflected = ln_gamma(1.0 - x);
        (PI / (PI * x).sin()).ln() - reflected
    } else {
        const COEFFICIENTS: [f64; 9] = [
            0.999_999_999_999_809_9,
            676.520_368_121_885_1,
            -1_259.139_216_722_402_8,
            771.323_428_777_653_1,
            -176.615_029_162_140_6,
            12.507_343_278_686_905,
            -0.138_571_095_265_720_12,
            9.984_369_578_019_572e-6,
            1.505_632_735_149_311_6e-7,
        ];
        let g = 7.0_f64;
        let z = x - 1.0;
        let mut ag = COEFFICIENTS[0];
        for (i, c) in COEFFICIENTS.iter().enumerate().skip(1) {
            ag += c / (z + i as f64);
        }
        let t = z + g + 0.5;
        0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation).
pub(crate) fn inv_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
