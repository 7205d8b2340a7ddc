//! Poisson/Fisher scoring for SV candidates, plus the numerical helpers it
//! rests on (Lanczos log-gamma, regularized incomplete gamma).

use crate::config::LibraryInfo;
use crate::read::PairFlag;
use crate::types::LibIndex;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Floor for log p-values; `exp(LZERO)` is treated as zero probability.
pub const LZERO: f64 = -99.0;

/// Natural log of the gamma function via the Lanczos approximation (g=7).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];

    if x < 0.5 {
        // Reflection formula: Γ(x) = π / (sin(πx) · Γ(1-x))
        let log_pi_over_sin = (PI / (PI * x).sin()).ln();
        log_pi_over_sin - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut ag = 0.99999999999980993_f64;
        for (i, &c) in COEFFS.iter().enumerate() {
            ag += c / (x + i as f64 + 1.0);
        }
        let t = x + 7.5; // g + 0.5
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Series expansion for the regularized lower incomplete gamma P(a, x).
fn gammainc_series(a: f64, x: f64) -> f64 {
    let max_iter = 200;
    let eps = 1e-12;
    let ln_prefix = a * x.ln() - x - ln_gamma(a);

    let mut sum = 1.0 / a;
    let mut term = 1.0 / a;

    for n in 1..=max_iter {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < sum.abs() * eps {
            break;
        }
    }
    sum * ln_prefix.exp()
}

/// Continued fraction for Q(a, x) = 1 - P(a, x) via modified Lentz's method.
fn gammainc_cf(a: f64, x: f64) -> f64 {
    let max_iter = 200;
    let eps = 1e-12;
    let tiny = 1e-30_f64;
    let ln_prefix = a * x.ln() - x - ln_gamma(a);

    let mut b = x + 1.0 - a;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;

    for i in 1..=max_iter {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < tiny {
            d = tiny;
        }
        c = b + an / c;
        if c.abs() < tiny {
            c = tiny;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < eps {
            break;
        }
    }
    h * ln_prefix.exp()
}

/// Regularized lower incomplete gamma P(a, x).
///
/// Uses the series expansion when x < a + 1 and the continued fraction
/// representation (computing Q = 1 - P) otherwise.
pub fn gammainc(a: f64, x: f64) -> Result<f64> {
    if a <= 0.0 {
        return Err(anyhow!("gammainc: a must be positive"));
    }
    if x < 0.0 {
        return Err(anyhow!("gammainc: x must be non-negative"));
    }
    if x == 0.0 {
        return Ok(0.0);
    }
    if x < a + 1.0 {
        Ok(gammainc_series(a, x))
    } else {
        Ok(1.0 - gammainc_cf(a, x))
    }
}

/// Regularized upper incomplete gamma Q(a, x), computed on the side of the
/// split that keeps the small tail accurate.
pub fn gammainc_upper(a: f64, x: f64) -> Result<f64> {
    if a <= 0.0 {
        return Err(anyhow!("gammainc_upper: a must be positive"));
    }
    if x < 0.0 || !x.is_finite() {
        return Err(anyhow!("gammainc_upper: x must be finite and non-negative"));
    }
    if x == 0.0 {
        return Ok(1.0);
    }
    if x < a + 1.0 {
        Ok(1.0 - gammainc_series(a, x))
    } else {
        Ok(gammainc_cf(a, x))
    }
}

/// log P[X >= k] for X ~ Poisson(lambda), inclusive upper tail.
///
/// Identity: P[X >= k] = P(k, lambda), the regularized lower incomplete
/// gamma. k = 0 has tail 1.
pub fn poisson_log_upper_tail(k: u64, lambda: f64) -> f64 {
    if k == 0 {
        return 0.0;
    }
    match gammainc(k as f64, lambda) {
        Ok(tail) => tail.ln(),
        Err(_) => 0.0,
    }
}

/// Survival function of the chi-squared distribution with `df` degrees of
/// freedom: P[X > x] = Q(df/2, x/2).
pub fn chi_squared_survival(x: f64, df: f64) -> Result<f64> {
    if df <= 0.0 {
        return Err(anyhow!("chi_squared_survival: df must be positive"));
    }
    if x <= 0.0 {
        return Ok(1.0);
    }
    gammainc_upper(df / 2.0, x / 2.0)
}

/// Kahan-compensated sum of log tail probabilities.
///
/// Keeps precision when many small per-library contributions combine.
pub fn kahan_log_sum<I: IntoIterator<Item = f64>>(log_tails: I) -> f64 {
    let mut err = 0.0_f64;
    let mut lp = 0.0_f64;
    for log_tail in log_tails {
        let a = log_tail - err;
        let b = lp + a;
        err = (b - lp) - a;
        lp = b;
    }
    lp
}

/// Combined log p-value for one candidate: per-library Poisson upper tails
/// over the candidate span, Kahan-summed, optionally recalibrated with
/// Fisher's method (−2·Σ ln p ~ χ²(2k)).
pub fn log_prob_score(
    total_region_size: i64,
    library_readcount: &BTreeMap<LibIndex, u32>,
    flag: PairFlag,
    fisher: bool,
    lib_info: &LibraryInfo,
) -> f64 {
    let covered = lib_info.covered_reference_length as f64;
    let tails = library_readcount.iter().map(|(&lib, &readcount)| {
        let genome_wide = lib_info.flag_count(lib, flag) as f64;
        let lambda = (total_region_size as f64 * genome_wide / covered).max(1.0e-10);
        poisson_log_upper_tail(readcount as u64, lambda)
    });
    let mut logpvalue = kahan_log_sum(tails);

    if fisher && logpvalue < 0.0 {
        let df = 2.0 * library_readcount.len() as f64;
        match chi_squared_survival(-2.0 * logpvalue, df) {
            Ok(fisher_p) => {
                logpvalue = if fisher_p > LZERO.exp() { fisher_p.ln() } else { LZERO };
            }
            Err(e) => {
                tracing::warn!(
                    df,
                    logpvalue,
                    "chi-squared recalibration failed, keeping Poisson combination: {e}"
                );
            }
        }
    }

    logpvalue
}

/// Phred-scale a log p-value, clamped to 99.
pub fn phred(logpvalue: f64) -> i32 {
    let q = -10.0 * logpvalue / std::f64::consts::LN_10;
    if q > 99.0 {
        99
    } else {
        (q + 0.5) as i32
    }
}
