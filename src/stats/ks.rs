// src/stats/ks.rs
//! Two-sample, two-sided Kolmogorov–Smirnov test.
//!
//! The statistic is tracked as the integer `max |i·n − j·m|` while walking both
//! sorted samples, so the exact null distribution can be evaluated on the
//! `m × n` lattice without any floating-point comparison of ECDF values.

/// Above this many lattice cells the asymptotic distribution is used.
const EXACT_CELL_LIMIT: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KsMethod {
    Exact,
    Asymptotic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub p_value: f64,
    pub method: KsMethod,
}

/// Compare two samples. Returns `None` when either sample is empty or holds a NaN.
///
/// The p-value does not depend on argument order.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Option<KsResult> {
    if a.is_empty() || b.is_empty() || a.iter().chain(b).any(|v| v.is_nan()) {
        return None;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (m, n) = (a.len(), b.len());
    let h = max_scaled_gap(&a, &b);
    let statistic = h as f64 / (m as f64 * n as f64);

    let (p_value, method) = if m.saturating_mul(n) <= EXACT_CELL_LIMIT {
        (exact_p_value(m, n, h), KsMethod::Exact)
    } else {
        let en = (m as f64 * n as f64) / (m + n) as f64;
        let sqrt_en = en.sqrt();
        let lambda = (sqrt_en + 0.12 + 0.11 / sqrt_en) * statistic;
        (kolmogorov_sf(lambda), KsMethod::Asymptotic)
    };

    Some(KsResult {
        statistic,
        p_value: p_value.clamp(0.0, 1.0),
        method,
    })
}

/// `max |i·n − j·m|` over the merged walk; ties advance both samples together.
fn max_scaled_gap(a: &[f64], b: &[f64]) -> u128 {
    let (m, n) = (a.len() as i128, b.len() as i128);
    let (mut i, mut j) = (0usize, 0usize);
    let mut best: u128 = 0;
    while i < a.len() && j < b.len() {
        let v = if a[i] <= b[j] { a[i] } else { b[j] };
        while i < a.len() && a[i] <= v {
            i += 1;
        }
        while j < b.len() && b[j] <= v {
            j += 1;
        }
        let gap = (i as i128 * n - j as i128 * m).unsigned_abs();
        best = best.max(gap);
    }
    best
}

/// `P(D >= h / (m·n))` by counting monotone lattice paths that stay strictly
/// inside the band `|i·n − j·m| < h`. Each cell holds the share of paths,
/// which keeps the recurrence in `[0, 1]`.
fn exact_p_value(m: usize, n: usize, h: u128) -> f64 {
    if h == 0 {
        return 1.0;
    }
    let inside = |i: usize, j: usize| (i as i128 * n as i128 - j as i128 * m as i128).unsigned_abs() < h;

    let mut row = vec![0.0f64; n + 1];
    row[0] = 1.0;
    for j in 1..=n {
        row[j] = if inside(0, j) { row[j - 1] } else { 0.0 };
    }
    for i in 1..=m {
        row[0] = if inside(i, 0) { row[0] } else { 0.0 };
        for j in 1..=n {
            row[j] = if inside(i, j) {
                let total = (i + j) as f64;
                row[j] * (i as f64 / total) + row[j - 1] * (j as f64 / total)
            } else {
                0.0
            };
        }
    }
    1.0 - row[n]
}

/// Survival function of the Kolmogorov distribution, `Q(λ) = 2 Σ (−1)^(k−1) e^(−2k²λ²)`.
pub(crate) fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev = 0.0f64;
    for k in 1..=100 {
        let kf = k as f64;
        let term = fac * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 0.001 * prev || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev = term.abs();
    }
    // series did not settle: λ is tiny, so the tail probability is one
    1.0
}
