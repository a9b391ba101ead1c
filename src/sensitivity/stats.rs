//! Statistical kernels for the sensitivity procedures: empirical CDFs,
//! the two-sample Kolmogorov-Smirnov distance, the k-sample
//! Anderson-Darling statistic and balanced-bootstrap confidence bounds.

use rand::rngs::StdRng;
use rand::Rng;

/// Fraction of `sorted` at or below `x`.
#[inline]
pub fn ecdf_at(sorted: &[f64], x: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let count = sorted.partition_point(|v| *v <= x);
    count as f64 / sorted.len() as f64
}

/// Two-sample Kolmogorov-Smirnov statistic: the supremum of the absolute
/// CDF difference, evaluated over the pooled sample points. Both inputs
/// must be sorted ascending.
pub fn ks_two_sample(a_sorted: &[f64], b_sorted: &[f64]) -> f64 {
    if a_sorted.is_empty() || b_sorted.is_empty() {
        return 0.0;
    }
    let mut sup = 0.0f64;
    for &x in a_sorted.iter().chain(b_sorted) {
        let d = (ecdf_at(a_sorted, x) - ecdf_at(b_sorted, x)).abs();
        sup = sup.max(d);
    }
    sup
}

/// Quantile edges at fractions 0, 1/s, ..., 1 of a sorted sample, with
/// linear interpolation between order statistics.
pub fn quantile_edges(sorted: &[f64], s: usize) -> Vec<f64> {
    let n = sorted.len();
    let mut edges = Vec::with_capacity(s + 1);
    for i in 0..=s {
        if n == 0 {
            edges.push(0.0);
            continue;
        }
        let pos = i as f64 / s as f64 * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        edges.push(sorted[lo] * (1.0 - frac) + sorted[hi.min(n - 1)] * frac);
    }
    edges
}

/// Scholz-Stephens k-sample Anderson-Darling statistic A2kN.
///
/// Distances between each sample's empirical CDF and the pooled CDF are
/// accumulated over the pooled order statistics (the last is excluded to
/// keep the weight finite). Returns 0 for degenerate inputs.
pub fn anderson_darling_k(samples: &[&[f64]]) -> f64 {
    let n_total: usize = samples.iter().map(|s| s.len()).sum();
    if n_total < 2 || samples.iter().any(|s| s.is_empty()) {
        return 0.0;
    }
    let mut pooled: Vec<f64> = samples.iter().flat_map(|s| s.iter().copied()).collect();
    pooled.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = n_total as f64;
    let mut a2 = 0.0;
    for sample in samples {
        let n_i = sample.len() as f64;
        let mut inner = 0.0;
        for (j, z) in pooled[..n_total - 1].iter().enumerate() {
            let j1 = (j + 1) as f64;
            let m_ij = sample.iter().filter(|v| **v <= *z).count() as f64;
            let num = (n * m_ij - j1 * n_i).powi(2);
            let den = j1 * (n - j1);
            if den > 1e-30 {
                inner += num / den;
            }
        }
        a2 += inner / n_i;
    }
    let a2 = a2 / n;
    if a2.is_finite() {
        a2
    } else {
        0.0
    }
}

/// Balanced-bootstrap estimate of the mean with a percentile confidence
/// interval. Every observation appears exactly `n_boot` times across the
/// resamples. Returns (mean, lower, upper).
pub fn balanced_bootstrap_ci(
    values: &[f64],
    n_boot: usize,
    ci: f64,
    rng: &mut StdRng,
) -> (f64, f64, f64) {
    let n = values.len();
    if n == 0 || n_boot == 0 {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    // One pool holding each index n_boot times, shuffled then chunked.
    let mut pool: Vec<usize> = (0..n * n_boot).map(|i| i % n).collect();
    for i in (1..pool.len()).rev() {
        let j = rng.gen_range(0..=i);
        pool.swap(i, j);
    }
    let mut means: Vec<f64> = pool
        .chunks(n)
        .map(|chunk| chunk.iter().map(|&i| values[i]).sum::<f64>() / n as f64)
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mean = means.iter().sum::<f64>() / means.len() as f64;
    let alpha = (1.0 - ci) / 2.0;
    let lo_idx = (alpha * (means.len() - 1) as f64).round() as usize;
    let hi_idx = ((1.0 - alpha) * (means.len() - 1) as f64).round() as usize;
    (mean, means[lo_idx], means[hi_idx])
}
