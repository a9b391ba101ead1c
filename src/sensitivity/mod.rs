//! Post-hoc sensitivity analysis over a scenario ensemble: PAWN indices,
//! temporal PAWN, Regional Sensitivity Analysis and outcome mapping.
//!
//! All procedures share the same slicing scheme: each factor's sampled
//! values are cut at its 0, 1/S, ..., 1 quantiles and the output
//! distribution inside each slice is compared against a reference. Numeric
//! degeneracy (empty slices, zero variance) never fails; degenerate PAWN
//! cells become 0 and degenerate RSA / outcome-map cells are marked
//! missing with NaN.

pub mod stats;

use ndarray::{Array2, Array3, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use tracing::warn;

use stats::{anderson_darling_k, balanced_bootstrap_ci, ks_two_sample, quantile_edges};

/// Summary statistics emitted per factor: min, mean, median, max, std, cv.
pub const N_SUMMARIES: usize = 6;

/// Default number of quantile slices.
pub const DEFAULT_SLICES: usize = 10;

/// Default bootstrap resamples and confidence level for outcome mapping.
pub const DEFAULT_BOOTSTRAP: usize = 100;
pub const DEFAULT_CI: f64 = 0.95;

fn summarize(values: &[f64]) -> [f64; N_SUMMARIES] {
    if values.is_empty() {
        return [0.0; N_SUMMARIES];
    }
    let n = values.len() as f64;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let mean = values.iter().sum::<f64>() / n;
    let median = if sorted.len() % 2 == 0 {
        0.5 * (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2])
    } else {
        sorted[sorted.len() / 2]
    };
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let cv = if mean.abs() > 1e-30 { std / mean } else { 0.0 };
    let mut out = [min, mean, median, max, std, cv];
    for v in out.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    out
}

/// Row indices falling into slice `s` (1-based) of a factor column. The
/// first slice is closed on both sides, later slices are left-open.
fn slice_members(col: ArrayView1<'_, f64>, edges: &[f64], s: usize) -> Vec<usize> {
    let lo = edges[s - 1];
    let hi = edges[s];
    col.iter()
        .enumerate()
        .filter(|(_, &v)| if s == 1 { v >= lo && v <= hi } else { v > lo && v <= hi })
        .map(|(i, _)| i)
        .collect()
}

fn sorted_column(col: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut v: Vec<f64> = col.iter().copied().collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    v
}

/// PAWN moment-independent indices.
///
/// For each factor, the unconditional output CDF is compared with the
/// conditional CDF inside each quantile slice via the two-sample K-S
/// distance; the six summaries of those distances are the factor's row.
pub fn pawn_indices(x: ArrayView2<'_, f64>, y: &[f64], n_slices: usize) -> Array2<f64> {
    let d = x.shape()[1];
    let mut out = Array2::zeros((d, N_SUMMARIES));
    let mut y_all = y.to_vec();
    y_all.sort_by(|a, b| a.partial_cmp(b).unwrap());

    for factor in 0..d {
        let col = x.column(factor);
        let edges = quantile_edges(&sorted_column(col), n_slices);
        let mut distances = Vec::with_capacity(n_slices);
        for s in 1..=n_slices {
            let members = slice_members(col, &edges, s);
            if members.is_empty() {
                continue;
            }
            let mut y_slice: Vec<f64> = members.iter().map(|&i| y[i]).collect();
            y_slice.sort_by(|a, b| a.partial_cmp(b).unwrap());
            distances.push(ks_two_sample(&y_slice, &y_all));
        }
        let summary = summarize(&distances);
        for (j, v) in summary.iter().enumerate() {
            out[[factor, j]] = *v;
        }
    }
    out
}

/// Temporal PAWN: indices over cumulative (prefix-mean) outcomes.
///
/// `y_t` holds one output trajectory per row (N x T). The result is a
/// D x 6 x T tensor; each time slice is max-scaled per summary column so
/// factors are comparable across time.
pub fn pawn_temporal(
    x: ArrayView2<'_, f64>,
    y_t: ArrayView2<'_, f64>,
    n_slices: usize,
) -> Array3<f64> {
    let n = x.shape()[0];
    let d = x.shape()[1];
    let horizon = y_t.shape()[1];
    let mut out = Array3::zeros((d, N_SUMMARIES, horizon));

    let mut prefix = vec![0.0f64; n];
    let mut y_cum = vec![0.0f64; n];
    for t in 0..horizon {
        for i in 0..n {
            prefix[i] += y_t[[i, t]];
            y_cum[i] = prefix[i] / (t + 1) as f64;
        }
        let indices = pawn_indices(x, &y_cum, n_slices);
        for j in 0..N_SUMMARIES {
            let col_max = (0..d)
                .map(|f| indices[[f, j]])
                .fold(0.0f64, f64::max);
            for f in 0..d {
                out[[f, j, t]] = if col_max > 1e-30 {
                    indices[[f, j]] / col_max
                } else {
                    0.0
                };
            }
        }
    }
    out
}

/// Regional Sensitivity Analysis: per factor and slice, the k-sample
/// Anderson-Darling distance between in-slice and out-of-slice outputs.
/// Degenerate slices (fewer than two distinct outputs, or an empty
/// complement) are NaN. Each factor column is max-scaled.
pub fn rsa_indices(x: ArrayView2<'_, f64>, y: &[f64], n_slices: usize) -> Array2<f64> {
    let n = x.shape()[0];
    let d = x.shape()[1];
    let mut out = Array2::from_elem((n_slices, d), f64::NAN);

    for factor in 0..d {
        let col = x.column(factor);
        let edges = quantile_edges(&sorted_column(col), n_slices);
        for s in 1..=n_slices {
            let members = slice_members(col, &edges, s);
            if members.is_empty() || members.len() == n {
                continue;
            }
            let inside: Vec<f64> = members.iter().map(|&i| y[i]).collect();
            let mut distinct = inside.clone();
            distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
            distinct.dedup();
            if distinct.len() < 2 {
                continue;
            }
            let member_set: Vec<bool> = {
                let mut flags = vec![false; n];
                for &i in &members {
                    flags[i] = true;
                }
                flags
            };
            let outside: Vec<f64> = (0..n).filter(|i| !member_set[*i]).map(|i| y[i]).collect();
            out[[s - 1, factor]] = anderson_darling_k(&[inside.as_slice(), outside.as_slice()]);
        }

        let col_max = (0..n_slices)
            .map(|s| out[[s, factor]])
            .filter(|v| v.is_finite())
            .fold(0.0f64, f64::max);
        if col_max > 1e-30 {
            for s in 0..n_slices {
                out[[s, factor]] /= col_max;
            }
        }
    }
    out
}

/// Outcome mapping: per target factor and quantile slice, the balanced-
/// bootstrap mean and confidence bounds of a binary behavioral rule
/// evaluated on max-scaled outputs.
///
/// Returns an S x |targets| x 3 tensor of (mean, lower, upper); empty
/// cells are NaN. An empty behavioral set yields an all-NaN table.
pub fn outcome_map<F>(
    x: ArrayView2<'_, f64>,
    outputs: ArrayView2<'_, f64>,
    rule: F,
    targets: &[usize],
    n_slices: usize,
    n_boot: usize,
    rng: &mut StdRng,
) -> Array3<f64>
where
    F: Fn(ArrayView1<'_, f64>) -> bool,
{
    let n = x.shape()[0];
    let mut out = Array3::from_elem((n_slices, targets.len(), 3), f64::NAN);

    // Max-scale each output column before applying the rule.
    let mut norm = outputs.to_owned();
    for mut col in norm.columns_mut() {
        let max = col.iter().copied().fold(0.0f64, |m, v| m.max(v.abs()));
        if max > 1e-30 {
            col.mapv_inplace(|v| v / max);
        }
    }
    let behavioral: Vec<f64> = (0..n)
        .map(|i| if rule(norm.row(i)) { 1.0 } else { 0.0 })
        .collect();
    if behavioral.iter().sum::<f64>() == 0.0 {
        warn!("behavioral rule matched no scenarios; outcome map is empty");
        return out;
    }

    for (ti, &factor) in targets.iter().enumerate() {
        let col = x.column(factor);
        let edges = quantile_edges(&sorted_column(col), n_slices);
        for s in 1..=n_slices {
            let members = slice_members(col, &edges, s);
            if members.is_empty() {
                continue;
            }
            let values: Vec<f64> = members.iter().map(|&i| behavioral[i]).collect();
            let (mean, lo, hi) = balanced_bootstrap_ci(&values, n_boot, DEFAULT_CI, rng);
            out[[s - 1, ti, 0]] = mean;
            out[[s - 1, ti, 1]] = lo;
            out[[s - 1, ti, 2]] = hi;
        }
    }
    out
}
