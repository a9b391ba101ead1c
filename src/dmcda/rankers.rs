//! MCDA ranking algorithms over a weighted decision matrix.
//!
//! Each ranker maps the matrix to one score per candidate; higher scores
//! rank higher and ties break by ascending location index (the matrix rows
//! are already in index order, so a stable sort preserves that).

use super::DecisionMatrix;
use crate::error::{ReefError, Result};

/// A guided ranking algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankAlg {
    OrderSum,
    Topsis,
    Vikor,
}

/// How a scenario chooses intervention sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Counterfactual: never selects sites.
    Counterfactual,
    /// Uniform random draw from the candidate set.
    Unguided,
    Guided(RankAlg),
}

/// Registry of guided algorithms keyed by their table id.
const GUIDED_REGISTRY: [(i32, RankAlg); 3] = [
    (1, RankAlg::OrderSum),
    (2, RankAlg::Topsis),
    (3, RankAlg::Vikor),
];

impl SelectionPolicy {
    /// Resolve a scenario's `alg_ind`. Unknown ids are an error, never a
    /// silent default.
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            -1 => Ok(SelectionPolicy::Counterfactual),
            0 => Ok(SelectionPolicy::Unguided),
            _ => GUIDED_REGISTRY
                .iter()
                .find(|(key, _)| *key == id)
                .map(|(_, alg)| SelectionPolicy::Guided(*alg))
                .ok_or(ReefError::UnknownMcdaMethod(id)),
        }
    }
}

/// A candidate with its ranking score; position in the output list is the
/// rank (0 = best).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSite {
    pub site: usize,
    pub score: f64,
}

impl RankAlg {
    /// Rank all candidates in the matrix, best first.
    pub fn rank(self, m: &DecisionMatrix) -> Vec<RankedSite> {
        let scores = match self {
            RankAlg::OrderSum => order_sum_scores(m),
            RankAlg::Topsis => topsis_scores(m),
            RankAlg::Vikor => vikor_scores(m),
        };
        let mut ranked: Vec<RankedSite> = m
            .sites
            .iter()
            .zip(&scores)
            .map(|(&site, &score)| RankedSite {
                site,
                score: if score.is_finite() { score } else { 0.0 },
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        ranked
    }
}

/// Additive score: row sums of the weighted matrix. Linear and monotone in
/// the weights.
fn order_sum_scores(m: &DecisionMatrix) -> Vec<f64> {
    (0..m.sites.len()).map(|i| m.weighted.row(i).sum()).collect()
}

/// Distance to the positive/negative ideal solutions. A zero-variance
/// criterion contributes nothing to either distance; a candidate equal to
/// both ideals scores 0.
fn topsis_scores(m: &DecisionMatrix) -> Vec<f64> {
    let n = m.sites.len();
    let c = m.criteria.len();
    let pis: Vec<f64> = (0..c)
        .map(|j| m.weighted.column(j).iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    let nis: Vec<f64> = (0..c)
        .map(|j| m.weighted.column(j).iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    (0..n)
        .map(|i| {
            let mut sp = 0.0;
            let mut sn = 0.0;
            for j in 0..c {
                let v = m.weighted[[i, j]];
                sp += (v - pis[j]).powi(2);
                sn += (v - nis[j]).powi(2);
            }
            let sp = sp.sqrt();
            let sn = sn.sqrt();
            if sp + sn > 1e-30 { sn / (sp + sn) } else { 0.0 }
        })
        .collect()
}

/// Compromise score Q with v = 0.5; returned as 1 - Q so larger is better.
/// Either range term with a zero denominator contributes 0.
fn vikor_scores(m: &DecisionMatrix) -> Vec<f64> {
    const V: f64 = 0.5;
    let n = m.sites.len();
    let c = m.criteria.len();
    let f = m
        .weighted
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let mut sr = vec![0.0; n];
    let mut r = vec![0.0; n];
    for i in 0..n {
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        for j in 0..c {
            let a = f - m.weighted[[i, j]];
            sum += a;
            max = max.max(a);
        }
        sr[i] = sum;
        r[i] = if max.is_finite() { max } else { 0.0 };
    }

    let s_min = sr.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = sr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let r_min = r.iter().copied().fold(f64::INFINITY, f64::min);
    let r_max = r.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    (0..n)
        .map(|i| {
            let s_term = if (s_max - s_min).abs() > 1e-30 {
                V * (sr[i] - s_min) / (s_max - s_min)
            } else {
                0.0
            };
            let r_term = if (r_max - r_min).abs() > 1e-30 {
                (1.0 - V) * (r[i] - r_min) / (r_max - r_min)
            } else {
                0.0
            };
            1.0 - (s_term + r_term)
        })
        .collect()
}
