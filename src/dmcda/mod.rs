//! Guided site selection (dMCDA): decision-matrix assembly, risk filtering,
//! normalization and weighting.
//!
//! The pipeline is: build a criteria table for the candidate locations,
//! drop rows that violate the scenario's tolerance rules, project the
//! columns the current intent actually weights, L2-normalize each column
//! and scale by the L1-normalized weights. The weighted matrix then feeds
//! one of the rankers in [`rankers`].

pub mod rankers;
pub mod selector;
pub mod spread;

use ndarray::Array2;

use crate::error::{ReefError, Result};

/// Decision criteria, in the fixed column order used by every matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    InConnectivity,
    OutConnectivity,
    HeatStress,
    WaveStress,
    LowCover,
    HighCover,
    SeedPriority,
    ShadePriority,
    AvailableSpace,
}

pub const CRITERIA_ORDER: [Criterion; 9] = [
    Criterion::InConnectivity,
    Criterion::OutConnectivity,
    Criterion::HeatStress,
    Criterion::WaveStress,
    Criterion::LowCover,
    Criterion::HighCover,
    Criterion::SeedPriority,
    Criterion::ShadePriority,
    Criterion::AvailableSpace,
];

impl Criterion {
    /// Column index in the criteria table.
    #[inline]
    pub fn column(self) -> usize {
        CRITERIA_ORDER.iter().position(|c| *c == self).unwrap()
    }
}

/// What the selection is for. Seeding and shading share the pipeline and
/// differ only in which columns they weight and how stress criteria are
/// oriented (seeding avoids heat, shading targets it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Seed,
    Shade,
}

/// Comparison operator of a tolerance rule.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    #[inline]
    fn test(self, value: f64, threshold: f64) -> bool {
        match self {
            Op::Lt => value < threshold,
            Op::Le => value <= threshold,
            Op::Gt => value > threshold,
            Op::Ge => value >= threshold,
        }
    }
}

/// A risk threshold applied to one criterion; rows failing any rule are
/// dropped before ranking.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceRule {
    pub criterion: Criterion,
    pub op: Op,
    pub threshold: f64,
}

/// Raw criteria values for the current candidate set: one row per
/// candidate, columns in [`CRITERIA_ORDER`].
pub struct CriteriaTable {
    /// Domain location index of each row.
    pub sites: Vec<usize>,
    pub values: Array2<f64>,
}

/// A filtered, projected, normalized and weighted decision matrix.
pub struct DecisionMatrix {
    /// Weighted matrix S: one row per surviving candidate.
    pub weighted: Array2<f64>,
    /// L1-normalized weights, aligned with `criteria`.
    pub weights: Vec<f64>,
    /// L2 norms of the projected columns before weighting; zero for
    /// all-zero columns.
    pub col_norms: Vec<f64>,
    /// Surviving candidate location indices, row-aligned with `weighted`.
    pub sites: Vec<usize>,
    /// The projected criteria, column-aligned with `weighted`.
    pub criteria: Vec<Criterion>,
}

/// Orient a raw criterion value as a benefit for the given intent. Stress
/// probabilities are complements when the intent avoids stress (seeding)
/// and taken as-is when the intent targets it (shading heat).
#[inline]
pub fn intent_value(criterion: Criterion, intent: Intent, raw: f64) -> f64 {
    match (criterion, intent) {
        (Criterion::HeatStress, Intent::Seed) => 1.0 - raw,
        (Criterion::HeatStress, Intent::Shade) => raw,
        (Criterion::WaveStress, _) => 1.0 - raw,
        _ => raw,
    }
}

/// Full-length weight vector for an intent; zero entries drop the column
/// at projection so an unweighted criterion can never influence ranking.
pub fn intent_weights(w: &crate::scenario::CriteriaWeights, intent: Intent) -> [f64; 9] {
    let mut out = [0.0; 9];
    out[Criterion::InConnectivity.column()] = w.in_connectivity;
    out[Criterion::OutConnectivity.column()] = w.out_connectivity;
    out[Criterion::HeatStress.column()] = w.heat_stress;
    out[Criterion::WaveStress.column()] = w.wave_stress;
    match intent {
        Intent::Seed => {
            out[Criterion::LowCover.column()] = w.low_cover;
            out[Criterion::SeedPriority.column()] = w.seed_priority;
        }
        Intent::Shade => {
            out[Criterion::HighCover.column()] = w.high_cover;
            out[Criterion::ShadePriority.column()] = w.shade_priority;
        }
    }
    out
}

/// Tolerance rules for an intent. Both intents respect the deployed-coral
/// risk tolerance; seeding additionally requires free space to plant into.
pub fn intent_rules(intent: Intent, risk_tol: f64) -> Vec<ToleranceRule> {
    let mut rules = vec![
        ToleranceRule {
            criterion: Criterion::HeatStress,
            op: Op::Le,
            threshold: risk_tol,
        },
        ToleranceRule {
            criterion: Criterion::WaveStress,
            op: Op::Le,
            threshold: risk_tol,
        },
    ];
    if intent == Intent::Seed {
        rules.push(ToleranceRule {
            criterion: Criterion::AvailableSpace,
            op: Op::Gt,
            threshold: 0.0,
        });
    }
    rules
}

/// Assemble the weighted decision matrix for one intent.
///
/// Steps: risk-filter rows, project non-zero-weight columns, orient each
/// value as a benefit, L2-normalize columns (an all-zero column stays
/// zero), then scale by the L1-normalized weights.
pub fn build_decision_matrix(
    table: &CriteriaTable,
    rules: &[ToleranceRule],
    weights: &[f64; 9],
    intent: Intent,
) -> Result<DecisionMatrix> {
    let keep: Vec<usize> = (0..table.sites.len())
        .filter(|&row| {
            rules
                .iter()
                .all(|r| r.op.test(table.values[[row, r.criterion.column()]], r.threshold))
        })
        .collect();
    if keep.is_empty() {
        return Err(ReefError::EmptyCandidateSet);
    }

    let criteria: Vec<Criterion> = CRITERIA_ORDER
        .iter()
        .copied()
        .filter(|c| weights[c.column()] > 0.0)
        .collect();
    let weight_sum: f64 = criteria.iter().map(|c| weights[c.column()]).sum();
    let norm_weights: Vec<f64> = criteria
        .iter()
        .map(|c| {
            if weight_sum > 1e-30 {
                weights[c.column()] / weight_sum
            } else {
                0.0
            }
        })
        .collect();

    let mut weighted = Array2::zeros((keep.len(), criteria.len()));
    for (i, &row) in keep.iter().enumerate() {
        for (j, &c) in criteria.iter().enumerate() {
            weighted[[i, j]] = intent_value(c, intent, table.values[[row, c.column()]]);
        }
    }

    let mut col_norms = vec![0.0; criteria.len()];
    for j in 0..criteria.len() {
        let norm = weighted.column(j).mapv(|v| v * v).sum().sqrt();
        col_norms[j] = norm;
        for i in 0..keep.len() {
            let v = if norm > 1e-30 { weighted[[i, j]] / norm } else { 0.0 };
            let v = v * norm_weights[j];
            weighted[[i, j]] = if v.is_finite() { v } else { 0.0 };
        }
    }

    Ok(DecisionMatrix {
        weighted,
        weights: norm_weights,
        col_norms,
        sites: keep.iter().map(|&r| table.sites[r]).collect(),
        criteria,
    })
}
