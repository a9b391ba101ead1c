//! Scenario parameter rows and the intervention calendar.
//!
//! One `ScenarioParams` value is one row of the sampled parameter table: a
//! combination of climate forcing label, intervention magnitudes and timing,
//! and multi-criteria decision weights. Rows are immutable once sampled and
//! every derived quantity (decision years, the unguided-selection seed) is a
//! pure function of the row.

use serde::{Deserialize, Serialize};

/// Per-criterion decision weights carried by a scenario row. Weights are
/// relative; the decision-matrix builder L1-normalizes the active subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CriteriaWeights {
    pub wave_stress: f64,
    pub heat_stress: f64,
    pub in_connectivity: f64,
    pub out_connectivity: f64,
    pub high_cover: f64,
    pub low_cover: f64,
    pub seed_priority: f64,
    pub shade_priority: f64,
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        Self {
            wave_stress: 1.0,
            heat_stress: 1.0,
            in_connectivity: 0.5,
            out_connectivity: 0.5,
            high_cover: 0.5,
            low_cover: 0.5,
            seed_priority: 0.5,
            shade_priority: 0.5,
        }
    }
}

/// Spatial-spread constraint settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpreadParams {
    pub enabled: bool,
    /// Minimum pairwise distance as a fraction of the median pairwise
    /// distance over the whole domain.
    pub min_dist_frac: f64,
    /// Size of the ranked replacement pool drawn from below the cut line.
    pub top_n: usize,
}

impl Default for SpreadParams {
    fn default() -> Self {
        Self {
            enabled: false,
            min_dist_frac: 0.1,
            top_n: 10,
        }
    }
}

/// One sampled scenario: a row of the parameter table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Climate forcing label, e.g. "RCP45".
    pub rcp: String,
    /// MCDA algorithm id: -1 counterfactual, 0 unguided, 1 OrderSum,
    /// 2 TOPSIS, 3 VIKOR.
    pub alg_ind: i32,
    /// Out-planted volume for tabular Acropora [colonies per event].
    pub seed_vol_tabular: f64,
    /// Out-planted volume for corymbose Acropora [colonies per event].
    pub seed_vol_corymbose: f64,
    /// Fogging fraction: local DHW at fogged sites is scaled by (1 - f).
    pub fogging: f64,
    /// SRM magnitude: DHW reduction applied domain-wide in shading years.
    pub srm: f64,
    /// First seeding year (1-based).
    pub seed_start_year: usize,
    /// Number of years the seeding program lasts.
    pub seed_years: usize,
    /// Seeding cadence [years]; 0 means a single event.
    pub seed_freq: usize,
    pub shade_start_year: usize,
    pub shade_years: usize,
    pub shade_freq: usize,
    pub weights: CriteriaWeights,
    /// Risk tolerance for deployed corals: candidate sites with heat or
    /// wave damage probability above this are filtered out.
    pub deployed_risk_tol: f64,
    /// Shallow bound of the deployment depth window [m].
    pub depth_min: f64,
    /// Window extent: the deep bound is depth_min + depth_offset.
    pub depth_offset: f64,
    pub spread: SpreadParams,
    /// Assisted-adaptation DHW offset applied to enhanced corals.
    pub a_adapt: f64,
    /// Natural adaptation rate [DHW/yr].
    pub n_adapt: f64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            rcp: "RCP45".into(),
            alg_ind: 1,
            seed_vol_tabular: 0.0,
            seed_vol_corymbose: 0.0,
            fogging: 0.0,
            srm: 0.0,
            seed_start_year: 2,
            seed_years: 10,
            seed_freq: 3,
            shade_start_year: 2,
            shade_years: 10,
            shade_freq: 1,
            weights: CriteriaWeights::default(),
            deployed_risk_tol: 1.0,
            depth_min: 3.0,
            depth_offset: 7.0,
            spread: SpreadParams::default(),
            a_adapt: 0.0,
            n_adapt: 0.0,
        }
    }
}

impl ScenarioParams {
    /// True if this scenario plants corals at all.
    #[inline]
    pub fn seeds_any(&self) -> bool {
        self.seed_vol_tabular > 0.0 || self.seed_vol_corymbose > 0.0
    }

    /// PRNG seed for unguided site selection, derived from the parameter
    /// values themselves so repeat runs reproduce exactly. The first 24
    /// numeric fields of the row are integer-cast and summed.
    pub fn derive_seed(&self) -> u64 {
        let fields: [f64; 24] = [
            self.alg_ind as f64,
            self.seed_vol_tabular,
            self.seed_vol_corymbose,
            self.fogging * 100.0,
            self.srm,
            self.seed_start_year as f64,
            self.seed_years as f64,
            self.seed_freq as f64,
            self.shade_start_year as f64,
            self.shade_years as f64,
            self.shade_freq as f64,
            self.weights.wave_stress * 100.0,
            self.weights.heat_stress * 100.0,
            self.weights.in_connectivity * 100.0,
            self.weights.out_connectivity * 100.0,
            self.weights.high_cover * 100.0,
            self.weights.low_cover * 100.0,
            self.weights.seed_priority * 100.0,
            self.weights.shade_priority * 100.0,
            self.deployed_risk_tol * 100.0,
            self.depth_min,
            self.depth_offset,
            self.a_adapt,
            self.n_adapt * 100.0,
        ];
        fields
            .iter()
            .fold(0u64, |acc, v| acc.wrapping_add(*v as i64 as u64))
    }
}

/// Mark decision years on a horizon of `horizon` years (index t-1 holds
/// year t). With a positive cadence, events run from `start` every `freq`
/// years while inside the program window and the horizon. With cadence 0 a
/// single event fires at `max(start, 2)`; year 1 is reserved for the
/// initial state.
pub fn intervention_years(start: usize, years: usize, freq: usize, horizon: usize) -> Vec<bool> {
    let mut active = vec![false; horizon];
    if years == 0 && freq > 0 {
        return active;
    }
    if freq == 0 {
        let year = start.max(2);
        if year <= horizon {
            active[year - 1] = true;
        }
        return active;
    }
    let last = (start + years - 1).min(horizon);
    let mut year = start.max(1);
    while year <= last {
        active[year - 1] = true;
        year += freq;
    }
    active
}
