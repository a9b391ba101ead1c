//! Site selection for intervention deployment.
//!
//! Orchestrates the depth filter, the rotation rule, criteria assembly and
//! the per-intent ranking pipeline, producing preferred seeding and
//! shading sites plus the ordinal ranks of every considered location.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, warn};

use super::rankers::{RankAlg, SelectionPolicy};
use super::spread::enforce_min_distance;
use super::{
    build_decision_matrix, intent_rules, intent_weights, CriteriaTable, Criterion, Intent,
    CRITERIA_ORDER,
};
use crate::domain::Domain;
use crate::error::{ReefError, Result};
use crate::scenario::ScenarioParams;

/// Preferred sites for one intent: fixed length `n_int`, `None` marks an
/// unfilled slot.
pub type PrefSites = Vec<Option<usize>>;

/// Output of one selection event.
pub struct Selection {
    pub seed: PrefSites,
    pub shade: PrefSites,
    /// (location, 1-based ordinal) for every location the seed ranking
    /// considered; absent locations are "not considered" (rank 0).
    pub seed_ranks: Vec<(usize, usize)>,
    pub shade_ranks: Vec<(usize, usize)>,
}

impl Selection {
    pub fn empty(n_int: usize) -> Self {
        Self {
            seed: vec![None; n_int],
            shade: vec![None; n_int],
            seed_ranks: Vec::new(),
            shade_ranks: Vec::new(),
        }
    }
}

/// Per-scenario selector: resolves the policy once and carries the derived
/// spread threshold and the once-per-scenario warning latch.
pub struct SiteSelector<'a> {
    domain: &'a Domain,
    scenario: &'a ScenarioParams,
    policy: SelectionPolicy,
    /// Minimum pairwise distance [m] when distance sorting is enabled.
    d_min: Option<f64>,
    /// Largest per-bin wave-mortality coefficient; scales raw wave stress
    /// into a damage probability.
    wave_mort_max: f64,
    warned_spread: bool,
    warned_rotation: bool,
}

impl<'a> SiteSelector<'a> {
    pub fn new(domain: &'a Domain, scenario: &'a ScenarioParams) -> Result<Self> {
        let policy = SelectionPolicy::from_id(scenario.alg_ind)?;
        let d_min = if scenario.spread.enabled {
            Some(scenario.spread.min_dist_frac * domain.median_pairwise_distance())
        } else {
            None
        };
        let wave_mort_max = domain
            .species
            .iter()
            .map(|s| s.wave_mortality_90)
            .fold(0.0, f64::max);
        Ok(Self {
            domain,
            scenario,
            policy,
            d_min,
            wave_mort_max,
            warned_spread: false,
            warned_rotation: false,
        })
    }

    #[inline]
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Run one selection event.
    ///
    /// `dhw` and `wave` are the current-step stress vectors, `cover` the
    /// current 36 x N cover matrix, `prev_*` the preferences from the most
    /// recent event (used by the rotation rule).
    #[allow(clippy::too_many_arguments)]
    pub fn select(
        &mut self,
        dhw: &[f64],
        wave: &[f64],
        cover: ArrayView2<'_, f64>,
        prev_seed: &[Option<usize>],
        prev_shade: &[Option<usize>],
        do_seed: bool,
        do_shade: bool,
        rng: &mut StdRng,
    ) -> Selection {
        let n_int = self.domain.sim.n_site_int;
        let mut out = Selection::empty(n_int);
        if self.policy == SelectionPolicy::Counterfactual || (!do_seed && !do_shade) {
            return out;
        }

        let candidates = match self.candidate_set(prev_seed, prev_shade) {
            Some(c) => c,
            None => return out,
        };
        let table = self.build_criteria(&candidates, dhw, wave, cover);

        match self.policy {
            SelectionPolicy::Counterfactual => {}
            SelectionPolicy::Unguided => {
                if do_seed {
                    let (sites, ranks) = draw_unguided(&candidates, n_int, rng);
                    out.seed = sites;
                    out.seed_ranks = ranks;
                }
                if do_shade {
                    let (sites, ranks) = draw_unguided(&candidates, n_int, rng);
                    out.shade = sites;
                    out.shade_ranks = ranks;
                }
            }
            SelectionPolicy::Guided(alg) => {
                if do_seed {
                    let (sites, ranks) = self.rank_intent(alg, &table, Intent::Seed);
                    out.seed = sites;
                    out.seed_ranks = ranks;
                }
                if do_shade {
                    let (sites, ranks) = self.rank_intent(alg, &table, Intent::Shade);
                    out.shade = sites;
                    out.shade_ranks = ranks;
                }
            }
        }
        out
    }

    /// Depth filter plus rotation rule. Returns `None` when rotation leaves
    /// nothing to choose from (the zero-fill path).
    fn candidate_set(
        &mut self,
        prev_seed: &[Option<usize>],
        prev_shade: &[Option<usize>],
    ) -> Option<Vec<usize>> {
        let depth_lo = self.scenario.depth_min;
        let depth_hi = self.scenario.depth_min + self.scenario.depth_offset;
        let mut eligible: Vec<usize> = (0..self.domain.n_locations())
            .filter(|&l| {
                let d = self.domain.locations[l].depth_med;
                (depth_lo..=depth_hi).contains(&d)
            })
            .collect();
        if eligible.is_empty() {
            warn!(
                depth_lo,
                depth_hi, "no location inside the deployment depth window; keeping all"
            );
            eligible = (0..self.domain.n_locations()).collect();
        }

        let previous: Vec<usize> = prev_seed
            .iter()
            .chain(prev_shade)
            .filter_map(|s| *s)
            .collect();
        let candidates: Vec<usize> = eligible
            .into_iter()
            .filter(|l| !previous.contains(l))
            .collect();
        if candidates.is_empty() {
            warn!("rotation rule removed every candidate; selection skipped this event");
            return None;
        }
        if candidates.len() < self.domain.sim.n_site_int && !self.warned_rotation {
            self.warned_rotation = true;
            warn!(
                candidates = candidates.len(),
                n_int = self.domain.sim.n_site_int,
                "candidate pool smaller than the intervention size; unfilled slots stay empty"
            );
        }
        Some(candidates)
    }

    /// Assemble the raw criteria table for the candidate rows.
    fn build_criteria(
        &self,
        candidates: &[usize],
        dhw: &[f64],
        wave: &[f64],
        cover: ArrayView2<'_, f64>,
    ) -> CriteriaTable {
        let d = self.domain;
        let mut values = ndarray::Array2::zeros((candidates.len(), CRITERIA_ORDER.len()));
        for (row, &l) in candidates.iter().enumerate() {
            let k = d.locations[l].k.max(1e-30);
            let total_cover: f64 = cover.column(l).sum();
            let rel_cover = (total_cover / k).clamp(0.0, 1.0);
            let heat = (dhw[l] / d.sim.dhw_max_tot).clamp(0.0, 1.0);
            let wave_prob = (self.wave_mort_max * wave[l]).clamp(0.0, 1.0);

            values[[row, Criterion::InConnectivity.column()]] = d.in_strength[l];
            values[[row, Criterion::OutConnectivity.column()]] = d.out_strength[l];
            values[[row, Criterion::HeatStress.column()]] = heat;
            values[[row, Criterion::WaveStress.column()]] = wave_prob;
            values[[row, Criterion::LowCover.column()]] = 1.0 - rel_cover;
            values[[row, Criterion::HighCover.column()]] = rel_cover;
            values[[row, Criterion::SeedPriority.column()]] =
                0.5 * d.conn_rank[l] + 0.5 * d.pred_frac[l];
            values[[row, Criterion::ShadePriority.column()]] = d.conn_rank[l];
            values[[row, Criterion::AvailableSpace.column()]] = (k - total_cover).max(0.0);
        }
        CriteriaTable {
            sites: candidates.to_vec(),
            values,
        }
    }

    /// Run one intent through build, rank and the spread filter.
    fn rank_intent(
        &mut self,
        alg: RankAlg,
        table: &CriteriaTable,
        intent: Intent,
    ) -> (PrefSites, Vec<(usize, usize)>) {
        let n_int = self.domain.sim.n_site_int;
        let weights = intent_weights(&self.scenario.weights, intent);
        let rules = intent_rules(intent, self.scenario.deployed_risk_tol);

        let matrix = match build_decision_matrix(table, &rules, &weights, intent) {
            Ok(m) => m,
            Err(ReefError::EmptyCandidateSet) => {
                debug!(?intent, "risk filters removed every candidate");
                return (vec![None; n_int], Vec::new());
            }
            Err(_) => return (vec![None; n_int], Vec::new()),
        };

        let ranked = alg.rank(&matrix);
        let ordered: Vec<usize> = ranked.iter().map(|r| r.site).collect();

        let chosen: Vec<usize> = match self.d_min {
            Some(d_min) => {
                let outcome = enforce_min_distance(
                    &ordered,
                    n_int,
                    &self.domain.dist,
                    d_min,
                    self.scenario.spread.top_n,
                );
                if outcome.degraded && !self.warned_spread {
                    self.warned_spread = true;
                    warn!(
                        ?intent,
                        d_min, "distance constraint unsatisfiable; returning best-effort selection"
                    );
                }
                outcome.sites
            }
            None => ordered.iter().copied().take(n_int).collect(),
        };

        let mut prefs = vec![None; n_int];
        for (slot, site) in chosen.iter().enumerate() {
            prefs[slot] = Some(*site);
        }
        let ranks = ordered
            .iter()
            .enumerate()
            .map(|(pos, &site)| (site, pos + 1))
            .collect();
        (prefs, ranks)
    }
}

/// Uniform random draw without replacement; the ordinal is the draw order.
fn draw_unguided(
    candidates: &[usize],
    n_int: usize,
    rng: &mut StdRng,
) -> (PrefSites, Vec<(usize, usize)>) {
    let mut pool = candidates.to_vec();
    let take = n_int.min(pool.len());
    let mut prefs = vec![None; n_int];
    let mut ranks = Vec::with_capacity(take);
    for slot in 0..take {
        let pick = rng.gen_range(0..pool.len());
        let site = pool.swap_remove(pick);
        prefs[slot] = Some(site);
        ranks.push((site, slot + 1));
    }
    (prefs, ranks)
}
