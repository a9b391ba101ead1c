//! The per-scenario runner: buffer allocation, the replicate/time loop,
//! intervention scheduling, site-selection events and the
//! proportional-cover constraint.

pub mod batch;

use ndarray::{Array2, ArrayViewMut2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::dmcda::selector::{PrefSites, Selection, SiteSelector};
use crate::domain::species::N_BINS;
use crate::domain::{ClimateForcing, Domain};
use crate::ecosystem::{step_year, StepBuffers, StepSchedule};
use crate::integrators::GrowthModel;
use crate::results::ScenarioResult;
use crate::scenario::{intervention_years, ScenarioParams};

/// Tolerance on the capacity invariant after proportional adjustment.
pub const CAPACITY_EPS: f64 = 1e-9;

/// Run-wide configuration. Environment variables `REEFWISE_REPS` and
/// `REEFWISE_THRESHOLD` override the replicate count and the storage
/// quantization epsilon.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of environmental replicates to run; `None` uses every
    /// replicate in the forcing arrays.
    pub reps: Option<usize>,
    /// Stored values below this magnitude are quantized to 0.
    pub threshold: f64,
    /// Batches larger than this fan out across worker threads.
    pub parallel_threshold: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reps: None,
            threshold: 1e-6,
            parallel_threshold: 64,
        }
    }
}

impl RunConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(reps) = std::env::var("REEFWISE_REPS") {
            match reps.parse::<usize>() {
                Ok(n) if n > 0 => config.reps = Some(n),
                _ => warn!(value = %reps, "ignoring invalid REEFWISE_REPS"),
            }
        }
        if let Ok(threshold) = std::env::var("REEFWISE_THRESHOLD") {
            match threshold.parse::<f64>() {
                Ok(eps) if eps >= 0.0 && eps.is_finite() => config.threshold = eps,
                _ => warn!(value = %threshold, "ignoring invalid REEFWISE_THRESHOLD"),
            }
        }
        config
    }
}

/// Rescale any over-capacity location so its cover sum equals k. Column
/// sums are cached into `ycover` for reuse by the caller.
pub fn adjust_proportional(
    mut y: ArrayViewMut2<'_, f64>,
    domain: &Domain,
    ycover: &mut [f64],
) {
    for l in 0..domain.n_locations() {
        let k = domain.locations[l].k;
        let sum: f64 = y.column(l).sum();
        if sum > k && sum > 1e-30 {
            let scale = k / sum;
            for s in 0..y.shape()[0] {
                y[[s, l]] *= scale;
            }
            ycover[l] = k;
        } else {
            ycover[l] = sum;
        }
    }
}

/// Execute one scenario over all requested replicates.
///
/// The result is deterministic given (domain, scenario, forcing slice,
/// derived seed); scratch buffers are owned by this call and never shared.
pub fn run_scenario(
    domain: &Domain,
    scenario: &ScenarioParams,
    forcing: &ClimateForcing,
    init_cover: &Array2<f64>,
    growth: &dyn GrowthModel,
    config: &RunConfig,
) -> ScenarioResult {
    let horizon = domain.sim.horizon_years;
    let n = domain.n_locations();
    let n_int = domain.sim.n_site_int;
    let reps = config
        .reps
        .unwrap_or_else(|| forcing.n_reps())
        .min(forcing.n_reps());

    let mut result = ScenarioResult::new(horizon, N_BINS, n, reps);

    let mut selector = match SiteSelector::new(domain, scenario) {
        Ok(s) => s,
        Err(err) => {
            warn!(%err, "scenario aborted before stepping");
            result.failed = true;
            return result;
        }
    };

    let seed_years = intervention_years(
        scenario.seed_start_year,
        scenario.seed_years,
        scenario.seed_freq,
        horizon,
    );
    let shade_years = intervention_years(
        scenario.shade_start_year,
        scenario.shade_years,
        scenario.shade_freq,
        horizon,
    );

    let mut buf = StepBuffers::new(n);
    let mut ycover = vec![0.0; n];
    let mut dhw_prev = vec![0.0; n];
    let mut dhw_t = vec![0.0; n];
    let mut wave_prev = vec![0.0; n];
    let mut wave_t = vec![0.0; n];

    for rep in 0..reps {
        let mut rng = StdRng::seed_from_u64(scenario.derive_seed());
        let mut pref_seed: PrefSites = vec![None; n_int];
        let mut pref_shade: PrefSites = vec![None; n_int];

        // Year 1 is the (shared) initial state, capacity-adjusted.
        {
            let mut y0 = result
                .cover
                .index_axis_mut(ndarray::Axis(0), 0)
                .index_axis_move(ndarray::Axis(2), rep);
            y0.assign(init_cover);
            adjust_proportional(y0, domain, &mut ycover);
        }

        for t in 2..=horizon {
            for l in 0..n {
                dhw_prev[l] = forcing.dhw[[t - 2, l, rep]];
                dhw_t[l] = forcing.dhw[[t - 1, l, rep]];
                wave_prev[l] = forcing.wave[[t - 2, l, rep]];
                wave_t[l] = forcing.wave[[t - 1, l, rep]];
            }

            let schedule = StepSchedule {
                seed: seed_years[t - 1] && scenario.seeds_any(),
                shade: shade_years[t - 1] && scenario.srm > 0.0,
                fog: shade_years[t - 1] && scenario.fogging > 0.0,
            };

            // Decision event: refresh preferred sites before stepping.
            let do_seed = schedule.seed;
            let do_shade = schedule.shade || schedule.fog;
            if do_seed || do_shade {
                let y_prev = result
                    .cover
                    .index_axis(ndarray::Axis(0), t - 2)
                    .index_axis_move(ndarray::Axis(2), rep);
                let selection: Selection = selector.select(
                    &dhw_t,
                    &wave_t,
                    y_prev,
                    &pref_seed,
                    &pref_shade,
                    do_seed,
                    do_shade,
                    &mut rng,
                );
                if do_seed {
                    pref_seed = selection.seed;
                }
                if do_shade {
                    pref_shade = selection.shade;
                }
                for &(site, ordinal) in &selection.seed_ranks {
                    result.site_ranks[[t - 1, site, 0]] += ordinal as f64;
                }
                for &(site, ordinal) in &selection.shade_ranks {
                    result.site_ranks[[t - 1, site, 1]] += ordinal as f64;
                }
            }

            let (y_prev, mut y_next) = {
                let (a, b) = result
                    .cover
                    .multi_slice_mut((
                        ndarray::s![t - 2, .., .., rep],
                        ndarray::s![t - 1, .., .., rep],
                    ));
                (a, b)
            };
            let events = step_year(
                domain,
                scenario,
                t,
                y_prev.view(),
                y_next.view_mut(),
                &dhw_prev,
                &dhw_t,
                &wave_prev,
                &pref_seed,
                &pref_shade,
                schedule,
                growth,
                &mut buf,
            );
            adjust_proportional(y_next.view_mut(), domain, &mut ycover);

            for (slot, l, added) in events.seeded {
                result.seed_log[[t - 1, slot, l, rep]] += added;
            }
            for (l, removed) in events.fogged {
                result.fog_log.push(t - 1, l, rep, removed);
            }
            if events.shaded > 0.0 {
                for l in 0..n {
                    result.shade_log.push(t - 1, l, rep, events.shaded);
                }
            }
        }
    }

    // Only the mean over replicates is stored for ranks, to bound volume.
    if reps > 0 {
        result.site_ranks.mapv_inplace(|v| v / reps as f64);
    }
    result.quantize(config.threshold);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::test_domain;
    use crate::integrators::CoralGrowth;
    use ndarray::{Array2, Array3};
    use rand::Rng;

    fn forcing_for(domain: &Domain, reps: usize, dhw_level: f64) -> ClimateForcing {
        let t = domain.sim.horizon_years;
        let n = domain.n_locations();
        ClimateForcing::new(
            Array3::from_elem((t, n, reps), dhw_level),
            Array3::from_elem((t, n, reps), 0.1),
            domain,
        )
        .unwrap()
    }

    fn random_init(domain: &Domain, total_per_site: f64, seed: u64) -> Array2<f64> {
        let n = domain.n_locations();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = Array2::zeros((N_BINS, n));
        for l in 0..n {
            let mut weights = [0.0f64; N_BINS];
            let mut sum = 0.0;
            for w in weights.iter_mut() {
                *w = rng.gen::<f64>();
                sum += *w;
            }
            for (s, w) in weights.iter().enumerate() {
                init[[s, l]] = total_per_site * w / sum;
            }
        }
        init
    }

    #[test]
    fn capacity_invariant_holds_at_every_step() {
        // Horizon 10, five sites with k = 0.5, no interventions, random
        // initial cover summing to 0.4 per site.
        let domain = test_domain(5);
        let forcing = forcing_for(&domain, 2, 3.0);
        let init = random_init(&domain, 0.4, 7);
        let scenario = ScenarioParams {
            alg_ind: -1,
            ..Default::default()
        };
        let result = run_scenario(
            &domain,
            &scenario,
            &forcing,
            &init,
            &CoralGrowth::default(),
            &RunConfig::default(),
        );
        assert!(!result.failed);
        for rep in 0..2 {
            for t in 0..domain.sim.horizon_years {
                for l in 0..domain.n_locations() {
                    let mut sum = 0.0;
                    for s in 0..N_BINS {
                        let v = result.cover[[t, s, l, rep]];
                        assert!(v >= 0.0);
                        sum += v;
                    }
                    assert!(sum <= 0.5 + CAPACITY_EPS);
                }
            }
        }
    }

    #[test]
    fn runs_are_reproducible() {
        let domain = test_domain(6);
        let forcing = forcing_for(&domain, 2, 6.0);
        let init = random_init(&domain, 0.2, 3);
        let scenario = ScenarioParams {
            alg_ind: 2,
            seed_vol_tabular: 20_000.0,
            fogging: 0.2,
            ..Default::default()
        };
        let growth = CoralGrowth::default();
        let config = RunConfig::default();
        let a = run_scenario(&domain, &scenario, &forcing, &init, &growth, &config);
        let b = run_scenario(&domain, &scenario, &forcing, &init, &growth, &config);
        assert_eq!(a.cover, b.cover);
        assert_eq!(a.seed_log, b.seed_log);
        assert_eq!(a.site_ranks, b.site_ranks);
    }

    #[test]
    fn counterfactual_never_deploys() {
        let domain = test_domain(5);
        let forcing = forcing_for(&domain, 1, 6.0);
        let init = random_init(&domain, 0.2, 1);
        let scenario = ScenarioParams {
            alg_ind: -1,
            seed_vol_tabular: 50_000.0,
            fogging: 0.3,
            srm: 2.0,
            ..Default::default()
        };
        let result = run_scenario(
            &domain,
            &scenario,
            &forcing,
            &init,
            &CoralGrowth::default(),
            &RunConfig::default(),
        );
        assert_eq!(result.seed_log.sum(), 0.0);
        assert!(result.fog_log.is_empty());
        // SRM is domain-wide and does not depend on site selection.
        assert!(!result.shade_log.is_empty());
        assert_eq!(result.site_ranks.sum(), 0.0);
    }

    #[test]
    fn guided_seeding_deploys_and_logs_ranks() {
        let domain = test_domain(8);
        let forcing = forcing_for(&domain, 1, 4.0);
        let init = random_init(&domain, 0.1, 11);
        let scenario = ScenarioParams {
            alg_ind: 1,
            seed_vol_tabular: 50_000.0,
            seed_vol_corymbose: 50_000.0,
            depth_min: 0.0,
            depth_offset: 100.0,
            ..Default::default()
        };
        let result = run_scenario(
            &domain,
            &scenario,
            &forcing,
            &init,
            &CoralGrowth::default(),
            &RunConfig::default(),
        );
        assert!(result.seed_log.sum() > 0.0);
        assert!(result.site_ranks.sum() > 0.0);
        // Rank 0 means "not considered": initial year is never a decision.
        assert_eq!(
            result
                .site_ranks
                .index_axis(ndarray::Axis(0), 0)
                .sum(),
            0.0
        );
    }

    #[test]
    fn bad_algorithm_flags_failure() {
        let domain = test_domain(4);
        let forcing = forcing_for(&domain, 1, 4.0);
        let init = random_init(&domain, 0.1, 2);
        let scenario = ScenarioParams {
            alg_ind: 42,
            ..Default::default()
        };
        let result = run_scenario(
            &domain,
            &scenario,
            &forcing,
            &init,
            &CoralGrowth::default(),
            &RunConfig::default(),
        );
        assert!(result.failed);
        assert_eq!(result.cover.sum(), 0.0);
    }

    #[test]
    fn adjuster_rescales_only_over_capacity_columns() {
        let domain = test_domain(3);
        let mut y = Array2::zeros((N_BINS, 3));
        // Column 0 over capacity, column 1 under, column 2 empty.
        for s in 0..N_BINS {
            y[[s, 0]] = 0.02;
            y[[s, 1]] = 0.005;
        }
        let mut ycover = vec![0.0; 3];
        adjust_proportional(y.view_mut(), &domain, &mut ycover);
        let sum0: f64 = y.column(0).sum();
        assert!((sum0 - 0.5).abs() < CAPACITY_EPS);
        assert!((ycover[0] - 0.5).abs() < CAPACITY_EPS);
        let sum1: f64 = y.column(1).sum();
        assert!((sum1 - 0.18).abs() < 1e-12);
        assert_eq!(ycover[2], 0.0);
    }
}
