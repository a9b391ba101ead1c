//! The per-step ecosystem pipeline: stressors, recruitment, bleaching and
//! wave losses, intervention application and the growth step.
//!
//! One call to [`step_year`] advances the cover state from year t-1 to
//! year t for a single environmental replicate. The pipeline is strictly
//! sequential; all scratch state lives in [`StepBuffers`] owned by the
//! calling scenario worker.

pub mod recruitment;
pub mod stressors;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use tracing::debug;

use crate::domain::species::{FunctionalGroup, ENHANCED_BINS, N_BINS, N_GROUPS};
use crate::domain::Domain;
use crate::integrators::GrowthModel;
use crate::scenario::ScenarioParams;

/// Scratch buffers reused across steps and replicates of one scenario.
pub struct StepBuffers {
    pub lps: Array2<f64>,
    pub fec_scope: Array2<f64>,
    pub scope_lp: Array2<f64>,
    pub recruits: Array2<f64>,
    pub bleach_surv: Array2<f64>,
    pub wave_surv: Array2<f64>,
    pub dhw_step: Vec<f64>,
    pub cov_tmp: Array2<f64>,
}

impl StepBuffers {
    pub fn new(n_loc: usize) -> Self {
        Self {
            lps: Array2::zeros((N_GROUPS, n_loc)),
            fec_scope: Array2::zeros((N_GROUPS, n_loc)),
            scope_lp: Array2::zeros((N_GROUPS, n_loc)),
            recruits: Array2::zeros((N_GROUPS, n_loc)),
            bleach_surv: Array2::zeros((N_BINS, n_loc)),
            wave_surv: Array2::zeros((N_BINS, n_loc)),
            dhw_step: vec![0.0; n_loc],
            cov_tmp: Array2::zeros((N_BINS, n_loc)),
        }
    }
}

/// Which interventions fire this step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepSchedule {
    pub seed: bool,
    pub shade: bool,
    pub fog: bool,
}

/// Deployment amounts logged during one step.
#[derive(Debug, Default)]
pub struct StepEvents {
    /// (enhanced-taxon slot, location, cover added).
    pub seeded: Vec<(usize, usize, f64)>,
    /// (location, DHW removed by fogging).
    pub fogged: Vec<(usize, f64)>,
    /// DHW removed domain-wide by SRM this step (0 when inactive).
    pub shaded: f64,
}

/// Advance one replicate from year t-1 to year t.
///
/// `dhw_prev`/`wave_prev` are the stress vectors of the source year (they
/// drive larval production and wave losses), `dhw_t` the target year's
/// thermal stress before intervention adjustment. The proportional-cover
/// constraint is enforced by the caller after this returns.
#[allow(clippy::too_many_arguments)]
pub fn step_year(
    domain: &Domain,
    scenario: &ScenarioParams,
    t: usize,
    y_prev: ArrayView2<'_, f64>,
    mut y_next: ArrayViewMut2<'_, f64>,
    dhw_prev: &[f64],
    dhw_t: &[f64],
    wave_prev: &[f64],
    seed_sites: &[Option<usize>],
    shade_sites: &[Option<usize>],
    schedule: StepSchedule,
    growth: &dyn GrowthModel,
    buf: &mut StepBuffers,
) -> StepEvents {
    let mut events = StepEvents::default();
    let n = domain.n_locations();
    let ad = scenario.a_adapt + (t as f64 - 1.0) * scenario.n_adapt;

    // Larval production and fecundity scope from the source year's state.
    recruitment::larval_production(&mut buf.lps, dhw_prev, domain, ad);
    recruitment::fecundity_scope(&mut buf.fec_scope, y_prev, domain);
    for g in 0..N_GROUPS {
        for l in 0..n {
            buf.scope_lp[[g, l]] = buf.fec_scope[[g, l]] * buf.lps[[g, l]];
        }
    }
    recruitment::settler_recruits(&mut buf.recruits, &buf.scope_lp, domain);

    // Intervention-adjusted thermal stress for this step.
    buf.dhw_step.copy_from_slice(dhw_t);
    if schedule.shade && scenario.srm > 0.0 {
        stressors::apply_srm(&mut buf.dhw_step, scenario.srm);
        events.shaded = scenario.srm;
    }
    if schedule.fog && scenario.fogging > 0.0 {
        // Fog the seeded sites when any were chosen, otherwise the shaded.
        let targets = if seed_sites.iter().any(|s| s.is_some()) {
            seed_sites
        } else {
            shade_sites
        };
        events.fogged = stressors::apply_fogging(&mut buf.dhw_step, targets, scenario.fogging);
    }

    stressors::bleaching_survival(&mut buf.bleach_surv, &buf.dhw_step, domain, ad);
    stressors::wave_survival(&mut buf.wave_surv, wave_prev, domain);

    // Combined proportional loss into the working state.
    for s in 0..N_BINS {
        for l in 0..n {
            buf.cov_tmp[[s, l]] =
                y_prev[[s, l]] * buf.bleach_surv[[s, l]] * buf.wave_surv[[s, l]];
        }
    }

    // Settlers enter the smallest size class of their group.
    for g in 0..N_GROUPS {
        for l in 0..n {
            buf.cov_tmp[[g * crate::domain::species::N_CLASSES, l]] += buf.recruits[[g, l]];
        }
    }

    // Out-planting into the two enhanced taxa.
    if schedule.seed && seed_sites.iter().any(|s| s.is_some()) {
        let volumes = [scenario.seed_vol_tabular, scenario.seed_vol_corymbose];
        let n_int = domain.sim.n_site_int as f64;
        for (slot, (&bin, &vol)) in ENHANCED_BINS.iter().zip(&volumes).enumerate() {
            if vol <= 0.0 {
                continue;
            }
            let colony_area = domain.species[bin].colony_area_m2;
            for l in seed_sites.iter().filter_map(|s| *s) {
                let loc = &domain.locations[l];
                let added = (vol / n_int) * colony_area / (loc.area_m2 * loc.k.max(1e-30));
                buf.cov_tmp[[bin, l]] += added;
                events.seeded.push((slot, l, added));
            }
            debug!(
                year = t,
                taxon = FunctionalGroup::of_bin(bin).name(),
                volume = vol,
                "out-planting event"
            );
        }
    }

    // Growth over a fixed one-year span, then hand back the new state.
    growth.grow(&mut buf.cov_tmp, domain, 1.0);
    y_next.assign(&buf.cov_tmp);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::test_domain;
    use crate::integrators::CoralGrowth;

    fn initial_cover(domain: &Domain, per_bin: f64) -> Array2<f64> {
        Array2::from_elem((N_BINS, domain.n_locations()), per_bin)
    }

    fn run_step(
        domain: &Domain,
        scenario: &ScenarioParams,
        y_prev: &Array2<f64>,
        schedule: StepSchedule,
        seed_sites: &[Option<usize>],
    ) -> (Array2<f64>, StepEvents) {
        let n = domain.n_locations();
        let mut y_next = Array2::zeros((N_BINS, n));
        let mut buf = StepBuffers::new(n);
        let growth = CoralGrowth::default();
        let shade_sites = vec![None; domain.sim.n_site_int];
        let events = step_year(
            domain,
            scenario,
            2,
            y_prev.view(),
            y_next.view_mut(),
            &vec![2.0; n],
            &vec![3.0; n],
            &vec![0.1; n],
            seed_sites,
            &shade_sites,
            schedule,
            &growth,
            &mut buf,
        );
        (y_next, events)
    }

    #[test]
    fn benign_step_keeps_cover_positive() {
        let domain = test_domain(4);
        let y0 = initial_cover(&domain, 0.003);
        let none = vec![None; domain.sim.n_site_int];
        let (y1, events) = run_step(
            &domain,
            &ScenarioParams::default(),
            &y0,
            StepSchedule::default(),
            &none,
        );
        assert!(y1.iter().all(|&v| v >= 0.0));
        assert!(events.seeded.is_empty());
        assert!(events.fogged.is_empty());
        assert_eq!(events.shaded, 0.0);
    }

    #[test]
    fn seeding_adds_cover_at_selected_sites() {
        let domain = test_domain(5);
        let scenario = ScenarioParams {
            seed_vol_tabular: 50_000.0,
            seed_vol_corymbose: 50_000.0,
            ..Default::default()
        };
        let y0 = initial_cover(&domain, 0.001);
        let none = vec![None; domain.sim.n_site_int];
        let mut sites = vec![None; domain.sim.n_site_int];
        sites[0] = Some(1);
        sites[1] = Some(3);

        let (plain, _) = run_step(&domain, &scenario, &y0, StepSchedule::default(), &none);
        let schedule = StepSchedule {
            seed: true,
            ..Default::default()
        };
        let (seeded, events) = run_step(&domain, &scenario, &y0, schedule, &sites);

        assert_eq!(events.seeded.len(), 4);
        for &(slot, l, added) in &events.seeded {
            assert!(added > 0.0);
            assert!(l == 1 || l == 3);
            assert!(slot < 2);
            let bin = ENHANCED_BINS[slot];
            assert!(seeded[[bin, l]] > plain[[bin, l]]);
        }
        // Unselected sites are untouched by seeding.
        for s in 0..N_BINS {
            assert!((seeded[[s, 0]] - plain[[s, 0]]).abs() < 1e-12);
        }
    }

    #[test]
    fn shading_reduces_bleaching_losses() {
        let domain = test_domain(4);
        let n = domain.n_locations();
        let y0 = initial_cover(&domain, 0.003);
        let none = vec![None; domain.sim.n_site_int];
        let mut buf = StepBuffers::new(n);
        let growth = CoralGrowth::default();

        let mut run = |srm: f64, shade: bool| {
            let scenario = ScenarioParams {
                srm,
                ..Default::default()
            };
            let mut y_next = Array2::zeros((N_BINS, n));
            step_year(
                &domain,
                &scenario,
                2,
                y0.view(),
                y_next.view_mut(),
                &vec![6.0; n],
                &vec![16.0; n],
                &vec![0.0; n],
                &none,
                &none,
                StepSchedule {
                    shade,
                    ..Default::default()
                },
                &growth,
                &mut buf,
            );
            y_next
        };

        let unshaded = run(0.0, false);
        let shaded = run(6.0, true);
        let total = |y: &Array2<f64>| -> f64 { y.iter().sum() };
        assert!(total(&shaded) > total(&unshaded));
    }

    #[test]
    fn fogging_prefers_seed_sites_and_falls_back_to_shade_sites() {
        let domain = test_domain(4);
        let n = domain.n_locations();
        let y0 = initial_cover(&domain, 0.003);
        let mut buf = StepBuffers::new(n);
        let growth = CoralGrowth::default();
        let scenario = ScenarioParams {
            fogging: 0.5,
            ..Default::default()
        };
        let schedule = StepSchedule {
            fog: true,
            ..Default::default()
        };

        let mut seed_sites = vec![None; domain.sim.n_site_int];
        seed_sites[0] = Some(2);
        let mut shade_sites = vec![None; domain.sim.n_site_int];
        shade_sites[0] = Some(3);

        let mut y_next = Array2::zeros((N_BINS, n));
        let with_seed = step_year(
            &domain,
            &scenario,
            2,
            y0.view(),
            y_next.view_mut(),
            &vec![4.0; n],
            &vec![8.0; n],
            &vec![0.0; n],
            &seed_sites,
            &shade_sites,
            schedule,
            &growth,
            &mut buf,
        );
        assert_eq!(with_seed.fogged, vec![(2, 4.0)]);

        let none = vec![None; domain.sim.n_site_int];
        let fallback = step_year(
            &domain,
            &scenario,
            2,
            y0.view(),
            y_next.view_mut(),
            &vec![4.0; n],
            &vec![8.0; n],
            &vec![0.0; n],
            &none,
            &shade_sites,
            schedule,
            &growth,
            &mut buf,
        );
        assert_eq!(fallback.fogged, vec![(3, 4.0)]);
    }
}
