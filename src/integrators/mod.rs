//! Modified Patankar-Runge-Kutta (MPRK) integration of coral growth as a
//! positivity-preserving Production-Destruction System.
//!
//! The scenario runner treats growth as a black box behind [`GrowthModel`]:
//! any integrator that advances a 36 x N cover matrix by a fixed span may
//! be substituted. The default kernel integrates logistic colony growth,
//! size-class progression and background mortality per location with
//! MPRK22, which keeps cover non-negative for any step size.

use ndarray::Array2;

use crate::domain::species::{class_of, N_BINS, N_CLASSES};
use crate::domain::Domain;

/// Fixed state-derivative contract of the growth step: advance the cover
/// matrix (proportions, one column per location) by `dt_years`.
pub trait GrowthModel: Sync {
    fn grow(&self, cover: &mut Array2<f64>, domain: &Domain, dt_years: f64);
}

/// A Production-Destruction System (PDS) for a single location.
pub struct PdsRates {
    pub production: Vec<f64>,
    pub destruction: Vec<f64>,
}

/// Modified Patankar-Euler (first-order, unconditionally positive); also
/// the predictor stage of [`mprk22_step`].
pub fn patankar_euler_step(state: &mut [f64], rates: &PdsRates, dt: f64) {
    for (i, y) in state.iter_mut().enumerate() {
        let p = rates.production[i];
        let d = rates.destruction[i];

        if *y > 1e-30 {
            *y = (*y + dt * p) / (1.0 + dt * d / *y);
        } else {
            *y = dt * p;
        }
        debug_assert!(*y >= 0.0, "MPRK positivity violation");
    }
}

/// Modified Patankar-Runge-Kutta 2nd order (MPRK22).
pub fn mprk22_step<F>(state: &mut [f64], compute_rates: &F, dt: f64)
where
    F: Fn(&[f64]) -> PdsRates,
{
    let n = state.len();
    let y_n: Vec<f64> = state.to_vec();

    // Stage 1: Patankar-Euler predictor
    let rates_n = compute_rates(&y_n);
    let mut y_star = y_n.clone();
    patankar_euler_step(&mut y_star, &rates_n, dt);

    // Stage 2: Corrector
    let rates_star = compute_rates(&y_star);
    for i in 0..n {
        let p_avg = 0.5 * (rates_n.production[i] + rates_star.production[i]);

        let d_n = if y_n[i] > 1e-30 {
            rates_n.destruction[i] / y_n[i]
        } else {
            0.0
        };
        let d_star = if y_star[i] > 1e-30 {
            rates_star.destruction[i] / y_star[i]
        } else {
            0.0
        };
        let d_avg = 0.5 * (d_n + d_star);

        if d_avg > 1e-30 {
            state[i] = (y_n[i] + dt * p_avg) / (1.0 + dt * d_avg);
        } else {
            state[i] = y_n[i] + dt * p_avg;
        }
        state[i] = state[i].max(0.0);
    }
}

/// Coral growth rates for one location's 36-bin state.
///
/// Each bin grows logistically into the free space left under the
/// location's carrying capacity, progresses into the next size class, and
/// suffers background whole-colony mortality. Progression out of a class
/// is destruction there and production in the class above.
pub fn coral_growth_rates(state: &[f64], domain: &Domain, location: usize) -> PdsRates {
    let k = domain.locations[location].k;
    let total: f64 = state.iter().sum();
    let free_frac = if k > 1e-30 {
        ((k - total) / k).max(0.0)
    } else {
        0.0
    };

    let mut production = vec![0.0f64; N_BINS];
    let mut destruction = vec![0.0f64; N_BINS];
    for s in 0..N_BINS {
        let params = &domain.species[s];
        let y = state[s];

        production[s] += params.growth_rate * y * free_frac;
        destruction[s] += params.background_mortality * y;

        let outflow = params.class_progression * y;
        if class_of(s) < N_CLASSES - 1 {
            destruction[s] += outflow;
            // Progressed cover expands as colonies grow, limited by space.
            production[s + 1] += outflow * (1.0 + free_frac);
        }
    }
    PdsRates {
        production,
        destruction,
    }
}

/// Default growth kernel: per-location MPRK22 over the coral PDS.
pub struct CoralGrowth {
    /// Sub-steps per integration span; the yearly span is split for
    /// accuracy, positivity holds at any value.
    pub substeps: usize,
}

impl Default for CoralGrowth {
    fn default() -> Self {
        Self { substeps: 4 }
    }
}

impl GrowthModel for CoralGrowth {
    fn grow(&self, cover: &mut Array2<f64>, domain: &Domain, dt_years: f64) {
        let n_loc = cover.shape()[1];
        let dt = dt_years / self.substeps.max(1) as f64;
        let mut state = vec![0.0f64; N_BINS];
        for l in 0..n_loc {
            for s in 0..N_BINS {
                state[s] = cover[[s, l]];
            }
            let rate_fn = |y: &[f64]| coral_growth_rates(y, domain, l);
            for _ in 0..self.substeps.max(1) {
                mprk22_step(&mut state, &rate_fn, dt);
            }
            for s in 0..N_BINS {
                cover[[s, l]] = state[s];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::species::bin_index;
    use crate::domain::tests::test_domain;

    #[test]
    fn patankar_euler_stays_positive_under_huge_destruction() {
        let mut state = vec![0.5, 1e-3];
        let rates = PdsRates {
            production: vec![0.0, 0.0],
            destruction: vec![500.0, 500.0],
        };
        patankar_euler_step(&mut state, &rates, 1.0);
        assert!(state.iter().all(|&y| y >= 0.0));
    }

    #[test]
    fn mprk22_preserves_positivity_and_tracks_decay() {
        // Pure exponential decay: dy/dt = -y, exact solution e^-t.
        let rate_fn = |y: &[f64]| PdsRates {
            production: vec![0.0],
            destruction: vec![y[0]],
        };
        let mut state = vec![1.0];
        let dt = 0.05;
        for _ in 0..20 {
            mprk22_step(&mut state, &rate_fn, dt);
        }
        assert!(state[0] > 0.0);
        // Pure destruction reduces MPRK22 to a Patankar-weighted implicit
        // step, so accuracy is first-order here.
        assert!((state[0] - (-1.0f64).exp()).abs() < 1e-2);
    }

    #[test]
    fn growth_never_exceeds_free_space_meaningfully() {
        let domain = test_domain(4);
        let n = domain.n_locations();
        // Start near carrying capacity.
        let per_bin = 0.49 / N_BINS as f64;
        let mut cover = Array2::from_elem((N_BINS, n), per_bin);
        CoralGrowth::default().grow(&mut cover, &domain, 1.0);
        for l in 0..n {
            let total: f64 = cover.column(l).sum();
            // Logistic crowding plus mortality keeps totals near k; the
            // proportional adjuster handles any small overshoot.
            assert!(total < domain.locations[l].k * 1.1);
            assert!(cover.column(l).iter().all(|&y| y >= 0.0));
        }
    }

    #[test]
    fn empty_reef_stays_empty() {
        let domain = test_domain(3);
        let mut cover = Array2::zeros((N_BINS, domain.n_locations()));
        CoralGrowth::default().grow(&mut cover, &domain, 1.0);
        assert!(cover.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn cover_progresses_into_larger_classes() {
        let domain = test_domain(3);
        let mut cover = Array2::zeros((N_BINS, domain.n_locations()));
        let small = bin_index(0, 0);
        for l in 0..domain.n_locations() {
            cover[[small, l]] = 0.01;
        }
        CoralGrowth::default().grow(&mut cover, &domain, 2.0);
        for l in 0..domain.n_locations() {
            assert!(cover[[bin_index(0, 1), l]] > 0.0);
        }
    }
}
