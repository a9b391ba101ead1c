//! Larval production, fecundity scope and settler recruitment through the
//! connectivity matrix.

use ndarray::Array2;

use crate::domain::species::{bin_index, N_CLASSES, N_GROUPS};
use crate::domain::Domain;

/// Stress-attenuated larval-production multiplier per (group, location).
///
/// Gompertz-shaped response to the previous step's DHW: production is near
/// 1 under low stress and collapses as DHW approaches the saturation
/// magnitude. Adaptation `ad` shrinks the effective stress; each group's
/// bleach resistance attenuates it further.
pub fn larval_production(out: &mut Array2<f64>, dhw_prev: &[f64], domain: &Domain, ad: f64) {
    let c = &domain.sim;
    let adapt_frac = (1.0 - ad / c.dhw_max_tot).max(0.0);
    for g in 0..N_GROUPS {
        let resist = domain.species[bin_index(g, 0)].bleach_resistance;
        for (l, &dhw) in dhw_prev.iter().enumerate() {
            let stress = dhw * adapt_frac * (1.0 - resist);
            let lp = 1.0 - (-(-c.lp_dhw_coeff * (stress - c.lp_prm2)).exp()).exp();
            out[[g, l]] = lp.clamp(0.0, 1.0);
        }
    }
}

/// Per-group larval output potential: fecundity summed over the group's
/// size classes, weighted by cover and polygon area.
pub fn fecundity_scope(out: &mut Array2<f64>, cover: ndarray::ArrayView2<'_, f64>, domain: &Domain) {
    for g in 0..N_GROUPS {
        for l in 0..domain.n_locations() {
            let area = domain.locations[l].area_m2;
            let mut scope = 0.0;
            for class in 0..N_CLASSES {
                let s = bin_index(g, class);
                scope += domain.species[s].fecundity_per_m2 * cover[[s, l]] * area;
            }
            out[[g, l]] = scope;
        }
    }
}

/// Distribute produced larvae through the transition matrix and convert
/// settled larvae into proportional cover.
///
/// `scope_lp` is the element-wise product of fecundity scope and the
/// larval-production multiplier. For each destination,
/// `recruits[g, l] = potential_settler_cover * (scope_lp . conn)[g, l] / area_l`.
pub fn settler_recruits(
    out: &mut Array2<f64>,
    scope_lp: &Array2<f64>,
    domain: &Domain,
) {
    let n = domain.n_locations();
    let settled = scope_lp.dot(&domain.conn);
    for g in 0..N_GROUPS {
        for l in 0..n {
            out[[g, l]] = domain.sim.potential_settler_cover * settled[[g, l]]
                / domain.locations[l].area_m2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::species::N_BINS;
    use crate::domain::tests::test_domain;

    #[test]
    fn production_is_full_when_cool_and_zero_when_hot() {
        let domain = test_domain(3);
        let n = domain.n_locations();
        let mut lp = Array2::zeros((N_GROUPS, n));
        larval_production(&mut lp, &vec![0.0; n], &domain, 0.0);
        assert!(lp.iter().all(|&v| v > 0.8));

        larval_production(&mut lp, &vec![80.0; n], &domain, 0.0);
        assert!(lp.iter().all(|&v| v < 0.05));
    }

    #[test]
    fn adaptation_restores_production() {
        let domain = test_domain(2);
        let n = domain.n_locations();
        let mut base = Array2::zeros((N_GROUPS, n));
        let mut adapted = Array2::zeros((N_GROUPS, n));
        larval_production(&mut base, &vec![12.0; n], &domain, 0.0);
        larval_production(&mut adapted, &vec![12.0; n], &domain, 8.0);
        for g in 0..N_GROUPS {
            assert!(adapted[[g, 0]] >= base[[g, 0]]);
        }
    }

    #[test]
    fn scope_ignores_immature_classes() {
        let domain = test_domain(2);
        let n = domain.n_locations();
        // Only juvenile cover: no larval output at all.
        let mut cover = Array2::zeros((N_BINS, n));
        for g in 0..N_GROUPS {
            for l in 0..n {
                cover[[bin_index(g, 0), l]] = 0.1;
            }
        }
        let mut scope = Array2::zeros((N_GROUPS, n));
        fecundity_scope(&mut scope, cover.view(), &domain);
        assert!(scope.iter().all(|&v| v == 0.0));

        // Mature cover produces.
        for g in 0..N_GROUPS {
            for l in 0..n {
                cover[[bin_index(g, 4), l]] = 0.1;
            }
        }
        fecundity_scope(&mut scope, cover.view(), &domain);
        assert!(scope.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn recruits_follow_connectivity() {
        let domain = test_domain(4);
        let n = domain.n_locations();
        // All larvae originate from location 0.
        let mut scope_lp = Array2::zeros((N_GROUPS, n));
        scope_lp[[0, 0]] = 1e6;
        let mut recruits = Array2::zeros((N_GROUPS, n));
        settler_recruits(&mut recruits, &scope_lp, &domain);
        // Location 0 exports; its own row has conn[[0, 0]] = 0, so it
        // receives nothing while its neighbors do.
        assert_eq!(recruits[[0, 0]], 0.0);
        for l in 1..n {
            assert!(recruits[[0, l]] > 0.0);
        }
        // No cross-group leakage.
        for g in 1..N_GROUPS {
            for l in 0..n {
                assert_eq!(recruits[[g, l]], 0.0);
            }
        }
    }
}
