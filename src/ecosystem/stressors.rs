//! Thermal and hydrodynamic stress responses: intervention-adjusted DHW,
//! bleaching survival and wave-damage survival.

use ndarray::Array2;

use crate::domain::species::N_BINS;
use crate::domain::Domain;

/// Uniform DHW reduction from solar radiation management; clamped at zero.
pub fn apply_srm(dhw_step: &mut [f64], srm: f64) {
    for v in dhw_step.iter_mut() {
        *v = (*v - srm).max(0.0);
    }
}

/// Localized cooling: scale DHW at the fogged sites by (1 - fogging).
/// Returns the sites actually fogged and the DHW removed at each.
pub fn apply_fogging(
    dhw_step: &mut [f64],
    sites: &[Option<usize>],
    fogging: f64,
) -> Vec<(usize, f64)> {
    let mut fogged = Vec::new();
    for l in sites.iter().filter_map(|s| *s) {
        let removed = dhw_step[l] * fogging;
        dhw_step[l] -= removed;
        fogged.push((l, removed));
    }
    fogged
}

/// Bleaching survival per (bin, location) from the adjusted DHW.
///
/// Gompertz kernel with negated shape parameters: survival approaches 1 at
/// zero stress and 0 as effective DHW grows. Per-bin bleach resistance
/// attenuates the stress and adaptation `ad` is subtracted from it.
pub fn bleaching_survival(
    out: &mut Array2<f64>,
    dhw_adj: &[f64],
    domain: &Domain,
    ad: f64,
) {
    let p1 = domain.sim.gompertz_p1;
    let p2 = domain.sim.gompertz_p2;
    for s in 0..N_BINS {
        let resist = domain.species[s].bleach_resistance;
        for (l, &dhw) in dhw_adj.iter().enumerate() {
            let z = (dhw * (1.0 - resist) - ad).max(0.0);
            let surv = 1.0 - (-p1 * (-p2 * z).exp()).exp();
            out[[s, l]] = surv.clamp(0.0, 1.0);
        }
    }
}

/// Wave-damage survival per (bin, location): the 90th-percentile mortality
/// coefficient scaled by the wave stress, clamped into [0, 1].
pub fn wave_survival(out: &mut Array2<f64>, wave: &[f64], domain: &Domain) {
    for s in 0..N_BINS {
        let m90 = domain.species[s].wave_mortality_90;
        for (l, &w) in wave.iter().enumerate() {
            out[[s, l]] = 1.0 - (m90 * w).clamp(0.0, 1.0);
        }
    }
}
