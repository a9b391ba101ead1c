//! Static world description: reef locations, larval connectivity, pairwise
//! distances and simulation constants.
//!
//! A `Domain` is constructed once, validated eagerly, and shared read-only
//! across all scenario workers. Every matrix dimension in the engine is
//! keyed by the location index in `locations`.

pub mod species;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{ReefError, Result};
use species::{SpeciesParams, N_BINS};

/// One reef polygon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub site_id: String,
    pub unique_id: String,
    /// Polygon area [m^2].
    pub area_m2: f64,
    /// Median depth [m], positive downward.
    pub depth_med: f64,
    /// Carrying-capacity fraction in [0, 1]: the share of the polygon that
    /// coral cover may occupy.
    pub k: f64,
    /// Centroid (lon, lat) in degrees.
    pub centroid: (f64, f64),
}

/// Simulation constants shared by every scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConstants {
    /// Horizon T [years].
    pub horizon_years: usize,
    /// Number of sites selected per intervention event.
    pub n_site_int: usize,
    /// Cover established per settled larva per m^2 of reef: settler basal
    /// area scaled by early post-settlement survival.
    pub potential_settler_cover: f64,
    /// Larval-production Gompertz coefficient on DHW.
    pub lp_dhw_coeff: f64,
    /// DHW magnitude at which adaptation saturates.
    pub dhw_max_tot: f64,
    /// Larval-production Gompertz location parameter.
    pub lp_prm2: f64,
    /// Bleaching Gompertz shape p1 (used negated in the kernel).
    pub gompertz_p1: f64,
    /// Bleaching Gompertz shape p2 (used negated in the kernel).
    pub gompertz_p2: f64,
}

impl Default for SimConstants {
    fn default() -> Self {
        Self {
            horizon_years: 74,
            n_site_int: 5,
            potential_settler_cover: 5e-6,
            lp_dhw_coeff: 0.4,
            dhw_max_tot: 50.0,
            lp_prm2: 5.0,
            gompertz_p1: 6.0,
            gompertz_p2: 0.40,
        }
    }
}

/// The static world: locations, connectivity, derived spatial structure and
/// the species table. Read-only for the life of a batch.
pub struct Domain {
    pub locations: Vec<Location>,
    /// Row-stochastic larval transition matrix: `conn[[src, dst]]` is the
    /// probability that a larva exported from `src` settles at `dst`.
    /// Rows sum to at most 1 (losses to open water make up the remainder).
    pub conn: Array2<f64>,
    /// Pairwise great-circle distances between centroids [m].
    pub dist: Array2<f64>,
    /// Per-location connectivity rank scalar in [0, 1] (rank-normalized
    /// mean of in- and out-strength).
    pub conn_rank: Vec<f64>,
    /// For each location, the source contributing the largest inflow.
    pub strongest_pred: Vec<usize>,
    /// Total larval inflow strength per location (column sums of `conn`).
    pub in_strength: Vec<f64>,
    /// Total larval outflow strength per location (row sums of `conn`).
    pub out_strength: Vec<f64>,
    /// Fraction of locations for which each location is the strongest
    /// predecessor; the seed-priority signal.
    pub pred_frac: Vec<f64>,
    /// 36-bin species parameter table.
    pub species: Vec<SpeciesParams>,
    pub sim: SimConstants,
}

impl Domain {
    /// Validate inputs and derive the spatial structure. Shape errors here
    /// are fatal for the whole batch.
    pub fn new(
        locations: Vec<Location>,
        conn: Array2<f64>,
        species: Vec<SpeciesParams>,
        sim: SimConstants,
    ) -> Result<Self> {
        let n = locations.len();
        if n == 0 {
            return Err(ReefError::ShapeMismatch {
                context: "location table",
                expected: "at least one location".into(),
                actual: "0 locations".into(),
            });
        }
        if conn.shape() != [n, n] {
            return Err(ReefError::ShapeMismatch {
                context: "connectivity matrix",
                expected: format!("{n}x{n}"),
                actual: format!("{}x{}", conn.shape()[0], conn.shape()[1]),
            });
        }
        if species.len() != N_BINS {
            return Err(ReefError::ShapeMismatch {
                context: "species table",
                expected: format!("{N_BINS} bins"),
                actual: format!("{} bins", species.len()),
            });
        }
        for (i, loc) in locations.iter().enumerate() {
            if !(0.0..=1.0).contains(&loc.k) || loc.area_m2 <= 0.0 {
                return Err(ReefError::ShapeMismatch {
                    context: "location attributes",
                    expected: "k in [0,1] and area > 0".into(),
                    actual: format!("site {i}: k={}, area={}", loc.k, loc.area_m2),
                });
            }
        }
        for (i, row) in conn.rows().into_iter().enumerate() {
            let sum: f64 = row.sum();
            if sum > 1.0 + 1e-9 || row.iter().any(|v| *v < 0.0 || !v.is_finite()) {
                return Err(ReefError::ShapeMismatch {
                    context: "connectivity matrix rows",
                    expected: "non-negative entries, row sum <= 1".into(),
                    actual: format!("row {i} sums to {sum}"),
                });
            }
        }

        let dist = pairwise_distances(&locations);
        let in_strength: Vec<f64> = (0..n).map(|l| conn.column(l).sum()).collect();
        let out_strength: Vec<f64> = (0..n).map(|l| conn.row(l).sum()).collect();
        let conn_rank = rank_normalize(&combined_strength(&in_strength, &out_strength));

        // Strongest predecessor: the source with the largest entry in this
        // location's inflow column. Self-seeding is excluded.
        let strongest_pred: Vec<usize> = (0..n)
            .map(|dst| {
                let mut best = 0usize;
                let mut best_val = f64::NEG_INFINITY;
                for src in 0..n {
                    if src == dst {
                        continue;
                    }
                    let v = conn[[src, dst]];
                    if v > best_val {
                        best_val = v;
                        best = src;
                    }
                }
                best
            })
            .collect();

        let mut pred_counts = vec![0usize; n];
        for &src in &strongest_pred {
            pred_counts[src] += 1;
        }
        let max_count = pred_counts.iter().copied().max().unwrap_or(0).max(1);
        let pred_frac: Vec<f64> = pred_counts
            .iter()
            .map(|&c| c as f64 / max_count as f64)
            .collect();

        Ok(Self {
            locations,
            conn,
            dist,
            conn_rank,
            strongest_pred,
            in_strength,
            out_strength,
            pred_frac,
            species,
            sim,
        })
    }

    #[inline]
    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }

    /// Median of the strict upper triangle of the distance matrix.
    pub fn median_pairwise_distance(&self) -> f64 {
        let n = self.n_locations();
        let mut d: Vec<f64> = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            for j in i + 1..n {
                d.push(self.dist[[i, j]]);
            }
        }
        if d.is_empty() {
            return 0.0;
        }
        d.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = d.len() / 2;
        if d.len() % 2 == 0 {
            0.5 * (d[mid - 1] + d[mid])
        } else {
            d[mid]
        }
    }
}

/// Climate forcing shared across scenarios: degree-heating weeks and wave
/// stress, shaped T x N_loc x R.
pub struct ClimateForcing {
    pub dhw: Array3<f64>,
    pub wave: Array3<f64>,
}

impl ClimateForcing {
    pub fn new(dhw: Array3<f64>, wave: Array3<f64>, domain: &Domain) -> Result<Self> {
        let t = domain.sim.horizon_years;
        let n = domain.n_locations();
        for (name, arr) in [("dhw array", &dhw), ("wave array", &wave)] {
            let shape = arr.shape();
            if shape[0] != t || shape[1] != n || shape[2] == 0 {
                return Err(ReefError::ShapeMismatch {
                    context: name,
                    expected: format!("{t}x{n}xR (R >= 1)"),
                    actual: format!("{}x{}x{}", shape[0], shape[1], shape[2]),
                });
            }
        }
        if dhw.shape()[2] != wave.shape()[2] {
            return Err(ReefError::ShapeMismatch {
                context: "forcing replicates",
                expected: format!("{} replicates in both arrays", dhw.shape()[2]),
                actual: format!("{} wave replicates", wave.shape()[2]),
            });
        }
        Ok(Self { dhw, wave })
    }

    #[inline]
    pub fn n_reps(&self) -> usize {
        self.dhw.shape()[2]
    }
}

/// Great-circle distance matrix over location centroids [m].
fn pairwise_distances(locations: &[Location]) -> Array2<f64> {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let n = locations.len();
    let mut dist = Array2::zeros((n, n));
    for i in 0..n {
        let (lon_i, lat_i) = locations[i].centroid;
        for j in i + 1..n {
            let (lon_j, lat_j) = locations[j].centroid;
            let d_lat = (lat_j - lat_i).to_radians();
            let d_lon = (lon_j - lon_i).to_radians();
            let a = (d_lat / 2.0).sin().powi(2)
                + lat_i.to_radians().cos() * lat_j.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
            let d = 2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin();
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}

fn combined_strength(in_s: &[f64], out_s: &[f64]) -> Vec<f64> {
    in_s.iter()
        .zip(out_s)
        .map(|(a, b)| 0.5 * (a + b))
        .collect()
}

/// Map values to their rank position scaled into [0, 1]; tied values keep
/// their index order. A single location maps to 1.
fn rank_normalize(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 1 {
        return vec![1.0];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
    let mut ranks = vec![0.0; n];
    for (pos, &idx) in order.iter().enumerate() {
        ranks[idx] = pos as f64 / (n - 1) as f64;
    }
    ranks
}
