//! Per-scenario result assembly: dense trajectory arrays, sparse
//! deployment logs and the ranking log, plus the epsilon quantization
//! applied before storage.

use ndarray::{Array3, Array4};

/// One sparse (time, location, replicate) -> value log. Fog and shade
/// deployments touch a handful of cells per year, so triples beat dense
/// T x N x R arrays by orders of magnitude.
#[derive(Debug, Clone, Default)]
pub struct SparseLog {
    entries: Vec<SparseEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub t: u32,
    pub loc: u32,
    pub rep: u32,
    pub value: f64,
}

impl SparseLog {
    pub fn push(&mut self, t: usize, loc: usize, rep: usize, value: f64) {
        self.entries.push(SparseEntry {
            t: t as u32,
            loc: loc as u32,
            rep: rep as u32,
            value,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &SparseEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose magnitude falls below `eps`.
    pub fn quantize(&mut self, eps: f64) {
        self.entries.retain(|e| e.value.abs() >= eps);
    }

    /// Materialize the dense T x N x R array.
    pub fn to_dense(&self, t: usize, n_loc: usize, reps: usize) -> Array3<f64> {
        let mut dense = Array3::zeros((t, n_loc, reps));
        for e in &self.entries {
            dense[[e.t as usize, e.loc as usize, e.rep as usize]] += e.value;
        }
        dense
    }
}

/// Everything one scenario writes to the result store.
pub struct ScenarioResult {
    /// Raw cover, T x 36 x N x R.
    pub cover: Array4<f64>,
    /// Out-planted cover per enhanced taxon, T x 2 x N x R.
    pub seed_log: Array4<f64>,
    /// DHW removed by fogging.
    pub fog_log: SparseLog,
    /// DHW removed by shading.
    pub shade_log: SparseLog,
    /// Mean-over-replicates ranking log, T x N x 2 (seed, shade);
    /// 0 means "not considered".
    pub site_ranks: Array3<f64>,
    /// Set when a scenario-fatal error left this result partial.
    pub failed: bool,
}

impl ScenarioResult {
    pub fn new(horizon: usize, n_bins: usize, n_loc: usize, reps: usize) -> Self {
        Self {
            cover: Array4::zeros((horizon, n_bins, n_loc, reps)),
            seed_log: Array4::zeros((horizon, 2, n_loc, reps)),
            fog_log: SparseLog::default(),
            shade_log: SparseLog::default(),
            site_ranks: Array3::zeros((horizon, n_loc, 2)),
            failed: false,
        }
    }

    /// Zero every stored value below `eps` to aid sparse persistence.
    pub fn quantize(&mut self, eps: f64) {
        for v in self.cover.iter_mut() {
            if v.abs() < eps {
                *v = 0.0;
            }
        }
        for v in self.seed_log.iter_mut() {
            if v.abs() < eps {
                *v = 0.0;
            }
        }
        self.fog_log.quantize(eps);
        self.shade_log.quantize(eps);
    }
}

/// Batch output, partitioned by scenario ordinal; writers never overlap.
pub struct ResultStore {
    pub scenarios: Vec<ScenarioResult>,
}

impl ResultStore {
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
