//! Spatial-spread constraint over a ranked site list.
//!
//! Re-ranks a preferred selection so that every chosen pair is at least
//! `d_min` apart, drawing replacements from the next `top_n` ranked sites.
//! Never fails: when the constraint cannot be satisfied the best-ranked
//! originals are restored and the outcome is flagged as degraded.

use ndarray::Array2;

/// Result of the spread filter.
pub struct SpreadOutcome {
    /// Exactly `min(n_int, ranked.len())` sites.
    pub sites: Vec<usize>,
    /// True when the constraint could not be satisfied and the selection
    /// fell back to proximity-violating originals.
    pub degraded: bool,
}

/// Indices within `pref` that sit closer than `d_min` to another member.
fn conflict_slots(pref: &[usize], dist: &Array2<f64>, d_min: f64) -> Vec<usize> {
    (0..pref.len())
        .filter(|&i| {
            (0..pref.len()).any(|j| i != j && dist[[pref[i], pref[j]]] < d_min)
        })
        .collect()
}

/// Enforce the minimum pairwise distance on the top of a ranked list.
///
/// `ranked` is the full ranker output, best first. The preferred set starts
/// as its top `n_int`; while any pair conflicts, the worst-ranked
/// conflicting slot is swapped for the next unused site among the following
/// `top_n`. On pool exhaustion the still-conflicting slots revert to the
/// highest-ranked unused originals.
pub fn enforce_min_distance(
    ranked: &[usize],
    n_int: usize,
    dist: &Array2<f64>,
    d_min: f64,
    top_n: usize,
) -> SpreadOutcome {
    let take = n_int.min(ranked.len());
    let mut pref: Vec<usize> = ranked[..take].to_vec();
    if take < 2 || d_min <= 0.0 {
        return SpreadOutcome {
            sites: pref,
            degraded: false,
        };
    }

    let mut alts = ranked[take..].iter().copied().take(top_n);
    loop {
        let conflicts = conflict_slots(&pref, dist, d_min);
        if conflicts.is_empty() {
            return SpreadOutcome {
                sites: pref,
                degraded: false,
            };
        }
        match alts.next() {
            Some(alt) => {
                // Swap out the worst-ranked offender first.
                let victim = *conflicts.last().unwrap();
                pref[victim] = alt;
            }
            None => {
                // Pool exhausted: restore best-ranked originals for the
                // slots still in conflict so the length stays n_int.
                for &slot in &conflicts {
                    if let Some(orig) = ranked.iter().copied().find(|s| !pref.contains(s)) {
                        pref[slot] = orig;
                    }
                }
                return SpreadOutcome {
                    sites: pref,
                    degraded: true,
                };
            }
        }
    }
}
