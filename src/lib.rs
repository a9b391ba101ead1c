//! reefwise: Monte Carlo decision support for coral reef restoration.
//!
//! For each sampled scenario (climate forcing, intervention parameters and
//! multi-criteria decision weights) the engine simulates coral population
//! dynamics over a multi-decade horizon at hundreds of reef locations,
//! periodically choosing where to deploy interventions (out-planting,
//! shading, fogging) with a guided or random site-selection policy, and
//! accumulates per-scenario trajectories plus deployment logs. A scenario
//! ensemble feeds the PAWN / RSA / outcome-mapping sensitivity procedures.
//!
//! The main entry points are [`runner::batch::run_scenarios`] for a full
//! batch and [`runner::batch::rank_locations`] for a one-off selection
//! surface; [`sensitivity`] operates on the resulting ensemble.

pub mod dmcda;
pub mod domain;
pub mod ecosystem;
pub mod error;
pub mod integrators;
pub mod results;
pub mod runner;
pub mod scenario;
pub mod sensitivity;

pub use dmcda::rankers::{RankAlg, SelectionPolicy};
pub use dmcda::selector::{Selection, SiteSelector};
pub use domain::{ClimateForcing, Domain, Location, SimConstants};
pub use error::{ReefError, Result};
pub use integrators::{CoralGrowth, GrowthModel};
pub use results::{ResultStore, ScenarioResult};
pub use runner::batch::{rank_locations, run_scenarios};
pub use runner::{run_scenario, RunConfig};
pub use scenario::{CriteriaWeights, ScenarioParams, SpreadParams};
