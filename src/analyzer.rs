// Picks the fastest configuration of a finished sweep and derives
// speedup and efficiency against the sequential baseline.

use serde::Serialize;

use crate::error::AnalysisError;
use crate::sweep::{Configuration, ResultSpace};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimalResult {
    pub configuration: Configuration,
    pub runtime: u64,
    pub baseline: u64,
    /// Ts/Tp, two decimals
    pub speedup: f64,
    /// speedup / threads, two decimals
    pub efficiency: f64,
}

/// Two decimals, rounding the exact binary value with ties to even:
/// 9/8 = 1.125 becomes 1.12, not 1.13.
pub fn round2(x: f64) -> f64 {
    format!("{:.2}", x).parse().unwrap_or(x)
}

/// Minimum runtime over the space; the earliest configuration wins a tie.
/// Efficiency is taken from the already-rounded speedup so the printed
/// equation `speedup/threads = efficiency` holds.
pub fn find_optimal(space: &ResultSpace, baseline: u64) -> Result<OptimalResult, AnalysisError> {
    let best = space
        .entries()
        .iter()
        .min_by_key(|e| e.runtime)
        .ok_or(AnalysisError::EmptyResult)?;

    if best.runtime == 0 {
        return Err(AnalysisError::ZeroRuntime(best.configuration.clone()));
    }

    let speedup = round2(baseline as f64 / best.runtime as f64);
    let efficiency = round2(speedup / best.configuration.threads as f64);

    Ok(OptimalResult {
        configuration: best.configuration.clone(),
        runtime: best.runtime,
        baseline,
        speedup,
        efficiency,
    })
}
