//! Batch runner: fetches one or more days of history for every configured
//! location and merges the results into the weather store.

pub mod cli;
pub mod report;
pub mod run;
pub mod scheduler;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use report::{LocationStatus, LocationTally, RunSummary, StatsReport};
pub use run::{store_daily, Pipeline, RunError, RunSettings};
