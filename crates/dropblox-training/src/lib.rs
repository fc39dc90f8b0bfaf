//! Evolutionary search for agent weight vectors.
//!
//! The search treats full games as a black-box fitness function: every chromosome of
//! the population plays a few seeded games through a
//! [`TrialRunner`](dropblox_agent::TrialRunner), and the summed scores drive selection.
//!
//! # Architecture
//!
//! ```text
//! Harness
//!     ↓ chromosome + seed (rayon pool)
//! TrialRunner (dropblox-agent)
//!     ↓ game state / move tokens
//! Board (dropblox-engine)
//!     ↓ final score
//! Harness: aggregate → select → reproduce
//! ```
//!
//! - [`harness`] - Generation loop, parameters and per-generation reports
//! - [`genetic`] - Selection, crossover and mutation operators
//! - [`stats`] - Fitness summary statistics
//! - [`log`] - JSON-lines generation log and best-chromosome lookup
//!
//! # Example
//!
//! ```rust,no_run
//! use dropblox_agent::{Agent, LocalTrialRunner, TrialLimits};
//! use dropblox_training::harness::{Harness, HarnessParams};
//!
//! let runner = LocalTrialRunner::new(Agent::new("./my-agent"), TrialLimits::default());
//! let mut harness = Harness::new(runner, HarnessParams::default())?;
//! let last = harness.run(|report| {
//!     println!("generation {}: {:?}", report.generation, report.stats);
//!     Ok(())
//! })?;
//! println!("{}", last.table[0].chromosome);
//! # Ok::<(), dropblox_training::HarnessError>(())
//! ```

use std::io;

pub mod genetic;
pub mod harness;
pub mod log;
pub mod stats;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum HarnessError {
    #[display("population size must be a positive multiple of 4, got {_0}")]
    #[from(ignore)]
    InvalidPopulationSize(#[error(not(source))] usize),
    #[display("trials per chromosome must be at least 1")]
    #[from(ignore)]
    ZeroTrials,
    #[display("invalid parameter `{field}`: {reason}")]
    #[from(ignore)]
    InvalidParam {
        field: &'static str,
        reason: &'static str,
    },
    #[display("expected a population of {expected}, got {actual}")]
    #[from(ignore)]
    PopulationMismatch { expected: usize, actual: usize },
    #[display("failed to build thread pool: {_0}")]
    ThreadPool(rayon::ThreadPoolBuildError),
    #[display("failed to write generation log: {_0}")]
    Log(io::Error),
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ReadLogError {
    #[display("failed to read generation log: {_0}")]
    Io(io::Error),
    #[display("line {line}: invalid generation record: {source}")]
    #[from(ignore)]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}
