//! Bridge between the game engine and an external move-choosing agent.
//!
//! The agent is an opaque program. Every turn it is started with the serialized game
//! state, the seconds left in the game and, optionally, the path of a weight file. It
//! answers with one move token per line on stdout.
//!
//! - [`Chromosome`] / [`Feature`] - Weight vectors and their text file format
//! - [`Agent`] - Runs the agent program for one turn under a deadline
//! - [`TrialRunner`] - Plays a whole game for a chromosome and seed and reports the score
//!   - [`LocalTrialRunner`] drives a [`dropblox_engine::Board`] in-process
//!   - [`ClientTrialRunner`] runs an external client CLI and parses its `RESULTS:` line
//! - [`CancellationToken`] - Per-trial stop flag with an optional deadline
//!
//! Trials never fail: any adapter failure is logged and scored as zero.

use std::{io, num::ParseFloatError};

pub use self::{agent::*, cancel::*, trial::*, weights::*};

mod agent;
mod cancel;
mod trial;
mod weights;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown feature name: {name:?}")]
pub struct UnknownFeatureError {
    name: String,
}

impl UnknownFeatureError {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ParseWeightsError {
    #[display("line {line}: expected `<FEATURE_NAME> <value>`")]
    Malformed { line: usize },
    #[display("line {line}: {source}")]
    UnknownFeature {
        line: usize,
        source: UnknownFeatureError,
    },
    #[display("line {line}: invalid weight: {source}")]
    InvalidValue { line: usize, source: ParseFloatError },
    #[display("line {line}: duplicate feature {feature}")]
    DuplicateFeature { line: usize, feature: Feature },
}

impl ParseWeightsError {
    /// 1-based line number of the offending line.
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::Malformed { line }
            | Self::UnknownFeature { line, .. }
            | Self::InvalidValue { line, .. }
            | Self::DuplicateFeature { line, .. } => *line,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum WeightsFileError {
    #[display("failed to read weight file: {_0}")]
    Io(io::Error),
    #[display("invalid weight file: {_0}")]
    Parse(ParseWeightsError),
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AgentError {
    #[display("failed to serialize game state: {_0}")]
    Serialize(serde_json::Error),
    #[display("failed to start agent: {_0}")]
    Spawn(io::Error),
    #[display("agent stdout was not captured")]
    MissingStdout,
    #[display("failed to wait for agent: {_0}")]
    Wait(io::Error),
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrialError {
    #[display("failed to write weight file: {_0}")]
    WeightsFile(io::Error),
    #[display("{_0}")]
    #[from]
    Agent(AgentError),
    #[display("failed to run client: {_0}")]
    Client(io::Error),
    #[display("client output has no `RESULTS:` line")]
    MissingResults,
    #[display("invalid trial limit `{field}`: {reason}")]
    InvalidLimits {
        field: &'static str,
        reason: &'static str,
    },
}
