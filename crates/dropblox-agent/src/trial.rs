use std::{
    ffi::OsString,
    io::Read as _,
    path::Path,
    process::{Command as Process, Stdio},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use dropblox_engine::{Board, BlockCatalog, BoardSeed};
use serde::{Deserialize, Serialize};

use crate::{Agent, CancellationToken, Chromosome, TrialError};

/// Wall-clock budget of one game.
pub const DEFAULT_GAME_BUDGET_SECS: f64 = 300.0;

/// Why a trial stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum TrialEnd {
    /// The board topped out.
    GameOver,
    TimeBudgetExhausted,
    TurnLimit,
    Cancelled,
    /// The trial could not be run; scored as zero.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub score: u64,
    pub turns: usize,
    pub end: TrialEnd,
}

impl TrialOutcome {
    /// Outcome recorded for a trial that crashed or produced no result.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            score: 0,
            turns: 0,
            end: TrialEnd::Aborted,
        }
    }
}

/// Resource limits of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialLimits {
    /// Total agent time allowed for one game, in seconds.
    pub game_budget_secs: f64,
    /// Upper bound of a single agent invocation, in seconds.
    pub turn_timeout_secs: Option<f64>,
    /// Stop after this many turns.
    pub max_turns: Option<usize>,
}

impl Default for TrialLimits {
    fn default() -> Self {
        Self {
            game_budget_secs: DEFAULT_GAME_BUDGET_SECS,
            turn_timeout_secs: None,
            max_turns: None,
        }
    }
}

impl TrialLimits {
    pub fn validate(&self) -> Result<(), TrialError> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !finite_non_negative(self.game_budget_secs) {
            return Err(TrialError::InvalidLimits {
                field: "game_budget_secs",
                reason: "must be a finite, non-negative number",
            });
        }
        if self
            .turn_timeout_secs
            .is_some_and(|v| !finite_non_negative(v))
        {
            return Err(TrialError::InvalidLimits {
                field: "turn_timeout_secs",
                reason: "must be a finite, non-negative number",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn game_budget(&self) -> Duration {
        secs(self.game_budget_secs)
    }

    #[must_use]
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Plays one game with a chromosome on a seeded board and reports the result.
///
/// Implementations must not fail: errors are logged and reported as
/// [`TrialOutcome::zero`].
pub trait TrialRunner: Send + Sync {
    fn run_trial(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> TrialOutcome;
}

impl<T> TrialRunner for &T
where
    T: TrialRunner + ?Sized,
{
    fn run_trial(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> TrialOutcome {
        (**self).run_trial(chromosome, seed, cancel)
    }
}

impl<T> TrialRunner for Box<T>
where
    T: TrialRunner + ?Sized,
{
    fn run_trial(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> TrialOutcome {
        (**self).run_trial(chromosome, seed, cancel)
    }
}

fn outcome_or_zero(seed: BoardSeed, result: Result<TrialOutcome, TrialError>) -> TrialOutcome {
    result.unwrap_or_else(|err| {
        tracing::warn!(%seed, %err, "trial failed, scoring zero");
        TrialOutcome::zero()
    })
}

/// Plays games in-process, asking the agent for each turn's moves.
#[derive(Debug, Clone)]
pub struct LocalTrialRunner {
    agent: Agent,
    limits: TrialLimits,
    catalog: Arc<BlockCatalog>,
}

impl LocalTrialRunner {
    #[must_use]
    pub fn new(agent: Agent, limits: TrialLimits) -> Self {
        Self::with_catalog(agent, limits, BlockCatalog::standard())
    }

    #[must_use]
    pub fn with_catalog(agent: Agent, limits: TrialLimits, catalog: Arc<BlockCatalog>) -> Self {
        Self {
            agent,
            limits,
            catalog,
        }
    }

    #[must_use]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    #[must_use]
    pub fn limits(&self) -> &TrialLimits {
        &self.limits
    }

    /// Plays one game from `seed`, passing `weights` through to the agent.
    pub fn play(
        &self,
        seed: BoardSeed,
        weights: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<TrialOutcome, TrialError> {
        let mut board = Board::with_catalog(seed, Arc::clone(&self.catalog));
        self.play_board(&mut board, weights, cancel)
    }

    fn play_board(
        &self,
        board: &mut Board,
        weights: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<TrialOutcome, TrialError> {
        let started = Instant::now();
        let budget = self.limits.game_budget();
        let mut turns = 0;
        let end = loop {
            if board.state().is_failed() {
                break TrialEnd::GameOver;
            }
            if cancel.is_cancelled() {
                break TrialEnd::Cancelled;
            }
            if self.limits.max_turns.is_some_and(|max| turns >= max) {
                break TrialEnd::TurnLimit;
            }
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break TrialEnd::TimeBudgetExhausted;
            }

            let timeout = [self.limits.turn_timeout(), cancel.remaining()]
                .into_iter()
                .flatten()
                .fold(remaining, Duration::min);
            let snapshot = board.snapshot();
            let reply = self
                .agent
                .request(&snapshot, remaining.as_secs_f64(), weights, timeout)?;
            let report = board.send_commands(reply.commands);
            turns += 1;
            tracing::debug!(
                turn = turns,
                score = board.score(),
                discarded = report.discarded.len(),
                invalid = reply.invalid_lines.len(),
                "turn played"
            );
        };

        let outcome = TrialOutcome {
            score: board.score(),
            turns,
            end,
        };
        tracing::debug!(?outcome, "game finished");
        Ok(outcome)
    }
}

impl TrialRunner for LocalTrialRunner {
    fn run_trial(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> TrialOutcome {
        let result = chromosome
            .write_to_tempfile()
            .map_err(TrialError::WeightsFile)
            .and_then(|file| self.play(seed, Some(file.path()), cancel));
        outcome_or_zero(seed, result)
    }
}

/// Runs each trial through an external client program.
///
/// The client is started as
///
/// ```text
/// program [args..] --seed <seed> --weights <weight-file>
/// ```
///
/// which matches `dropblox play`. Its stdout must contain a `RESULTS: <score>` line
/// and may contain a `RESULTS_TIME: <turns>` line.
#[derive(Debug, Clone)]
pub struct ClientTrialRunner {
    program: OsString,
    args: Vec<OsString>,
    limits: TrialLimits,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl ClientTrialRunner {
    pub fn new<S, I, A>(program: S, args: I, limits: TrialLimits) -> Self
    where
        S: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            limits,
        }
    }

    fn try_run(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> Result<TrialOutcome, TrialError> {
        let weights = chromosome
            .write_to_tempfile()
            .map_err(TrialError::WeightsFile)?;
        let mut child = Process::new(&self.program)
            .args(&self.args)
            .arg("--seed")
            .arg(seed.to_string())
            .arg("--weights")
            .arg(weights.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(TrialError::Client)?;

        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut output = Vec::new();
                let read = stdout
                    .read_to_end(&mut output)
                    .map(|_| String::from_utf8_lossy(&output).into_owned());
                tx.send(read).ok();
            });
        }

        let deadline = Instant::now() + self.limits.game_budget();
        let output = loop {
            if cancel.is_cancelled() {
                break Err(TrialEnd::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(TrialEnd::TimeBudgetExhausted);
            }
            match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(read) => break Ok(read),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break Ok(Ok(String::new())),
            }
        };

        child.kill().ok();
        child.wait().map_err(TrialError::Client)?;

        match output {
            Ok(read) => {
                let output = read.map_err(TrialError::Client)?;
                let (score, turns) = parse_results(&output).ok_or(TrialError::MissingResults)?;
                Ok(TrialOutcome {
                    score,
                    turns: turns.unwrap_or(0),
                    end: TrialEnd::GameOver,
                })
            }
            Err(end) => {
                tracing::warn!(%seed, ?end, "client trial stopped early");
                Ok(TrialOutcome {
                    score: 0,
                    turns: 0,
                    end,
                })
            }
        }
    }
}

impl TrialRunner for ClientTrialRunner {
    fn run_trial(
        &self,
        chromosome: &Chromosome,
        seed: BoardSeed,
        cancel: &CancellationToken,
    ) -> TrialOutcome {
        outcome_or_zero(seed, self.try_run(chromosome, seed, cancel))
    }
}

/// Extracts the score and, if present, the turn count from client output.
fn parse_results(output: &str) -> Option<(u64, Option<usize>)> {
    let field = |prefix: &str| {
        output.lines().find_map(|line| {
            let rest = line.trim().strip_prefix(prefix)?;
            rest.trim().parse::<u64>().ok()
        })
    };
    let score = field("RESULTS:")?;
    let turns = field("RESULTS_TIME:").and_then(|t| usize::try_from(t).ok());
    Some((score, turns))
}
