use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use dropblox_agent::{Agent, TrialLimits};
use tracing_subscriber::EnvFilter;

use self::{best::BestArg, play::PlayArg, train::TrainArg};

mod best;
mod play;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Evolve agent weights with the genetic search
    Train(#[clap(flatten)] TrainArg),
    /// Play one game against the agent and print `RESULTS:` lines
    Play(#[clap(flatten)] PlayArg),
    /// Print the best chromosome found in a generation log
    Best(#[clap(flatten)] BestArg),
}

/// The move-choosing program and its fixed leading arguments.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct AgentArg {
    /// Agent program run once per turn
    #[arg(long)]
    agent: Option<PathBuf>,
    /// Extra argument passed to the agent before the game state (repeatable)
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    agent_args: Vec<String>,
}

impl AgentArg {
    pub(crate) fn to_agent(&self) -> Option<Agent> {
        let program = self.agent.as_ref()?;
        Some(Agent::new(program).with_args(&self.agent_args))
    }
}

/// Overrides of [`TrialLimits`].
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct LimitsArg {
    /// Agent time budget of one game, in seconds
    #[arg(long)]
    game_budget: Option<f64>,
    /// Cap of a single agent invocation, in seconds
    #[arg(long)]
    turn_timeout: Option<f64>,
    /// Stop a game after this many turns
    #[arg(long)]
    max_turns: Option<usize>,
}

impl LimitsArg {
    pub(crate) fn apply(&self, limits: &mut TrialLimits) {
        let Self {
            game_budget,
            turn_timeout,
            max_turns,
        } = self;
        if let Some(v) = game_budget {
            limits.game_budget_secs = *v;
        }
        if turn_timeout.is_some() {
            limits.turn_timeout_secs = *turn_timeout;
        }
        if max_turns.is_some() {
            limits.max_turns = *max_turns;
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Play(arg) => play::run(&arg)?,
        Mode::Best(arg) => best::run(&arg)?,
    }
    Ok(())
}

/// Logs go to stderr; stdout is reserved for results.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
