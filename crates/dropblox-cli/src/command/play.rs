use std::path::PathBuf;

use anyhow::Context as _;
use dropblox_agent::{CancellationToken, Chromosome, LocalTrialRunner, TrialLimits};
use dropblox_engine::BoardSeed;

use super::{AgentArg, LimitsArg};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct PlayArg {
    /// Board seed; random when omitted
    #[arg(long)]
    seed: Option<BoardSeed>,
    /// Weight file passed to the agent every turn
    #[arg(long)]
    weights: Option<PathBuf>,
    #[clap(flatten)]
    pub(super) agent: AgentArg,
    #[clap(flatten)]
    limits: LimitsArg,
}

pub(crate) fn run(arg: &PlayArg) -> anyhow::Result<()> {
    let PlayArg {
        seed,
        weights,
        agent,
        limits: limits_arg,
    } = arg;

    let agent = agent.to_agent().context("--agent is required")?;
    if let Some(path) = weights {
        let chromosome = Chromosome::read_file(path)
            .with_context(|| format!("Failed to load weights: {}", path.display()))?;
        tracing::debug!(%chromosome, "loaded weights");
    }
    let mut limits = TrialLimits::default();
    limits_arg.apply(&mut limits);
    limits.validate()?;

    let seed = seed.unwrap_or_else(rand::random);
    tracing::info!(%seed, "starting game");

    let runner = LocalTrialRunner::new(agent, limits);
    let outcome = runner.play(seed, weights.as_deref(), &CancellationToken::new())?;
    tracing::info!(end = ?outcome.end, "game finished");

    println!("RESULTS: {}", outcome.score);
    println!("RESULTS_TIME: {}", outcome.turns);
    Ok(())
}
