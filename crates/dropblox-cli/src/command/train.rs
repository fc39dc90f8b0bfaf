use std::path::PathBuf;

use anyhow::{Context as _, bail};
use dropblox_agent::{Chromosome, ClientTrialRunner, LocalTrialRunner, TrialLimits, TrialRunner};
use dropblox_training::{
    harness::{Harness, HarnessParams},
    log::GenerationLog,
};
use serde::{Deserialize, Serialize};

use super::{AgentArg, LimitsArg};
use crate::util;

/// Contents of a `--config` file. Every section and field is optional.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct TrainConfig {
    pub(crate) harness: HarnessParams,
    pub(crate) limits: TrialLimits,
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Search configuration file (JSON); flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of chromosomes per generation (a multiple of 4)
    #[arg(long)]
    population_size: Option<usize>,
    /// Games per chromosome per generation
    #[arg(long)]
    trials: Option<usize>,
    /// Stop once the best average score per game exceeds this
    #[arg(long)]
    target: Option<f64>,
    /// Stop after this many generations
    #[arg(long)]
    max_generations: Option<usize>,
    /// Number of concurrent trials
    #[arg(long)]
    workers: Option<usize>,
    /// Seed of the search RNG
    #[arg(long)]
    rng_seed: Option<u64>,
    /// Weight file the first population is drawn around
    #[arg(long)]
    initial_weights: Option<PathBuf>,
    /// Append a JSON record per generation to this file
    #[arg(long)]
    log: Option<PathBuf>,
    /// Write the final best weights to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    /// Run each trial through this client program (`<client> --seed N --weights FILE`)
    #[arg(long, conflicts_with = "agent")]
    client: Option<PathBuf>,
    /// Extra argument passed to the client before `--seed` (repeatable)
    #[arg(long = "client-arg", allow_hyphen_values = true)]
    client_args: Vec<String>,
    #[clap(flatten)]
    agent: AgentArg,
    #[clap(flatten)]
    limits: LimitsArg,
}

impl TrainArg {
    fn load_config(&self) -> anyhow::Result<TrainConfig> {
        let mut config: TrainConfig = match &self.config {
            Some(path) => util::read_json_file("training config", path)?,
            None => TrainConfig::default(),
        };
        let harness = &mut config.harness;
        if let Some(v) = self.population_size {
            harness.population_size = v;
        }
        if let Some(v) = self.trials {
            harness.trials_per_chromosome = v;
        }
        if let Some(v) = self.target {
            harness.target_average_score = v;
        }
        if self.max_generations.is_some() {
            harness.max_generations = self.max_generations;
        }
        if self.workers.is_some() {
            harness.workers = self.workers;
        }
        if self.rng_seed.is_some() {
            harness.rng_seed = self.rng_seed;
        }
        self.limits.apply(&mut config.limits);
        Ok(config)
    }

    fn runner(&self, limits: TrialLimits) -> anyhow::Result<Box<dyn TrialRunner>> {
        if let Some(client) = &self.client {
            return Ok(Box::new(ClientTrialRunner::new(
                client,
                &self.client_args,
                limits,
            )));
        }
        let Some(agent) = self.agent.to_agent() else {
            bail!("either --agent or --client is required");
        };
        Ok(Box::new(LocalTrialRunner::new(agent, limits)))
    }
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainConfig { harness: params, limits } = arg.load_config()?;
    limits.validate()?;
    let center = match &arg.initial_weights {
        Some(path) => Chromosome::read_file(path)
            .with_context(|| format!("Failed to load initial weights: {}", path.display()))?,
        None => Chromosome::default_seed(),
    };
    let runner = arg.runner(limits)?;

    tracing::info!(
        population = params.population_size,
        trials = params.trials_per_chromosome,
        target = params.target_average_score,
        "starting weight search"
    );
    let mut harness = Harness::with_center(runner, params, &center)?;

    let mut log = arg
        .log
        .as_ref()
        .map(|path| {
            GenerationLog::append(path)
                .with_context(|| format!("Failed to open generation log: {}", path.display()))
        })
        .transpose()?;

    let last = harness.run(|report| {
        for (rank, entry) in report.table.iter().enumerate() {
            tracing::debug!(rank, score = entry.score, chromosome = ?entry.chromosome);
        }
        if let Some(log) = &mut log {
            log.write(report)?;
        }
        Ok(())
    })?;

    let Some(best) = last.best() else {
        bail!("search finished without scoring any chromosome");
    };
    tracing::info!(
        generation = last.generation,
        average = best.average,
        "search finished"
    );
    util::write_chromosome(arg.output.as_deref(), &best.chromosome)?;
    println!("AVG SCORE: {}", best.average);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser as _;

    use super::*;
    use crate::command::{CommandArgs, Mode};

    fn parse(args: &[&str]) -> TrainArg {
        let args = CommandArgs::try_parse_from(["dropblox", "train"].iter().chain(args)).unwrap();
        let Mode::Train(arg) = args.mode else {
            panic!("expected train mode");
        };
        arg
    }

    #[test]
    fn test_defaults_without_config() {
        let config = parse(&["--agent", "./ai"]).load_config().unwrap();
        assert_eq!(config, TrainConfig::default());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(
            &path,
            r#"{"harness": {"population_size": 8, "trials_per_chromosome": 2, "jitter_sigma": 0.5},
                "limits": {"game_budget_secs": 60}}"#,
        )
        .unwrap();
        let config = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--trials",
            "3",
            "--max-turns",
            "100",
            "--agent",
            "./ai",
        ])
        .load_config()
        .unwrap();
        assert_eq!(config.harness.population_size, 8);
        assert_eq!(config.harness.trials_per_chromosome, 3);
        assert_eq!(config.harness.jitter_sigma, 0.5);
        assert_eq!(config.harness.max_seed, 1024);
        assert_eq!(config.limits.game_budget_secs, 60.0);
        assert_eq!(config.limits.max_turns, Some(100));
    }

    #[test]
    fn test_runner_requires_agent_or_client() {
        let arg = parse(&[]);
        assert!(arg.runner(TrialLimits::default()).is_err());
        assert!(
            parse(&["--client", "./dropblox", "--client-arg", "play"])
                .runner(TrialLimits::default())
                .is_ok()
        );
    }

    #[test]
    fn test_agent_and_client_conflict() {
        let result = CommandArgs::try_parse_from([
            "dropblox", "train", "--agent", "./ai", "--client", "./dropblox",
        ]);
        assert!(result.is_err());
    }
}
