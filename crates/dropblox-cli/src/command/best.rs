use std::path::PathBuf;

use anyhow::Context as _;
use dropblox_training::log;

use crate::util;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct BestArg {
    /// Generation log written by `train --log`
    log: PathBuf,
    /// Write the best weights to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &BestArg) -> anyhow::Result<()> {
    let BestArg { log: log_path, output } = arg;

    let reports = log::read_reports(log_path)
        .with_context(|| format!("Failed to read generation log: {}", log_path.display()))?;
    let (generation, best) = log::best_logged(&reports)
        .with_context(|| format!("No scored chromosomes in {}", log_path.display()))?;
    tracing::info!(generation, score = best.score, "best chromosome");

    util::write_chromosome(output.as_deref(), &best.chromosome)?;
    println!("AVG SCORE: {}", best.average);
    Ok(())
}
