//! Generation log: one JSON-encoded [`GenerationReport`] per line.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead as _, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use crate::{
    ReadLogError,
    harness::{GenerationReport, ScoredChromosome},
};

#[derive(Debug)]
pub struct GenerationLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl GenerationLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn append<P>(path: P) -> io::Result<Self>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, report: &GenerationReport) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Reads every report of a generation log. Blank lines are skipped.
pub fn read_reports<P>(path: P) -> Result<Vec<GenerationReport>, ReadLogError>
where
    P: AsRef<Path>,
{
    let reader = BufReader::new(File::open(path)?);
    let mut reports = vec![];
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let report = serde_json::from_str(&line).map_err(|source| ReadLogError::Parse {
            line: index + 1,
            source,
        })?;
        reports.push(report);
    }
    Ok(reports)
}

/// Finds the chromosome with the highest average score over all logged generations.
///
/// Returns the generation it was scored in along with the entry. Earlier
/// generations win ties.
#[must_use]
pub fn best_logged(reports: &[GenerationReport]) -> Option<(usize, &ScoredChromosome)> {
    reports
        .iter()
        .flat_map(|report| report.table.iter().map(|entry| (report.generation, entry)))
        .reduce(|best, candidate| {
            if candidate.1.average > best.1.average {
                candidate
            } else {
                best
            }
        })
}
