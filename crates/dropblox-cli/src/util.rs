use std::{
    fs,
    io::{self, Write as _},
    path::Path,
};

use anyhow::Context as _;
use dropblox_agent::Chromosome;
use serde::de::DeserializeOwned;

/// Writes `chromosome` in weight-file format to `path`, or to stdout when `None`.
pub fn write_chromosome(path: Option<&Path>, chromosome: &Chromosome) -> anyhow::Result<()> {
    match path {
        Some(path) => chromosome
            .write_file(path)
            .with_context(|| format!("Failed to write weights to {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{chromosome}")
                .and_then(|()| stdout.flush())
                .context("Failed to write weights to stdout")
        }
    }
}

pub fn read_json_file<T>(file_kind: &str, path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to open {file_kind} file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {file_kind} JSON file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_read_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"a": 1, "b": 2}"#).unwrap();
        let value: BTreeMap<String, u32> = read_json_file("config", &path).unwrap();
        assert_eq!(value["b"], 2);

        let missing = dir.path().join("x.json");
        let err = read_json_file::<BTreeMap<String, u32>>("config", &missing).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Failed to open config file"), "{message}");

        fs::write(&path, "{").unwrap();
        let err = read_json_file::<BTreeMap<String, u32>>("config", &path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config JSON file"));
    }

    #[test]
    fn test_write_chromosome_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.txt");
        write_chromosome(Some(&path), &Chromosome::default_seed()).unwrap();
        assert_eq!(
            Chromosome::read_file(&path).unwrap(),
            Chromosome::default_seed()
        );
    }
}
