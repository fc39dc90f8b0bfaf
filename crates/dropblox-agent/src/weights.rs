//! Named heuristic features and weight vectors over them.
//!
//! A [`Chromosome`] maps each [`Feature`] to a real-valued weight. It is the unit
//! evolved by the training harness and is handed to the agent as a plain-text
//! weight file, one `<FEATURE_NAME> <value>` pair per line:
//!
//! ```text
//! BLOCK_EDGES 0.7277
//! HOLES -1.6656
//! ```
//!
//! Blank lines are ignored. Unknown feature names, missing or extra tokens, and
//! unparsable values are errors.

use std::{
    collections::BTreeMap,
    fmt, fs,
    hash::{Hash, Hasher},
    io::{self, Write as _},
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{ParseWeightsError, UnknownFeatureError, WeightsFileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    BlockEdges,
    WallEdges,
    Gaps,
    Holes,
    MaxHeight,
    BlockHeight,
    PointsEarned,
    Covers,
    Bumpiness,
}

impl Feature {
    pub const ALL: [Self; 9] = [
        Self::BlockEdges,
        Self::WallEdges,
        Self::Gaps,
        Self::Holes,
        Self::MaxHeight,
        Self::BlockHeight,
        Self::PointsEarned,
        Self::Covers,
        Self::Bumpiness,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockEdges => "BLOCK_EDGES",
            Self::WallEdges => "WALL_EDGES",
            Self::Gaps => "GAPS",
            Self::Holes => "HOLES",
            Self::MaxHeight => "MAX_HEIGHT",
            Self::BlockHeight => "BLOCK_HEIGHT",
            Self::PointsEarned => "POINTS_EARNED",
            Self::Covers => "COVERS",
            Self::Bumpiness => "BUMPINESS",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = UnknownFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownFeatureError {
                name: s.to_owned(),
            })
    }
}

/// A weight vector: an ordered map from feature to weight.
///
/// Two chromosomes are equal when they have the same features with bit-identical
/// weights, so chromosomes can key hash maps when scores are aggregated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chromosome {
    weights: BTreeMap<Feature, f64>,
}

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.weights.len() == other.weights.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((fa, wa), (fb, wb))| fa == fb && wa.to_bits() == wb.to_bits())
    }
}

impl Eq for Chromosome {}

impl Hash for Chromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.weights.len());
        for (feature, weight) in self.iter() {
            feature.hash(state);
            weight.to_bits().hash(state);
        }
    }
}

impl FromIterator<(Feature, f64)> for Chromosome {
    fn from_iter<T: IntoIterator<Item = (Feature, f64)>>(iter: T) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

impl Chromosome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand-tuned starting point of the weight search.
    #[must_use]
    pub fn default_seed() -> Self {
        [
            (Feature::BlockEdges, 0.7277),
            (Feature::WallEdges, 1.42234),
            (Feature::Gaps, 0.182_809),
            (Feature::Holes, -1.6656),
            (Feature::MaxHeight, -0.1),
            (Feature::BlockHeight, -0.7377),
            (Feature::PointsEarned, 0.9297),
            (Feature::Covers, 0.05707),
            (Feature::Bumpiness, -0.4219),
        ]
        .into_iter()
        .collect()
    }

    #[must_use]
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.weights.get(&feature).copied()
    }

    pub fn insert(&mut self, feature: Feature, weight: f64) -> Option<f64> {
        self.weights.insert(feature, weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.weights.iter().map(|(&f, &w)| (f, w))
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.weights.keys().copied()
    }

    /// Applies `f` to every weight, keeping the feature set.
    #[must_use]
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(Feature, f64) -> f64,
    {
        self.iter().map(|(k, w)| (k, f(k, w))).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn read_file<P>(path: P) -> Result<Self, WeightsFileError>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        Ok(text.parse()?)
    }

    pub fn write_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        fs::write(path, self.to_string())
    }

    /// Writes the weight file to a fresh temporary file, removed when dropped.
    pub fn write_to_tempfile(&self) -> io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("dropblox-weights-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(self.to_string().as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

/// Formats the chromosome in weight-file format.
///
/// Weights use the shortest representation that parses back to the same value.
impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (feature, weight) in self.iter() {
            writeln!(f, "{feature} {weight}")?;
        }
        Ok(())
    }
}

impl FromStr for Chromosome {
    type Err = ParseWeightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut weights = BTreeMap::new();
        for (index, raw) in s.lines().enumerate() {
            let line = index + 1;
            let mut tokens = raw.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let (Some(value), None) = (tokens.next(), tokens.next()) else {
                return Err(ParseWeightsError::Malformed { line });
            };
            let feature = name
                .parse::<Feature>()
                .map_err(|source| ParseWeightsError::UnknownFeature { line, source })?;
            let weight = value
                .parse::<f64>()
                .map_err(|source| ParseWeightsError::InvalidValue { line, source })?;
            if weights.insert(feature, weight).is_some() {
                return Err(ParseWeightsError::DuplicateFeature { line, feature });
            }
        }
        Ok(Self { weights })
    }
}
