use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, EvalError};

/// Number of segmentation methods compared in one experiment.
pub const METHOD_COUNT: usize = 4;

/// Number of quality questions answered for every slot.
pub const QUESTION_COUNT: usize = 4;

/// Upper bound (inclusive) for freshly generated seeds.
pub const RANDOM_SEED_MAX: u64 = 65_535;

/// One entry of a presentation order: a segmentation method applied to one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Index of the segmentation method, in `0..METHOD_COUNT`.
    pub method: usize,
    /// Position of the volume within the sorted file listing.
    pub sequence: usize,
}

impl Slot {
    /// Creates a slot for the given method and sequence indices.
    pub const fn new(method: usize, sequence: usize) -> Self {
        Self { method, sequence }
    }
}

/// A single answer to a quality question, always within `Score::MIN..=Score::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    /// Lowest accepted answer.
    pub const MIN: i64 = 1;
    /// Highest accepted answer.
    pub const MAX: i64 = 5;
    /// Answer shown for a slot that has not been scored yet.
    pub const DEFAULT: Score = Score(1);

    /// Validates a raw answer. Out-of-range values are rejected, never clamped.
    pub fn new(value: i64) -> Result<Self, EvalError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EvalError::Config(
                ErrorInfo::new("score.out-of-range", "score must lie within [1, 5]")
                    .with_context("value", value.to_string()),
            ))
        }
    }

    /// Returns the answer as an integer.
    pub fn get(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for Score {
    type Error = EvalError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        score.get()
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four answers recorded for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scores(pub [Score; QUESTION_COUNT]);

impl Scores {
    /// Validates four raw answers at once.
    pub fn from_values(values: [i64; QUESTION_COUNT]) -> Result<Self, EvalError> {
        let mut scores = [Score::DEFAULT; QUESTION_COUNT];
        for (question, value) in values.into_iter().enumerate() {
            scores[question] = Score::new(value).map_err(|err| match err {
                EvalError::Config(info) => EvalError::Config(
                    info.with_context("question", format!("q{}", question + 1)),
                ),
                other => other,
            })?;
        }
        Ok(Self(scores))
    }

    /// Returns the answer for a zero-based question index.
    pub fn get(&self, question: usize) -> Option<Score> {
        self.0.get(question).copied()
    }

    /// Replaces the answer for a zero-based question index.
    pub fn set(&mut self, question: usize, score: Score) -> Result<(), EvalError> {
        let slot = self.0.get_mut(question).ok_or_else(|| {
            EvalError::Config(
                ErrorInfo::new("score.question", "question index out of range")
                    .with_context("question", question.to_string())
                    .with_hint("questions are numbered 1 to 4"),
            )
        })?;
        *slot = score;
        Ok(())
    }

    /// Returns the answers as plain integers.
    pub fn values(&self) -> [i64; QUESTION_COUNT] {
        self.0.map(Score::get)
    }
}

impl Default for Scores {
    fn default() -> Self {
        Self([Score::DEFAULT; QUESTION_COUNT])
    }
}

/// Seed controlling the presentation order.
///
/// Accepted either as a YAML integer or as a digit-only string; anything else
/// is rejected when the configuration is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "SeedValue", into = "u64")]
pub struct Seed(u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedValue {
    Numeric(u64),
    Text(String),
}

impl Seed {
    /// Wraps an already validated integer.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parses a digit-only string into a seed.
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(EvalError::Config(
                ErrorInfo::new("config.seed", "seed must be a non-negative integer")
                    .with_context("value", text)
                    .with_hint("use digits only, e.g. 4242"),
            ));
        }
        trimmed.parse::<u64>().map(Self).map_err(|err| {
            EvalError::Config(
                ErrorInfo::new("config.seed", err.to_string()).with_context("value", text),
            )
        })
    }

    /// Draws a fresh seed in `0..=RANDOM_SEED_MAX`.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..=RANDOM_SEED_MAX))
    }

    /// Returns the raw integer.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl TryFrom<SeedValue> for Seed {
    type Error = EvalError;

    fn try_from(value: SeedValue) -> Result<Self, Self::Error> {
        match value {
            SeedValue::Numeric(raw) => Ok(Seed(raw)),
            SeedValue::Text(text) => Seed::parse(&text),
        }
    }
}

impl From<Seed> for u64 {
    fn from(seed: Seed) -> Self {
        seed.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Seed {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Seed::parse(s)
    }
}
