//! Proficiency levels and activity difficulty bands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("unknown level: {0}")]
pub struct ParseLevelError(pub String);

/// Ordinal mastery rating, novice (0) through expert (4).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    #[default]
    Novice,
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    pub const ALL: [Self; 5] = [
        Self::Novice,
        Self::Beginner,
        Self::Intermediate,
        Self::Advanced,
        Self::Expert,
    ];

    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Novice => 0,
            Self::Beginner => 1,
            Self::Intermediate => 2,
            Self::Advanced => 3,
            Self::Expert => 4,
        }
    }

    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// One level up, saturating at expert.
    #[must_use]
    pub fn next(self) -> Self {
        Self::from_ordinal(self.ordinal() + 1).unwrap_or(Self::Expert)
    }

    #[must_use]
    pub fn below(self, other: Self) -> bool {
        self < other
    }

    #[must_use]
    pub fn distance(self, other: Self) -> u8 {
        self.ordinal().abs_diff(other.ordinal())
    }

    #[must_use]
    pub fn within_one_of(self, other: Self) -> bool {
        self.distance(other) <= 1
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProficiencyLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseLevelError(s.to_owned()))
    }
}

/// Activity difficulty. Mirrors [`ProficiencyLevel`] without `novice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    /// Band for a developer currently at `level`; `novice` maps to `beginner`.
    #[must_use]
    pub fn for_level(level: ProficiencyLevel) -> Self {
        match level {
            ProficiencyLevel::Novice | ProficiencyLevel::Beginner => Self::Beginner,
            ProficiencyLevel::Intermediate => Self::Intermediate,
            ProficiencyLevel::Advanced => Self::Advanced,
            ProficiencyLevel::Expert => Self::Expert,
        }
    }

    #[must_use]
    pub fn level(self) -> ProficiencyLevel {
        match self {
            Self::Beginner => ProficiencyLevel::Beginner,
            Self::Intermediate => ProficiencyLevel::Intermediate,
            Self::Advanced => ProficiencyLevel::Advanced,
            Self::Expert => ProficiencyLevel::Expert,
        }
    }

    /// One band up, capped at expert.
    #[must_use]
    pub fn harder(self) -> Self {
        match self {
            Self::Beginner => Self::Intermediate,
            Self::Intermediate => Self::Advanced,
            Self::Advanced | Self::Expert => Self::Expert,
        }
    }

    /// One band down, floored at beginner.
    #[must_use]
    pub fn easier(self) -> Self {
        match self {
            Self::Beginner | Self::Intermediate => Self::Beginner,
            Self::Advanced => Self::Intermediate,
            Self::Expert => Self::Advanced,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.level().as_str()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<ProficiencyLevel>()? {
            ProficiencyLevel::Novice => Err(ParseLevelError(s.to_owned())),
            level => Ok(Self::for_level(level)),
        }
    }
}
