//! Developer competency state and the performance signals folded into it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::goal::SkillGap;
use crate::level::ProficiencyLevel;

/// One piece of evidence about a skill. `accuracy` is the activity accuracy or, for
/// code-derived insights, the analyzer's confidence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgressSample {
    pub at: DateTime<Utc>,
    pub level: ProficiencyLevel,
    pub accuracy: f64,
}

impl ProgressSample {
    /// Combined signal used for trend slopes.
    #[must_use]
    pub fn score(&self) -> f64 {
        f64::from(self.level.ordinal()) + self.accuracy
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkillProfile {
    pub developer_id: String,
    pub levels: BTreeMap<String, ProficiencyLevel>,
    #[serde(default)]
    pub trend: BTreeMap<String, Vec<ProgressSample>>,
    pub updated_at: DateTime<Utc>,
}

impl SkillProfile {
    #[must_use]
    pub fn new(developer_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            developer_id: developer_id.into(),
            levels: BTreeMap::new(),
            trend: BTreeMap::new(),
            updated_at: at,
        }
    }

    /// Current level; skills missing from the map count as novice.
    #[must_use]
    pub fn level(&self, skill: &str) -> ProficiencyLevel {
        self.levels.get(skill).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn samples(&self, skill: &str) -> &[ProgressSample] {
        self.trend.get(skill).map(Vec::as_slice).unwrap_or_default()
    }

    /// Skills at advanced or above, ascending by id.
    #[must_use]
    pub fn strengths(&self) -> Vec<&str> {
        self.levels
            .iter()
            .filter(|(_, level)| **level >= ProficiencyLevel::Advanced)
            .map(|(skill, _)| skill.as_str())
            .collect()
    }
}

/// Outcome of one completed activity.
///
/// Only `accuracy` and `attempts` feed level and difficulty decisions; the speed and
/// consistency figures are validated and logged but never change a decision.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Performance {
    /// Fraction of the activity answered correctly, `0.0..=1.0`.
    pub accuracy: f64,
    /// Actual time divided by estimated time.
    pub speed_ratio: f64,
    /// Rolling variance of recent accuracies.
    pub consistency: f64,
    pub attempts: u32,
}

impl Performance {
    #[must_use]
    pub fn new(accuracy: f64) -> Self {
        Self {
            accuracy,
            speed_ratio: 1.0,
            consistency: 0.0,
            attempts: 1,
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidPerformance` when a field is out of range or not finite.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(EngineError::InvalidPerformance(format!(
                "accuracy must be within 0..=1, got {}",
                self.accuracy
            )));
        }
        if !self.speed_ratio.is_finite() || self.speed_ratio < 0.0 {
            return Err(EngineError::InvalidPerformance(format!(
                "speed ratio must be a non-negative number, got {}",
                self.speed_ratio
            )));
        }
        if !self.consistency.is_finite() || self.consistency < 0.0 {
            return Err(EngineError::InvalidPerformance(format!(
                "consistency must be a non-negative number, got {}",
                self.consistency
            )));
        }
        if self.attempts == 0 {
            return Err(EngineError::InvalidPerformance(
                "attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Population variance of the last `window` accuracies plus `latest`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rolling_variance(samples: &[ProgressSample], latest: f64, window: usize) -> f64 {
    let keep = window.saturating_sub(1);
    let start = samples.len().saturating_sub(keep);
    let values: Vec<f64> = samples[start..]
        .iter()
        .map(|s| s.accuracy)
        .chain(std::iter::once(latest))
        .collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Code-derived evidence about a skill, produced by an external analyzer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkillInsight {
    pub skill: String,
    pub observed: ProficiencyLevel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkillSummary {
    pub developer_id: String,
    pub competencies: BTreeMap<String, ProficiencyLevel>,
    pub strengths: Vec<String>,
    pub trends: BTreeMap<String, TrendDirection>,
    pub declining: Vec<String>,
    pub top_gaps: Vec<SkillGap>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(level: ProficiencyLevel, accuracy: f64) -> ProgressSample {
        ProgressSample {
            at: Utc::now(),
            level,
            accuracy,
        }
    }

    #[test]
    fn missing_skill_is_novice() {
        let profile = SkillProfile::new("dev", Utc::now());
        assert_eq!(profile.level("anything"), ProficiencyLevel::Novice);
        assert!(profile.samples("anything").is_empty());
    }

    #[test]
    fn strengths_are_advanced_and_above() {
        let mut profile = SkillProfile::new("dev", Utc::now());
        profile
            .levels
            .insert("rust".into(), ProficiencyLevel::Expert);
        profile
            .levels
            .insert("sql".into(), ProficiencyLevel::Advanced);
        profile
            .levels
            .insert("go".into(), ProficiencyLevel::Intermediate);
        assert_eq!(profile.strengths(), ["rust", "sql"]);
    }

    #[test]
    fn performance_validation() {
        assert!(Performance::new(0.0).validate().is_ok());
        assert!(Performance::new(1.0).validate().is_ok());
        assert!(Performance::new(1.2).validate().is_err());
        assert!(Performance::new(f64::NAN).validate().is_err());
        let mut p = Performance::new(0.5);
        p.attempts = 0;
        assert!(p.validate().is_err());
        let mut p = Performance::new(0.5);
        p.speed_ratio = -1.0;
        assert!(p.validate().is_err());
        let mut p = Performance::new(0.5);
        p.consistency = f64::INFINITY;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rolling_variance_of_constant_is_zero() {
        let samples = vec![sample(ProficiencyLevel::Beginner, 0.7); 4];
        assert!(rolling_variance(&samples, 0.7, 5).abs() < 1e-12);
    }

    #[test]
    fn rolling_variance_uses_window() {
        let samples = vec![
            sample(ProficiencyLevel::Beginner, 0.0),
            sample(ProficiencyLevel::Beginner, 1.0),
            sample(ProficiencyLevel::Beginner, 1.0),
        ];
        // window of 2 keeps [1.0] + latest 1.0
        assert!(rolling_variance(&samples, 1.0, 2).abs() < 1e-12);
        // [0.0, 1.0, 1.0, 0.0] -> mean 0.5, variance 0.25
        assert!((rolling_variance(&samples, 0.0, 4) - 0.25).abs() < 1e-12);
        // no history
        assert!(rolling_variance(&[], 0.4, 5).abs() < 1e-12);
    }

    #[test]
    fn sample_score_combines_level_and_accuracy() {
        assert!((sample(ProficiencyLevel::Intermediate, 0.5).score() - 2.5).abs() < 1e-12);
    }
}
