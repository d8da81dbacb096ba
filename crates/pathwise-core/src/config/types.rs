use serde::{Deserialize, Serialize};

use crate::level::ProficiencyLevel;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub profiler: ProfilerConfig,
    #[serde(default)]
    pub path: PathConfig,
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

fn default_skills_path() -> String {
    "skills.toml".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    #[serde(default = "default_skills_path")]
    pub skills_path: String,
    /// Optional activity catalog; without one every activity is synthesized.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            skills_path: default_skills_path(),
            catalog_path: None,
        }
    }
}

fn default_mastery_accuracy() -> f64 {
    0.85
}

fn default_first_attempt_accuracy() -> f64 {
    0.95
}

fn default_min_data_points() -> usize {
    2
}

fn default_trend_window() -> usize {
    5
}

fn default_insight_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfilerConfig {
    /// Accuracy that counts as evidence of the next level.
    #[serde(default = "default_mastery_accuracy")]
    pub mastery_accuracy: f64,
    /// Accuracy needed when the completion is the only data point for the skill.
    #[serde(default = "default_first_attempt_accuracy")]
    pub first_attempt_accuracy: f64,
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,
    /// Number of most recent samples used for trend classification (at least 3).
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_insight_confidence")]
    pub insight_confidence: f64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            mastery_accuracy: default_mastery_accuracy(),
            first_attempt_accuracy: default_first_attempt_accuracy(),
            min_data_points: default_min_data_points(),
            trend_window: default_trend_window(),
            insight_confidence: default_insight_confidence(),
        }
    }
}

fn default_prerequisite_level() -> ProficiencyLevel {
    ProficiencyLevel::Beginner
}

fn default_activity_minutes() -> u32 {
    30
}

fn default_max_attempts_per_skill() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathConfig {
    /// Level at which a skill counts as satisfied when it is only a prerequisite.
    #[serde(default = "default_prerequisite_level")]
    pub prerequisite_level: ProficiencyLevel,
    #[serde(default = "default_activity_minutes")]
    pub default_activity_minutes: u32,
    /// Cap on activities for one skill within a single path, reinforcements included.
    #[serde(default = "default_max_attempts_per_skill")]
    pub max_attempts_per_skill: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            prerequisite_level: default_prerequisite_level(),
            default_activity_minutes: default_activity_minutes(),
            max_attempts_per_skill: default_max_attempts_per_skill(),
        }
    }
}

fn default_scale_up_accuracy() -> f64 {
    0.9
}

fn default_scale_down_accuracy() -> f64 {
    0.5
}

fn default_streak_length() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptationConfig {
    #[serde(default = "default_scale_up_accuracy")]
    pub scale_up_accuracy: f64,
    #[serde(default = "default_scale_down_accuracy")]
    pub scale_down_accuracy: f64,
    #[serde(default = "default_streak_length")]
    pub streak_length: u32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            scale_up_accuracy: default_scale_up_accuracy(),
            scale_down_accuracy: default_scale_down_accuracy(),
            streak_length: default_streak_length(),
        }
    }
}

fn default_sqlite_path() -> String {
    "pathwise.db".into()
}

fn default_max_save_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Reload-and-retry attempts after a version conflict.
    #[serde(default = "default_max_save_retries")]
    pub max_save_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            max_save_retries: default_max_save_retries(),
        }
    }
}

fn default_top_gaps() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryConfig {
    #[serde(default = "default_top_gaps")]
    pub top_gaps: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_gaps: default_top_gaps(),
        }
    }
}
