use std::str::FromStr;

use super::Config;

/// Parse an env var, warning and returning `None` on invalid values.
fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(v) = raw.trim().parse::<T>() {
        Some(v)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PATHWISE_SKILLS_PATH") {
            self.graph.skills_path = v;
        }
        if let Ok(v) = std::env::var("PATHWISE_CATALOG_PATH") {
            self.graph.catalog_path = Some(v).filter(|p| !p.is_empty());
        }
        if let Ok(v) = std::env::var("PATHWISE_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Some(v) = parse_env("PATHWISE_MAX_SAVE_RETRIES") {
            self.store.max_save_retries = v;
        }
        if let Some(v) = parse_env("PATHWISE_MASTERY_ACCURACY") {
            self.profiler.mastery_accuracy = v;
        }
        if let Some(v) = parse_env("PATHWISE_FIRST_ATTEMPT_ACCURACY") {
            self.profiler.first_attempt_accuracy = v;
        }
        if let Some(v) = parse_env("PATHWISE_MIN_DATA_POINTS") {
            self.profiler.min_data_points = v;
        }
        if let Some(v) = parse_env("PATHWISE_TREND_WINDOW") {
            self.profiler.trend_window = v;
        }
        if let Some(v) = parse_env("PATHWISE_INSIGHT_CONFIDENCE") {
            self.profiler.insight_confidence = v;
        }
        if let Some(v) = parse_env("PATHWISE_PREREQUISITE_LEVEL") {
            self.path.prerequisite_level = v;
        }
        if let Some(v) = parse_env("PATHWISE_DEFAULT_ACTIVITY_MINUTES") {
            self.path.default_activity_minutes = v;
        }
        if let Some(v) = parse_env("PATHWISE_MAX_ATTEMPTS_PER_SKILL") {
            self.path.max_attempts_per_skill = v;
        }
        if let Some(v) = parse_env("PATHWISE_SCALE_UP_ACCURACY") {
            self.adaptation.scale_up_accuracy = v;
        }
        if let Some(v) = parse_env("PATHWISE_SCALE_DOWN_ACCURACY") {
            self.adaptation.scale_down_accuracy = v;
        }
        if let Some(v) = parse_env("PATHWISE_STREAK_LENGTH") {
            self.adaptation.streak_length = v;
        }
        if let Some(v) = parse_env("PATHWISE_SUMMARY_TOP_GAPS") {
            self.summary.top_gaps = v;
        }
    }
}
