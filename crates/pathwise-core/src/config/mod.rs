mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting thresholds are inconsistent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let unit = |name: &str, v: f64| -> anyhow::Result<()> {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must be within 0..=1, got {v}");
            }
            Ok(())
        };
        unit("profiler.mastery_accuracy", self.profiler.mastery_accuracy)?;
        unit(
            "profiler.first_attempt_accuracy",
            self.profiler.first_attempt_accuracy,
        )?;
        unit("profiler.insight_confidence", self.profiler.insight_confidence)?;
        unit("adaptation.scale_up_accuracy", self.adaptation.scale_up_accuracy)?;
        unit(
            "adaptation.scale_down_accuracy",
            self.adaptation.scale_down_accuracy,
        )?;

        if self.adaptation.scale_down_accuracy >= self.adaptation.scale_up_accuracy {
            bail!(
                "adaptation.scale_down_accuracy ({}) must be below scale_up_accuracy ({})",
                self.adaptation.scale_down_accuracy,
                self.adaptation.scale_up_accuracy
            );
        }
        if self.adaptation.streak_length == 0 {
            bail!("adaptation.streak_length must be at least 1");
        }
        if self.profiler.min_data_points == 0 {
            bail!("profiler.min_data_points must be at least 1");
        }
        if self.profiler.trend_window < 3 {
            bail!(
                "profiler.trend_window must be at least 3, got {}",
                self.profiler.trend_window
            );
        }
        if self.path.default_activity_minutes == 0 {
            bail!("path.default_activity_minutes must be positive");
        }
        if self.path.max_attempts_per_skill == 0 {
            bail!("path.max_attempts_per_skill must be at least 1");
        }
        Ok(())
    }
}
