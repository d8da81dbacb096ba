//! Competency assessment and the pure profile update operations.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pathwise_graph::SkillGraph;

use crate::activity::LearningActivity;
use crate::config::ProfilerConfig;
use crate::error::EngineError;
use crate::goal::{LearningGoal, SkillGap};
use crate::level::ProficiencyLevel;
use crate::profile::{
    Performance, ProgressSample, SkillInsight, SkillProfile, SkillSummary, TrendDirection,
};

/// Slopes with a smaller magnitude count as flat.
const TREND_EPSILON: f64 = 0.01;
const MIN_TREND_SAMPLES: usize = 3;

#[derive(Debug, Clone)]
pub struct SkillProfiler {
    graph: Arc<SkillGraph>,
    config: ProfilerConfig,
}

impl SkillProfiler {
    #[must_use]
    pub fn new(graph: Arc<SkillGraph>, config: ProfilerConfig) -> Self {
        Self { graph, config }
    }

    #[must_use]
    pub fn graph(&self) -> &SkillGraph {
        &self.graph
    }

    #[must_use]
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Initial profile. Every published skill receives an explicit level; skills the
    /// assessment does not mention start at novice.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` if the assessment names a skill outside the graph.
    pub fn assess(
        &self,
        developer_id: &str,
        assessed: &BTreeMap<String, ProficiencyLevel>,
        at: DateTime<Utc>,
    ) -> Result<SkillProfile, EngineError> {
        if let Some(unknown) = assessed.keys().find(|id| !self.graph.contains(id)) {
            return Err(EngineError::UnknownSkill(unknown.clone()));
        }
        let mut profile = SkillProfile::new(developer_id, at);
        for skill in self.graph.skills() {
            let level = assessed.get(&skill.id).copied().unwrap_or_default();
            profile.levels.insert(skill.id.clone(), level);
        }
        tracing::info!(
            developer = developer_id,
            skills = profile.levels.len(),
            assessed = assessed.len(),
            "profile assessed"
        );
        Ok(profile)
    }

    /// Bring a stored profile up to date with the graph: skills published after the
    /// profile was created are added at novice. Existing levels are never touched.
    #[must_use]
    pub fn reconcile(&self, profile: &SkillProfile) -> SkillProfile {
        let mut reconciled = profile.clone();
        let mut added = 0usize;
        for skill in self.graph.skills() {
            if !reconciled.levels.contains_key(&skill.id) {
                reconciled
                    .levels
                    .insert(skill.id.clone(), ProficiencyLevel::Novice);
                added += 1;
            }
        }
        if added > 0 {
            tracing::debug!(
                developer = %profile.developer_id,
                added,
                "reconciled stale profile"
            );
        }
        reconciled
    }

    /// Fold one completion into the profile.
    ///
    /// The level for the activity's skill moves up one step when the accuracy reaches
    /// the mastery threshold with enough data points, or the first-attempt threshold
    /// when this is the only data point and it took a single attempt. Levels never
    /// decrease. A trend sample is always appended.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPerformance` for out-of-range performance values and
    /// `UnknownSkill` if the activity's topic is not published.
    pub fn update(
        &self,
        profile: &SkillProfile,
        activity: &LearningActivity,
        performance: &Performance,
        at: DateTime<Utc>,
    ) -> Result<SkillProfile, EngineError> {
        performance.validate()?;
        let skill = activity.topic.as_str();
        if !self.graph.contains(skill) {
            return Err(EngineError::UnknownSkill(skill.to_owned()));
        }

        let current = profile.level(skill);
        let data_points = profile.samples(skill).len() + 1;
        let mastered = if data_points == 1 && data_points < self.config.min_data_points {
            performance.attempts == 1
                && performance.accuracy >= self.config.first_attempt_accuracy
        } else if data_points >= self.config.min_data_points {
            performance.accuracy >= self.config.mastery_accuracy
        } else {
            false
        };
        let level = if mastered { current.next() } else { current };

        let mut updated = profile.clone();
        updated.levels.insert(skill.to_owned(), level);
        updated
            .trend
            .entry(skill.to_owned())
            .or_default()
            .push(ProgressSample {
                at,
                level,
                accuracy: performance.accuracy,
            });
        updated.updated_at = at;

        tracing::debug!(
            developer = %profile.developer_id,
            skill,
            accuracy = performance.accuracy,
            speed_ratio = performance.speed_ratio,
            consistency = performance.consistency,
            attempts = performance.attempts,
            data_points,
            from = %current,
            to = %level,
            "profile updated"
        );
        Ok(updated)
    }

    /// Fold code-derived evidence into the profile. Raises the level to the observed
    /// one when it is higher and the confidence clears the threshold; never lowers.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` for unpublished skills and `InvalidInsight` when the
    /// confidence is outside `0..=1`.
    pub fn apply_insight(
        &self,
        profile: &SkillProfile,
        insight: &SkillInsight,
        at: DateTime<Utc>,
    ) -> Result<SkillProfile, EngineError> {
        if !self.graph.contains(&insight.skill) {
            return Err(EngineError::UnknownSkill(insight.skill.clone()));
        }
        if !(0.0..=1.0).contains(&insight.confidence) {
            return Err(EngineError::InvalidInsight(format!(
                "{}: confidence must be within 0..=1, got {}",
                insight.skill, insight.confidence
            )));
        }

        let current = profile.level(&insight.skill);
        let level = if insight.observed > current
            && insight.confidence >= self.config.insight_confidence
        {
            insight.observed
        } else {
            current
        };

        let mut updated = profile.clone();
        updated.levels.insert(insight.skill.clone(), level);
        updated
            .trend
            .entry(insight.skill.clone())
            .or_default()
            .push(ProgressSample {
                at,
                level,
                accuracy: insight.confidence,
            });
        updated.updated_at = at;

        tracing::debug!(
            developer = %profile.developer_id,
            skill = %insight.skill,
            observed = %insight.observed,
            confidence = insight.confidence,
            from = %current,
            to = %level,
            "insight applied"
        );
        Ok(updated)
    }

    /// One gap per skill below a goal target, highest priority first.
    ///
    /// Priority is the goal weight times the level distance. When several goals name
    /// the same skill the highest-priority gap wins. Ties are broken by ascending
    /// skill id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` or `InvalidGoal` for goals that do not validate.
    pub fn identify_gaps(
        &self,
        profile: &SkillProfile,
        goals: &[LearningGoal],
    ) -> Result<Vec<SkillGap>, EngineError> {
        let mut by_skill: BTreeMap<&str, SkillGap> = BTreeMap::new();
        for goal in goals {
            goal.validate(&self.graph)?;
            let current = profile.level(&goal.skill);
            if !current.below(goal.target) {
                continue;
            }
            let gap = SkillGap {
                skill: goal.skill.clone(),
                current,
                target: goal.target,
                priority: goal.priority * f64::from(current.distance(goal.target)),
            };
            match by_skill.get(goal.skill.as_str()) {
                Some(existing)
                    if existing.priority > gap.priority
                        || (existing.priority.total_cmp(&gap.priority) == Ordering::Equal
                            && existing.target >= gap.target) => {}
                _ => {
                    by_skill.insert(goal.skill.as_str(), gap);
                }
            }
        }

        let mut gaps: Vec<SkillGap> = by_skill.into_values().collect();
        gaps.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.skill.cmp(&b.skill))
        });
        Ok(gaps)
    }

    /// Direction of the least-squares slope of `level + accuracy` over the most recent
    /// samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn trend(&self, profile: &SkillProfile, skill: &str) -> TrendDirection {
        let samples = profile.samples(skill);
        let window = self.config.trend_window.max(MIN_TREND_SAMPLES);
        let recent = &samples[samples.len().saturating_sub(window)..];
        if recent.len() < MIN_TREND_SAMPLES {
            return TrendDirection::Stable;
        }

        let n = recent.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = recent.iter().map(ProgressSample::score).sum::<f64>() / n;
        let (mut num, mut den) = (0.0, 0.0);
        for (i, sample) in recent.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (sample.score() - mean_y);
            den += dx * dx;
        }
        let slope = num / den;
        if slope > TREND_EPSILON {
            TrendDirection::Improving
        } else if slope < -TREND_EPSILON {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }

    /// # Errors
    ///
    /// Returns an error if a goal does not validate against the graph.
    pub fn summary(
        &self,
        profile: &SkillProfile,
        goals: &[LearningGoal],
        top_gaps: usize,
    ) -> Result<SkillSummary, EngineError> {
        let mut gaps = self.identify_gaps(profile, goals)?;
        gaps.truncate(top_gaps);

        let trends: BTreeMap<String, TrendDirection> = profile
            .levels
            .keys()
            .map(|skill| (skill.clone(), self.trend(profile, skill)))
            .collect();
        let declining = trends
            .iter()
            .filter(|(_, direction)| **direction == TrendDirection::Declining)
            .map(|(skill, _)| skill.clone())
            .collect();

        Ok(SkillSummary {
            developer_id: profile.developer_id.clone(),
            competencies: profile.levels.clone(),
            strengths: profile.strengths().into_iter().map(str::to_owned).collect(),
            trends,
            declining,
            top_gaps: gaps,
        })
    }
}
