//! Ordered curricula and the operations that build and patch them.
//!
//! Every activity at or after the cursor must come after each remaining activity whose
//! skill is a direct or indirect prerequisite of its own skill. Activities before the
//! cursor are completed history and are never reordered.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pathwise_graph::SkillGraph;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityCatalog, LearningActivity};
use crate::config::PathConfig;
use crate::error::EngineError;
use crate::goal::LearningGoal;
use crate::level::{Difficulty, ProficiencyLevel};
use crate::profile::SkillProfile;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LearningPath {
    developer_id: String,
    activities: Vec<LearningActivity>,
    cursor: usize,
    goals: Vec<LearningGoal>,
    /// Level each skill on the path has to reach before its activities become redundant.
    targets: BTreeMap<String, ProficiencyLevel>,
    estimated_completion: DateTime<Utc>,
}

impl LearningPath {
    #[must_use]
    pub fn developer_id(&self) -> &str {
        &self.developer_id
    }

    #[must_use]
    pub fn activities(&self) -> &[LearningActivity] {
        &self.activities
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn goals(&self) -> &[LearningGoal] {
        &self.goals
    }

    #[must_use]
    pub fn targets(&self) -> &BTreeMap<String, ProficiencyLevel> {
        &self.targets
    }

    #[must_use]
    pub fn target(&self, skill: &str) -> Option<ProficiencyLevel> {
        self.targets.get(skill).copied()
    }

    #[must_use]
    pub fn estimated_completion(&self) -> DateTime<Utc> {
        self.estimated_completion
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    #[must_use]
    pub fn completed(&self) -> &[LearningActivity] {
        &self.activities[..self.split()]
    }

    #[must_use]
    pub fn remaining(&self) -> &[LearningActivity] {
        &self.activities[self.split()..]
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.activities.len()
    }

    /// Activity at the cursor, `None` once the path is finished.
    #[must_use]
    pub fn next_activity(&self) -> Option<&LearningActivity> {
        self.activities.get(self.cursor)
    }

    /// Move past the current activity. Saturates at the end of the path.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.activities.len());
    }

    /// Recompute the estimated completion from the remaining activities.
    pub fn reestimate(&mut self, now: DateTime<Utc>) {
        let minutes: i64 = self
            .remaining()
            .iter()
            .map(|a| i64::from(a.estimated_minutes))
            .sum();
        self.estimated_completion = now + Duration::minutes(minutes);
    }

    /// Drop all remaining activities. The path is terminal afterwards.
    ///
    /// Returns the number of activities removed.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.activities.len().saturating_sub(self.cursor);
        self.activities.truncate(self.cursor);
        self.cursor = self.activities.len();
        self.estimated_completion = now;
        removed
    }

    /// Cursor clamped to the path length.
    fn split(&self) -> usize {
        self.cursor.min(self.activities.len())
    }

    fn used_ids(&self) -> BTreeSet<&str> {
        self.activities.iter().map(|a| a.id.as_str()).collect()
    }
}

/// Result of [`PathBuilder::insert_prerequisites`]. Both lists hold activity ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Insertion {
    pub inserted: Vec<String>,
    pub moved: Vec<String>,
}

impl Insertion {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.moved.is_empty()
    }
}

/// An activity swapped for one at another difficulty band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub removed: String,
    pub added: String,
    pub from: Difficulty,
    pub to: Difficulty,
}

#[derive(Debug, Clone)]
pub struct PathBuilder {
    graph: Arc<SkillGraph>,
    catalog: Arc<ActivityCatalog>,
    config: PathConfig,
}

impl PathBuilder {
    #[must_use]
    pub fn new(graph: Arc<SkillGraph>, catalog: Arc<ActivityCatalog>, config: PathConfig) -> Self {
        Self {
            graph,
            catalog,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &ActivityCatalog {
        &self.catalog
    }

    /// Build a fresh path for `goals`.
    ///
    /// Goal skills below their target are included together with every transitive
    /// prerequisite below the configured prerequisite level. A skill at or above that
    /// level is taken as evidence that its own prerequisites are met, so expansion
    /// stops there.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill`/`InvalidGoal` for goals that do not validate, a graph
    /// error if the required skills cannot be ordered, and `PathInvariant` if the
    /// composed path still schedules a skill before one of its prerequisites.
    pub fn generate(
        &self,
        goals: &[LearningGoal],
        profile: &SkillProfile,
        now: DateTime<Utc>,
    ) -> Result<LearningPath, EngineError> {
        let threshold = self.config.prerequisite_level;
        let mut targets: BTreeMap<String, ProficiencyLevel> = BTreeMap::new();
        let mut stack = Vec::new();

        for goal in goals {
            goal.validate(&self.graph)?;
            if profile.level(&goal.skill).below(goal.target) {
                let target = targets.entry(goal.skill.clone()).or_default();
                *target = (*target).max(goal.target);
                stack.push(goal.skill.clone());
            }
        }

        let mut expanded = BTreeSet::new();
        while let Some(skill) = stack.pop() {
            if !expanded.insert(skill.clone()) || !profile.level(&skill).below(threshold) {
                continue;
            }
            for prereq in self
                .graph
                .prerequisites_of(&skill)
                .map_err(EngineError::from_graph)?
            {
                if profile.level(&prereq.id).below(threshold) {
                    let target = targets.entry(prereq.id.clone()).or_default();
                    *target = (*target).max(threshold);
                    stack.push(prereq.id.clone());
                }
            }
        }

        let order = self
            .graph
            .topological_order(targets.keys())
            .map_err(EngineError::from_graph)?;
        let none = BTreeSet::new();
        let activities: Vec<LearningActivity> = order
            .iter()
            .flat_map(|skill| {
                let activity = self
                    .catalog
                    .select(skill, Difficulty::for_level(profile.level(skill)));
                self.catalog.with_prerequisites(activity, &none)
            })
            .collect();

        let mut path = LearningPath {
            developer_id: profile.developer_id.clone(),
            activities,
            cursor: 0,
            goals: goals.to_vec(),
            targets,
            estimated_completion: now,
        };
        path.reestimate(now);
        self.check_invariant(&path)?;
        tracing::info!(
            developer = %path.developer_id,
            goals = goals.len(),
            activities = path.len(),
            "learning path generated"
        );
        Ok(path)
    }

    /// Place the not-yet-completed prerequisites of `topic` at the cursor, in
    /// topological order.
    ///
    /// Direct prerequisites are always considered; deeper ones only when they are
    /// still at novice or already on the remaining path. Remaining activities for
    /// those skills are pulled forward instead of duplicated, and skills never on the
    /// path get a catalog activity at their current band. Running the operation twice
    /// leaves the path unchanged the second time.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` for an unpublished topic and `PathInvariant` if the
    /// patched path would break prerequisite ordering; the path is untouched then.
    pub fn insert_prerequisites(
        &self,
        path: &mut LearningPath,
        topic: &str,
        profile: &SkillProfile,
    ) -> Result<Insertion, EngineError> {
        let direct = self
            .graph
            .prerequisites_of(topic)
            .map_err(EngineError::from_graph)?;
        if direct.is_empty() {
            return Ok(Insertion::default());
        }

        let remaining_topics: BTreeSet<&str> =
            path.remaining().iter().map(|a| a.topic.as_str()).collect();
        let completed: BTreeSet<&str> = path
            .completed()
            .iter()
            .map(|a| a.topic.as_str())
            .filter(|t| !remaining_topics.contains(t))
            .collect();

        let mut wanted: BTreeSet<String> = direct
            .iter()
            .map(|s| s.id.clone())
            .filter(|id| !completed.contains(id.as_str()))
            .collect();
        for deeper in self
            .graph
            .transitive_prerequisites(topic)
            .map_err(EngineError::from_graph)?
        {
            if completed.contains(deeper.as_str()) {
                continue;
            }
            if profile.level(&deeper) == ProficiencyLevel::Novice
                || remaining_topics.contains(deeper.as_str())
            {
                wanted.insert(deeper);
            }
        }
        if wanted.is_empty() {
            return Ok(Insertion::default());
        }

        let order = self
            .graph
            .topological_order(&wanted)
            .map_err(EngineError::from_graph)?;
        let remaining = path.remaining();
        let used = path.used_ids();
        let mut prefix = Vec::new();
        let mut inserted = Vec::new();
        let mut moved = Vec::new();
        for skill in &order {
            let existing: Vec<&LearningActivity> =
                remaining.iter().filter(|a| &a.topic == skill).collect();
            if existing.is_empty() {
                let activity = self.catalog.select_fresh(
                    skill,
                    Difficulty::for_level(profile.level(skill)),
                    &used,
                );
                for scheduled in self.catalog.with_prerequisites(activity, &used) {
                    inserted.push(scheduled.id.clone());
                    prefix.push(scheduled);
                }
            } else {
                prefix.extend(existing.into_iter().cloned());
            }
        }
        let rest = remaining
            .iter()
            .filter(|a| !wanted.contains(&a.topic))
            .cloned();

        let mut activities = path.completed().to_vec();
        activities.extend(prefix);
        activities.extend(rest);

        for (offset, activity) in remaining.iter().enumerate() {
            if wanted.contains(&activity.topic)
                && activities.get(path.split() + offset).map(|a| &a.id) != Some(&activity.id)
            {
                moved.push(activity.id.clone());
            }
        }

        let mut candidate = path.clone();
        candidate.activities = activities;
        for skill in &wanted {
            let remedial = profile.level(skill).next();
            let target = candidate.targets.entry(skill.clone()).or_default();
            *target = (*target).max(remedial);
        }
        self.check_invariant(&candidate)?;

        let outcome = Insertion { inserted, moved };
        if !outcome.is_empty() {
            tracing::debug!(
                developer = %path.developer_id,
                topic,
                inserted = ?outcome.inserted,
                moved = ?outcome.moved,
                "prerequisites placed at cursor"
            );
        }
        *path = candidate;
        Ok(outcome)
    }

    /// Remove remaining activities whose skill is in `mastered`, unless a later
    /// remaining activity directly depends on that skill. Removal runs leftmost first
    /// until nothing else qualifies, so a second call is a no-op.
    ///
    /// Returns the removed activity ids in removal order.
    pub fn skip_redundant(
        &self,
        path: &mut LearningPath,
        mastered: &BTreeSet<String>,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        loop {
            let position = (path.cursor..path.activities.len()).find(|&i| {
                let topic = &path.activities[i].topic;
                mastered.contains(topic)
                    && !path.activities[i + 1..].iter().any(|later| {
                        self.graph
                            .get(&later.topic)
                            .is_some_and(|s| s.prerequisites.contains(topic))
                    })
            });
            let Some(i) = position else {
                break;
            };
            removed.push(path.activities.remove(i).id);
        }
        if !removed.is_empty() {
            tracing::debug!(
                developer = %path.developer_id,
                skipped = ?removed,
                "redundant activities skipped"
            );
        }
        removed
    }

    /// Swap the next remaining activity for `topic` with one at `difficulty`.
    ///
    /// Returns `None` when no remaining activity covers the topic or it already sits
    /// at that band.
    pub fn retarget(
        &self,
        path: &mut LearningPath,
        topic: &str,
        difficulty: Difficulty,
    ) -> Option<Replacement> {
        let i = (path.cursor..path.activities.len()).find(|&i| path.activities[i].topic == topic)?;
        let from = path.activities[i].difficulty;
        if from == difficulty {
            return None;
        }
        let removed = path.activities[i].id.clone();
        let mut used = path.used_ids();
        used.remove(removed.as_str());
        let replacement = self.catalog.select_fresh(topic, difficulty, &used);
        let added = replacement.id.clone();
        let scheduled = self.catalog.with_prerequisites(replacement, &used);
        path.activities.splice(i..=i, scheduled);
        Some(Replacement {
            removed,
            added,
            from,
            to: difficulty,
        })
    }

    /// Enqueue one more activity for `topic`, right after the last remaining activity
    /// for the topic or any of its prerequisites (or at the cursor when there is none).
    ///
    /// Returns `None` once the path already holds `max_attempts_per_skill` activities
    /// for the topic.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` for an unpublished topic.
    pub fn reinforce(
        &self,
        path: &mut LearningPath,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<Option<LearningActivity>, EngineError> {
        let prerequisites = self
            .graph
            .transitive_prerequisites(topic)
            .map_err(EngineError::from_graph)?;
        let attempts = path.activities.iter().filter(|a| a.topic == topic).count();
        if attempts >= self.config.max_attempts_per_skill {
            return Ok(None);
        }

        let cursor = path.split();
        let position = (cursor..path.activities.len())
            .rev()
            .find(|&i| {
                let other = &path.activities[i].topic;
                other == topic || prerequisites.contains(other)
            })
            .map_or(cursor, |i| i + 1);
        let used = path.used_ids();
        let activity = self.catalog.select_fresh(topic, difficulty, &used);
        let scheduled = self.catalog.with_prerequisites(activity.clone(), &used);
        path.activities.splice(position..position, scheduled);
        tracing::debug!(
            developer = %path.developer_id,
            topic,
            activity = %activity.id,
            position,
            "reinforcement enqueued"
        );
        Ok(Some(activity))
    }

    /// # Errors
    ///
    /// Returns `PathInvariant` naming the first remaining activity that precedes one
    /// of its prerequisites, or `UnknownSkill` for an unpublished topic.
    pub fn check_invariant(&self, path: &LearningPath) -> Result<(), EngineError> {
        let remaining = path.remaining();
        for (i, activity) in remaining.iter().enumerate() {
            let prerequisites = self
                .graph
                .transitive_prerequisites(&activity.topic)
                .map_err(EngineError::from_graph)?;
            if let Some(late) = remaining[i + 1..]
                .iter()
                .find(|later| prerequisites.contains(&later.topic))
            {
                return Err(EngineError::PathInvariant(format!(
                    "{} ({}) is scheduled before its prerequisite {} ({})",
                    activity.id, activity.topic, late.id, late.topic
                )));
            }
        }
        Ok(())
    }
}
