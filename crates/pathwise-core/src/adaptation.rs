//! Per-skill difficulty state machine and the engine that turns one completion into a
//! profile update plus a patched path.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::LearningActivity;
use crate::config::AdaptationConfig;
use crate::error::EngineError;
use crate::gateway::LearnerState;
use crate::goal::LearningGoal;
use crate::level::{Difficulty, ProficiencyLevel};
use crate::path::{Insertion, LearningPath, PathBuilder, Replacement};
use crate::profile::{Performance, SkillInsight, SkillProfile};
use crate::profiler::SkillProfiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DifficultyState {
    ScalingUp { streak: u32 },
    Stable { successes: u32, struggles: u32 },
    ScalingDown { streak: u32 },
}

impl Default for DifficultyState {
    fn default() -> Self {
        Self::Stable {
            successes: 0,
            struggles: 0,
        }
    }
}

impl DifficultyState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScalingUp { .. } => "scaling_up",
            Self::Stable { .. } => "stable",
            Self::ScalingDown { .. } => "scaling_down",
        }
    }

    /// Current run of consecutive high-accuracy completions.
    #[must_use]
    pub fn success_run(&self) -> u32 {
        match *self {
            Self::ScalingUp { streak } => streak,
            Self::Stable { successes, .. } => successes,
            Self::ScalingDown { .. } => 0,
        }
    }

    /// Current run of consecutive low-accuracy completions.
    #[must_use]
    pub fn struggle_run(&self) -> u32 {
        match *self {
            Self::ScalingDown { streak } => streak,
            Self::Stable { struggles, .. } => struggles,
            Self::ScalingUp { .. } => 0,
        }
    }
}

impl fmt::Display for DifficultyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty tracker for one (developer, skill) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SkillDifficulty {
    pub state: DifficultyState,
    pub band: Difficulty,
    /// One-shot band requested explicitly; consumed by the next completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_next: Option<Difficulty>,
}

impl SkillDifficulty {
    #[must_use]
    pub fn new(band: Difficulty) -> Self {
        Self {
            state: DifficultyState::default(),
            band,
            override_next: None,
        }
    }

    /// Band the next activity for this skill should use.
    #[must_use]
    pub fn next_band(&self) -> Difficulty {
        self.override_next.unwrap_or(self.band)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub accuracy: f64,
    pub from: DifficultyState,
    pub to: DifficultyState,
    pub old_band: Difficulty,
    pub new_band: Difficulty,
    pub insert_prerequisites: bool,
}

/// Advance the state machine by one completion.
///
/// Runs of `streak_length` completions at or above the scale-up accuracy move the
/// band up one step on every further success; runs at or below the scale-down
/// accuracy move it down and request remedial prerequisites. Anything else resets to
/// a stable state with an unchanged band. A pending override is consumed.
#[must_use]
pub fn transition(
    current: &SkillDifficulty,
    accuracy: f64,
    config: &AdaptationConfig,
) -> (SkillDifficulty, Transition) {
    let (successes, struggles) = if accuracy >= config.scale_up_accuracy {
        (current.state.success_run() + 1, 0)
    } else if accuracy <= config.scale_down_accuracy {
        (0, current.state.struggle_run() + 1)
    } else {
        (0, 0)
    };

    let (state, band, insert_prerequisites) = if successes >= config.streak_length {
        (
            DifficultyState::ScalingUp { streak: successes },
            current.band.harder(),
            false,
        )
    } else if struggles >= config.streak_length {
        (
            DifficultyState::ScalingDown { streak: struggles },
            current.band.easier(),
            true,
        )
    } else {
        (
            DifficultyState::Stable {
                successes,
                struggles,
            },
            current.band,
            false,
        )
    };

    let next = SkillDifficulty {
        state,
        band,
        override_next: None,
    };
    let step = Transition {
        accuracy,
        from: current.state,
        to: state,
        old_band: current.band,
        new_band: band,
        insert_prerequisites,
    };
    (next, step)
}

/// One path or difficulty change made while adapting.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    DifficultyChanged {
        skill: String,
        from: Difficulty,
        to: Difficulty,
    },
    PrerequisitesInserted {
        skill: String,
        insertion: Insertion,
    },
    Retargeted {
        skill: String,
        replacement: Replacement,
    },
    Reinforced {
        skill: String,
        activity: String,
    },
    Skipped {
        activities: Vec<String>,
    },
    KeptPreviousPath {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AdaptationOutcome {
    pub state: LearnerState,
    pub completed: LearningActivity,
    pub transition: Transition,
    pub adjustments: Vec<Adjustment>,
    /// Human-readable explanation of every change, in the order it was made.
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AdaptationEngine {
    profiler: SkillProfiler,
    builder: PathBuilder,
    config: AdaptationConfig,
}

impl AdaptationEngine {
    #[must_use]
    pub fn new(profiler: SkillProfiler, builder: PathBuilder, config: AdaptationConfig) -> Self {
        Self {
            profiler,
            builder,
            config,
        }
    }

    #[must_use]
    pub fn profiler(&self) -> &SkillProfiler {
        &self.profiler
    }

    #[must_use]
    pub fn builder(&self) -> &PathBuilder {
        &self.builder
    }

    /// First state for a developer: assessed profile plus a path for `goals`.
    ///
    /// # Errors
    ///
    /// Returns an error if the assessment or a goal names an unknown skill.
    pub fn enroll(
        &self,
        developer_id: &str,
        assessed: &BTreeMap<String, ProficiencyLevel>,
        goals: &[LearningGoal],
        at: DateTime<Utc>,
    ) -> Result<LearnerState, EngineError> {
        let profile = self.profiler.assess(developer_id, assessed, at)?;
        let path = self.builder.generate(goals, &profile, at)?;
        Ok(LearnerState {
            profile,
            path,
            difficulty: BTreeMap::new(),
        })
    }

    /// Apply one completed activity.
    ///
    /// The profile update and the path advance always happen together. Path
    /// adjustments that fail leave the advanced path in place and add a rationale line
    /// instead of failing the event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPerformance` for bad input, `PathFinished` when there is no
    /// activity at the cursor and `UnknownSkill` if the activity's topic left the graph.
    pub fn on_completion(
        &self,
        state: &LearnerState,
        performance: &Performance,
        at: DateTime<Utc>,
    ) -> Result<AdaptationOutcome, EngineError> {
        performance.validate()?;
        let completed = state
            .path
            .next_activity()
            .cloned()
            .ok_or_else(|| EngineError::PathFinished(state.path.developer_id().to_owned()))?;
        let topic = completed.topic.as_str();
        let profile = self
            .profiler
            .update(&state.profile, &completed, performance, at)?;

        let tracker = state
            .difficulty
            .get(topic)
            .copied()
            .unwrap_or_else(|| SkillDifficulty::new(completed.difficulty));
        let (tracker, step) = transition(&tracker, performance.accuracy, &self.config);

        let mut adjustments = Vec::new();
        let mut rationale = Vec::new();
        if step.old_band != step.new_band {
            rationale.push(self.band_rationale(topic, &step));
            adjustments.push(Adjustment::DifficultyChanged {
                skill: topic.to_owned(),
                from: step.old_band,
                to: step.new_band,
            });
        } else if step.from.as_str() != step.to.as_str()
            && !matches!(step.to, DifficultyState::Stable { .. })
        {
            rationale.push(format!(
                "{topic}: entered {} at accuracy {:.2}; difficulty stays at {}",
                step.to, step.accuracy, step.new_band
            ));
        }

        let mut advanced = state.path.clone();
        advanced.advance();
        let mut candidate = advanced.clone();
        let mut path = match self.adapt_path(&mut candidate, &profile, topic, &step, &tracker) {
            Ok((changes, lines)) => {
                adjustments.extend(changes);
                rationale.extend(lines);
                candidate
            }
            Err(err) => {
                tracing::warn!(
                    developer = %profile.developer_id,
                    topic,
                    "path adjustment failed, keeping previous path: {err}"
                );
                rationale.push(format!(
                    "{topic}: kept previous path after a failed adjustment ({err})"
                ));
                adjustments.push(Adjustment::KeptPreviousPath {
                    reason: err.to_string(),
                });
                advanced
            }
        };
        path.reestimate(at);

        let mut difficulty = state.difficulty.clone();
        difficulty.insert(topic.to_owned(), tracker);

        tracing::info!(
            developer = %profile.developer_id,
            activity = %completed.id,
            accuracy = performance.accuracy,
            state = %step.to,
            band = %step.new_band,
            adjustments = adjustments.len(),
            "completion applied"
        );
        Ok(AdaptationOutcome {
            state: LearnerState {
                profile,
                path,
                difficulty,
            },
            completed,
            transition: step,
            adjustments,
            rationale,
        })
    }

    /// Override the band of the next activity for `topic`. Later completions keep
    /// driving the computed band.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` if the topic is not published.
    pub fn request_difficulty(
        &self,
        state: &LearnerState,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<(LearnerState, Vec<String>), EngineError> {
        if !self.profiler.graph().contains(topic) {
            return Err(EngineError::UnknownSkill(topic.to_owned()));
        }
        let mut tracker = state.difficulty.get(topic).copied().unwrap_or_else(|| {
            SkillDifficulty::new(Difficulty::for_level(state.profile.level(topic)))
        });
        tracker.override_next = Some(difficulty);

        let mut next = state.clone();
        let mut rationale = vec![format!(
            "{topic}: next activity requested at {difficulty} (computed band {})",
            tracker.band
        )];
        if let Some(swap) = self.builder.retarget(&mut next.path, topic, difficulty) {
            rationale.push(replacement_rationale(topic, &swap));
        }
        next.difficulty.insert(topic.to_owned(), tracker);
        Ok((next, rationale))
    }

    /// Fold code-derived evidence into the profile and drop activities it makes
    /// redundant.
    ///
    /// The profile change is always kept. A patched path that fails the ordering check
    /// is discarded in favor of the previous one, with a rationale line saying so.
    ///
    /// # Errors
    ///
    /// Returns an error if the insight is invalid.
    pub fn on_insight(
        &self,
        state: &LearnerState,
        insight: &SkillInsight,
        at: DateTime<Utc>,
    ) -> Result<(LearnerState, Vec<String>), EngineError> {
        let profile = self.profiler.apply_insight(&state.profile, insight, at)?;
        let mut path = state.path.clone();
        let mut rationale = Vec::new();
        let old = state.profile.level(&insight.skill);
        let new = profile.level(&insight.skill);
        if new != old {
            rationale.push(format!(
                "{}: level {old} -> {new} from code insight (confidence {:.2})",
                insight.skill, insight.confidence
            ));
        }
        let skipped = self.skip_mastered(&mut path, &profile);
        let mut path = match self.builder.check_invariant(&path) {
            Ok(()) => {
                if !skipped.is_empty() {
                    rationale.push(skip_rationale(&skipped));
                }
                path
            }
            Err(err) => {
                tracing::warn!(
                    developer = %profile.developer_id,
                    skill = %insight.skill,
                    "insight left an invalid path, keeping previous path: {err}"
                );
                rationale.push(format!(
                    "{}: kept previous path after a failed adjustment ({err})",
                    insight.skill
                ));
                state.path.clone()
            }
        };
        path.reestimate(at);
        Ok((
            LearnerState {
                profile,
                path,
                difficulty: state.difficulty.clone(),
            },
            rationale,
        ))
    }

    /// Replace the path wholesale for a new goal set. Profile and difficulty trackers
    /// carry over.
    ///
    /// # Errors
    ///
    /// Returns an error if a goal does not validate.
    pub fn regenerate(
        &self,
        state: &LearnerState,
        goals: &[LearningGoal],
        at: DateTime<Utc>,
    ) -> Result<LearnerState, EngineError> {
        let path = self.builder.generate(goals, &state.profile, at)?;
        Ok(LearnerState {
            profile: state.profile.clone(),
            path,
            difficulty: state.difficulty.clone(),
        })
    }

    #[must_use]
    pub fn abandon(&self, state: &LearnerState, at: DateTime<Utc>) -> LearnerState {
        let mut next = state.clone();
        let dropped = next.path.abandon(at);
        tracing::info!(
            developer = %state.profile.developer_id,
            dropped,
            "goals abandoned"
        );
        next
    }

    fn adapt_path(
        &self,
        path: &mut LearningPath,
        profile: &SkillProfile,
        topic: &str,
        step: &Transition,
        tracker: &SkillDifficulty,
    ) -> Result<(Vec<Adjustment>, Vec<String>), EngineError> {
        let mut adjustments = Vec::new();
        let mut rationale = Vec::new();

        if step.insert_prerequisites {
            let insertion = self.builder.insert_prerequisites(path, topic, profile)?;
            if !insertion.is_empty() {
                let placed: Vec<&str> = insertion
                    .inserted
                    .iter()
                    .chain(&insertion.moved)
                    .map(String::as_str)
                    .collect();
                rationale.push(format!(
                    "{topic}: placed prerequisites [{}] at position {} after {} consecutive \
                     completions at or below {:.2} (latest {:.2})",
                    placed.join(", "),
                    path.cursor(),
                    step.to.struggle_run(),
                    self.config.scale_down_accuracy,
                    step.accuracy
                ));
                adjustments.push(Adjustment::PrerequisitesInserted {
                    skill: topic.to_owned(),
                    insertion,
                });
            }
        }

        let level = profile.level(topic);
        if let Some(target) = path.target(topic).filter(|target| level < *target) {
            let band = tracker.next_band();
            if let Some(swap) = self.builder.retarget(path, topic, band) {
                rationale.push(replacement_rationale(topic, &swap));
                adjustments.push(Adjustment::Retargeted {
                    skill: topic.to_owned(),
                    replacement: swap,
                });
            } else if path.remaining().iter().all(|a| a.topic != topic) {
                match self.builder.reinforce(path, topic, band)? {
                    Some(extra) => {
                        rationale.push(format!(
                            "{topic}: level {level} is still below target {target}; \
                             enqueued {} at {band}",
                            extra.id
                        ));
                        adjustments.push(Adjustment::Reinforced {
                            skill: topic.to_owned(),
                            activity: extra.id,
                        });
                    }
                    None => rationale.push(format!(
                        "{topic}: level {level} is still below target {target} but the path \
                         already holds {} activities for it",
                        self.builder.config().max_attempts_per_skill
                    )),
                }
            }
        }

        let skipped = self.skip_mastered(path, profile);
        if !skipped.is_empty() {
            rationale.push(skip_rationale(&skipped));
            adjustments.push(Adjustment::Skipped {
                activities: skipped,
            });
        }

        self.builder.check_invariant(path)?;
        Ok((adjustments, rationale))
    }

    /// Skip remaining activities whose skill already meets its path target.
    fn skip_mastered(&self, path: &mut LearningPath, profile: &SkillProfile) -> Vec<String> {
        let fallback = self.builder.config().prerequisite_level;
        let mastered: BTreeSet<String> = path
            .remaining()
            .iter()
            .filter(|a| profile.level(&a.topic) >= path.target(&a.topic).unwrap_or(fallback))
            .map(|a| a.topic.clone())
            .collect();
        if mastered.is_empty() {
            return Vec::new();
        }
        self.builder.skip_redundant(path, &mastered)
    }

    fn band_rationale(&self, topic: &str, step: &Transition) -> String {
        let (runs, comparison, threshold) = if step.new_band > step.old_band {
            (
                step.to.success_run(),
                "at or above",
                self.config.scale_up_accuracy,
            )
        } else {
            (
                step.to.struggle_run(),
                "at or below",
                self.config.scale_down_accuracy,
            )
        };
        format!(
            "{topic}: difficulty {} -> {} after {runs} consecutive completions {comparison} \
             {threshold:.2} (latest {:.2})",
            step.old_band, step.new_band, step.accuracy
        )
    }
}

fn replacement_rationale(topic: &str, swap: &Replacement) -> String {
    format!(
        "{topic}: next activity switched from {} ({}) to {} ({})",
        swap.removed, swap.from, swap.added, swap.to
    )
}

fn skip_rationale(skipped: &[String]) -> String {
    format!(
        "skipped [{}]: skill already meets its path target",
        skipped.join(", ")
    )
}
