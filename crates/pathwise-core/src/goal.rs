use std::fmt;
use std::str::FromStr;

use pathwise_graph::SkillGraph;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::level::ProficiencyLevel;

const DEFAULT_PRIORITY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LearningGoal {
    pub skill: String,
    pub target: ProficiencyLevel,
    pub priority: f64,
}

impl LearningGoal {
    #[must_use]
    pub fn new(skill: impl Into<String>, target: ProficiencyLevel, priority: f64) -> Self {
        Self {
            skill: skill.into(),
            target,
            priority,
        }
    }

    /// # Errors
    ///
    /// Returns `UnknownSkill` if the goal names a skill outside the graph and
    /// `InvalidGoal` for non-positive or non-finite priorities.
    pub fn validate(&self, graph: &SkillGraph) -> Result<(), EngineError> {
        if !graph.contains(&self.skill) {
            return Err(EngineError::UnknownSkill(self.skill.clone()));
        }
        if !self.priority.is_finite() || self.priority <= 0.0 {
            return Err(EngineError::InvalidGoal(format!(
                "{}: priority must be a positive number, got {}",
                self.skill, self.priority
            )));
        }
        Ok(())
    }
}

impl fmt::Display for LearningGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.skill, self.target, self.priority)
    }
}

/// Parses `skill:target[:priority]`, e.g. `recursion:advanced:2.5`.
impl FromStr for LearningGoal {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let skill = parts.next().map(str::trim).unwrap_or_default();
        let target = parts.next().map(str::trim);
        let priority = parts.next().map(str::trim);
        if skill.is_empty() || parts.next().is_some() {
            return Err(EngineError::InvalidGoal(format!(
                "expected skill:target[:priority], got {s:?}"
            )));
        }
        let target = target
            .ok_or_else(|| EngineError::InvalidGoal(format!("missing target level in {s:?}")))?
            .parse::<ProficiencyLevel>()
            .map_err(|e| EngineError::InvalidGoal(e.to_string()))?;
        let priority = match priority {
            Some(p) => p
                .parse::<f64>()
                .map_err(|e| EngineError::InvalidGoal(format!("priority {p:?}: {e}")))?,
            None => DEFAULT_PRIORITY,
        };
        Ok(Self::new(skill, target, priority))
    }
}

/// A skill whose current proficiency is below a goal target.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkillGap {
    pub skill: String,
    pub current: ProficiencyLevel,
    pub target: ProficiencyLevel,
    pub priority: f64,
}
