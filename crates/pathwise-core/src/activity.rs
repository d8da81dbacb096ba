//! Activity templates and the catalog they are selected from.
//!
//! Catalog file format:
//!
//! ```toml
//! [[activity]]
//! id = "loops-intro"
//! topic = "loops"
//! difficulty = "beginner"
//! estimated_minutes = 20
//! description = "Iterate over a range and accumulate a sum."
//!
//! [[activity]]
//! id = "loops-nested"
//! topic = "loops"
//! difficulty = "intermediate"
//! estimated_minutes = 30
//! prerequisites = ["loops-intro"]
//! ```
//!
//! `prerequisites` name catalog activities of the same topic. They are scheduled ahead
//! of the activity unless the path already holds them.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use pathwise_graph::SkillGraph;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::level::Difficulty;

/// Immutable activity template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LearningActivity {
    pub id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub estimated_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LearningActivity {
    /// Stand-in used when the catalog has nothing for a topic at a band.
    #[must_use]
    pub fn synthesized(topic: &str, difficulty: Difficulty, estimated_minutes: u32) -> Self {
        Self {
            id: format!("{topic}/{difficulty}"),
            topic: topic.to_owned(),
            difficulty,
            prerequisites: Vec::new(),
            estimated_minutes,
            description: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "activity")]
    activities: Vec<LearningActivity>,
}

#[derive(Debug, Clone)]
pub struct ActivityCatalog {
    /// topic -> templates sorted by (difficulty, id)
    by_topic: BTreeMap<String, Vec<LearningActivity>>,
    default_minutes: u32,
}

impl ActivityCatalog {
    #[must_use]
    pub fn new(default_minutes: u32) -> Self {
        Self {
            by_topic: BTreeMap::new(),
            default_minutes,
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidCatalog` on duplicate ids, blank ids, zero durations, and
    /// activity prerequisites that are unknown, of another topic, or cyclic.
    pub fn from_activities(
        activities: impl IntoIterator<Item = LearningActivity>,
        default_minutes: u32,
    ) -> Result<Self, EngineError> {
        let mut catalog = Self::new(default_minutes);
        let mut seen = HashSet::new();
        for activity in activities {
            if activity.id.trim().is_empty() {
                return Err(EngineError::InvalidCatalog("activity id must not be empty".into()));
            }
            if activity.estimated_minutes == 0 {
                return Err(EngineError::InvalidCatalog(format!(
                    "{}: estimated_minutes must be positive",
                    activity.id
                )));
            }
            if !seen.insert(activity.id.clone()) {
                return Err(EngineError::InvalidCatalog(format!(
                    "duplicate activity id: {}",
                    activity.id
                )));
            }
            catalog
                .by_topic
                .entry(activity.topic.clone())
                .or_default()
                .push(activity);
        }
        for entries in catalog.by_topic.values_mut() {
            entries.sort_by(|a, b| (a.difficulty, &a.id).cmp(&(b.difficulty, &b.id)));
        }
        catalog.check_prerequisites()?;
        Ok(catalog)
    }

    /// Parse a TOML catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the entries are invalid.
    pub fn parse(content: &str, default_minutes: u32) -> Result<Self, EngineError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_activities(file.activities, default_minutes)
    }

    /// Every topic must exist in the graph.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSkill` for the first topic the graph does not know.
    pub fn validate_against(&self, graph: &SkillGraph) -> Result<(), EngineError> {
        match self.by_topic.keys().find(|topic| !graph.contains(topic)) {
            Some(topic) => Err(EngineError::UnknownSkill(topic.clone())),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_topic.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }

    #[must_use]
    pub fn default_minutes(&self) -> u32 {
        self.default_minutes
    }

    /// First catalog template for `topic` at exactly `difficulty`, or a synthesized one.
    #[must_use]
    pub fn select(&self, topic: &str, difficulty: Difficulty) -> LearningActivity {
        self.candidates(topic, difficulty)
            .next()
            .cloned()
            .unwrap_or_else(|| LearningActivity::synthesized(topic, difficulty, self.default_minutes))
    }

    /// Like [`select`](Self::select) but skips ids already in `used`. Repeated synthesized
    /// activities get a numeric suffix so ids stay distinct within a path.
    #[must_use]
    pub fn select_fresh(
        &self,
        topic: &str,
        difficulty: Difficulty,
        used: &BTreeSet<&str>,
    ) -> LearningActivity {
        if let Some(found) = self
            .candidates(topic, difficulty)
            .find(|a| !used.contains(a.id.as_str()))
        {
            return found.clone();
        }
        let mut activity = self.select(topic, difficulty);
        let base = activity.id.clone();
        let mut n = 2;
        while used.contains(activity.id.as_str()) {
            activity.id = format!("{base}#{n}");
            n += 1;
        }
        activity
    }

    /// `activity` preceded by the catalog activities it requires, deepest first.
    /// Requirements whose ids are in `used` are left out.
    #[must_use]
    pub fn with_prerequisites(
        &self,
        activity: LearningActivity,
        used: &BTreeSet<&str>,
    ) -> Vec<LearningActivity> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        self.push_prerequisites(&activity, used, &mut seen, &mut out);
        out.push(activity);
        out
    }

    fn push_prerequisites(
        &self,
        activity: &LearningActivity,
        used: &BTreeSet<&str>,
        seen: &mut BTreeSet<String>,
        out: &mut Vec<LearningActivity>,
    ) {
        for id in &activity.prerequisites {
            if used.contains(id.as_str()) || !seen.insert(id.clone()) {
                continue;
            }
            if let Some(required) = self.find(&activity.topic, id) {
                self.push_prerequisites(required, used, seen, out);
                out.push(required.clone());
            }
        }
    }

    fn find(&self, topic: &str, id: &str) -> Option<&LearningActivity> {
        self.by_topic.get(topic)?.iter().find(|a| a.id == id)
    }

    fn check_prerequisites(&self) -> Result<(), EngineError> {
        for entries in self.by_topic.values() {
            for activity in entries {
                if let Some(missing) = activity
                    .prerequisites
                    .iter()
                    .find(|id| !entries.iter().any(|a| &a.id == *id))
                {
                    return Err(EngineError::InvalidCatalog(format!(
                        "{}: prerequisite {missing} is not a {} activity in the catalog",
                        activity.id, activity.topic
                    )));
                }
            }
            let mut done = HashSet::new();
            for activity in entries {
                if reaches_cycle(entries, activity, &mut done, &mut Vec::new()) {
                    return Err(EngineError::InvalidCatalog(format!(
                        "prerequisite cycle through {}",
                        activity.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Text served when the content generator is unavailable.
    #[must_use]
    pub fn fallback_content(&self, activity: &LearningActivity) -> String {
        match &activity.description {
            Some(description) => description.clone(),
            None => format!(
                "Practice {} at {} level (about {} minutes).",
                activity.topic, activity.difficulty, activity.estimated_minutes
            ),
        }
    }

    fn candidates<'a>(
        &'a self,
        topic: &'a str,
        difficulty: Difficulty,
    ) -> impl Iterator<Item = &'a LearningActivity> + 'a {
        self.by_topic
            .get(topic)
            .into_iter()
            .flatten()
            .filter(move |a| a.difficulty == difficulty)
    }
}

fn reaches_cycle<'a>(
    entries: &'a [LearningActivity],
    activity: &'a LearningActivity,
    done: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> bool {
    if done.contains(activity.id.as_str()) {
        return false;
    }
    if stack.contains(&activity.id.as_str()) {
        return true;
    }
    stack.push(&activity.id);
    for id in &activity.prerequisites {
        if let Some(next) = entries.iter().find(|a| &a.id == id)
            && reaches_cycle(entries, next, done, stack)
        {
            return true;
        }
    }
    stack.pop();
    done.insert(&activity.id);
    false
}
