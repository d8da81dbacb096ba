//! One developer event in, one atomic snapshot write out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::activity::{ActivityCatalog, LearningActivity};
use crate::adaptation::{AdaptationEngine, Adjustment, Transition};
use crate::content::{ContentGenerator, MaterializedActivity, materialize};
use crate::error::EngineError;
use crate::gateway::{GatewayError, LearnerState, PersistenceGateway, VersionedState};
use crate::goal::LearningGoal;
use crate::level::{Difficulty, ProficiencyLevel};
use crate::path::LearningPath;
use crate::profile::{Performance, SkillInsight, SkillSummary};

#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub version: u64,
    pub completed: LearningActivity,
    pub transition: Transition,
    pub adjustments: Vec<Adjustment>,
    pub rationale: Vec<String>,
    pub next: Option<LearningActivity>,
}

pub struct Session<G, C> {
    engine: AdaptationEngine,
    catalog: Arc<ActivityCatalog>,
    gateway: G,
    generator: C,
    max_save_retries: u32,
    top_gaps: usize,
}

impl<G: PersistenceGateway, C: ContentGenerator> Session<G, C> {
    #[must_use]
    pub fn new(
        engine: AdaptationEngine,
        catalog: Arc<ActivityCatalog>,
        gateway: G,
        generator: C,
    ) -> Self {
        Self {
            engine,
            catalog,
            gateway,
            generator,
            max_save_retries: 3,
            top_gaps: 5,
        }
    }

    #[must_use]
    pub fn with_max_save_retries(mut self, retries: u32) -> Self {
        self.max_save_retries = retries;
        self
    }

    #[must_use]
    pub fn with_top_gaps(mut self, top_gaps: usize) -> Self {
        self.top_gaps = top_gaps;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &AdaptationEngine {
        &self.engine
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Create the first snapshot for a developer.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnrolled` if a record exists, or an assessment/goal error.
    pub async fn enroll(
        &self,
        developer_id: &str,
        assessed: &BTreeMap<String, ProficiencyLevel>,
        goals: &[LearningGoal],
        at: DateTime<Utc>,
    ) -> Result<LearnerState, EngineError> {
        if self.gateway.load(developer_id).await?.is_some() {
            return Err(EngineError::AlreadyEnrolled(developer_id.to_owned()));
        }
        let state = self.engine.enroll(developer_id, assessed, goals, at)?;
        match self.gateway.save(developer_id, &state, 0).await {
            Ok(version) => {
                tracing::info!(developer = developer_id, version, "developer enrolled");
                Ok(state)
            }
            Err(GatewayError::VersionConflict { .. }) => {
                Err(EngineError::AlreadyEnrolled(developer_id.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `NotEnrolled` when the developer has no record.
    pub async fn snapshot(&self, developer_id: &str) -> Result<VersionedState, EngineError> {
        self.gateway
            .load(developer_id)
            .await?
            .ok_or_else(|| EngineError::NotEnrolled(developer_id.to_owned()))
    }

    /// Activity at the cursor with its content, `None` once the path is finished.
    ///
    /// # Errors
    ///
    /// Returns `NotEnrolled` when the developer has no record.
    pub async fn next_activity(
        &self,
        developer_id: &str,
    ) -> Result<Option<MaterializedActivity>, EngineError> {
        let current = self.snapshot(developer_id).await?;
        let Some(activity) = current.state.path.next_activity().cloned() else {
            return Ok(None);
        };
        Ok(Some(
            materialize(&self.generator, &self.catalog, activity).await,
        ))
    }

    /// # Errors
    ///
    /// Returns an error if the performance is invalid, the path is finished, or the
    /// write still conflicts after the configured retries.
    pub async fn record_completion(
        &self,
        developer_id: &str,
        performance: &Performance,
        at: DateTime<Utc>,
    ) -> Result<CompletionReport, EngineError> {
        let (state, version, outcome) = self
            .commit(developer_id, |state| {
                let outcome = self.engine.on_completion(state, performance, at)?;
                Ok((outcome.state.clone(), outcome))
            })
            .await?;
        Ok(CompletionReport {
            version,
            completed: outcome.completed,
            transition: outcome.transition,
            adjustments: outcome.adjustments,
            rationale: outcome.rationale,
            next: state.path.next_activity().cloned(),
        })
    }

    /// # Errors
    ///
    /// Returns `UnknownSkill` for unpublished topics or a persistence error.
    pub async fn request_difficulty(
        &self,
        developer_id: &str,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<Vec<String>, EngineError> {
        let (_, _, rationale) = self
            .commit(developer_id, |state| {
                self.engine.request_difficulty(state, topic, difficulty)
            })
            .await?;
        Ok(rationale)
    }

    /// # Errors
    ///
    /// Returns an error for invalid insights or a persistence error.
    pub async fn record_insight(
        &self,
        developer_id: &str,
        insight: &SkillInsight,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, EngineError> {
        let (_, _, rationale) = self
            .commit(developer_id, |state| {
                self.engine.on_insight(state, insight, at)
            })
            .await?;
        Ok(rationale)
    }

    /// Regenerate the path for a new goal set.
    ///
    /// # Errors
    ///
    /// Returns an error if a goal does not validate or persistence fails.
    pub async fn change_goals(
        &self,
        developer_id: &str,
        goals: &[LearningGoal],
        at: DateTime<Utc>,
    ) -> Result<LearningPath, EngineError> {
        let (state, _, ()) = self
            .commit(developer_id, |state| {
                Ok((self.engine.regenerate(state, goals, at)?, ()))
            })
            .await?;
        Ok(state.path)
    }

    /// # Errors
    ///
    /// Returns `NotEnrolled` or a persistence error.
    pub async fn abandon(&self, developer_id: &str, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.commit(developer_id, |state| Ok((self.engine.abandon(state, at), ())))
            .await?;
        Ok(())
    }

    /// Summary against the goals of the current path.
    ///
    /// # Errors
    ///
    /// Returns `NotEnrolled` or a goal validation error.
    pub async fn summary(&self, developer_id: &str) -> Result<SkillSummary, EngineError> {
        let current = self.snapshot(developer_id).await?;
        let profiler = self.engine.profiler();
        let profile = profiler.reconcile(&current.state.profile);
        profiler.summary(&profile, current.state.path.goals(), self.top_gaps)
    }

    /// Load, reconcile, apply `op` and save against the loaded version. Version
    /// conflicts reload and retry up to `max_save_retries` times.
    async fn commit<T, F>(
        &self,
        developer_id: &str,
        op: F,
    ) -> Result<(LearnerState, u64, T), EngineError>
    where
        F: Fn(&LearnerState) -> Result<(LearnerState, T), EngineError>,
    {
        let mut retries = 0;
        loop {
            let current = self.snapshot(developer_id).await?;
            let mut state = current.state;
            state.profile = self.engine.profiler().reconcile(&state.profile);
            let (next, output) = op(&state)?;
            match self.gateway.save(developer_id, &next, current.version).await {
                Ok(version) => {
                    tracing::debug!(developer = developer_id, version, "snapshot saved");
                    return Ok((next, version, output));
                }
                Err(GatewayError::VersionConflict {
                    expected, actual, ..
                }) if retries < self.max_save_retries => {
                    retries += 1;
                    tracing::warn!(
                        developer = developer_id,
                        expected,
                        actual,
                        attempt = retries,
                        "stale snapshot, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pathwise_graph::{Skill, SkillCategory, SkillGraph};

    use super::*;
    use crate::adaptation::DifficultyState;
    use crate::config::{AdaptationConfig, PathConfig, ProfilerConfig};
    use crate::content::ContentSource;
    use crate::content::mock::MockGenerator;
    use crate::gateway::InMemoryGateway;
    use crate::path::PathBuilder;
    use crate::profiler::SkillProfiler;

    /// Simulates a concurrent writer that bumps the record before the first `n` saves.
    #[derive(Default)]
    struct RacingGateway {
        inner: InMemoryGateway,
        races: AtomicU32,
    }

    impl PersistenceGateway for RacingGateway {
        async fn load(&self, developer_id: &str) -> Result<Option<VersionedState>, GatewayError> {
            self.inner.load(developer_id).await
        }

        async fn save(
            &self,
            developer_id: &str,
            state: &LearnerState,
            expected_version: u64,
        ) -> Result<u64, GatewayError> {
            let pending = self.races.load(Ordering::SeqCst);
            if pending > 0 && expected_version > 0 {
                self.races.store(pending - 1, Ordering::SeqCst);
                let current = self.inner.load(developer_id).await?;
                if let Some(current) = current {
                    self.inner
                        .save(developer_id, &current.state, current.version)
                        .await?;
                }
            }
            self.inner.save(developer_id, state, expected_version).await
        }
    }

    fn engine() -> AdaptationEngine {
        let graph = Arc::new(
            SkillGraph::from_skills([
                Skill::new("loops", SkillCategory::Concept),
                Skill::new("recursion", SkillCategory::Algorithm)
                    .with_prerequisites(["loops"]),
            ])
            .unwrap(),
        );
        AdaptationEngine::new(
            SkillProfiler::new(Arc::clone(&graph), ProfilerConfig::default()),
            PathBuilder::new(
                graph,
                Arc::new(ActivityCatalog::new(30)),
                PathConfig::default(),
            ),
            AdaptationConfig::default(),
        )
    }

    fn session<G: PersistenceGateway>(gateway: G) -> Session<G, MockGenerator> {
        Session::new(
            engine(),
            Arc::new(ActivityCatalog::new(30)),
            gateway,
            MockGenerator::failing(),
        )
    }

    fn goals() -> Vec<LearningGoal> {
        vec![LearningGoal::new("recursion", ProficiencyLevel::Intermediate, 1.0)]
    }

    fn known_loops() -> BTreeMap<String, ProficiencyLevel> {
        BTreeMap::from([("loops".to_owned(), ProficiencyLevel::Beginner)])
    }

    #[tokio::test]
    async fn enroll_once() {
        let session = session(InMemoryGateway::new());
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            session.enroll("dev", &known_loops(), &goals(), Utc::now()).await,
            Err(EngineError::AlreadyEnrolled(_))
        ));
        assert_eq!(session.snapshot("dev").await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn events_for_unknown_developer_fail() {
        let session = session(InMemoryGateway::new());
        assert!(matches!(
            session
                .record_completion("ghost", &Performance::new(0.5), Utc::now())
                .await,
            Err(EngineError::NotEnrolled(_))
        ));
        assert!(matches!(
            session.next_activity("ghost").await,
            Err(EngineError::NotEnrolled(_))
        ));
    }

    #[tokio::test]
    async fn completion_persists_profile_and_path_together() {
        let session = session(InMemoryGateway::new());
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();

        let first = session
            .record_completion("dev", &Performance::new(0.2), Utc::now())
            .await
            .unwrap();
        assert_eq!(first.version, 2);
        let second = session
            .record_completion("dev", &Performance::new(0.15), Utc::now())
            .await
            .unwrap();
        assert_eq!(second.version, 3);
        assert_eq!(second.next.as_ref().map(|a| a.topic.as_str()), Some("loops"));
        assert!(!second.rationale.is_empty());

        let stored = session.snapshot("dev").await.unwrap();
        assert_eq!(stored.state.path.cursor(), 2);
        assert_eq!(stored.state.profile.samples("recursion").len(), 2);
        assert_eq!(
            stored.state.difficulty["recursion"].state,
            DifficultyState::ScalingDown { streak: 2 }
        );
    }

    #[tokio::test]
    async fn next_activity_falls_back_to_catalog_text() {
        let session = session(InMemoryGateway::new());
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();
        let next = session.next_activity("dev").await.unwrap().unwrap();
        assert_eq!(next.source, ContentSource::Catalog);
        assert_eq!(next.activity.topic, "recursion");
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let gateway = RacingGateway {
            races: AtomicU32::new(2),
            ..RacingGateway::default()
        };
        let session = session(gateway);
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();
        let report = session
            .record_completion("dev", &Performance::new(0.6), Utc::now())
            .await
            .unwrap();
        // two racing writes plus the enrollment and our own save
        assert_eq!(report.version, 4);
        assert_eq!(session.snapshot("dev").await.unwrap().state.path.cursor(), 1);
    }

    #[tokio::test]
    async fn conflicts_give_up_after_retries() {
        let gateway = RacingGateway {
            races: AtomicU32::new(10),
            ..RacingGateway::default()
        };
        let session = session(gateway).with_max_save_retries(1);
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();
        let err = session
            .record_completion("dev", &Performance::new(0.6), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Gateway(GatewayError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn goals_difficulty_and_abandon() {
        let session = session(InMemoryGateway::new());
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();

        let rationale = session
            .request_difficulty("dev", "recursion", Difficulty::Advanced)
            .await
            .unwrap();
        assert!(!rationale.is_empty());
        let next = session.next_activity("dev").await.unwrap().unwrap();
        assert_eq!(next.activity.difficulty, Difficulty::Advanced);

        let path = session
            .change_goals(
                "dev",
                &[LearningGoal::new("loops", ProficiencyLevel::Advanced, 1.0)],
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(path.activities()[0].topic, "loops");

        let summary = session.summary("dev").await.unwrap();
        assert_eq!(summary.top_gaps[0].skill, "loops");

        session.abandon("dev", Utc::now()).await.unwrap();
        assert!(session.next_activity("dev").await.unwrap().is_none());
        assert_eq!(session.snapshot("dev").await.unwrap().version, 4);
    }

    #[tokio::test]
    async fn insight_is_recorded() {
        let session = session(InMemoryGateway::new());
        session
            .enroll("dev", &known_loops(), &goals(), Utc::now())
            .await
            .unwrap();
        let insight = SkillInsight {
            skill: "recursion".into(),
            observed: ProficiencyLevel::Advanced,
            confidence: 0.8,
        };
        let rationale = session
            .record_insight("dev", &insight, Utc::now())
            .await
            .unwrap();
        assert_eq!(rationale.len(), 2);
        let stored = session.snapshot("dev").await.unwrap();
        assert_eq!(
            stored.state.profile.level("recursion"),
            ProficiencyLevel::Advanced
        );
        assert!(stored.state.path.is_finished());
    }
}
