use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use pathwise_core::config::{AdaptationConfig, PathConfig, ProfilerConfig};
use pathwise_core::content::mock::MockGenerator;
use pathwise_core::{
    ActivityCatalog, AdaptationEngine, ContentSource, Difficulty, DifficultyState, EngineError,
    LearningGoal, PathBuilder, Performance, PersistenceGateway, ProficiencyLevel, Session,
    SkillProfiler,
};
use pathwise_graph::{GraphStore, Skill, SkillCategory, SkillGraph, TomlGraphStore};
use pathwise_store::SqliteGateway;

const SKILLS: &str = r#"
[[skill]]
id = "loops"
category = "concept"

[[skill]]
id = "arrays"
category = "concept"
prerequisites = ["loops"]

[[skill]]
id = "recursion"
category = "algorithm"
prerequisites = ["loops"]
"#;

const CATALOG: &str = r#"
[[activity]]
id = "loops-drills"
topic = "loops"
difficulty = "beginner"
estimated_minutes = 20
description = "Write for and while loops over ranges."
"#;

async fn graph(dir: &Path) -> Arc<SkillGraph> {
    let path = dir.join("skills.toml");
    tokio::fs::write(&path, SKILLS).await.unwrap();
    Arc::new(TomlGraphStore::new(path).load_graph().await.unwrap())
}

fn engine(graph: &Arc<SkillGraph>, catalog: &Arc<ActivityCatalog>) -> AdaptationEngine {
    AdaptationEngine::new(
        SkillProfiler::new(Arc::clone(graph), ProfilerConfig::default()),
        PathBuilder::new(Arc::clone(graph), Arc::clone(catalog), PathConfig::default()),
        AdaptationConfig::default(),
    )
}

async fn session(
    dir: &Path,
    generator: MockGenerator,
) -> Session<SqliteGateway, MockGenerator> {
    let graph = graph(dir).await;
    let catalog = Arc::new(ActivityCatalog::parse(CATALOG, 30).unwrap());
    catalog.validate_against(&graph).unwrap();
    let db = dir.join("pathwise.db");
    let gateway = SqliteGateway::open(db.to_str().unwrap()).await.unwrap();
    Session::new(engine(&graph, &catalog), catalog, gateway, generator)
}

fn assessed(levels: &[(&str, ProficiencyLevel)]) -> BTreeMap<String, ProficiencyLevel> {
    levels
        .iter()
        .map(|(skill, level)| ((*skill).to_owned(), *level))
        .collect()
}

#[tokio::test]
async fn intermediate_developer_gets_single_activity_at_current_band() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path(), MockGenerator::failing()).await;

    let state = session
        .enroll(
            "amir",
            &assessed(&[("arrays", ProficiencyLevel::Intermediate)]),
            &[LearningGoal::new("arrays", ProficiencyLevel::Advanced, 1.0)],
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(state.path.len(), 1);
    let activity = state.path.next_activity().unwrap();
    assert_eq!(activity.topic, "arrays");
    assert_eq!(activity.difficulty, Difficulty::Intermediate);
    session
        .engine()
        .builder()
        .check_invariant(&state.path)
        .unwrap();
}

#[tokio::test]
async fn struggling_developer_gets_prerequisites_and_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let generator = MockGenerator::with_responses(vec!["trace factorial(3) by hand".into()]);
    let session = session(dir.path(), generator.clone()).await;
    let goals = [LearningGoal::new(
        "recursion",
        ProficiencyLevel::Intermediate,
        1.0,
    )];

    session
        .enroll(
            "dev",
            &assessed(&[("loops", ProficiencyLevel::Beginner)]),
            &goals,
            Utc::now(),
        )
        .await
        .unwrap();

    let next = session.next_activity("dev").await.unwrap().unwrap();
    assert_eq!(next.activity.topic, "recursion");
    assert_eq!(next.source, ContentSource::Generated);
    assert_eq!(next.content, "trace factorial(3) by hand");
    assert_eq!(generator.calls().len(), 1);

    session
        .record_completion("dev", &Performance::new(0.2), Utc::now())
        .await
        .unwrap();
    let report = session
        .record_completion("dev", &Performance::new(0.15), Utc::now())
        .await
        .unwrap();
    assert_eq!(report.version, 3);
    assert_eq!(report.transition.to, DifficultyState::ScalingDown { streak: 2 });
    assert_eq!(report.next.as_ref().map(|a| a.topic.as_str()), Some("loops"));
    assert!(!report.rationale.is_empty());

    let before = session.snapshot("dev").await.unwrap();
    session
        .engine()
        .builder()
        .check_invariant(&before.state.path)
        .unwrap();
    session.gateway().pool().close().await;

    let reopened = SqliteGateway::open(dir.path().join("pathwise.db").to_str().unwrap())
        .await
        .unwrap();
    let after = reopened.load("dev").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(reopened.developers().await.unwrap(), ["dev"]);
}

#[tokio::test]
async fn summary_reports_goal_gap() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path(), MockGenerator::failing()).await;
    session
        .enroll(
            "dev",
            &assessed(&[("loops", ProficiencyLevel::Beginner)]),
            &[LearningGoal::new("recursion", ProficiencyLevel::Advanced, 2.0)],
            Utc::now(),
        )
        .await
        .unwrap();

    let next = session.next_activity("dev").await.unwrap().unwrap();
    assert_eq!(next.source, ContentSource::Catalog);

    let summary = session.summary("dev").await.unwrap();
    assert_eq!(summary.developer_id, "dev");
    assert_eq!(summary.top_gaps[0].skill, "recursion");
    assert_eq!(summary.top_gaps[0].target, ProficiencyLevel::Advanced);
    assert_eq!(summary.competencies["loops"], ProficiencyLevel::Beginner);
}

#[tokio::test]
async fn goals_for_unpublished_skills_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path(), MockGenerator::failing()).await;
    let err = session
        .enroll(
            "dev",
            &BTreeMap::new(),
            &[LearningGoal::new("haskell", ProficiencyLevel::Beginner, 1.0)],
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSkill(skill) if skill == "haskell"));
    assert!(session.gateway().developers().await.unwrap().is_empty());
}

#[tokio::test]
async fn published_skill_is_visible_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skills.toml");
    tokio::fs::write(&path, SKILLS).await.unwrap();
    let store = TomlGraphStore::new(&path);

    store
        .publish(
            Skill::new("memoization", SkillCategory::Algorithm).with_prerequisites(["recursion"]),
        )
        .await
        .unwrap();
    let cyclic = Skill::new("loops", SkillCategory::Concept).with_prerequisites(["memoization"]);
    assert!(store.publish(cyclic).await.is_err());

    let graph = store.load_graph().await.unwrap();
    assert_eq!(graph.len(), 4);
    let order = graph
        .topological_order(["memoization", "recursion", "loops"])
        .unwrap();
    assert_eq!(order, ["loops", "recursion", "memoization"]);
}
