//! Skill profiling, learning path sequencing, and performance-driven adaptation.

pub mod activity;
pub mod adaptation;
pub mod config;
pub mod content;
mod error;
pub mod gateway;
pub mod goal;
pub mod level;
pub mod path;
pub mod profile;
pub mod profiler;
pub mod session;

pub use activity::{ActivityCatalog, LearningActivity};
pub use adaptation::{
    AdaptationEngine, AdaptationOutcome, Adjustment, DifficultyState, SkillDifficulty, Transition,
};
pub use config::Config;
pub use content::{ContentError, ContentGenerator, ContentSource, MaterializedActivity, NoGenerator};
pub use error::EngineError;
pub use gateway::{GatewayError, InMemoryGateway, LearnerState, PersistenceGateway, VersionedState};
pub use goal::{LearningGoal, SkillGap};
pub use level::{Difficulty, ProficiencyLevel};
pub use path::{Insertion, LearningPath, PathBuilder, Replacement};
pub use profile::{
    Performance, ProgressSample, SkillInsight, SkillProfile, SkillSummary, TrendDirection,
};
pub use profiler::SkillProfiler;
pub use session::{CompletionReport, Session};
