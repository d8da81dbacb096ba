//! Skill prerequisite graph, deterministic ordering, and the graph store.

mod error;
pub mod graph;
pub mod store;

pub use error::GraphError;
pub use graph::{Skill, SkillCategory, SkillGraph};
pub use store::{GraphStore, TomlGraphStore, parse_skills, render_skills};
