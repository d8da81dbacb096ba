//! Skill graph persistence.
//!
//! The graph file is TOML with one `[[skill]]` table per published skill:
//!
//! ```toml
//! [[skill]]
//! id = "loops"
//! category = "concept"
//! prerequisites = ["variables"]
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::GraphError;
use crate::graph::{Skill, SkillGraph};

pub trait GraphStore: Send + Sync {
    /// Load and validate the full graph.
    fn load_graph(&self) -> impl Future<Output = Result<SkillGraph, GraphError>> + Send;

    /// Validate and durably append a skill.
    ///
    /// A rejected publish must leave the stored graph untouched.
    fn publish(&self, skill: Skill) -> impl Future<Output = Result<(), GraphError>> + Send;
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SkillFile {
    #[serde(default, rename = "skill")]
    skills: Vec<Skill>,
}

/// Parse and validate a TOML skill list.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or the skills do not form a valid DAG.
pub fn parse_skills(content: &str) -> Result<SkillGraph, GraphError> {
    let file: SkillFile = toml::from_str(content)?;
    SkillGraph::from_skills(file.skills)
}

/// Render a graph back to the TOML skill list format, in publication order.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_skills(graph: &SkillGraph) -> Result<String, GraphError> {
    let file = SkillFile {
        skills: graph.skills().cloned().collect(),
    };
    Ok(toml::to_string(&file)?)
}

/// File-backed graph store. A missing file is an empty graph.
#[derive(Debug)]
pub struct TomlGraphStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlGraphStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<SkillGraph, GraphError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_skills(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "skill graph file missing, starting empty");
                Ok(SkillGraph::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl GraphStore for TomlGraphStore {
    async fn load_graph(&self) -> Result<SkillGraph, GraphError> {
        let graph = self.read().await?;
        tracing::info!(path = %self.path.display(), skills = graph.len(), "skill graph loaded");
        Ok(graph)
    }

    async fn publish(&self, skill: Skill) -> Result<(), GraphError> {
        let _guard = self.write_lock.lock().await;
        let mut graph = self.read().await?;
        let id = skill.id.clone();
        match graph.publish(skill) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(skill = %id, "skill already published");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(skill = %id, "publish rejected: {e}");
                return Err(e);
            }
        }

        let rendered = render_skills(&graph)?;
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, rendered).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::info!(skill = %id, "skill published");
        Ok(())
    }
}
