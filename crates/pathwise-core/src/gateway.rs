//! Versioned per-developer snapshots and the persistence seam.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::adaptation::SkillDifficulty;
use crate::path::LearningPath;
use crate::profile::SkillProfile;

/// Everything persisted for one developer. Profile and path are always written
/// together so a completion can never be half-applied.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LearnerState {
    pub profile: SkillProfile,
    pub path: LearningPath,
    #[serde(default)]
    pub difficulty: BTreeMap<String, SkillDifficulty>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VersionedState {
    pub state: LearnerState,
    /// Monotonic write counter; `0` means no record exists yet.
    pub version: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("version conflict for {developer_id}: expected {expected}, found {actual}")]
    VersionConflict {
        developer_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("persistence backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Storage for [`LearnerState`] snapshots with optimistic concurrency.
pub trait PersistenceGateway: Send + Sync {
    /// Latest snapshot, `None` when the developer has no record.
    fn load(
        &self,
        developer_id: &str,
    ) -> impl Future<Output = Result<Option<VersionedState>, GatewayError>> + Send;

    /// Store `state` if the current version still equals `expected_version`.
    ///
    /// Returns the new version.
    fn save(
        &self,
        developer_id: &str,
        state: &LearnerState,
        expected_version: u64,
    ) -> impl Future<Output = Result<u64, GatewayError>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: RwLock<HashMap<String, VersionedState>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceGateway for InMemoryGateway {
    async fn load(&self, developer_id: &str) -> Result<Option<VersionedState>, GatewayError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(developer_id).cloned())
    }

    async fn save(
        &self,
        developer_id: &str,
        state: &LearnerState,
        expected_version: u64,
    ) -> Result<u64, GatewayError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let actual = records.get(developer_id).map_or(0, |r| r.version);
        if actual != expected_version {
            return Err(GatewayError::VersionConflict {
                developer_id: developer_id.to_owned(),
                expected: expected_version,
                actual,
            });
        }
        let version = actual + 1;
        records.insert(
            developer_id.to_owned(),
            VersionedState {
                state: state.clone(),
                version,
            },
        );
        Ok(version)
    }
}
