//! Seam to the external content generator, with catalog text as the fallback.

use std::future::Future;

use serde::Serialize;

use crate::activity::{ActivityCatalog, LearningActivity};

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content generation unavailable: {0}")]
    GenerationUnavailable(String),
}

pub trait ContentGenerator: Send + Sync {
    /// Produce the explanation and exercises for one activity.
    fn materialize(
        &self,
        activity: &LearningActivity,
    ) -> impl Future<Output = Result<String, ContentError>> + Send;
}

/// Generator used when no content service is configured. Every activity falls back
/// to catalog text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGenerator;

impl ContentGenerator for NoGenerator {
    async fn materialize(&self, _activity: &LearningActivity) -> Result<String, ContentError> {
        Err(ContentError::GenerationUnavailable(
            "no content generator configured".into(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Generated,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedActivity {
    pub activity: LearningActivity,
    pub content: String,
    pub source: ContentSource,
}

/// Ask `generator` for content, using catalog text when it is unavailable. Never
/// fails.
pub async fn materialize<G: ContentGenerator>(
    generator: &G,
    catalog: &ActivityCatalog,
    activity: LearningActivity,
) -> MaterializedActivity {
    match generator.materialize(&activity).await {
        Ok(content) => MaterializedActivity {
            activity,
            content,
            source: ContentSource::Generated,
        },
        Err(e) => {
            tracing::warn!(activity = %activity.id, "falling back to catalog content: {e}");
            let content = catalog.fallback_content(&activity);
            MaterializedActivity {
                activity,
                content,
                source: ContentSource::Catalog,
            }
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Test-only scripted content generator.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};

    use super::{ContentError, ContentGenerator};
    use crate::activity::LearningActivity;

    #[derive(Debug, Clone, Default)]
    pub struct MockGenerator {
        responses: Arc<Mutex<VecDeque<String>>>,
        pub fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockGenerator {
        #[must_use]
        pub fn with_responses(responses: Vec<String>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                ..Self::default()
            }
        }

        #[must_use]
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        /// Activity ids requested so far.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl ContentGenerator for MockGenerator {
        async fn materialize(&self, activity: &LearningActivity) -> Result<String, ContentError> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(activity.id.clone());
            if self.fail {
                return Err(ContentError::GenerationUnavailable("mock failure".into()));
            }
            let scripted = self
                .responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            Ok(scripted.unwrap_or_else(|| format!("generated content for {}", activity.id)))
        }
    }
}
