use pathwise_core::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored version {version} for {developer_id} is out of range")]
    CorruptVersion { developer_id: String, version: i64 },
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::Backend(Box::new(err))
    }
}
