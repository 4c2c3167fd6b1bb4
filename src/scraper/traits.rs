use crate::model::{FetchError, FetchRequest, RawPage};
use crate::normalizer::RecordShape;

/// A paged remote listing the pipeline can walk.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Endpoint put on every `FetchRequest` issued against this source.
    fn endpoint(&self) -> &str;

    fn shape(&self) -> RecordShape;

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError>;

    /// Re-acquires credentials after an auth rejection. Returns `Ok(false)` when
    /// the source has nothing to refresh.
    async fn refresh_credentials(&self) -> Result<bool, FetchError> {
        Ok(false)
    }
}
