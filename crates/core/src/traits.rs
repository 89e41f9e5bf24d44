use crate::error::BackendError;
use crate::models::{GeneratedQuestion, PageBlock};
use async_trait::async_trait;

#[async_trait]
pub trait BlockStore {
    /// True when the store already holds this page under the same content
    /// digest, in which case the page is skipped entirely.
    async fn page_is_current(
        &self,
        doc_id: &str,
        page_number: u32,
        page_sha: &str,
    ) -> Result<bool, BackendError>;

    async fn insert_blocks(
        &self,
        doc_id: &str,
        page_number: u32,
        page_sha: &str,
        blocks: &[PageBlock],
    ) -> Result<(), BackendError>;
}

#[async_trait]
pub trait QuestionStore {
    async fn insert_questions(
        &self,
        doc_id: &str,
        page_number: u32,
        questions: &[GeneratedQuestion],
    ) -> Result<(), BackendError>;
}
