use crate::error::BackendError;
use crate::models::{GeneratedQuestion, PageBlock};
use crate::traits::{BlockStore, QuestionStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

const BLOCKS_TABLE: &str = "legal_blocks";
const QUESTIONS_TABLE: &str = "generated_questions";

/// PostgREST client for the two ingestion tables.
pub struct SupabaseStore {
    client: Client,
    endpoint: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(endpoint: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            service_key: service_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.endpoint.trim_end_matches('/'), table)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl BlockStore for SupabaseStore {
    async fn page_is_current(
        &self,
        doc_id: &str,
        page_number: u32,
        page_sha: &str,
    ) -> Result<bool, BackendError> {
        let response = self
            .authed(self.client.get(self.table_url(BLOCKS_TABLE)))
            .query(&[
                ("select", "id".to_string()),
                ("doc_id", format!("eq.{doc_id}")),
                ("page_number", format!("eq.{page_number}")),
                ("page_sha", format!("eq.{page_sha}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "supabase".to_string(),
                details: response.status().to_string(),
            });
        }

        let rows: Value = response.json().await?;
        Ok(rows_present(&rows))
    }

    async fn insert_blocks(
        &self,
        doc_id: &str,
        page_number: u32,
        page_sha: &str,
        blocks: &[PageBlock],
    ) -> Result<(), BackendError> {
        let rows = block_rows(doc_id, page_number, page_sha, blocks);
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .authed(self.client.post(self.table_url(BLOCKS_TABLE)))
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "supabase".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl QuestionStore for SupabaseStore {
    async fn insert_questions(
        &self,
        doc_id: &str,
        page_number: u32,
        questions: &[GeneratedQuestion],
    ) -> Result<(), BackendError> {
        let rows = question_rows(doc_id, page_number, questions);
        if rows.is_empty() {
            return Ok(());
        }

        // Duplicate inserts are silently dropped so a re-run never creates
        // a second copy of a question.
        let response = self
            .authed(self.client.post(self.table_url(QUESTIONS_TABLE)))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "supabase".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

fn rows_present(rows: &Value) -> bool {
    rows.as_array().is_some_and(|rows| !rows.is_empty())
}

fn block_rows(doc_id: &str, page_number: u32, page_sha: &str, blocks: &[PageBlock]) -> Vec<Value> {
    blocks
        .iter()
        .map(|block| {
            json!({
                "doc_id": doc_id,
                "page_sha": page_sha,
                "page_number": page_number,
                "block_id": block.block_id,
                "text": block.text,
                "section_hint": block.section_hint,
                "bbox_left": block.bounds.left,
                "bbox_top": block.bounds.top,
                "bbox_right": block.bounds.right,
                "bbox_bottom": block.bounds.bottom,
                "char_start": block.char_start,
                "char_end": block.char_end,
                "embedding": block.embedding,
            })
        })
        .collect()
}

fn question_rows(doc_id: &str, page_number: u32, questions: &[GeneratedQuestion]) -> Vec<Value> {
    questions
        .iter()
        .map(|question| {
            json!({
                "doc_id": doc_id,
                "page": page_number,
                "block_id": question.block_id,
                "question": question.question,
                "ref_title": question.ref_title,
                "ref_note": question.ref_note,
                "choices": question.choices,
                "correct_index": question.correct_index,
                "explanation": question.explanation,
                "source_block_sha": question.source_block_sha,
            })
        })
        .collect()
}
