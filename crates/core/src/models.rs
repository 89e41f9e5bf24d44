use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub doc_id: String,
    /// File name of the source PDF.
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// Block geometry in page coordinates, top-left origin, truncated to
/// integer points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// One text region of a page. Identity within a document is
/// `(doc_id, page_number, block_id)`; `block_id` is `p{page}-b{index:02}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageBlock {
    pub block_id: String,
    pub text: String,
    pub bounds: BlockBounds,
    /// Byte offset of the block text within the full page text.
    pub char_start: usize,
    pub char_end: usize,
    pub section_hint: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A structurally valid multiple-choice question as returned by the chat
/// model: exactly four options, `correct_index` in `0..4`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mcq {
    pub stem: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
}

/// A question derived from exactly one block, with the in-code reference
/// suffix already composed and the source block's text hash attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub block_id: String,
    pub question: String,
    pub ref_title: String,
    pub ref_note: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
    pub source_block_sha: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Vertical gap (in points) between consecutive spans that starts a new
    /// block.
    pub block_gap_points: f32,
    /// Inclusive character-count range a block must fall in to be used for
    /// question generation.
    pub mcq_min_chars: usize,
    pub mcq_max_chars: usize,
    /// Cap applied to the first-line fallback of the section hint.
    pub section_hint_max_chars: usize,
    pub law_title_regex: &'static str,
    pub law_name_regex: &'static str,
    pub section_line_regex: &'static str,
    pub section_anywhere_regex: &'static str,
    /// Hint used when no title or section heading is found on the page.
    pub fallback_section_hint: &'static str,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            block_gap_points: 6.0,
            mcq_min_chars: 150,
            mcq_max_chars: 1_200,
            section_hint_max_chars: 60,
            law_title_regex: "^חוק\\s+[^,]+,\\s+התש[^\\d]*–\\d{4}",
            law_name_regex: "^חוק\\s+([^,]+)",
            section_line_regex: "^סעיף\\s*\\d+(\\([א-ת0-9]+\\))?",
            section_anywhere_regex: "סעיף\\s*(\\d+(\\([א-ת0-9]+\\))?)",
            fallback_section_hint: "הספר",
        }
    }
}
