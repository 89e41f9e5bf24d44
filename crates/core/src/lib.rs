pub mod blocks;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod questions;
pub mod sections;
pub mod stores;
pub mod traits;

pub use blocks::{assign_char_offsets, group_spans};
pub use embeddings::{
    Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
pub use error::{BackendError, IngestError};
pub use extractor::{page_sha, ExtractedPage, PageSource, PdfiumSource, SpanBounds, TextSpan};
pub use ingest::{
    build_document_fingerprint, digest_file, sha256_hex, IngestionPipeline, IngestionReport,
    PageOutcome, SkippedPage,
};
pub use models::{
    BlockBounds, DocumentFingerprint, GeneratedQuestion, IngestionOptions, Mcq, PageBlock,
};
pub use questions::{
    compose_question_with_reference, parse_mcq, OpenAiQuestionGenerator, QuestionGenerator,
    DEFAULT_QUESTION_MODEL,
};
pub use sections::SectionHinter;
pub use stores::SupabaseStore;
pub use traits::{BlockStore, QuestionStore};
