use crate::blocks::{assign_char_offsets, group_spans};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{page_sha, PageSource};
use crate::models::{DocumentFingerprint, IngestionOptions};
use crate::questions::{compose_question_with_reference, QuestionGenerator};
use crate::sections::SectionHinter;
use crate::traits::{BlockStore, QuestionStore};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PageOutcome {
    pub page: u32,
    pub blocks_stored: usize,
    pub questions_stored: usize,
    /// True when the store already held the page under the same digest.
    pub skipped_existing: bool,
}

#[derive(Debug, Clone)]
pub struct SkippedPage {
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub doc_id: String,
    pub pages: Vec<PageOutcome>,
    pub skipped_pages: Vec<SkippedPage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestionReport {
    pub fn total_blocks(&self) -> usize {
        self.pages.iter().map(|page| page.blocks_stored).sum()
    }

    pub fn total_questions(&self) -> usize {
        self.pages.iter().map(|page| page.questions_stored).sum()
    }
}

/// Sequential, single-pass pipeline over one document: extract page spans,
/// build blocks with offsets and a section hint, embed, persist, then
/// generate and persist questions for blocks of suitable length. A failure
/// anywhere in a page records the page as skipped and moves on.
pub struct IngestionPipeline<S, E, G, B, Q>
where
    S: PageSource,
    E: Embedder,
    G: QuestionGenerator,
    B: BlockStore,
    Q: QuestionStore,
{
    source: S,
    embedder: E,
    generator: G,
    block_store: B,
    question_store: Q,
    hinter: SectionHinter,
    options: IngestionOptions,
}

impl<S, E, G, B, Q> IngestionPipeline<S, E, G, B, Q>
where
    S: PageSource,
    E: Embedder,
    G: QuestionGenerator,
    B: BlockStore,
    Q: QuestionStore,
{
    pub fn new(
        source: S,
        embedder: E,
        generator: G,
        block_store: B,
        question_store: Q,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        let hinter = SectionHinter::new(&options)?;
        Ok(Self {
            source,
            embedder,
            generator,
            block_store,
            question_store,
            hinter,
            options,
        })
    }

    pub async fn run(&self, doc_id: &str) -> Result<IngestionReport, IngestError> {
        let started_at = Utc::now();
        let total_pages = self.source.page_count()?;
        info!(doc_id, total_pages, "starting ingestion");

        let mut pages = Vec::new();
        let mut skipped_pages = Vec::new();

        for page_number in 1..=total_pages {
            match self.process_page(doc_id, page_number).await {
                Ok(outcome) => {
                    info!(
                        page = page_number,
                        blocks = outcome.blocks_stored,
                        questions = outcome.questions_stored,
                        "page complete"
                    );
                    pages.push(outcome);
                }
                Err(error) => {
                    warn!(page = page_number, error = %error, "page failed, continuing");
                    skipped_pages.push(SkippedPage {
                        page: page_number,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(IngestionReport {
            doc_id: doc_id.to_string(),
            pages,
            skipped_pages,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn process_page(&self, doc_id: &str, page_number: u32) -> Result<PageOutcome, IngestError> {
        let extraction = self.source.extract_page(page_number)?;
        let sha = page_sha(&extraction);

        let mut blocks = group_spans(page_number, &extraction.spans, &self.options);
        if blocks.is_empty() {
            debug!(page = page_number, "no text blocks on page");
            return Ok(PageOutcome {
                page: page_number,
                blocks_stored: 0,
                questions_stored: 0,
                skipped_existing: false,
            });
        }

        assign_char_offsets(&mut blocks, &extraction.full_text);

        let section_hint = self.hinter.derive(&extraction.full_text);
        for block in &mut blocks {
            block.section_hint = Some(section_hint.clone());
        }

        if self
            .block_store
            .page_is_current(doc_id, page_number, &sha)
            .await?
        {
            info!(page = page_number, "page unchanged, skipping");
            return Ok(PageOutcome {
                page: page_number,
                blocks_stored: 0,
                questions_stored: 0,
                skipped_existing: true,
            });
        }

        let texts: Vec<String> = blocks.iter().map(|block| block.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != blocks.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} does not match block count {}",
                embeddings.len(),
                blocks.len()
            )));
        }
        for (block, embedding) in blocks.iter_mut().zip(embeddings) {
            block.embedding = Some(embedding);
        }

        self.block_store
            .insert_blocks(doc_id, page_number, &sha, &blocks)
            .await?;
        let blocks_stored = blocks.len();

        let mut questions_stored = 0usize;
        let suitable = blocks.iter().filter(|block| {
            let chars = block.text.chars().count();
            chars >= self.options.mcq_min_chars && chars <= self.options.mcq_max_chars
        });

        for block in suitable {
            let mcq = match self.generator.generate(&block.text).await {
                Ok(Some(mcq)) => mcq,
                Ok(None) => {
                    warn!(
                        page = page_number,
                        block_id = %block.block_id,
                        "model output failed structural validation"
                    );
                    continue;
                }
                Err(error) => {
                    warn!(
                        page = page_number,
                        block_id = %block.block_id,
                        error = %error,
                        "question generation failed"
                    );
                    continue;
                }
            };

            let question = compose_question_with_reference(
                &mcq,
                block.section_hint.as_deref(),
                page_number,
                &block.block_id,
                sha256_hex(&block.text),
            );

            self.question_store
                .insert_questions(doc_id, page_number, std::slice::from_ref(&question))
                .await?;
            questions_stored += 1;
        }

        Ok(PageOutcome {
            page: page_number,
            blocks_stored,
            questions_stored,
            skipped_existing: false,
        })
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn build_document_fingerprint(
    path: &Path,
    doc_id: &str,
) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(DocumentFingerprint {
        doc_id: doc_id.to_string(),
        title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        ingested_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::{build_document_fingerprint, digest_file, sha256_hex, IngestionPipeline};
    use crate::embeddings::Embedder;
    use crate::error::{BackendError, IngestError};
    use crate::extractor::{ExtractedPage, PageSource, SpanBounds, TextSpan};
    use crate::models::{GeneratedQuestion, IngestionOptions, Mcq, PageBlock};
    use crate::questions::QuestionGenerator;
    use crate::traits::{BlockStore, QuestionStore};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn long_hebrew_text() -> String {
        "הוראות הסעיף קובעות כי ".repeat(10)
    }

    fn page_with_text(number: u32, text: &str) -> ExtractedPage {
        ExtractedPage {
            number,
            full_text: text.to_string(),
            spans: vec![TextSpan {
                text: text.to_string(),
                bounds: SpanBounds {
                    left: 40.0,
                    top: 100.0,
                    right: 520.0,
                    bottom: 112.0,
                },
            }],
        }
    }

    struct FakeSource {
        pages: Vec<Result<ExtractedPage, String>>,
    }

    impl PageSource for FakeSource {
        fn page_count(&self) -> Result<u32, IngestError> {
            Ok(self.pages.len() as u32)
        }

        fn extract_page(&self, number: u32) -> Result<ExtractedPage, IngestError> {
            match &self.pages[(number - 1) as usize] {
                Ok(page) => Ok(page.clone()),
                Err(reason) => Err(IngestError::PdfParse(reason.clone())),
            }
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct FakeGenerator {
        output: Option<Mcq>,
    }

    #[async_trait]
    impl QuestionGenerator for FakeGenerator {
        async fn generate(&self, _block_text: &str) -> Result<Option<Mcq>, BackendError> {
            Ok(self.output.clone())
        }
    }

    /// Returns one vector too few, whatever the input size.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts.iter().skip(1).map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl QuestionGenerator for FailingGenerator {
        async fn generate(&self, _block_text: &str) -> Result<Option<Mcq>, BackendError> {
            Err(BackendError::Request(
                "chat endpoint unreachable".to_string(),
            ))
        }
    }

    #[derive(Default)]
    struct FakeBlockStore {
        existing_sha: Option<String>,
        inserted: Mutex<Vec<PageBlock>>,
    }

    #[async_trait]
    impl BlockStore for FakeBlockStore {
        async fn page_is_current(
            &self,
            _doc_id: &str,
            _page_number: u32,
            page_sha: &str,
        ) -> Result<bool, BackendError> {
            Ok(self.existing_sha.as_deref() == Some(page_sha))
        }

        async fn insert_blocks(
            &self,
            _doc_id: &str,
            _page_number: u32,
            _page_sha: &str,
            blocks: &[PageBlock],
        ) -> Result<(), BackendError> {
            self.inserted
                .lock()
                .expect("lock poisoned")
                .extend_from_slice(blocks);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQuestionStore {
        inserted: Mutex<Vec<GeneratedQuestion>>,
    }

    #[async_trait]
    impl QuestionStore for FakeQuestionStore {
        async fn insert_questions(
            &self,
            _doc_id: &str,
            _page_number: u32,
            questions: &[GeneratedQuestion],
        ) -> Result<(), BackendError> {
            self.inserted
                .lock()
                .expect("lock poisoned")
                .extend_from_slice(questions);
            Ok(())
        }
    }

    fn sample_mcq() -> Mcq {
        Mcq {
            stem: "מה קובע הסעיף?".to_string(),
            options: vec!["א".into(), "ב".into(), "ג".into(), "ד".into()],
            correct_index: 0,
            explanation: "הסבר".to_string(),
        }
    }

    fn pipeline(
        source: FakeSource,
        generator: FakeGenerator,
    ) -> IngestionPipeline<FakeSource, FakeEmbedder, FakeGenerator, FakeBlockStore, FakeQuestionStore>
    {
        IngestionPipeline::new(
            source,
            FakeEmbedder,
            generator,
            FakeBlockStore::default(),
            FakeQuestionStore::default(),
            IngestionOptions::default(),
        )
        .expect("default options are valid")
    }

    #[tokio::test]
    async fn suitable_blocks_become_stored_questions() {
        let text = long_hebrew_text();
        let source = FakeSource {
            pages: vec![Ok(page_with_text(1, &text))],
        };
        let pipeline = pipeline(source, FakeGenerator {
            output: Some(sample_mcq()),
        });

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.total_blocks(), 1);
        assert_eq!(report.total_questions(), 1);

        let blocks = pipeline.block_store.inserted.lock().expect("lock poisoned");
        assert_eq!(blocks[0].block_id, "p1-b00");
        assert!(blocks[0].embedding.is_some());
        assert!(blocks[0].section_hint.is_some());

        let questions = pipeline
            .question_store
            .inserted
            .lock()
            .expect("lock poisoned");
        assert_eq!(questions[0].block_id, "p1-b00");
        assert_eq!(questions[0].source_block_sha, sha256_hex(&blocks[0].text));
    }

    #[tokio::test]
    async fn short_blocks_are_not_sent_to_the_model() {
        let source = FakeSource {
            pages: vec![Ok(page_with_text(1, "טקסט קצר מדי לשאלה"))],
        };
        let pipeline = pipeline(source, FakeGenerator {
            output: Some(sample_mcq()),
        });

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert_eq!(report.total_blocks(), 1);
        assert_eq!(report.total_questions(), 0);
    }

    #[tokio::test]
    async fn invalid_model_output_skips_the_block() {
        let text = long_hebrew_text();
        let source = FakeSource {
            pages: vec![Ok(page_with_text(1, &text))],
        };
        let pipeline = pipeline(source, FakeGenerator { output: None });

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert_eq!(report.total_blocks(), 1);
        assert_eq!(report.total_questions(), 0);
        assert!(report.skipped_pages.is_empty());
    }

    #[tokio::test]
    async fn embedding_count_mismatch_skips_the_page() {
        let text = long_hebrew_text();
        let source = FakeSource {
            pages: vec![Ok(page_with_text(1, &text))],
        };
        let pipeline = IngestionPipeline::new(
            source,
            ShortEmbedder,
            FakeGenerator {
                output: Some(sample_mcq()),
            },
            FakeBlockStore::default(),
            FakeQuestionStore::default(),
            IngestionOptions::default(),
        )
        .expect("default options are valid");

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert!(report.pages.is_empty());
        assert_eq!(report.skipped_pages.len(), 1);
        assert_eq!(report.skipped_pages[0].page, 1);
        assert!(report.skipped_pages[0].reason.contains("embedding count"));
        assert!(pipeline
            .block_store
            .inserted
            .lock()
            .expect("lock poisoned")
            .is_empty());
    }

    #[tokio::test]
    async fn generator_transport_error_keeps_the_page() {
        let text = long_hebrew_text();
        let source = FakeSource {
            pages: vec![Ok(page_with_text(1, &text))],
        };
        let pipeline = IngestionPipeline::new(
            source,
            FakeEmbedder,
            FailingGenerator,
            FakeBlockStore::default(),
            FakeQuestionStore::default(),
            IngestionOptions::default(),
        )
        .expect("default options are valid");

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert!(report.skipped_pages.is_empty());
        assert_eq!(report.total_blocks(), 1);
        assert_eq!(report.total_questions(), 0);
        assert!(pipeline
            .question_store
            .inserted
            .lock()
            .expect("lock poisoned")
            .is_empty());
    }

    #[tokio::test]
    async fn unchanged_page_is_skipped_before_embedding() {
        let text = long_hebrew_text();
        let page = page_with_text(1, &text);
        let existing_sha = crate::extractor::page_sha(&page);

        let source = FakeSource {
            pages: vec![Ok(page)],
        };
        let mut pipeline = pipeline(source, FakeGenerator {
            output: Some(sample_mcq()),
        });
        pipeline.block_store.existing_sha = Some(existing_sha);

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert!(report.pages[0].skipped_existing);
        assert_eq!(report.total_blocks(), 0);
        assert!(pipeline
            .block_store
            .inserted
            .lock()
            .expect("lock poisoned")
            .is_empty());
    }

    #[tokio::test]
    async fn failed_page_is_recorded_and_the_rest_continue() {
        let text = long_hebrew_text();
        let source = FakeSource {
            pages: vec![
                Err("unreadable content stream".to_string()),
                Ok(page_with_text(2, &text)),
            ],
        };
        let pipeline = pipeline(source, FakeGenerator {
            output: Some(sample_mcq()),
        });

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert_eq!(report.skipped_pages.len(), 1);
        assert_eq!(report.skipped_pages[0].page, 1);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].page, 2);
        assert_eq!(report.total_questions(), 1);
    }

    #[tokio::test]
    async fn empty_page_counts_as_processed() {
        let source = FakeSource {
            pages: vec![Ok(ExtractedPage {
                number: 1,
                full_text: String::new(),
                spans: Vec::new(),
            })],
        };
        let pipeline = pipeline(source, FakeGenerator { output: None });

        let report = pipeline.run("part1-2020").await.expect("run succeeds");

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.total_blocks(), 0);
        assert!(report.skipped_pages.is_empty());
    }

    #[test]
    fn block_sha_is_reproducible() {
        assert_eq!(sha256_hex("תוכן"), sha256_hex("תוכן"));
        assert_ne!(sha256_hex("תוכן"), sha256_hex("תוכן אחר"));
    }

    #[test]
    fn file_digest_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("part1.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        assert_eq!(digest_file(&path)?, digest_file(&path)?);

        let fingerprint = build_document_fingerprint(&path, "part1-2020")?;
        assert_eq!(fingerprint.doc_id, "part1-2020");
        assert_eq!(fingerprint.title, "part1.pdf");
        assert_eq!(fingerprint.checksum, digest_file(&path)?);
        Ok(())
    }
}
