use chrono::Utc;
use clap::Parser;
use lexquiz_core::{
    build_document_fingerprint, IngestionOptions, IngestionPipeline, OpenAiEmbedder,
    OpenAiQuestionGenerator, PdfiumSource, SupabaseStore,
};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "lexquiz",
    version,
    about = "Ingest a legal-text PDF into embedded blocks and generated exam questions."
)]
struct Cli {
    /// Path to the source PDF.
    #[arg(long, default_value = "./data/part1.pdf")]
    pdf: String,

    /// Document identifier used as the storage key.
    #[arg(long, env = "DOC_ID", default_value = "part1-2020")]
    doc_id: String,

    /// Supabase project URL.
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,

    /// Supabase service-role key.
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: String,

    /// OpenAI API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Embedding model name.
    #[arg(long, default_value = lexquiz_core::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Embedding vector size for the chosen model.
    #[arg(long, default_value_t = lexquiz_core::DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chat model used for question generation.
    #[arg(long, default_value = lexquiz_core::DEFAULT_QUESTION_MODEL)]
    question_model: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let app_version = env!("CARGO_PKG_VERSION");

    let pdf_path = Path::new(&cli.pdf);
    if !pdf_path.exists() {
        anyhow::bail!("pdf file not found at {}", pdf_path.display());
    }

    let fingerprint = build_document_fingerprint(pdf_path, &cli.doc_id)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        doc_id = %fingerprint.doc_id,
        pdf = %fingerprint.title,
        path = %fingerprint.source_path,
        checksum = %fingerprint.checksum,
        "lexquiz boot"
    );

    let source =
        PdfiumSource::new(pdf_path).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let embedder = OpenAiEmbedder::new(&cli.openai_base_url, &cli.openai_api_key)
        .with_model(&cli.embedding_model, cli.embedding_dimensions);
    let generator = OpenAiQuestionGenerator::new(&cli.openai_base_url, &cli.openai_api_key)
        .with_model(&cli.question_model);
    let block_store = SupabaseStore::new(&cli.supabase_url, &cli.supabase_key);
    let question_store = SupabaseStore::new(&cli.supabase_url, &cli.supabase_key);

    let pipeline = IngestionPipeline::new(
        source,
        embedder,
        generator,
        block_store,
        question_store,
        IngestionOptions::default(),
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let report = pipeline
        .run(&cli.doc_id)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    for outcome in &report.pages {
        println!(
            "page {}: {} blocks, {} questions{}",
            outcome.page,
            outcome.blocks_stored,
            outcome.questions_stored,
            if outcome.skipped_existing {
                " (unchanged, skipped)"
            } else {
                ""
            }
        );
    }

    if !report.skipped_pages.is_empty() {
        warn!(
            "skipped_pages={} for doc={}",
            report.skipped_pages.len(),
            report.doc_id
        );
        for skipped in &report.skipped_pages {
            warn!(page = skipped.page, reason = %skipped.reason, "skipped page");
        }
    }

    println!(
        "ingestion complete for {}: {} blocks, {} questions at {}",
        report.doc_id,
        report.total_blocks(),
        report.total_questions(),
        report.finished_at.to_rfc3339()
    );

    Ok(())
}
