use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use support_chatbot::index::VectorIndex;
use support_chatbot::{Components, Settings};

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Load PDFs, embed their chunks and rebuild the Qdrant collection")]
struct Cli {
    /// Directory containing the PDF corpus. Defaults to DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Collection to write. Defaults to COLLECTION_NAME.
    #[arg(long)]
    collection: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = Settings::from_env();
    init_tracing();
    let cli = Cli::parse();

    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(collection) = cli.collection {
        settings.collection_name = collection;
    }
    settings.validate()?;

    let components = Components::from_settings(&settings);
    let documents = components.loader.load().await?;
    let (index, stats) = VectorIndex::from_documents(
        &documents,
        &settings.chunking,
        settings.models.embedding_dimension,
        components.embedder.as_ref(),
        components.store.clone(),
    )
    .await?;

    println!(
        "Ingest complete. collection={} documents={} chunks={} points={}",
        settings.collection_name,
        stats.documents,
        stats.chunks,
        index.points()
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
