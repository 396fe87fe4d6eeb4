use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CollectionInfo, Document, IndexedPoint, RetrievedChunk};

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A store with one live collection that searches go to. Rebuilds write a
/// staging collection and publish it once it is complete.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Info on the live collection, `None` when it does not exist.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>>;

    /// Creates an empty collection and returns its name.
    async fn create_staging(&self, vector_size: usize) -> Result<String>;

    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<()>;

    /// Makes `collection` the live collection and drops the one it replaces.
    async fn publish(&self, collection: &str) -> Result<()>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Searches the live collection.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
