use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::RetrievedChunk;
use crate::traits::{Embedder, VectorStore};

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
        }
    }

    /// The `top_k` stored chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("failed to embed query")?;

        let mut hits = self.store.search(&embedding, self.top_k).await?;
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(self.top_k);

        tracing::debug!(hits = hits.len(), top_k = self.top_k, "retrieved chunks");
        Ok(hits)
    }
}
