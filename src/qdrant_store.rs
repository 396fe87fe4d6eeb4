use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{CollectionInfo, IndexedPoint, PointPayload, RetrievedChunk};
use crate::traits::VectorStore;

const UPSERT_BATCH_SIZE: usize = 64;

/// Qdrant over REST. The configured collection name is served as an alias
/// onto the most recently published collection.
#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: collection.into(),
        }
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.base_url, name)
    }

    fn staging_name(&self) -> String {
        format!("{}-{}", self.collection, Uuid::new_v4().simple())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn fetch_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .authorized(self.client.get(self.collection_url(name)))
            .send()
            .await
            .context("failed to contact qdrant while reading collection info")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .error_for_status()
            .context("qdrant collection info returned non-success status")?
            .json::<QdrantCollectionResponse>()
            .await
            .context("failed to decode qdrant collection info")?;

        Ok(Some(CollectionInfo {
            points_count: body.result.points_count.unwrap_or(0),
            vector_size: body
                .result
                .config
                .pointer("/params/vectors/size")
                .and_then(Value::as_u64)
                .map(|size| size as usize),
        }))
    }

    /// The collection the live alias points at, if the alias exists.
    async fn alias_target(&self) -> Result<Option<String>> {
        let body = self
            .authorized(self.client.get(format!("{}/aliases", self.base_url)))
            .send()
            .await
            .context("failed to contact qdrant while listing aliases")?
            .error_for_status()
            .context("qdrant alias listing returned non-success status")?
            .json::<QdrantAliasesResponse>()
            .await
            .context("failed to decode qdrant aliases")?;

        Ok(body.result.target_of(&self.collection))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        self.fetch_collection(&self.collection).await
    }

    async fn create_staging(&self, vector_size: usize) -> Result<String> {
        let name = self.staging_name();
        let payload = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        self.authorized(self.client.put(self.collection_url(&name)))
            .json(&payload)
            .send()
            .await
            .context("failed to contact qdrant while creating collection")?
            .error_for_status()
            .context("qdrant failed to create collection")?;

        tracing::info!(collection = %name, vector_size, "created staging collection");
        Ok(name)
    }

    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<()> {
        let upsert_url = format!("{}/points?wait=true", self.collection_url(collection));

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let body = json!({ "points": batch });
            self.authorized(self.client.put(&upsert_url))
                .json(&body)
                .send()
                .await
                .context("failed to contact qdrant during upsert")?
                .error_for_status()
                .context("qdrant upsert returned non-success status")?;
        }

        Ok(())
    }

    async fn publish(&self, collection: &str) -> Result<()> {
        let previous = self.alias_target().await?;

        // A plain collection holding the live name blocks the alias.
        if previous.is_none() && self.fetch_collection(&self.collection).await?.is_some() {
            tracing::warn!(
                collection = %self.collection,
                "replacing plain collection with an alias"
            );
            self.drop_collection(&self.collection).await?;
        }

        let actions = alias_actions(&self.collection, collection, previous.is_some());
        let body = json!({ "actions": actions });
        self.authorized(self.client.post(format!("{}/collections/aliases", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("failed to contact qdrant while switching alias")?
            .error_for_status()
            .context("qdrant alias switch returned non-success status")?;

        tracing::info!(alias = %self.collection, collection = %collection, "published collection");

        if let Some(previous) = previous.filter(|name| name != collection) {
            if let Err(err) = self.drop_collection(&previous).await {
                tracing::warn!(
                    collection = %previous,
                    error = %format!("{err:#}"),
                    "failed to drop replaced collection"
                );
            }
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.collection_url(collection)))
            .send()
            .await
            .context("failed to contact qdrant while deleting collection")?;

        if response.status() != StatusCode::NOT_FOUND {
            response
                .error_for_status()
                .with_context(|| format!("qdrant failed to delete collection {collection}"))?;
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        if vector.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let url = format!("{}/points/search", self.collection_url(&self.collection));
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .context("failed to contact qdrant during search")?
            .error_for_status()
            .context("qdrant search returned non-success status")?
            .json::<QdrantSearchResponse>()
            .await
            .context("failed to decode qdrant search response")?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                Some(RetrievedChunk {
                    chunk_id: payload.chunk_id,
                    text: payload.text,
                    file_name: Some(payload.file_name),
                    page_label: payload.page_label,
                    score: point.score,
                })
            })
            .collect())
    }
}

/// Alias update actions; Qdrant applies them as one atomic change.
fn alias_actions(alias: &str, collection: &str, replace_existing: bool) -> Vec<Value> {
    let mut actions = Vec::new();
    if replace_existing {
        actions.push(json!({ "delete_alias": { "alias_name": alias } }));
    }
    actions.push(json!({
        "create_alias": { "collection_name": collection, "alias_name": alias }
    }));
    actions
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionResponse {
    result: QdrantCollectionResult,
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionResult {
    points_count: Option<u64>,
    #[serde(default)]
    config: Value,
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantResultPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantResultPoint {
    score: f32,
    payload: Option<PointPayload>,
}

#[derive(Debug, Deserialize)]
struct QdrantAliasesResponse {
    result: QdrantAliases,
}

#[derive(Debug, Deserialize)]
struct QdrantAliases {
    #[serde(default)]
    aliases: Vec<QdrantAlias>,
}

impl QdrantAliases {
    fn target_of(self, alias: &str) -> Option<String> {
        self.aliases
            .into_iter()
            .find(|entry| entry.alias_name == alias)
            .map(|entry| entry.collection_name)
    }
}

#[derive(Debug, Deserialize)]
struct QdrantAlias {
    alias_name: String,
    collection_name: String,
}
