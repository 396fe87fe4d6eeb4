//! In-process stand-ins for the remote providers, used by unit tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::models::{CollectionInfo, Document, IndexedPoint, RetrievedChunk};
use crate::traits::{DocumentLoader, Embedder, LanguageModel, VectorStore};

pub fn document(file_name: &str, text: &str) -> Document {
    Document {
        id: format!("{file_name}-doc"),
        text: text.to_string(),
        file_name: file_name.to_string(),
        file_path: format!("data/{file_name}"),
        page_label: Some("1".to_string()),
    }
}

pub struct StaticLoader {
    documents: Vec<Document>,
}

impl StaticLoader {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Signals `entered` on every load, then holds until `release` is notified.
pub struct GatedLoader {
    documents: Vec<Document>,
    pub entered: Notify,
    pub release: Notify,
    calls: AtomicUsize,
}

impl GatedLoader {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentLoader for GatedLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.documents.clone())
    }
}

/// Bag-of-words vectors: each lowercase word bumps one hashed dimension.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

struct MemoryCollection {
    vector_size: usize,
    points: Vec<IndexedPoint>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, MemoryCollection>,
    live: Option<String>,
    created: usize,
}

/// Named collections plus a live pointer, mirroring the alias swap.
#[derive(Default)]
pub struct MemoryVectorStore {
    state: Mutex<MemoryState>,
    fail_upserts: AtomicBool,
}

impl MemoryVectorStore {
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn collection_count(&self) -> usize {
        self.state.lock().unwrap().collections.len()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let state = self.state.lock().unwrap();
        let live = state.live.as_ref().and_then(|name| state.collections.get(name));
        Ok(live.map(|c| CollectionInfo {
            points_count: c.points.len() as u64,
            vector_size: Some(c.vector_size),
        }))
    }

    async fn create_staging(&self, vector_size: usize) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let name = format!("memory-{}", state.created);
        state.collections.insert(
            name.clone(),
            MemoryCollection {
                vector_size,
                points: Vec::new(),
            },
        );
        Ok(name)
    }

    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            anyhow::bail!("upsert rejected");
        }
        let mut state = self.state.lock().unwrap();
        let target = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("collection {collection} does not exist"))?;
        target.points.extend_from_slice(points);
        Ok(())
    }

    async fn publish(&self, collection: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.collections.contains_key(collection) {
            anyhow::bail!("collection {collection} does not exist");
        }
        if let Some(previous) = state.live.replace(collection.to_string()) {
            if previous != collection {
                state.collections.remove(&previous);
            }
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.state.lock().unwrap().collections.remove(collection);
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        let state = self.state.lock().unwrap();
        let Some(collection) = state.live.as_ref().and_then(|name| state.collections.get(name))
        else {
            anyhow::bail!("collection does not exist");
        };

        let mut hits: Vec<RetrievedChunk> = collection
            .points
            .iter()
            .map(|point| RetrievedChunk {
                chunk_id: point.payload.chunk_id.clone(),
                text: point.payload.text.clone(),
                file_name: Some(point.payload.file_name.clone()),
                page_label: point.payload.page_label.clone(),
                score: cosine(vector, &point.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Replies with the scripted answers in order, repeating the last one.
pub struct ScriptedModel {
    replies: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(str::to_string).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().unwrap();
        let index = prompts.len().min(self.replies.len().saturating_sub(1));
        prompts.push(prompt.to_string());
        self.replies
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted reply"))
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn model(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("quota exceeded")
    }
}
