use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{RwLock, Semaphore};

use crate::config::Settings;
use crate::error::ServiceError;
use crate::gemini::GeminiClient;
use crate::index::{IndexStats, VectorIndex};
use crate::ingest::PdfDirectoryLoader;
use crate::models::ChatAnswer;
use crate::ollama::OllamaClient;
use crate::qdrant_store::QdrantStore;
use crate::query_engine::QueryEngine;
use crate::synthesizer::{PromptTemplate, ResponseSynthesizer};
use crate::traits::{DocumentLoader, Embedder, LanguageModel, VectorStore};

const NOT_INITIALIZED_MESSAGE: &str =
    "Chatbot is not initialized. Call /reinitialize to build the index.";

/// The external collaborators the chatbot is wired from. `llm` is `None`
/// when no API key is configured.
#[derive(Clone)]
pub struct Components {
    pub loader: Arc<dyn DocumentLoader>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub llm: Option<Arc<dyn LanguageModel>>,
}

impl Components {
    pub fn from_settings(settings: &Settings) -> Self {
        let llm = settings.google_api_key.as_ref().map(|key| {
            Arc::new(GeminiClient::new(
                settings.gemini_base_url.clone(),
                key.clone(),
                settings.models.chat_model.clone(),
                settings.models.temperature,
                settings.models.max_output_tokens,
            )) as Arc<dyn LanguageModel>
        });

        Self {
            loader: Arc::new(PdfDirectoryLoader::new(settings.data_dir.clone())),
            embedder: Arc::new(OllamaClient::new(
                settings.ollama_base_url.clone(),
                settings.models.embedding_model.clone(),
            )),
            store: Arc::new(QdrantStore::new(
                settings.qdrant_url.clone(),
                settings.qdrant_api_key.clone(),
                settings.collection_name.clone(),
            )),
            llm,
        }
    }
}

/// Owns the current query engine. Rebuilds write a fresh collection and
/// construct a complete engine before swapping it in, so readers see the old
/// index or the new one.
#[derive(Clone)]
pub struct ChatbotService {
    settings: Settings,
    components: Components,
    engine: Arc<RwLock<Option<Arc<QueryEngine>>>>,
    rebuild_limit: Arc<Semaphore>,
}

impl ChatbotService {
    pub fn new(settings: Settings, components: Components) -> Self {
        Self {
            settings,
            components,
            engine: Arc::new(RwLock::new(None)),
            rebuild_limit: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Loads the documents, rebuilds the index and replaces the engine.
    /// On failure the previous engine, if any, stays current.
    pub async fn initialize(&self) -> Result<IndexStats, ServiceError> {
        let _permit = self
            .rebuild_limit
            .acquire()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;

        match self.rebuild().await {
            Ok((engine, stats)) => {
                *self.engine.write().await = Some(Arc::new(engine));
                tracing::info!(
                    documents = stats.documents,
                    chunks = stats.chunks,
                    collection = %self.settings.collection_name,
                    "chatbot initialized"
                );
                Ok(stats)
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "chatbot initialization failed");
                Err(ServiceError::internal("Error initializing vector store", &err))
            }
        }
    }

    /// Startup path: reuse the existing collection, rebuilding from the
    /// documents when it is missing and the settings allow it.
    pub async fn warm_start(&self) -> bool {
        let llm = match self.require_llm() {
            Ok(llm) => llm,
            Err(err) => {
                tracing::error!(error = %err, "chatbot not initialized");
                return false;
            }
        };

        match self.load_existing(llm).await {
            Ok(engine) => {
                *self.engine.write().await = Some(Arc::new(engine));
                tracing::info!(
                    collection = %self.settings.collection_name,
                    "loaded existing index"
                );
                true
            }
            Err(err) if self.settings.rebuild_index_if_missing => {
                tracing::warn!(error = %format!("{err:#}"), "existing index unavailable, rebuilding");
                self.initialize().await.is_ok()
            }
            Err(err) => {
                tracing::error!(
                    error = %format!("{err:#}"),
                    "existing index unavailable; call /reinitialize to build it"
                );
                false
            }
        }
    }

    pub async fn answer(&self, question: &str) -> Result<ChatAnswer, ServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Message cannot be empty".to_string(),
            ));
        }

        let engine = self
            .engine
            .read()
            .await
            .clone()
            .ok_or_else(|| ServiceError::ServiceUnavailable(NOT_INITIALIZED_MESSAGE.to_string()))?;

        let result = engine.query(question).await.map_err(|err| {
            tracing::error!(error = %format!("{err:#}"), "query failed");
            ServiceError::internal("Error processing question", &err)
        })?;

        let sources = result.source_files();
        Ok(ChatAnswer {
            response: result.response,
            sources: (!sources.is_empty()).then_some(sources),
        })
    }

    async fn rebuild(&self) -> Result<(QueryEngine, IndexStats)> {
        let llm = self.require_llm()?;
        self.settings.validate()?;

        let documents = self.components.loader.load().await?;
        let (index, stats) = VectorIndex::from_documents(
            &documents,
            &self.settings.chunking,
            self.settings.models.embedding_dimension,
            self.components.embedder.as_ref(),
            self.components.store.clone(),
        )
        .await?;

        Ok((self.build_engine(&index, llm)?, stats))
    }

    async fn load_existing(&self, llm: Arc<dyn LanguageModel>) -> Result<QueryEngine> {
        self.settings.validate()?;
        let index = VectorIndex::from_vector_store(
            self.components.store.clone(),
            self.settings.models.embedding_dimension,
        )
        .await?;
        self.build_engine(&index, llm)
    }

    fn build_engine(&self, index: &VectorIndex, llm: Arc<dyn LanguageModel>) -> Result<QueryEngine> {
        let retriever = index.as_retriever(
            self.components.embedder.clone(),
            self.settings.similarity_top_k,
        );
        let synthesizer = ResponseSynthesizer::new(
            llm,
            PromptTemplate::new(&self.settings.prompt_template)?,
            self.settings.context_window_chars,
        );
        Ok(QueryEngine::new(retriever, synthesizer))
    }

    fn require_llm(&self) -> Result<Arc<dyn LanguageModel>> {
        self.components
            .llm
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEY is not set; cannot create the LLM client"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::config::test_settings;
    use crate::testing::{
        document, FailingModel, GatedLoader, HashEmbedder, MemoryVectorStore, ScriptedModel,
        StaticLoader,
    };

    fn corpus() -> Vec<crate::models::Document> {
        vec![
            document("faq.pdf", "Refunds are issued within five business days."),
            document("faq.pdf", "Refunds go back to the original payment method."),
            document("policy.pdf", "Refunds require the original receipt."),
        ]
    }

    fn components(
        documents: Vec<crate::models::Document>,
        store: Arc<MemoryVectorStore>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Components {
        Components {
            loader: Arc::new(StaticLoader::new(documents)),
            embedder: Arc::new(HashEmbedder::new(64)),
            store,
            llm,
        }
    }

    fn service(llm: Option<Arc<dyn LanguageModel>>) -> ChatbotService {
        ChatbotService::new(
            test_settings("data"),
            components(corpus(), Arc::new(MemoryVectorStore::default()), llm),
        )
    }

    fn scripted() -> Option<Arc<dyn LanguageModel>> {
        Some(Arc::new(ScriptedModel::new(vec!["Refunds take five business days."])))
    }

    #[tokio::test]
    async fn answer_before_initialize_is_unavailable() {
        let chatbot = service(scripted());
        assert!(!chatbot.is_ready().await);
        let err = chatbot.answer("refund?").await.unwrap_err();
        assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_first() {
        let chatbot = service(scripted());
        let err = chatbot.answer(" \n\t").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn initialize_then_answer_with_unique_sources() {
        let chatbot = service(scripted());
        let stats = chatbot.initialize().await.unwrap();
        assert_eq!(stats.documents, 3);
        assert!(chatbot.is_ready().await);

        let answer = chatbot.answer("How fast are refunds issued?").await.unwrap();
        assert_eq!(answer.response, "Refunds take five business days.");

        let sources = answer.sources.unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&"faq.pdf".to_string()));
        assert!(sources.contains(&"policy.pdf".to_string()));
    }

    #[tokio::test]
    async fn missing_llm_credentials_fail_initialization() {
        let chatbot = service(None);
        let err = chatbot.initialize().await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
        assert!(!chatbot.is_ready().await);
        assert!(!chatbot.warm_start().await);
    }

    #[tokio::test]
    async fn loader_failure_surfaces_message() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let chatbot = pdf_service(&missing, Arc::new(MemoryVectorStore::default()));

        let err = chatbot.initialize().await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Error initializing vector store"));
        assert!(message.contains(&format!("directory {} does not exist", missing.display())));
        assert!(!chatbot.is_ready().await);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_serving_previous_index() {
        let store = Arc::new(MemoryVectorStore::default());
        let chatbot = service_with_store(store.clone(), corpus());
        chatbot.initialize().await.unwrap();

        store.fail_upserts(true);
        let err = chatbot.initialize().await.unwrap_err();
        assert!(err.to_string().contains("upsert rejected"));

        assert!(chatbot.is_ready().await);
        let answer = chatbot.answer("How fast are refunds issued?").await.unwrap();
        assert_eq!(answer.response, "Refunds take five business days.");
        assert!(answer.sources.unwrap().contains(&"faq.pdf".to_string()));
        assert_eq!(store.collection_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rebuilds_are_serialized_while_answers_use_current_engine() {
        let loader = Arc::new(GatedLoader::new(corpus()));
        let chatbot = ChatbotService::new(
            test_settings("data"),
            Components {
                loader: loader.clone(),
                embedder: Arc::new(HashEmbedder::new(64)),
                store: Arc::new(MemoryVectorStore::default()),
                llm: scripted(),
            },
        );

        loader.release.notify_one();
        chatbot.initialize().await.unwrap();
        loader.entered.notified().await;

        let first = tokio::spawn({
            let chatbot = chatbot.clone();
            async move { chatbot.initialize().await }
        });
        loader.entered.notified().await;
        assert_eq!(chatbot.rebuild_limit.available_permits(), 0);

        let second = tokio::spawn({
            let chatbot = chatbot.clone();
            async move { chatbot.initialize().await }
        });
        let entered_early =
            tokio::time::timeout(Duration::from_millis(100), loader.entered.notified()).await;
        assert!(entered_early.is_err());
        assert_eq!(loader.calls(), 2);

        let answer = chatbot.answer("How fast are refunds issued?").await.unwrap();
        assert!(answer.sources.is_some());

        loader.release.notify_one();
        loader.entered.notified().await;
        assert_eq!(loader.calls(), 3);
        loader.release.notify_one();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(chatbot.is_ready().await);
        assert!(chatbot.answer("refund receipt").await.is_ok());
    }

    #[tokio::test]
    async fn llm_failure_maps_to_internal_error() {
        let chatbot = service(Some(Arc::new(FailingModel)));
        chatbot.initialize().await.unwrap();

        let err = chatbot.answer("refunds?").await.unwrap_err();
        match err {
            ServiceError::Internal(message) => {
                assert!(message.starts_with("Error processing question"));
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn warm_start_reuses_existing_collection() {
        let store = Arc::new(MemoryVectorStore::default());
        service_with_store(store.clone(), corpus()).initialize().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let restarted = pdf_service(&dir.path().join("missing"), store);
        assert!(restarted.warm_start().await);
        assert!(restarted.answer("refund timing").await.is_ok());
    }

    #[tokio::test]
    async fn warm_start_rebuilds_missing_index_when_allowed() {
        let chatbot = service(scripted());
        assert!(chatbot.warm_start().await);
        assert!(chatbot.is_ready().await);
    }

    #[tokio::test]
    async fn warm_start_without_rebuild_stays_unready() {
        let mut settings = test_settings("data");
        settings.rebuild_index_if_missing = false;
        let chatbot = ChatbotService::new(
            settings,
            components(corpus(), Arc::new(MemoryVectorStore::default()), scripted()),
        );

        assert!(!chatbot.warm_start().await);
        assert!(!chatbot.is_ready().await);
    }

    fn service_with_store(
        store: Arc<MemoryVectorStore>,
        documents: Vec<crate::models::Document>,
    ) -> ChatbotService {
        ChatbotService::new(test_settings("data"), components(documents, store, scripted()))
    }

    /// A service reading PDFs from `data_dir`.
    fn pdf_service(data_dir: &Path, store: Arc<MemoryVectorStore>) -> ChatbotService {
        ChatbotService::new(
            test_settings(data_dir),
            Components {
                loader: Arc::new(PdfDirectoryLoader::new(data_dir)),
                embedder: Arc::new(HashEmbedder::new(64)),
                store,
                llm: scripted(),
            },
        )
    }
}
