pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod index;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod qdrant_store;
pub mod query_engine;
pub mod retrieval;
pub mod server;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatbotService, Components};
pub use config::Settings;
pub use error::ServiceError;
pub use server::{router, run_server};
