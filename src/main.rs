use anyhow::Result;
use tracing_subscriber::EnvFilter;

use support_chatbot::{run_server, ChatbotService, Components, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env();
    init_tracing();

    if settings.google_api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY is not set; the chatbot cannot be initialized");
    }

    let components = Components::from_settings(&settings);
    let chatbot = ChatbotService::new(settings.clone(), components);

    if !chatbot.warm_start().await {
        tracing::warn!("serving without a query engine until /reinitialize succeeds");
    }

    run_server(settings, chatbot).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
