mod config;
mod db;
mod error;
mod events;
mod pagination;
mod quota;
mod routes;
mod services;
mod state;
mod vision;
mod whatsapp;

use std::sync::Arc;

use crate::config::{ServerConfig, env_lookup};
use crate::services::payment_parser::{ParserConfig, PaymentParser};
use crate::vision::{VisionClient, VisionModel};
use crate::whatsapp::{CloudApiClient, WhatsAppConfig, WhatsAppSend, verify_token_from_lookup};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = ServerConfig::from_env().expect("invalid server configuration");
    tracing_subscriber::fmt().with_max_level(config.log_level).init();

    let pool = db::init_pool(&config).await.expect("database init failed");

    // A missing AI provider leaves the parser answering service_error.
    let vision: Option<Arc<dyn VisionModel>> = match VisionClient::from_env() {
        Ok(client) => {
            tracing::info!(provider = client.provider_name(), model = client.model(), "vision provider ready");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "vision provider unavailable; screenshot parsing disabled");
            None
        }
    };
    let parser = PaymentParser::new(&ParserConfig::from_env(), vision);

    let whatsapp: Option<Arc<dyn WhatsAppSend>> = match WhatsAppConfig::from_env().map(CloudApiClient::new) {
        Some(Ok(client)) => Some(Arc::new(client)),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "whatsapp client build failed");
            None
        }
        None => {
            tracing::info!("whatsapp credentials not set; messaging disabled");
            None
        }
    };

    let state = state::AppState::new(pool, parser, whatsapp).with_verify_token(verify_token_from_lookup(&env_lookup));

    let app = routes::app(state);
    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "squadhub listening");
    axum::serve(listener, app).await.expect("server failed");
}
