//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the database pool, the payment parser (with its in-memory daily
//! quota), the optional WhatsApp sender, and the match event bus.

use std::sync::Arc;

use sqlx::PgPool;

use crate::events::EventBus;
use crate::services::payment_parser::PaymentParser;
use crate::whatsapp::WhatsAppSend;

/// Shared application state. Clone is required by Axum; all inner fields
/// are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub parser: Arc<PaymentParser>,
    /// `None` when WhatsApp credentials are not configured.
    pub whatsapp: Option<Arc<dyn WhatsAppSend>>,
    pub events: EventBus,
    /// Token expected by the webhook verification handshake.
    pub verify_token: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, parser: PaymentParser, whatsapp: Option<Arc<dyn WhatsAppSend>>) -> Self {
        Self { pool, parser: Arc::new(parser), whatsapp, events: EventBus::new(), verify_token: None }
    }

    #[must_use]
    pub fn with_verify_token(mut self, token: Option<String>) -> Self {
        self.verify_token = token;
        self
    }

    /// Borrow the WhatsApp sender as a trait object.
    #[must_use]
    pub fn sender(&self) -> Option<&dyn WhatsAppSend> {
        self.whatsapp.as_deref()
    }
}
