pub mod common;
pub mod part_numbers;
pub mod products;
pub mod profiles;
pub mod quotes;
pub mod settings;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        catalog::CatalogService, profiles::ProfileService, quotes::QuoteService,
        settings::SettingsService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub quotes: Arc<QuoteService>,
    pub catalog: Arc<CatalogService>,
    pub settings: Arc<SettingsService>,
    pub profiles: Arc<ProfileService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let threshold = config.margin_threshold();
        Self {
            quotes: Arc::new(QuoteService::new(
                db_pool.clone(),
                event_sender.clone(),
                threshold,
                config.default_currency.to_uppercase(),
            )),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            settings: Arc::new(SettingsService::new(
                db_pool.clone(),
                event_sender.clone(),
                threshold,
            )),
            profiles: Arc::new(ProfileService::new(db_pool, event_sender)),
        }
    }
}
