//! Persistence for templates, clients and submissions, plus `AppState`.
//!
//! - `memory` - process-local store used when no database is configured
//! - `postgres` - sqlx/PostgreSQL store with embedded migrations

mod memory;
mod postgres;


pub use memory::InMemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AppConfig, StorageBackend};
use crate::consent::model::{Client, ConsentTemplate, Submission};
use crate::document::DocumentGenerator;
use crate::storage::{LocalStorage, ObjectStorage, SupabaseStorage};

const TEMPLATE_CACHE_KEY: &str = "templates";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Delete refused because other records still reference the row.
    #[error("{0}")]
    Protected(String),
    #[error("database error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Newest first.
    async fn list_templates(&self) -> Result<Vec<ConsentTemplate>, StoreError>;
    async fn get_template(&self, id: &Uuid) -> Result<Option<ConsentTemplate>, StoreError>;
    async fn get_template_by_slug(&self, slug: &str)
        -> Result<Option<ConsentTemplate>, StoreError>;
    /// Fails with `Conflict` when the slug is taken.
    async fn insert_template(&self, template: &ConsentTemplate) -> Result<(), StoreError>;
    /// Fails with `Protected` while any submission references the template.
    async fn delete_template(&self, id: &Uuid) -> Result<(), StoreError>;

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;
    async fn get_client(&self, id: &Uuid) -> Result<Option<Client>, StoreError>;
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError>;
    /// Clears `client_id` on the client's submissions instead of deleting them.
    async fn delete_client(&self, id: &Uuid) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError>;
    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError>;
    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    async fn set_submission_document(
        &self,
        id: &Uuid,
        document: Option<&str>,
    ) -> Result<(), StoreError>;
    /// Returns the deleted record so its artifacts can be removed.
    async fn delete_submission(&self, id: &Uuid) -> Result<Submission, StoreError>;
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConsentStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub documents: Arc<DocumentGenerator>,
    pub template_cache: Cache<String, Vec<ConsentTemplate>>,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn ConsentStore> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url).await?;
                log::info!("Connected to PostgreSQL, migrations applied");
                Arc::new(store)
            }
            None => {
                log::warn!("DATABASE_URL not set, records are kept in memory only");
                Arc::new(InMemoryStore::new())
            }
        };

        let storage: Arc<dyn ObjectStorage> = match &config.storage {
            StorageBackend::Local(local) => {
                log::info!("Storing artifacts under {}", local.root.display());
                Arc::new(LocalStorage::new(local.clone()))
            }
            StorageBackend::Supabase(supabase) => {
                log::info!("Storing artifacts in Supabase bucket '{}'", supabase.bucket_name);
                let http_client = reqwest::Client::builder()
                    .pool_idle_timeout(Duration::from_secs(900))
                    .user_agent("consent-server/0.1")
                    .build()?;
                Arc::new(SupabaseStorage::new(supabase.clone(), http_client))
            }
        };

        let documents = Arc::new(DocumentGenerator::from_config(&config.document));

        Ok(Self::new(store, storage, documents, config.template_cache_ttl))
    }

    pub fn new(
        store: Arc<dyn ConsentStore>,
        storage: Arc<dyn ObjectStorage>,
        documents: Arc<DocumentGenerator>,
        template_cache_ttl: Duration,
    ) -> Self {
        let template_cache = Cache::builder()
            .time_to_live(template_cache_ttl)
            .max_capacity(1)
            .build();

        Self {
            store,
            storage,
            documents,
            template_cache,
        }
    }

    /// Template catalogue, served from cache when fresh.
    pub async fn templates(&self) -> Result<Vec<ConsentTemplate>, StoreError> {
        if let Some(templates) = self.template_cache.get(TEMPLATE_CACHE_KEY).await {
            log::debug!("Template list served from cache");
            return Ok(templates);
        }

        let templates = self.store.list_templates().await?;
        self.template_cache
            .insert(TEMPLATE_CACHE_KEY.to_string(), templates.clone())
            .await;
        Ok(templates)
    }

    pub fn invalidate_templates(&self) {
        self.template_cache.invalidate_all();
    }
}
