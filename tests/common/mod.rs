#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use parking_lot::Mutex;

use consent_server::consent::model::{Client, ConsentTemplate};
use consent_server::db::{ConsentStore, InMemoryStore};
use consent_server::document::{DocumentEngine, DocumentGenerator, DocumentLayout, GeneratorError};
use consent_server::storage::ObjectStorage;
use consent_server::AppState;

pub const PDF_BYTES: &[u8] = b"%PDF-1.7 test document";

/// In-memory object storage.
#[derive(Default)]
pub struct MockObjectStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockObjectStorage {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String> {
        self.files.lock().insert(key.to_string(), file_data.to_vec());
        Ok(())
    }

    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String> {
        self.get(key).ok_or_else(|| format!("{} not found", key))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        self.files.lock().remove(key);
        Ok(())
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!("/media/{}", key)
    }
}

/// Engine that always returns the same bytes.
pub struct FixedEngine;

impl DocumentEngine for FixedEngine {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn render(&self, _layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        Ok(PDF_BYTES.to_vec())
    }
}

/// Engine that always fails, like a missing Typst binary.
pub struct BrokenEngine(pub &'static str);

impl DocumentEngine for BrokenEngine {
    fn name(&self) -> &'static str {
        self.0
    }

    fn render(&self, _layout: &DocumentLayout) -> Result<Vec<u8>, GeneratorError> {
        Err(GeneratorError::TypstExit(1))
    }
}

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<MockObjectStorage>,
    pub state: web::Data<AppState>,
}

pub fn context_with_engines(engines: Vec<Arc<dyn DocumentEngine>>) -> TestContext {
    let store = Arc::new(InMemoryStore::new());
    let storage = Arc::new(MockObjectStorage::default());
    let state = AppState::new(
        store.clone(),
        storage.clone(),
        Arc::new(DocumentGenerator::new(engines, Duration::from_secs(5))),
        Duration::from_secs(60),
    );
    TestContext {
        store,
        storage,
        state: web::Data::new(state),
    }
}

/// Broken primary engine followed by a working fallback.
pub fn context() -> TestContext {
    context_with_engines(vec![
        Arc::new(BrokenEngine("typst")) as Arc<dyn DocumentEngine>,
        Arc::new(FixedEngine),
    ])
}

pub async fn seed_template(store: &InMemoryStore, slug: &str) -> ConsentTemplate {
    let template = ConsentTemplate::new(
        slug.to_string(),
        "Facial Treatment Consent".to_string(),
        "<p>I understand the risks of this treatment.</p>".to_string(),
    );
    store.insert_template(&template).await.unwrap();
    template
}

pub async fn seed_client(store: &InMemoryStore) -> Client {
    let client = Client::new(
        "Jane Doe".to_string(),
        "jane@example.com".to_string(),
        "555-0100".to_string(),
        String::new(),
    );
    store.insert_client(&client).await.unwrap();
    client
}

/// A complete, valid form post.
pub fn form_fields(signature_data: &str, typed_signature: &str) -> Vec<(&'static str, String)> {
    vec![
        ("full_name", "Jane Doe".to_string()),
        ("email", "jane@example.com".to_string()),
        ("phone", "555-0100".to_string()),
        ("treatment_date", "2025-11-05".to_string()),
        ("treatment_type", "Chemical peel".to_string()),
        ("signature_data", signature_data.to_string()),
        ("typed_signature", typed_signature.to_string()),
        ("consent_given", "on".to_string()),
        ("allergies", "yes".to_string()),
        ("pregnancy", "no".to_string()),
        ("medications", "ibuprofen".to_string()),
        ("skin_conditions", String::new()),
    ]
}

/// Replace one field of a form post.
pub fn set_field(fields: &mut [(&'static str, String)], key: &str, value: &str) {
    for (name, current) in fields.iter_mut() {
        if *name == key {
            *current = value.to_string();
        }
    }
}
