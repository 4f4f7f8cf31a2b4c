//! Object storage for signature images and generated documents.
//!
//! Keys are slash-separated (`consent_signatures/foo.png`). Two backends are
//! provided: a local directory served under `MEDIA_URL`, and a Supabase
//! Storage bucket.

use std::env;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// Namespace for drawn signature images.
pub const SIGNATURE_NAMESPACE: &str = "consent_signatures";
/// Namespace for generated consent documents.
pub const DOCUMENT_NAMESPACE: &str = "consent_pdfs";

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String>;
    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String>;
    async fn delete_file(&self, key: &str) -> Result<(), String>;
    /// Public locator for a stored key.
    fn get_asset_url(&self, key: &str) -> String;
}

/// Build a storage key inside `namespace`, sanitizing the file name.
pub fn object_key(namespace: &str, filename: &str) -> String {
    format!("{}/{}", namespace, sanitize_filename::sanitize(filename))
}

#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
    /// URL prefix the root directory is mounted under.
    pub public_prefix: String,
}

pub struct LocalStorage {
    config: LocalStorageConfig,
}

impl LocalStorage {
    pub fn new(config: LocalStorageConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, String> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(format!("Invalid storage key '{}'", key));
        }
        Ok(self.config.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
        }
        tokio::fs::write(&path, file_data)
            .await
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        log::debug!("Stored {} ({} bytes)", key, file_data.len());
        Ok(())
    }

    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to delete {}: {}", path.display(), e)),
        }
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.public_prefix.trim_end_matches('/'), key)
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub bucket_name: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Self, String> {
        let read = |name: &str| {
            env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format!("{} not set", name))
        };
        Ok(Self {
            url: read("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            service_key: read("SUPABASE_SERVICE_KEY")?,
            bucket_name: read("BUCKET_NAME")?,
        })
    }
}

pub struct SupabaseStorage {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url, self.config.bucket_name, key
        )
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type.as_ref())
            .body(file_data.to_vec())
            .send()
            .await
            .map_err(|e| format!("Failed to upload {} to Supabase: {}", key, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Supabase upload of {} failed ({}): {}", key, status, body));
        }
        Ok(())
    }

    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .send()
            .await
            .map_err(|e| format!("Failed to download {} from Supabase: {}", key, e))?;

        if !response.status().is_success() {
            return Err(format!("Supabase download of {} failed ({})", key, response.status()));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("Failed to read Supabase response for {}: {}", key, e))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        let url = format!(
            "{}/storage/v1/object/{}",
            self.config.url, self.config.bucket_name
        );
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .json(&serde_json::json!({ "prefixes": [key] }))
            .send()
            .await
            .map_err(|e| format!("Failed to delete {} from Supabase: {}", key, e))?;

        if !response.status().is_success() {
            return Err(format!("Supabase delete of {} failed ({})", key, response.status()));
        }
        Ok(())
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.config.bucket_name, key
        )
    }
}
