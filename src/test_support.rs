//! Helpers shared by the unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::storage::ObjectStorage;

/// Object storage kept in a map. Uploads fail when `fail_uploads` is set.
#[derive(Default)]
pub struct MemoryStorage {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_uploads: bool,
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String> {
        if self.fail_uploads {
            return Err("bucket unavailable".to_string());
        }
        self.files.lock().insert(key.to_string(), file_data.to_vec());
        Ok(())
    }

    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String> {
        self.files
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| format!("{} not found", key))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        self.files.lock().remove(key);
        Ok(())
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!("/media/{}", key)
    }
}
