//! Runtime configuration loaded from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::document::DocumentConfig;
use crate::storage::{LocalStorageConfig, SupabaseConfig};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_MEDIA_ROOT: &str = "./media";
const DEFAULT_MEDIA_URL: &str = "/media";
const DEFAULT_STATIC_ROOT: &str = "./static";
const DEFAULT_FONT_DIR: &str = "./fonts";
const DEFAULT_FONT_FAMILY: &str = "LiberationSans";
const DEFAULT_TYPST_BIN: &str = "typst";
const DEFAULT_DOCUMENT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TEMPLATE_CACHE_TTL_SECS: u64 = 300;

/// Where artifacts are written.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local(LocalStorageConfig),
    Supabase(SupabaseConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    /// `None` keeps every record in process memory.
    pub database_url: Option<String>,
    pub storage: StorageBackend,
    pub document: DocumentConfig,
    pub template_cache_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let storage = match SupabaseConfig::from_env() {
            Ok(supabase) => StorageBackend::Supabase(supabase),
            Err(reason) => {
                log::debug!("Supabase storage not configured ({}), using local media root", reason);
                StorageBackend::Local(LocalStorageConfig {
                    root: PathBuf::from(var_or("MEDIA_ROOT", DEFAULT_MEDIA_ROOT)),
                    public_prefix: var_or("MEDIA_URL", DEFAULT_MEDIA_URL),
                })
            }
        };

        let document = DocumentConfig {
            static_root: PathBuf::from(var_or("STATIC_ROOT", DEFAULT_STATIC_ROOT)),
            font_dir: PathBuf::from(var_or("FONT_DIR", DEFAULT_FONT_DIR)),
            font_family: var_or("FONT_FAMILY", DEFAULT_FONT_FAMILY),
            typst_bin: var_or("TYPST_BIN", DEFAULT_TYPST_BIN),
            timeout: Duration::from_secs(secs_or(
                "DOCUMENT_TIMEOUT_SECS",
                DEFAULT_DOCUMENT_TIMEOUT_SECS,
            )),
        };

        Self {
            bind_address: var_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            storage,
            document,
            template_cache_ttl: Duration::from_secs(secs_or(
                "TEMPLATE_CACHE_TTL_SECS",
                DEFAULT_TEMPLATE_CACHE_TTL_SECS,
            )),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn secs_or(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} is not a number of seconds ('{}'), using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
