use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_PAGES_PATH: &str = "pages";
const DEFAULT_CDN_LOCATION: &str = "https://cdn.local";
const DEFAULT_CONTENT_HASH_HEADER: &str = "x-content-hash";
const DEFAULT_ASSET_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PAGE_LOCATION_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LEGACY_DATABASE: &str = "composite-ui";
const DEFAULT_LEGACY_PATH_COLLECTION: &str = "paths";
const DEFAULT_LEGACY_REGION_COLLECTION: &str = "regions";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration. Collection names and well-known paths live here and
/// are handed to components at construction; nothing downstream hard-codes
/// them.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file backing the registration store; in-memory only when unset.
    pub store_path: Option<PathBuf>,
    /// Path of the well-known aggregate whose `pageLocations` map the
    /// webhook reconciler maintains.
    pub pages_path: String,
    /// Base URL root-relative script assets are resolved against.
    pub cdn_location: String,
    /// Response header carrying the content hash of a fetched asset.
    pub content_hash_header: String,
    pub asset_timeout_ms: u64,
    pub page_location_timeout_ms: u64,
    /// Legacy change-feed addressing, for the full-resync source.
    pub legacy_database: String,
    pub legacy_path_collection: String,
    pub legacy_region_collection: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store_path: env::var("APP_REGISTRY_STORE_PATH").ok().map(PathBuf::from),
            pages_path: env_or("APP_REGISTRY_PAGES_PATH", DEFAULT_PAGES_PATH),
            cdn_location: env_or("APP_REGISTRY_CDN_LOCATION", DEFAULT_CDN_LOCATION),
            content_hash_header: env_or(
                "APP_REGISTRY_CONTENT_HASH_HEADER",
                DEFAULT_CONTENT_HASH_HEADER,
            ),
            asset_timeout_ms: env_u64("APP_REGISTRY_ASSET_TIMEOUT_MS", DEFAULT_ASSET_TIMEOUT_MS)?,
            page_location_timeout_ms: env_u64(
                "APP_REGISTRY_PAGE_LOCATION_TIMEOUT_MS",
                DEFAULT_PAGE_LOCATION_TIMEOUT_MS,
            )?,
            legacy_database: env_or("APP_REGISTRY_LEGACY_DATABASE", DEFAULT_LEGACY_DATABASE),
            legacy_path_collection: env_or(
                "APP_REGISTRY_LEGACY_PATH_COLLECTION",
                DEFAULT_LEGACY_PATH_COLLECTION,
            ),
            legacy_region_collection: env_or(
                "APP_REGISTRY_LEGACY_REGION_COLLECTION",
                DEFAULT_LEGACY_REGION_COLLECTION,
            ),
        })
    }

    pub fn for_tests() -> Self {
        Self {
            store_path: None,
            pages_path: DEFAULT_PAGES_PATH.to_string(),
            cdn_location: DEFAULT_CDN_LOCATION.to_string(),
            content_hash_header: DEFAULT_CONTENT_HASH_HEADER.to_string(),
            asset_timeout_ms: DEFAULT_ASSET_TIMEOUT_MS,
            page_location_timeout_ms: DEFAULT_PAGE_LOCATION_TIMEOUT_MS,
            legacy_database: DEFAULT_LEGACY_DATABASE.to_string(),
            legacy_path_collection: DEFAULT_LEGACY_PATH_COLLECTION.to_string(),
            legacy_region_collection: DEFAULT_LEGACY_REGION_COLLECTION.to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<u64>()
                .map_err(|error| ConfigError::Invalid {
                    key,
                    message: error.to_string(),
                })
        }
        _ => Ok(default),
    }
}
