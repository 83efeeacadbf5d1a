use anyhow::Context;
use serde::Deserialize;

const DEFAULT_UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket holding food images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base used to derive public image URLs; `{public_url}/{bucket}/{key}`.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "foodlog".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "foodlog-users".into()),
            ttl_minutes: parsed_env("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: parsed_env("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };

        let endpoint = std::env::var("STORAGE_ENDPOINT").context("STORAGE_ENDPOINT")?;
        let storage = StorageConfig {
            bucket: std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "food-images".into()),
            access_key: std::env::var("STORAGE_ACCESS_KEY").context("STORAGE_ACCESS_KEY")?,
            secret_key: std::env::var("STORAGE_SECRET_KEY").context("STORAGE_SECRET_KEY")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("STORAGE_PUBLIC_URL").unwrap_or_else(|_| endpoint.clone()),
            endpoint,
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            max_upload_bytes: parsed_env("MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_UPLOAD_LIMIT),
        })
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}
