//! Service configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TEXT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_TEXT_MODEL: &str = "claude-3-5-sonnet-20240620";
pub const DEFAULT_NOVA_MODEL: &str = "amazon.nova-canvas-v1:0";
pub const DEFAULT_TITAN_MODEL: &str = "amazon.titan-image-generator-v2:0";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("set either BLOB_DIR (with BLOB_PUBLIC_URL) or BLOB_UPLOAD_URL")]
    NoBlobStore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlobConfig {
    Local {
        dir: PathBuf,
        public_url: String,
    },
    Http {
        upload_url: String,
        public_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub bind_address: SocketAddr,
    pub request_timeout: Duration,
    pub fetch_timeout: Duration,
    pub allow_local_fetch: bool,
    pub text_api_url: String,
    pub text_api_key: String,
    pub text_model: String,
    pub image_api_url: String,
    pub image_api_key: Option<String>,
    pub nova_model: String,
    pub titan_model: String,
    pub blob: BlobConfig,
    pub job_queue_capacity: usize,
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let blob = match (get("BLOB_DIR"), get("BLOB_UPLOAD_URL")) {
            (Some(dir), _) => BlobConfig::Local {
                dir: PathBuf::from(dir),
                public_url: required("BLOB_PUBLIC_URL")?,
            },
            (None, Some(upload_url)) => BlobConfig::Http {
                upload_url,
                public_url: get("BLOB_PUBLIC_URL"),
            },
            (None, None) => return Err(ConfigError::NoBlobStore),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_address: parse_or(get("BIND_ADDRESS"), "BIND_ADDRESS", ([0, 0, 0, 0], 3000).into())?,
            request_timeout: Duration::from_secs(parse_or(
                get("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                29,
            )?),
            fetch_timeout: Duration::from_secs(parse_or(
                get("FETCH_TIMEOUT_SECS"),
                "FETCH_TIMEOUT_SECS",
                30,
            )?),
            allow_local_fetch: parse_or(get("ALLOW_LOCAL_FETCH"), "ALLOW_LOCAL_FETCH", false)?,
            text_api_url: get("TEXT_API_URL").unwrap_or_else(|| DEFAULT_TEXT_API_URL.to_string()),
            text_api_key: required("TEXT_API_KEY")?,
            text_model: get("TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_api_url: required("IMAGE_API_URL")?,
            image_api_key: get("IMAGE_API_KEY"),
            nova_model: get("IMAGE_MODEL_NOVA").unwrap_or_else(|| DEFAULT_NOVA_MODEL.to_string()),
            titan_model: get("IMAGE_MODEL_TITAN")
                .unwrap_or_else(|| DEFAULT_TITAN_MODEL.to_string()),
            blob,
            job_queue_capacity: parse_or(get("JOB_QUEUE_CAPACITY"), "JOB_QUEUE_CAPACITY", 32)?,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
