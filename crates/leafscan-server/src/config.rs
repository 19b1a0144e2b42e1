use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File,
    Object,
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "object" => Ok(Self::Object),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!(
                "unknown LEAFSCAN_STORAGE '{}' (expected memory, file, object or sqlite)",
                other
            ),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Object => "object",
            Self::Sqlite => "sqlite",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageKind,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub object_url: Option<String>,
    pub object_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub ai_model: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_region: Option<String>,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("LEAFSCAN_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid LEAFSCAN_PORT '{}'", v))?,
            None => 5000,
        };
        let storage = match var("LEAFSCAN_STORAGE") {
            Some(v) => v.parse()?,
            None => StorageKind::File,
        };
        let max_body_mb: usize = match var("LEAFSCAN_MAX_BODY_MB") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid LEAFSCAN_MAX_BODY_MB '{}'", v))?,
            None => 25,
        };

        Ok(Self {
            host: var("LEAFSCAN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage,
            data_dir: var("LEAFSCAN_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            db_path: var("LEAFSCAN_DB_PATH").unwrap_or_else(|| "leafscan.db".into()).into(),
            object_url: var("LEAFSCAN_OBJECT_URL"),
            object_token: var("LEAFSCAN_OBJECT_TOKEN"),
            openai_api_key: var("OPENAI_API_KEY"),
            ai_model: var("LEAFSCAN_AI_MODEL"),
            ai_base_url: var("LEAFSCAN_AI_BASE_URL"),
            ai_region: var("LEAFSCAN_AI_REGION"),
            max_body_bytes: max_body_mb * 1024 * 1024,
        })
    }
}
