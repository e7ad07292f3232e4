//! Configuration loaded from environment variables and the collections file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::query::{DEFAULT_PAGE_SIZE, GraphSettings, MAX_PAGE_SIZE};
use crate::registry::CollectionDef;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. When None, collections live in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to the collection definitions (default: ./collections.toml).
    pub collections_file: PathBuf,

    /// JSON seed for the in-memory store.
    pub seed_file: Option<PathBuf>,

    /// Page size when a request gives none (default: 10).
    pub default_page_size: u64,

    /// Largest page size a request may ask for (default: 100).
    pub max_page_size: u64,

    /// Per-query statement timeout on PostgreSQL (default: 10s).
    pub statement_timeout: Duration,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let collections_file = env::var("COLLECTIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./collections.toml"));

        let seed_file = env::var("SEED_FILE").ok().map(PathBuf::from);

        let default_page_size = env::var("DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("DEFAULT_PAGE_SIZE must be a valid u64")?;

        let max_page_size = env::var("MAX_PAGE_SIZE")
            .unwrap_or_else(|_| MAX_PAGE_SIZE.to_string())
            .parse()
            .context("MAX_PAGE_SIZE must be a valid u64")?;

        let statement_timeout_secs: u64 = env::var("STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            collections_file,
            seed_file,
            default_page_size,
            max_page_size,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
            cors_allowed_origins,
        })
    }

    /// Engine limits derived from the page size settings.
    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            default_limit: self.default_page_size.max(1),
            max_limit: self.max_page_size.max(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CollectionsFile {
    #[serde(default, rename = "collection")]
    collections: Vec<CollectionDef>,
}

/// Parse collection definitions from TOML.
///
/// ```toml
/// [[collection]]
/// name = "posts"
/// text_fields = ["title", "body"]
/// restricted_fields = ["internal_notes"]
///
/// [collection.default_filters]
/// deleted = false
///
/// [collection.relations.author]
/// collection = "users"
/// ```
pub fn parse_collections(source: &str) -> Result<Vec<CollectionDef>> {
    let file: CollectionsFile = toml::from_str(source).context("invalid collections file")?;
    Ok(file.collections)
}

/// Read collection definitions from a TOML file.
pub fn load_collections(path: &Path) -> Result<Vec<CollectionDef>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_collections(&source).with_context(|| format!("failed to parse {}", path.display()))
}
