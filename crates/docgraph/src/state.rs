//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::{Config, load_collections};
use crate::db;
use crate::query::GraphService;
use crate::registry::{CollectionDef, CollectionRegistry};
use crate::store::{DocumentStore, MemoryStore, PgStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Query engine over the registered collections.
    graph: GraphService,

    /// PostgreSQL connection pool, when collections live in PostgreSQL.
    db: Option<PgPool>,
}

impl AppState {
    /// Build state from configuration: pick the store, register collections.
    pub async fn new(config: &Config) -> Result<Self> {
        let defs = if config.collections_file.exists() {
            load_collections(&config.collections_file)?
        } else {
            tracing::warn!(
                path = %config.collections_file.display(),
                "collections file not found, starting with no collections"
            );
            Vec::new()
        };

        let (store, db): (Arc<dyn DocumentStore>, Option<PgPool>) = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url, config.database_max_connections).await?;
                let store =
                    PgStore::new(pool.clone()).with_statement_timeout(config.statement_timeout);
                for def in &defs {
                    store
                        .ensure_collection(def)
                        .await
                        .with_context(|| format!("failed to prepare collection {}", def.name))?;
                }
                info!("Using PostgreSQL document store");
                (Arc::new(store), Some(pool))
            }
            None => {
                let store = match &config.seed_file {
                    Some(path) => {
                        let raw = std::fs::read_to_string(path)
                            .with_context(|| format!("failed to read {}", path.display()))?;
                        let seed: serde_json::Value =
                            serde_json::from_str(&raw).context("seed file is not valid JSON")?;
                        MemoryStore::from_seed(&seed).context("invalid seed file")?
                    }
                    None => MemoryStore::new(),
                };
                info!("Using in-memory document store");
                (Arc::new(store), None)
            }
        };

        let registry = register_all(defs, store)?;
        let graph = GraphService::new(registry).with_settings(config.graph_settings());
        Ok(Self::with_graph(graph, db))
    }

    /// State around an existing query engine.
    pub fn with_graph(graph: GraphService, db: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { graph, db }),
        }
    }

    pub fn graph(&self) -> &GraphService {
        &self.inner.graph
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        self.inner.graph.registry()
    }

    pub fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }

    /// Whether the backing store is reachable. Always true in memory.
    pub async fn store_healthy(&self) -> bool {
        match &self.inner.db {
            Some(pool) => db::check_health(pool).await,
            None => true,
        }
    }
}

/// Register every definition against one store.
pub fn register_all(
    defs: Vec<CollectionDef>,
    store: Arc<dyn DocumentStore>,
) -> Result<Arc<CollectionRegistry>> {
    let registry = Arc::new(CollectionRegistry::new());
    for def in defs {
        let name = def.name.clone();
        registry
            .register(def, store.clone())
            .with_context(|| format!("failed to register collection {name}"))?;
    }
    info!(collections = registry.len(), "Collections registered");
    Ok(registry)
}
