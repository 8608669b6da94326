//! Source registry implementation
//!
//! Maps stream names to their [`UpstreamSource`]. Sources are created once
//! at startup and live for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::source::{StreamConfig, UpstreamSource};
use crate::stats::SourceStats;

/// Central registry of all configured upstream sources
///
/// Thread-safe via `RwLock`. Lookups on every viewer connection only take
/// the read side.
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<UpstreamSource>>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with one source per configuration
    ///
    /// Continuous (non on-demand) sources start connecting immediately.
    pub async fn from_configs(
        configs: impl IntoIterator<Item = StreamConfig>,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for config in configs {
            registry.add(config).await?;
        }
        Ok(registry)
    }

    /// Add a source for `config`
    pub async fn add(&self, config: StreamConfig) -> Result<Arc<UpstreamSource>, RegistryError> {
        let mut sources = self.sources.write().await;

        if sources.contains_key(&config.name) {
            return Err(RegistryError::DuplicateStream(config.name));
        }

        let name = config.name.clone();
        let on_demand = config.on_demand;
        let source = Arc::new(UpstreamSource::open(config).await);
        sources.insert(name.clone(), Arc::clone(&source));

        tracing::info!(stream = %name, on_demand = on_demand, "Source added");

        Ok(source)
    }

    /// Look up a source by name
    pub async fn get(&self, name: &str) -> Result<Arc<UpstreamSource>, RegistryError> {
        self.sources
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))
    }

    /// Remove a source and stop its reader
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let source = self
            .sources
            .write()
            .await
            .remove(name)
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))?;

        source.disable().await;
        tracing::info!(stream = %name, "Source removed");
        Ok(())
    }

    /// Disable a source by name
    pub async fn disable(&self, name: &str) -> Result<(), RegistryError> {
        self.get(name).await?.disable().await;
        Ok(())
    }

    /// Enable a source by name
    pub async fn enable(&self, name: &str) -> Result<(), RegistryError> {
        self.get(name).await?.enable().await;
        Ok(())
    }

    /// Names of all sources, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get statistics for one source
    pub async fn get_stream_stats(&self, name: &str) -> Option<SourceStats> {
        self.sources.read().await.get(name).map(|s| s.stats())
    }

    /// Get statistics for all sources, sorted by name
    pub async fn stats(&self) -> Vec<SourceStats> {
        let mut stats: Vec<SourceStats> =
            self.sources.read().await.values().map(|s| s.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Get total number of sources
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }

    /// Stop every reader
    ///
    /// Returns the number of readers that failed to stop in time.
    pub async fn shutdown(&self) -> usize {
        let sources: Vec<Arc<UpstreamSource>> =
            self.sources.read().await.values().cloned().collect();

        let mut stuck = 0;
        for source in sources {
            if !source.stop().await {
                stuck += 1;
            }
        }

        tracing::info!(stuck = stuck, "Source registry shut down");
        stuck
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
