// Initialization utilities for server mode
//
// Backend selection, pipeline assembly and logging/tracing setup

use anyhow::{Context, Result};
use feedtally_cache::{
    ActivityIndex, CacheBackend, DayLock, KeySpace, MemoryCache, RedisCache, StagingStore,
};
use feedtally_config::{CacheBackendKind, FlushTrigger, LogFormat, RuntimeConfig, SinkBackendKind};
use feedtally_core::Clock;
use feedtally_flush::{FlushCoordinator, FlushSettings, TrafficTrigger};
use feedtally_handlers::IngestService;
use feedtally_sink::{DurableSink, MemorySink, MySqlSink};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the HTTP surface and the flush driver share.
#[derive(Clone)]
pub struct Pipeline {
    pub ingest: IngestService,
    pub coordinator: Arc<FlushCoordinator>,
    pub cache: Arc<dyn CacheBackend>,
    pub sink: Arc<dyn DurableSink>,
}

/// Connect the configured cache backend.
pub async fn init_cache(config: &RuntimeConfig) -> Result<Arc<dyn CacheBackend>> {
    info!("Initializing cache backend: {}", config.cache.backend);

    let cache: Arc<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::Redis => Arc::new(
            RedisCache::connect(&config.cache.url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        CacheBackendKind::Memory => {
            warn!("Using in-process memory cache; staging data is lost on restart and not shared between instances");
            Arc::new(MemoryCache::new())
        }
    };
    Ok(cache)
}

/// Connect the configured durable sink.
pub async fn init_sink(config: &RuntimeConfig) -> Result<Arc<dyn DurableSink>> {
    info!("Initializing durable sink: {}", config.sink.backend);

    let sink: Arc<dyn DurableSink> = match config.sink.backend {
        SinkBackendKind::Mysql => Arc::new(
            MySqlSink::connect(
                &config.sink.url,
                &config.sink.table,
                config.sink.max_connections,
            )
            .await
            .context("Failed to connect to MySQL sink")?,
        ),
        SinkBackendKind::Memory => {
            warn!("Using in-process memory sink; flushed records are not persisted");
            Arc::new(MemorySink::new())
        }
    };
    Ok(sink)
}

/// Wire the staging store, activity index, lock, coordinator and ingest service.
pub fn build_pipeline(
    config: &RuntimeConfig,
    cache: Arc<dyn CacheBackend>,
    sink: Arc<dyn DurableSink>,
    clock: Arc<dyn Clock>,
) -> Pipeline {
    let keys = KeySpace::new(config.cache.key_prefix.clone());
    let ttl = config.cache.staging_ttl();

    let staging = StagingStore::new(
        cache.clone(),
        keys.clone(),
        ttl,
        config.cache.merge_max_attempts,
    );
    let index = ActivityIndex::new(cache.clone(), keys.clone(), ttl);
    let lock = DayLock::new(cache.clone(), keys, config.flush.lock_grace());

    let coordinator = Arc::new(FlushCoordinator::new(
        staging.clone(),
        index.clone(),
        lock,
        sink.clone(),
        clock.clone(),
        FlushSettings {
            page_size: config.flush.page_size,
            drain_interval: config.flush.drain_interval(),
        },
    ));

    let mut ingest = IngestService::new(staging, index, clock, config.request.max_payload_bytes);
    if config.flush.trigger == FlushTrigger::Traffic {
        ingest = ingest.with_traffic_trigger(TrafficTrigger::new(coordinator.clone()));
    }

    Pipeline {
        ingest,
        coordinator,
        cache,
        sink,
    }
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.server.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedtally_core::FixedClock;

    fn memory_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.cache.backend = CacheBackendKind::Memory;
        config.sink.backend = SinkBackendKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_memory_backends_need_no_network() {
        let config = memory_config();
        let cache = init_cache(&config).await.unwrap();
        let sink = init_sink(&config).await.unwrap();

        assert!(cache.ping().await.is_ok());
        assert!(sink.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_pipeline_honours_key_prefix() {
        let mut config = memory_config();
        config.cache.key_prefix = "ft-test".to_string();

        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(FixedClock::at("2024-03-02T10:00:00+00:00").unwrap());
        let pipeline = build_pipeline(&config, cache.clone(), Arc::new(MemorySink::new()), clock);

        pipeline
            .ingest
            .handle(br#"{"user_id":"u1","source":1,"video_id":"v1"}"#)
            .await
            .unwrap();

        assert!(cache.score("ft-test:active:2024-03-02", "u1").is_some());
    }
}
