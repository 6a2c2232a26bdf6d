// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_request_config(&config.request)?;
    validate_cache_config(&config.cache)?;
    validate_sink_config(&config.sink)?;
    validate_flush_config(&config.flush)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    match config.listen_addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => Ok(()),
        _ => bail!("server.listen_addr must be in format 'host:port'"),
    }
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("request.max_payload_bytes must be greater than 0");
    }

    // A single delta is a few hundred bytes.
    if config.max_payload_bytes > 1024 * 1024 {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "request.max_payload_bytes is very large for single engagement events"
        );
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<()> {
    if config.backend == CacheBackendKind::Redis && config.url.is_empty() {
        bail!("cache.url is required for the redis backend");
    }

    if config.key_prefix.is_empty() {
        bail!("cache.key_prefix must not be empty");
    }

    if config.staging_ttl_secs == 0 {
        bail!("cache.staging_ttl_secs must be greater than 0");
    }

    if config.merge_max_attempts == 0 {
        bail!("cache.merge_max_attempts must be greater than 0");
    }

    // Staging data must outlive the day plus the next day's flush.
    if config.staging_ttl_secs < 24 * 60 * 60 {
        warn!(
            staging_ttl_secs = config.staging_ttl_secs,
            "cache.staging_ttl_secs is under one day; staging records may expire before they are flushed"
        );
    }

    Ok(())
}

fn validate_sink_config(config: &SinkConfig) -> Result<()> {
    if config.backend == SinkBackendKind::Mysql {
        if config.url.is_empty() {
            bail!("sink.url is required for the mysql backend");
        }

        if config.max_connections == 0 {
            bail!("sink.max_connections must be greater than 0");
        }
    }

    if !is_plain_identifier(&config.table) {
        bail!(
            "sink.table must be a plain SQL identifier (letters, digits, underscores), got '{}'",
            config.table
        );
    }

    Ok(())
}

fn validate_flush_config(config: &FlushConfig) -> Result<()> {
    if config.interval_secs == 0 {
        bail!("flush.interval_secs must be greater than 0");
    }

    if config.page_size == 0 {
        bail!("flush.page_size must be greater than 0");
    }

    if config.drain_interval_ms > 60_000 {
        warn!(
            drain_interval_ms = config.drain_interval_ms,
            "flush.drain_interval_ms is over a minute; a day's flush may take very long"
        );
    }

    Ok(())
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
