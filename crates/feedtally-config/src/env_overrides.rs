use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "FEEDTALLY_";

/// Abstraction over environment-variable lookups so tests (and embedders)
/// can supply their own source of overrides.
pub trait EnvSource {
    /// Get a variable by its name without the FEEDTALLY_ prefix.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Server configuration (listen addr, log level/format)
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    // Request configuration
    if let Some(val) = get_env_parsed(env, "MAX_PAYLOAD_BYTES")? {
        config.request.max_payload_bytes = val;
    }

    // Cache
    if let Some(backend) = get_env_string(env, "CACHE_BACKEND") {
        config.cache.backend = backend
            .parse()
            .context("Invalid FEEDTALLY_CACHE_BACKEND value")?;
    }
    if let Some(url) = get_env_string(env, "REDIS_URL") {
        config.cache.url = url;
    }
    if let Some(prefix) = get_env_string(env, "CACHE_KEY_PREFIX") {
        config.cache.key_prefix = prefix;
    }
    if let Some(val) = get_env_parsed(env, "STAGING_TTL_SECS")? {
        config.cache.staging_ttl_secs = val;
    }
    if let Some(val) = get_env_parsed(env, "MERGE_MAX_ATTEMPTS")? {
        config.cache.merge_max_attempts = val;
    }

    // Sink
    if let Some(backend) = get_env_string(env, "SINK_BACKEND") {
        config.sink.backend = backend
            .parse()
            .context("Invalid FEEDTALLY_SINK_BACKEND value")?;
    }
    if let Some(url) = get_env_string(env, "SINK_URL") {
        config.sink.url = url;
    }
    if let Some(table) = get_env_string(env, "SINK_TABLE") {
        config.sink.table = table;
    }
    if let Some(val) = get_env_parsed(env, "SINK_MAX_CONNECTIONS")? {
        config.sink.max_connections = val;
    }

    // Flush
    if let Some(trigger) = get_env_string(env, "FLUSH_TRIGGER") {
        config.flush.trigger = trigger
            .parse()
            .context("Invalid FEEDTALLY_FLUSH_TRIGGER value")?;
    }
    if let Some(val) = get_env_parsed(env, "FLUSH_INTERVAL_SECS")? {
        config.flush.interval_secs = val;
    }
    if let Some(val) = get_env_parsed(env, "FLUSH_PAGE_SIZE")? {
        config.flush.page_size = val;
    }
    if let Some(val) = get_env_parsed(env, "FLUSH_DRAIN_INTERVAL_MS")? {
        config.flush.drain_interval_ms = val;
    }
    if let Some(val) = get_env_parsed(env, "FLUSH_LOCK_GRACE_SECS")? {
        config.flush.lock_grace_secs = val;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn get_env_parsed<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
