use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::connection::{ConnectionKey, normalize, validate_connection_groups};
use crate::error::ConfigError;
use crate::queue::QueueOptions;
use crate::settings::RqSettings;

pub const DEFAULT_CONFIG_FILENAME: &str = "rq.toml";
pub const ENV_CONFIG_KEY: &str = "RQ_CONFIG";

pub fn resolve_config_source(config_path: Option<&str>) -> (Option<String>, String) {
    if let Some(path) = config_path {
        return (Some(path.to_string()), "--config parameter".to_string());
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_KEY)
        && !env_path.is_empty()
    {
        return (Some(env_path), format!("{ENV_CONFIG_KEY} env var"));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILENAME);
    if default_path.is_file() {
        return (
            Some(default_path.to_string_lossy().to_string()),
            format!("{DEFAULT_CONFIG_FILENAME} in cwd"),
        );
    }

    (None, "not found".to_string())
}

pub fn load_toml_settings(config_path: Option<&str>) -> Result<RqSettings> {
    dotenvy::dotenv().ok();

    let (path, _) = resolve_config_source(config_path);
    let path = path.ok_or_else(|| {
        anyhow::anyhow!("queue settings not found. Provide --config, set RQ_CONFIG, or add rq.toml.")
    })?;

    let payload = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {path}"))?;
    parse_toml_settings(&payload).with_context(|| format!("invalid settings in {path}"))
}

/// Parses a settings document, applies env overrides and validates it.
pub fn parse_toml_settings(payload: &str) -> Result<RqSettings> {
    let toml_value: toml::Value = toml::from_str(payload).context("failed to parse TOML")?;
    let mut json_value =
        serde_json::to_value(toml_value).context("failed to convert TOML to JSON")?;

    json_value = normalize_toml_payload(json_value)?;
    let merged = deep_merge(json_value, env_overrides()?);

    let settings: RqSettings = serde_json::from_value(merged.clone()).map_err(|err| {
        let hint = diagnose_config_error(&merged, &err);
        anyhow::anyhow!("invalid queue settings: {err}{hint}")
    })?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn normalize_toml_payload(mut payload: Value) -> Result<Value> {
    if let Value::Object(mut map) = payload {
        if let Some(rq_value) = map.remove("rq") {
            payload = rq_value;
        } else {
            payload = Value::Object(map);
        }
    }

    if let Value::Object(map) = payload {
        return Ok(Value::Object(map));
    }

    Err(anyhow::anyhow!("queue settings must be a TOML table"))
}

fn env_overrides() -> Result<Value> {
    let mut payload = Map::new();

    set_env_string(&mut payload, "queue_class", "RQ_QUEUE_CLASS");
    set_env_string(&mut payload, "job_class", "RQ_JOB_CLASS");
    set_env_string(&mut payload, "worker_class", "RQ_WORKER_CLASS");
    set_env_string(&mut payload, "serializer", "RQ_SERIALIZER");
    set_env_int(&mut payload, "default_result_ttl", "RQ_DEFAULT_RESULT_TTL")?;
    set_env_argv(&mut payload, "worker_cmd", "RQ_WORKER_CMD");

    Ok(Value::Object(payload))
}

fn set_env_string(map: &mut Map<String, Value>, key: &str, env: &str) {
    if let Ok(value) = std::env::var(env)
        && !value.is_empty()
    {
        map.insert(key.to_string(), Value::String(value));
    }
}

fn set_env_int(map: &mut Map<String, Value>, key: &str, env: &str) -> Result<()> {
    if let Ok(value) = std::env::var(env) {
        if value.is_empty() {
            return Ok(());
        }
        let parsed: i64 = value
            .parse()
            .with_context(|| format!("Invalid {env} value: {value}"))?;
        map.insert(key.to_string(), Value::Number(parsed.into()));
    }
    Ok(())
}

fn set_env_argv(map: &mut Map<String, Value>, key: &str, env: &str) {
    if let Ok(value) = std::env::var(env) {
        let argv: Vec<Value> = value
            .split_whitespace()
            .map(|part| Value::String(part.to_string()))
            .collect();
        if !argv.is_empty() {
            map.insert(key.to_string(), Value::Array(argv));
        }
    }
}

fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let entry = base_map.remove(&key);
                let merged = match entry {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay_value) => overlay_value,
    }
}

fn diagnose_config_error(config: &Value, err: &serde_json::Error) -> String {
    let err_msg = err.to_string().to_lowercase();

    if err_msg.contains("invalid type")
        && let Some(queues) = config.get("queues")
    {
        let Some(queues) = queues.as_object() else {
            return format!(
                "\n\nHint: queues must be a table of queue tables (e.g. [queues.default]), got: {queues}"
            );
        };
        for (name, queue) in queues {
            if !queue.is_object() {
                return format!("\n\nHint: queue '{name}' must be a table, got: {queue}");
            }
        }
    }

    if err_msg.contains("unknown field")
        && let Some(caches) = config.get("caches").and_then(Value::as_object)
    {
        let valid_fields = ["location", "db"];
        for (name, cache) in caches {
            if let Some(obj) = cache.as_object() {
                for key in obj.keys() {
                    if !valid_fields.contains(&key.as_str()) {
                        return format!(
                            "\n\nHint: cache '{name}' has unknown field '{key}'. Valid fields are: {}",
                            valid_fields.join(", ")
                        );
                    }
                }
            }
        }
    }

    if err_msg.contains("invalid type")
        && let Some(cmd) = config.get("worker_cmd")
        && !cmd.is_array()
    {
        return format!("\n\nHint: worker_cmd must be an array of strings, got: {cmd}");
    }

    String::new()
}

fn validate_settings(settings: &RqSettings) -> Result<()> {
    let queues = settings.queues()?;

    for (name, raw) in queues {
        validate_connection_groups(name, raw)?;
        QueueOptions::from_raw(name, raw)?;

        let params = normalize(raw);
        if let Some(cache) = params.get(ConnectionKey::UseRedisCache) {
            let Some(cache) = cache.as_str() else {
                return Err(
                    ConfigError::invalid_value(name, "USE_REDIS_CACHE", "a cache name").into(),
                );
            };
            if settings.cache(cache).is_none() {
                return Err(ConfigError::UnknownCache {
                    queue: name.clone(),
                    cache: cache.to_string(),
                }
                .into());
            }
        }
    }

    if settings.worker_cmd.is_empty() {
        return Err(anyhow::anyhow!(
            "worker_cmd cannot be empty (e.g., [\"rq\", \"worker\"])"
        ));
    }

    Ok(())
}
