//! Turns canonical connection params into something that can be dialed.
//!
//! Only the params decide the target; queues sharing params share the
//! target. `USE_REDIS_CACHE` is looked up in the settings' cache table.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::IntoConnectionInfo;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use rqbridge_config::{CanonicalConnectionParams, ConnectionGroup, ConnectionKey, RqSettings};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::constants::{DEFAULT_REDIS_DB, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_SENTINEL_PORT};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentinelTarget {
    pub sentinels: Vec<(String, u16)>,
    pub master_name: String,
    pub db: i64,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionTarget {
    Direct {
        #[serde(serialize_with = "serialize_redacted")]
        url: String,
        socket_timeout: Option<Duration>,
    },
    Sentinel {
        #[serde(flatten)]
        target: SentinelTarget,
        socket_timeout: Option<Duration>,
    },
}

impl ConnectionTarget {
    /// URL a worker process can be started with; Sentinel targets have none.
    pub fn worker_url(&self) -> Option<&str> {
        match self {
            ConnectionTarget::Direct { url, .. } => Some(url),
            ConnectionTarget::Sentinel { .. } => None,
        }
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        match self {
            ConnectionTarget::Direct { socket_timeout, .. }
            | ConnectionTarget::Sentinel { socket_timeout, .. } => *socket_timeout,
        }
    }

    pub fn redacted(&self) -> String {
        match self {
            ConnectionTarget::Direct { url, .. } => redacted(url),
            ConnectionTarget::Sentinel { target, .. } => {
                let nodes = target
                    .sentinels
                    .iter()
                    .map(|(host, port)| format!("{}:{port}", bracket_host(host)))
                    .collect::<Vec<_>>()
                    .join(",");
                let scheme = if target.ssl { "sentinels" } else { "sentinel" };
                format!("{scheme}://{nodes}/{}/{}", target.master_name, target.db)
            }
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

fn serialize_redacted<S: serde::Serializer>(url: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&redacted(url))
}

pub fn resolve_target(
    params: &CanonicalConnectionParams,
    settings: &RqSettings,
) -> Result<ConnectionTarget> {
    let socket_timeout = match params.get(ConnectionKey::SocketTimeout) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let limit = value
                .as_f64()
                .filter(|seconds| *seconds > 0.0)
                .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
                .with_context(|| {
                    format!("SOCKET_TIMEOUT must be a positive number of seconds, got {value}")
                })?;
            Some(limit)
        }
    };
    let db = optional_int(params, ConnectionKey::Db)?;
    let password = params.get_str(ConnectionKey::Password).map(str::to_string);
    let ssl = params
        .get(ConnectionKey::Ssl)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let url = match params.group() {
        Some(ConnectionGroup::Url) => {
            let raw = params
                .get_str(ConnectionKey::Url)
                .context("URL must be a string")?;
            url_with_overrides(raw, db, password.as_deref(), ssl)?
        }
        Some(ConnectionGroup::Cache) => {
            let cache = params
                .get_str(ConnectionKey::UseRedisCache)
                .context("USE_REDIS_CACHE must be a cache name")?;
            let config = settings
                .cache(cache)
                .with_context(|| format!("cache '{cache}' is not configured under [caches]"))?;
            url_with_overrides(&config.location, config.db, None, false)
                .with_context(|| format!("cache '{cache}' has an invalid location"))?
        }
        Some(ConnectionGroup::UnixSocket) => {
            let path = params
                .get_str(ConnectionKey::UnixSocketPath)
                .context("UNIX_SOCKET_PATH must be a string")?;
            unix_url(path, db.unwrap_or(DEFAULT_REDIS_DB), password.as_deref())
        }
        Some(ConnectionGroup::Sentinel) => {
            let target = SentinelTarget {
                sentinels: sentinel_nodes(params.get(ConnectionKey::Sentinels))?,
                master_name: params
                    .get_str(ConnectionKey::MasterName)
                    .context("MASTER_NAME is required with SENTINELS")?
                    .to_string(),
                db: db.unwrap_or(DEFAULT_REDIS_DB),
                password,
                ssl,
            };
            return Ok(ConnectionTarget::Sentinel {
                target,
                socket_timeout,
            });
        }
        Some(ConnectionGroup::Tcp) | None => {
            let host = match params.get(ConnectionKey::Host) {
                None | Some(Value::Null) => DEFAULT_REDIS_HOST.to_string(),
                Some(Value::String(host)) => host.clone(),
                Some(other) => anyhow::bail!("HOST must be a string, got {other}"),
            };
            let port = match optional_int(params, ConnectionKey::Port)? {
                Some(port) => u16::try_from(port)
                    .ok()
                    .filter(|port| *port > 0)
                    .with_context(|| format!("PORT must be 1-65535, got {port}"))?,
                None => DEFAULT_REDIS_PORT,
            };
            tcp_url(
                &host,
                port,
                db.unwrap_or(DEFAULT_REDIS_DB),
                password.as_deref(),
                ssl,
            )?
        }
    };

    url.as_str()
        .into_connection_info()
        .with_context(|| format!("invalid Redis connection ({})", redacted(&url)))?;
    Ok(ConnectionTarget::Direct {
        url,
        socket_timeout,
    })
}

fn optional_int(params: &CanonicalConnectionParams, key: ConnectionKey) -> Result<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .with_context(|| format!("{key} must be an integer, got {number}")),
        Some(Value::String(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be an integer, got '{raw}'")),
        Some(other) => Err(anyhow::anyhow!("{key} must be an integer, got {other}")),
    }
}

fn url_with_overrides(raw: &str, db: Option<i64>, password: Option<&str>, ssl: bool) -> Result<String> {
    let mut url = Url::parse(raw).with_context(|| format!("invalid URL '{}'", redacted(raw)))?;
    if ssl && url.scheme() == "redis" {
        url.set_scheme("rediss")
            .map_err(|_| anyhow::anyhow!("cannot enable SSL for '{}'", redacted(raw)))?;
    }
    if let Some(db) = db {
        if url.scheme().contains("unix") {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "db")
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("db", &db.to_string());
        } else {
            url.set_path(&format!("/{db}"));
        }
    }
    if let Some(password) = password
        && url.password().is_none()
    {
        url.set_password(Some(password))
            .map_err(|_| anyhow::anyhow!("cannot set PASSWORD on '{}'", redacted(raw)))?;
    }
    Ok(url.to_string())
}

fn tcp_url(host: &str, port: u16, db: i64, password: Option<&str>, ssl: bool) -> Result<String> {
    let scheme = if ssl { "rediss" } else { "redis" };
    let mut url = Url::parse(&format!("{scheme}://{}:{port}/{db}", bracket_host(host)))
        .with_context(|| format!("invalid HOST '{host}'"))?;
    if let Some(password) = password {
        url.set_password(Some(password))
            .map_err(|_| anyhow::anyhow!("cannot set PASSWORD for HOST '{host}'"))?;
    }
    Ok(url.to_string())
}

fn unix_url(path: &str, db: i64, password: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("db", &db.to_string());
    if let Some(password) = password {
        query.append_pair("pass", password);
    }
    format!("redis+unix://{path}?{}", query.finish())
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

fn sentinel_nodes(value: Option<&Value>) -> Result<Vec<(String, u16)>> {
    let Some(Value::Array(entries)) = value else {
        anyhow::bail!("SENTINELS must be a list of [host, port] pairs");
    };
    if entries.is_empty() {
        anyhow::bail!("SENTINELS cannot be empty");
    }
    entries.iter().map(sentinel_node).collect()
}

fn sentinel_node(entry: &Value) -> Result<(String, u16)> {
    match entry {
        Value::Array(pair) => match pair.as_slice() {
            [Value::String(host), raw_port] => {
                let port = raw_port
                    .as_u64()
                    .and_then(|port| u16::try_from(port).ok())
                    .with_context(|| format!("invalid sentinel port {raw_port}"))?;
                Ok((host.clone(), port))
            }
            _ => anyhow::bail!("invalid sentinel entry {entry}"),
        },
        Value::String(raw) => match raw.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid sentinel port in '{raw}'"))?;
                Ok((host.trim_matches(['[', ']']).to_string(), port))
            }
            None => Ok((raw.clone(), DEFAULT_SENTINEL_PORT)),
        },
        _ => anyhow::bail!("invalid sentinel entry {entry}"),
    }
}

/// Hides the password of a Redis URL for display and logs.
pub fn redacted(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return summarize_redis_url(raw);
    };
    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    let has_pass = url.query_pairs().any(|(key, _)| key == "pass");
    if has_pass {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| {
                let value = if key == "pass" {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

fn summarize_redis_url(dsn: &str) -> String {
    let (scheme, rest) = dsn.split_once("://").unwrap_or(("", dsn));
    let without_auth = rest.rsplit('@').next().unwrap_or(rest);
    let host = without_auth
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_auth);

    if scheme.is_empty() {
        host.to_string()
    } else if host.is_empty() {
        format!("{scheme}://")
    } else {
        format!("{scheme}://{host}")
    }
}

fn is_tls_handshake_error(err: &redis::RedisError) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    message.contains("tls handshake") || message.contains("handshake eof")
}

fn redis_connect_context(target: &ConnectionTarget, err: &redis::RedisError) -> String {
    let mut context = format!("failed to connect to Redis ({target})");
    if is_tls_handshake_error(err) {
        let secure = match target {
            ConnectionTarget::Direct { url, .. } => url.starts_with("rediss://"),
            ConnectionTarget::Sentinel { target, .. } => target.ssl,
        };
        if secure {
            context.push_str(
                "; TLS handshake failed - verify the endpoint supports TLS and the port/certs are correct",
            );
        } else {
            context.push_str("; TLS handshake failed - if Redis requires TLS, set SSL = true");
        }
    }
    context
}

pub async fn connect(target: &ConnectionTarget) -> Result<redis::aio::MultiplexedConnection> {
    let client = match target {
        ConnectionTarget::Direct { url, .. } => {
            redis::Client::open(url.as_str()).context("failed to create Redis client")?
        }
        ConnectionTarget::Sentinel {
            target: sentinel, ..
        } => {
            let nodes: Vec<String> = sentinel
                .sentinels
                .iter()
                .map(|(host, port)| format!("redis://{}:{port}", bracket_host(host)))
                .collect();
            let mut resolver = Sentinel::build(nodes).context("invalid SENTINELS")?;
            let node_info = SentinelNodeConnectionInfo {
                tls_mode: sentinel.ssl.then_some(redis::TlsMode::Secure),
                redis_connection_info: Some(redis::RedisConnectionInfo {
                    db: sentinel.db,
                    password: sentinel.password.clone(),
                    ..Default::default()
                }),
            };
            let master = resolver.async_master_for(&sentinel.master_name, Some(&node_info));
            within_socket_timeout(target, master)
                .await?
                .map_err(|err| {
                    let context = redis_connect_context(target, &err);
                    anyhow::Error::new(err).context(context)
                })?
        }
    };

    let pending = client.get_multiplexed_async_connection();
    within_socket_timeout(target, pending)
        .await?
        .map_err(|err| {
            let context = redis_connect_context(target, &err);
            anyhow::Error::new(err).context(context)
        })
}

/// Bounds a connection step by the target's `SOCKET_TIMEOUT`, if any.
async fn within_socket_timeout<F: std::future::Future>(
    target: &ConnectionTarget,
    step: F,
) -> Result<F::Output> {
    match target.socket_timeout() {
        Some(limit) => tokio::time::timeout(limit, step)
            .await
            .map_err(|_| anyhow::anyhow!("timed out connecting to Redis ({target})")),
        None => Ok(step.await),
    }
}
