//! Projection of a queue's raw settings onto the keys that decide which
//! Redis endpoint it reaches.
//!
//! Two queues share a connection exactly when their canonical params are
//! equal. Equality is on the declared form: a `URL` and a `HOST`/`PORT`
//! pair naming the same server are different connections.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::queue::RawQueueConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionKey {
    Url,
    Db,
    UseRedisCache,
    UnixSocketPath,
    Host,
    Port,
    Password,
    Sentinels,
    MasterName,
    SocketTimeout,
    ConnectionKwargs,
    Ssl,
}

impl ConnectionKey {
    pub const ALL: [ConnectionKey; 12] = [
        ConnectionKey::Url,
        ConnectionKey::Db,
        ConnectionKey::UseRedisCache,
        ConnectionKey::UnixSocketPath,
        ConnectionKey::Host,
        ConnectionKey::Port,
        ConnectionKey::Password,
        ConnectionKey::Sentinels,
        ConnectionKey::MasterName,
        ConnectionKey::SocketTimeout,
        ConnectionKey::ConnectionKwargs,
        ConnectionKey::Ssl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKey::Url => "URL",
            ConnectionKey::Db => "DB",
            ConnectionKey::UseRedisCache => "USE_REDIS_CACHE",
            ConnectionKey::UnixSocketPath => "UNIX_SOCKET_PATH",
            ConnectionKey::Host => "HOST",
            ConnectionKey::Port => "PORT",
            ConnectionKey::Password => "PASSWORD",
            ConnectionKey::Sentinels => "SENTINELS",
            ConnectionKey::MasterName => "MASTER_NAME",
            ConnectionKey::SocketTimeout => "SOCKET_TIMEOUT",
            ConnectionKey::ConnectionKwargs => "CONNECTION_KWARGS",
            ConnectionKey::Ssl => "SSL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }

    /// The strategy this key belongs to, or `None` for shared modifiers
    /// (`DB`, `PASSWORD`, `SOCKET_TIMEOUT`, `CONNECTION_KWARGS`, `SSL`).
    pub fn group(self) -> Option<ConnectionGroup> {
        match self {
            ConnectionKey::Url => Some(ConnectionGroup::Url),
            ConnectionKey::UnixSocketPath => Some(ConnectionGroup::UnixSocket),
            ConnectionKey::Sentinels | ConnectionKey::MasterName => Some(ConnectionGroup::Sentinel),
            ConnectionKey::UseRedisCache => Some(ConnectionGroup::Cache),
            ConnectionKey::Host | ConnectionKey::Port => Some(ConnectionGroup::Tcp),
            ConnectionKey::Db
            | ConnectionKey::Password
            | ConnectionKey::SocketTimeout
            | ConnectionKey::ConnectionKwargs
            | ConnectionKey::Ssl => None,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive ways of describing a connection, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionGroup {
    Url,
    UnixSocket,
    Sentinel,
    Cache,
    Tcp,
}

impl ConnectionGroup {
    pub const PRECEDENCE: [ConnectionGroup; 5] = [
        ConnectionGroup::Url,
        ConnectionGroup::UnixSocket,
        ConnectionGroup::Sentinel,
        ConnectionGroup::Cache,
        ConnectionGroup::Tcp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConnectionGroup::Url => "url",
            ConnectionGroup::UnixSocket => "unix socket",
            ConnectionGroup::Sentinel => "sentinel",
            ConnectionGroup::Cache => "cache",
            ConnectionGroup::Tcp => "host/port",
        }
    }
}

impl fmt::Display for ConnectionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection-identity subset of a queue's settings.
///
/// Backed by an ordered map so that equal records serialize identically.
/// Nested objects (`CONNECTION_KWARGS`) compare by content; arrays
/// (`SENTINELS`) compare element by element, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalConnectionParams(BTreeMap<ConnectionKey, Value>);

impl CanonicalConnectionParams {
    pub fn get(&self, key: ConnectionKey) -> Option<&Value> {
        self.0.get(&key)
    }

    pub fn get_str(&self, key: ConnectionKey) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: ConnectionKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionKey, &Value)> {
        self.0.iter().map(|(key, value)| (*key, value))
    }

    /// The strategy this record describes; `None` for the empty record.
    pub fn group(&self) -> Option<ConnectionGroup> {
        ConnectionGroup::PRECEDENCE
            .into_iter()
            .find(|group| self.0.keys().any(|key| key.group() == Some(*group)))
    }
}

impl FromIterator<(ConnectionKey, Value)> for CanonicalConnectionParams {
    fn from_iter<I: IntoIterator<Item = (ConnectionKey, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl RawQueueConfig {
    /// Connection strategies declared by this config, in precedence order.
    pub fn connection_groups(&self) -> Vec<ConnectionGroup> {
        let mut groups: Vec<ConnectionGroup> = self
            .keys()
            .filter_map(|key| ConnectionKey::parse(key).and_then(ConnectionKey::group))
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

/// Projects `raw` onto the connection-identity keys.
///
/// Non-connection keys are dropped and values are copied unchanged. When
/// several strategies are declared only the highest-precedence one keeps
/// its exclusive keys, so the result always describes a single strategy.
pub fn normalize(raw: &RawQueueConfig) -> CanonicalConnectionParams {
    let winner = raw.connection_groups().first().copied();
    raw.iter()
        .filter_map(|(key, value)| {
            let key = ConnectionKey::parse(key)?;
            match key.group() {
                Some(group) if Some(group) != winner => None,
                _ => Some((key, value.clone())),
            }
        })
        .collect()
}

pub fn validate_connection_groups(queue: &str, raw: &RawQueueConfig) -> ConfigResult<()> {
    let groups = raw.connection_groups();
    if groups.len() > 1 {
        return Err(ConfigError::AmbiguousConnectionKeys {
            queue: queue.to_string(),
            groups: groups.iter().map(|group| group.name().to_string()).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawQueueConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalize_ignores_non_connection_keys() {
        let a = normalize(&raw(
            json!({"HOST": "h", "PORT": 1, "DB": 0, "DEFAULT_TIMEOUT": 500}),
        ));
        let b = normalize(&raw(
            json!({"HOST": "h", "PORT": 1, "DB": 0, "DEFAULT_TIMEOUT": 999}),
        ));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(!a.contains(ConnectionKey::SocketTimeout));
    }

    #[test]
    fn normalize_strips_queue_options() {
        let params = normalize(&raw(json!({
            "URL": "redis://localhost:6379/0",
            "QUEUE_CLASS": "myapp.queues.Priority",
            "SERIALIZER": "rq.serializers.JSONSerializer",
            "ASYNC": false,
        })));
        assert_eq!(params.len(), 1);
        assert_eq!(
            params.get_str(ConnectionKey::Url),
            Some("redis://localhost:6379/0")
        );
    }

    #[test]
    fn empty_config_yields_empty_record() {
        let params = normalize(&raw(json!({"DEFAULT_TIMEOUT": 360})));
        assert!(params.is_empty());
        assert_eq!(params.group(), None);
        assert_eq!(params, normalize(&RawQueueConfig::default()));
    }

    #[test]
    fn url_and_host_port_stay_distinct() {
        let by_url = normalize(&raw(json!({"URL": "redis://localhost:6379/0"})));
        let by_host = normalize(&raw(json!({"HOST": "localhost", "PORT": 6379, "DB": 0})));
        assert_ne!(by_url, by_host);
    }

    #[test]
    fn sentinel_order_matters_but_kwargs_order_does_not() {
        let forward = normalize(&raw(json!({
            "SENTINELS": [["s1", 26379], ["s2", 26379]],
            "MASTER_NAME": "mymaster",
            "CONNECTION_KWARGS": {"ssl": true, "health_check_interval": 30},
        })));
        let kwargs_swapped = normalize(&raw(json!({
            "CONNECTION_KWARGS": {"health_check_interval": 30, "ssl": true},
            "MASTER_NAME": "mymaster",
            "SENTINELS": [["s1", 26379], ["s2", 26379]],
        })));
        let sentinels_swapped = normalize(&raw(json!({
            "SENTINELS": [["s2", 26379], ["s1", 26379]],
            "MASTER_NAME": "mymaster",
            "CONNECTION_KWARGS": {"ssl": true, "health_check_interval": 30},
        })));
        assert_eq!(forward, kwargs_swapped);
        assert_ne!(forward, sentinels_swapped);
    }

    #[test]
    fn ambiguous_config_keeps_highest_precedence_group() {
        let config = raw(json!({
            "URL": "redis://cache:6379",
            "HOST": "localhost",
            "PORT": 6379,
            "SENTINELS": [["s1", 26379]],
            "MASTER_NAME": "mymaster",
            "DB": 2,
        }));
        assert_eq!(
            config.connection_groups(),
            vec![
                ConnectionGroup::Url,
                ConnectionGroup::Sentinel,
                ConnectionGroup::Tcp
            ]
        );
        let params = normalize(&config);
        let keys: Vec<_> = params.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![ConnectionKey::Url, ConnectionKey::Db]);
        assert_eq!(params.group(), Some(ConnectionGroup::Url));
    }

    #[test]
    fn validate_rejects_multiple_groups() {
        let config = raw(json!({"UNIX_SOCKET_PATH": "/tmp/redis.sock", "USE_REDIS_CACHE": "default"}));
        let err = validate_connection_groups("mixed", &config).unwrap_err();
        assert_eq!(
            err,
            ConfigError::AmbiguousConnectionKeys {
                queue: "mixed".to_string(),
                groups: vec!["unix socket".to_string(), "cache".to_string()],
            }
        );
        let single = raw(json!({"HOST": "localhost", "PORT": 6379, "DB": 0, "PASSWORD": "s3cret"}));
        assert!(validate_connection_groups("ok", &single).is_ok());
    }

    #[test]
    fn canonical_params_serialize_in_key_order() {
        let params = normalize(&raw(json!({"PORT": 6379, "HOST": "localhost", "DB": 1})));
        let rendered = serde_json::to_string(&params).unwrap();
        assert_eq!(rendered, r#"{"DB":1,"HOST":"localhost","PORT":6379}"#);
    }

    #[test]
    fn connection_key_round_trips_names() {
        for key in ConnectionKey::ALL {
            assert_eq!(ConnectionKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ConnectionKey::parse("DEFAULT_TIMEOUT"), None);
        assert_eq!(ConnectionKey::parse("host"), None);
    }
}
