use std::collections::BTreeMap;

use serde::Serialize;

use crate::connection::{CanonicalConnectionParams, normalize};
use crate::error::{ConfigError, ConfigResult};
use crate::queue::RawQueueConfig;

/// Deduplicated connections plus each queue's index into them.
///
/// Connections are ordered by the smallest queue name that uses them, so
/// the result depends only on the name → config associations and never on
/// the order they were supplied in. Indices are dense from 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionRegistry {
    connections: Vec<CanonicalConnectionParams>,
    index_by_name: BTreeMap<String, usize>,
}

impl ConnectionRegistry {
    pub fn build(configs: &BTreeMap<String, RawQueueConfig>) -> Self {
        let mut connections: Vec<CanonicalConnectionParams> = Vec::new();
        let mut index_by_name = BTreeMap::new();
        // BTreeMap iteration is the sorted-name walk.
        for (name, raw) in configs {
            let canon = normalize(raw);
            let index = match connections.iter().position(|existing| *existing == canon) {
                Some(index) => index,
                None => {
                    connections.push(canon);
                    connections.len() - 1
                }
            };
            index_by_name.insert(name.clone(), index);
        }
        Self {
            connections,
            index_by_name,
        }
    }

    /// Builds from any `(name, config)` source; later duplicates of a name win.
    pub fn build_from_iter<'a, I>(configs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a RawQueueConfig)>,
    {
        let sorted: BTreeMap<String, RawQueueConfig> = configs
            .into_iter()
            .map(|(name, raw)| (name.to_string(), raw.clone()))
            .collect();
        Self::build(&sorted)
    }

    pub fn connections(&self) -> &[CanonicalConnectionParams] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn index_by_name(&self) -> &BTreeMap<String, usize> {
        &self.index_by_name
    }

    pub fn index_of(&self, queue: &str) -> ConfigResult<usize> {
        self.index_by_name
            .get(queue)
            .copied()
            .ok_or_else(|| ConfigError::UnknownQueue(queue.to_string()))
    }

    pub fn connection_for_index(&self, index: usize) -> ConfigResult<&CanonicalConnectionParams> {
        self.connections
            .get(index)
            .ok_or(ConfigError::IndexOutOfRange {
                index,
                len: self.connections.len(),
            })
    }

    pub fn connection_for_queue(&self, queue: &str) -> ConfigResult<&CanonicalConnectionParams> {
        self.connection_for_index(self.index_of(queue)?)
    }

    /// Sorted names of the queues assigned to connection `index`.
    pub fn queues_for_index(&self, index: usize) -> ConfigResult<Vec<&str>> {
        self.connection_for_index(index)?;
        Ok(self
            .index_by_name
            .iter()
            .filter(|(_, assigned)| **assigned == index)
            .map(|(name, _)| name.as_str())
            .collect())
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.index_by_name.keys().map(String::as_str)
    }

    pub fn queue_count(&self) -> usize {
        self.index_by_name.len()
    }

    /// Queue at position `index` of the sorted queue list.
    pub fn queue_for_index(&self, index: usize) -> ConfigResult<&str> {
        self.queue_names()
            .nth(index)
            .ok_or(ConfigError::IndexOutOfRange {
                index,
                len: self.index_by_name.len(),
            })
    }
}

/// Returns the connection shared by every queue in `names`.
///
/// Fails with `InconsistentConnection` naming all requested queues when
/// they resolve to more than one connection.
pub fn assert_single_connection(
    configs: &BTreeMap<String, RawQueueConfig>,
    names: &[impl AsRef<str>],
) -> ConfigResult<CanonicalConnectionParams> {
    let mut shared: Option<CanonicalConnectionParams> = None;
    let mut consistent = true;
    for name in names {
        let name = name.as_ref();
        let raw = configs
            .get(name)
            .ok_or_else(|| ConfigError::UnknownQueue(name.to_string()))?;
        let canon = normalize(raw);
        match &shared {
            None => shared = Some(canon),
            Some(existing) if *existing != canon => consistent = false,
            Some(_) => {}
        }
    }
    if !consistent {
        return Err(ConfigError::InconsistentConnection {
            queues: names.iter().map(|name| name.as_ref().to_string()).collect(),
        });
    }
    shared.ok_or(ConfigError::NoQueuesRequested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionKey;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn raw(value: Value) -> RawQueueConfig {
        serde_json::from_value(value).unwrap()
    }

    fn p1() -> RawQueueConfig {
        raw(json!({"HOST": "localhost", "PORT": 6379, "DB": 0}))
    }

    fn p2() -> RawQueueConfig {
        raw(json!({"HOST": "localhost", "PORT": 6379, "DB": 1}))
    }

    fn p3() -> RawQueueConfig {
        raw(json!({"URL": "redis://redis.internal:6379/4"}))
    }

    fn configs(entries: &[(&str, RawQueueConfig)]) -> BTreeMap<String, RawQueueConfig> {
        entries
            .iter()
            .map(|(name, raw)| (name.to_string(), raw.clone()))
            .collect()
    }

    #[test]
    fn default_and_test_scenario() {
        let registry = ConnectionRegistry::build(&configs(&[("default", p1()), ("test", p2())]));
        assert_eq!(registry.connections(), &[normalize(&p1()), normalize(&p2())]);
        assert_eq!(registry.index_of("default").unwrap(), 0);
        assert_eq!(registry.index_of("test").unwrap(), 1);
        let rendered = serde_json::to_value(registry.connections()).unwrap();
        assert_eq!(
            rendered,
            json!([
                {"HOST": "localhost", "PORT": 6379, "DB": 0},
                {"HOST": "localhost", "PORT": 6379, "DB": 1},
            ])
        );
    }

    #[test]
    fn duplicates_share_one_entry() {
        let registry =
            ConnectionRegistry::build(&configs(&[("a", p1()), ("b", p2()), ("c", p1())]));
        assert_eq!(registry.len(), 2);
        let a = registry.index_of("a").unwrap();
        let b = registry.index_of("b").unwrap();
        let c = registry.index_of("c").unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn connections_follow_smallest_queue_name() {
        let registry = ConnectionRegistry::build(&configs(&[
            ("zebra", p3()),
            ("alpha", p1()),
            ("charlie", p2()),
            ("delta", p1()),
        ]));
        assert_eq!(
            registry.connections(),
            &[normalize(&p1()), normalize(&p2()), normalize(&p3())]
        );
        assert_eq!(registry.index_of("delta").unwrap(), 0);
        assert_eq!(registry.index_of("zebra").unwrap(), 2);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let entries = [
            ("zebra", p3()),
            ("alpha", p1()),
            ("charlie", p2()),
            ("delta", p1()),
            ("echo", RawQueueConfig::new()),
        ];
        let forward: HashMap<&str, &RawQueueConfig> =
            entries.iter().map(|(name, raw)| (*name, raw)).collect();
        let reversed: Vec<(&str, &RawQueueConfig)> =
            entries.iter().rev().map(|(name, raw)| (*name, raw)).collect();

        let first = ConnectionRegistry::build_from_iter(forward.iter().map(|(k, v)| (*k, *v)));
        let second = ConnectionRegistry::build_from_iter(reversed);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn every_queue_round_trips_to_its_params() {
        let input = configs(&[
            ("default", p1()),
            ("high", p1().with("DEFAULT_TIMEOUT", 500)),
            ("low", p2()),
            ("remote", p3()),
            ("local", raw(json!({"UNIX_SOCKET_PATH": "/var/run/redis.sock", "DB": 0}))),
        ]);
        let registry = ConnectionRegistry::build(&input);
        assert_eq!(registry.queue_count(), input.len());
        for (name, config) in &input {
            let index = registry.index_of(name).unwrap();
            assert_eq!(registry.connections()[index], normalize(config));
        }
        let mut used: Vec<usize> = registry.index_by_name().values().copied().collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, (0..registry.len()).collect::<Vec<_>>());
    }

    #[test]
    fn unconfigured_queues_share_the_empty_connection() {
        let registry = ConnectionRegistry::build(&configs(&[
            ("one", raw(json!({"DEFAULT_TIMEOUT": 10}))),
            ("two", RawQueueConfig::new()),
        ]));
        assert_eq!(registry.len(), 1);
        assert!(registry.connections()[0].is_empty());
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let input = configs(&[("default", p1()), ("test", p2())]);
        let registry = ConnectionRegistry::build(&input);
        let err = registry.connection_for_index(input.len() + 5).unwrap_err();
        assert_eq!(err, ConfigError::IndexOutOfRange { index: 7, len: 2 });
        assert!(err.is_not_found());
        assert!(registry.queues_for_index(2).is_err());
        assert!(registry.queue_for_index(2).unwrap_err().is_not_found());
    }

    #[test]
    fn lookups_by_index() {
        let registry = ConnectionRegistry::build(&configs(&[
            ("b", p2()),
            ("a", p1()),
            ("c", p1()),
        ]));
        assert_eq!(registry.queues_for_index(0).unwrap(), vec!["a", "c"]);
        assert_eq!(registry.queues_for_index(1).unwrap(), vec!["b"]);
        assert_eq!(registry.queue_for_index(0).unwrap(), "a");
        assert_eq!(registry.queue_for_index(2).unwrap(), "c");
        assert_eq!(
            registry
                .connection_for_queue("b")
                .unwrap()
                .get(ConnectionKey::Db),
            Some(&json!(1))
        );
        assert!(registry.index_of("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn single_connection_is_returned() {
        let input = configs(&[("x", p1()), ("y", p1().with("DEFAULT_TIMEOUT", 30))]);
        let shared = assert_single_connection(&input, &["x", "y"]).unwrap();
        assert_eq!(shared, normalize(&p1()));
    }

    #[test]
    fn conflicting_connections_name_the_queues() {
        let input = configs(&[("x", p1()), ("y", p2())]);
        let err = assert_single_connection(&input, &["x", "y"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InconsistentConnection {
                queues: vec!["x".to_string(), "y".to_string()],
            }
        );
    }

    #[test]
    fn single_connection_rejects_unknown_and_empty_requests() {
        let input = configs(&[("x", p1())]);
        assert_eq!(
            assert_single_connection(&input, &["x", "nope"]).unwrap_err(),
            ConfigError::UnknownQueue("nope".to_string())
        );
        let none: [&str; 0] = [];
        assert_eq!(
            assert_single_connection(&input, &none).unwrap_err(),
            ConfigError::NoQueuesRequested
        );
    }
}
