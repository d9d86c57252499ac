//! Run-level configuration and component parameters.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::id::{ComponentId, PartitionId};
use crate::time::SimTime;

// ── SimConfig ─────────────────────────────────────────────────────────

/// How a simulation is laid out and run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of ranks.
    pub ranks: u32,
    /// Threads per rank. Every `(rank, thread)` pair is one partition.
    pub threads_per_rank: u32,
    /// How long a partition waits for its peers in a collective
    /// before declaring a [`SyncFailure`](crate::error::SyncFailure).
    /// `None` waits as long as the peers are alive; a peer that aborts or
    /// drops its channel still ends the wait.
    pub exchange_timeout: Option<Duration>,
    /// Stop once the epoch horizon passes this time. Events later than
    /// this are never dispatched.
    pub end_time: Option<SimTime>,
    /// Record every dispatch in the partition trace.
    pub record_trace: bool,
}

impl SimConfig {
    /// One rank, one thread: a sequential simulation.
    pub fn sequential() -> Self {
        SimConfig {
            ranks: 1,
            threads_per_rank: 1,
            exchange_timeout: None,
            end_time: None,
            record_trace: false,
        }
    }

    /// `threads` partitions on a single rank.
    pub fn threads(threads: u32) -> Self {
        SimConfig {
            threads_per_rank: threads,
            ..Self::sequential()
        }
    }

    /// `ranks × threads_per_rank` partitions.
    pub fn grid(ranks: u32, threads_per_rank: u32) -> Self {
        SimConfig {
            ranks,
            threads_per_rank,
            ..Self::sequential()
        }
    }

    pub fn with_end_time(mut self, end: SimTime) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = Some(timeout);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }

    /// All partitions, in `(rank, thread)` order.
    pub fn partitions(&self) -> Vec<PartitionId> {
        (0..self.ranks)
            .flat_map(|rank| (0..self.threads_per_rank).map(move |t| PartitionId::new(rank, t)))
            .collect()
    }

    pub fn contains(&self, partition: PartitionId) -> bool {
        partition.rank < self.ranks && partition.thread < self.threads_per_rank
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranks == 0 || self.threads_per_rank == 0 {
            return Err(ConfigError::NoPartitions);
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::sequential()
    }
}

// ── Params ────────────────────────────────────────────────────────────

/// String-keyed parameters handed to a component factory.
///
/// Values are stored as strings, the way a model front-end produces
/// them, and parsed on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse a parameter. `Ok(None)` when it is absent.
    pub fn get<T: FromStr>(&self, component: ComponentId, key: &str) -> Result<Option<T>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidParam {
                component,
                key: key.to_string(),
                value: raw.clone(),
            }),
        }
    }

    /// Parse a parameter, falling back to `default` when absent.
    pub fn get_or<T: FromStr>(&self, component: ComponentId, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(component, key)?.unwrap_or(default))
    }

    /// Parse a parameter that must be present.
    pub fn require<T: FromStr>(&self, component: ComponentId, key: &str) -> Result<T, ConfigError> {
        self.get(component, key)?.ok_or_else(|| ConfigError::MissingParam {
            component,
            key: key.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_grid() {
        let cfg = SimConfig::grid(2, 2);
        assert_eq!(
            cfg.partitions(),
            vec![
                PartitionId::new(0, 0),
                PartitionId::new(0, 1),
                PartitionId::new(1, 0),
                PartitionId::new(1, 1),
            ]
        );
        assert!(cfg.contains(PartitionId::new(1, 1)));
        assert!(!cfg.contains(PartitionId::new(2, 0)));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert_eq!(SimConfig::threads(0).validate(), Err(ConfigError::NoPartitions));
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_params_typed_access() {
        let id = ComponentId::new(3);
        let params = Params::new().with("period", 10).with("name", "clk");

        assert_eq!(params.get::<u64>(id, "period"), Ok(Some(10)));
        assert_eq!(params.get::<u64>(id, "absent"), Ok(None));
        assert_eq!(params.get_or::<u64>(id, "absent", 7), Ok(7));
        assert_eq!(params.get_str("name"), Some("clk"));
        assert_eq!(
            params.get::<u64>(id, "name"),
            Err(ConfigError::InvalidParam {
                component: id,
                key: "name".into(),
                value: "clk".into(),
            })
        );
        assert!(matches!(
            params.require::<u64>(id, "limit"),
            Err(ConfigError::MissingParam { .. })
        ));
    }

    #[test]
    fn test_params_from_iter() {
        let params: Params = vec![("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(params.len(), 2);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
