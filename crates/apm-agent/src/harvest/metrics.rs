// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::collector::{Command, RunId};
use crate::harvest::payload::{unix_seconds, Payload};

/// Default cap on distinct metrics held between harvests.
pub const DEFAULT_MAX_METRICS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricKey {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

/// Aggregated values of one metric: `[count, total, exclusive, min, max,
/// sum_of_squares]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricData {
    pub count: f64,
    pub total: f64,
    pub exclusive: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

impl MetricData {
    fn duration(total: f64, exclusive: f64) -> Self {
        Self {
            count: 1.0,
            total,
            exclusive,
            min: total,
            max: total,
            sum_squares: total * total,
        }
    }

    fn count(count: f64) -> Self {
        Self {
            count,
            total: 0.0,
            exclusive: 0.0,
            min: 0.0,
            max: 0.0,
            sum_squares: 0.0,
        }
    }

    fn aggregate(&mut self, other: &MetricData) {
        if self.count == 0.0 {
            self.min = other.min;
            self.max = other.max;
        } else if other.count > 0.0 {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.total += other.total;
        self.exclusive += other.exclusive;
        self.sum_squares += other.sum_squares;
    }

    fn to_array(self) -> [f64; 6] {
        [
            self.count,
            self.total,
            self.exclusive,
            self.min,
            self.max,
            self.sum_squares,
        ]
    }
}

/// Time-bucketed metric aggregates, delivered with `metric_data`.
///
/// Serialized as `[run_id, period_start, period_end, [[key, values], ...]]`.
#[derive(Debug, Clone)]
pub struct MetricTable {
    metrics: HashMap<MetricKey, MetricData>,
    period_start: SystemTime,
    max_metrics: usize,
    dropped: u64,
}

impl MetricTable {
    #[must_use]
    pub fn new(max_metrics: usize) -> Self {
        Self {
            metrics: HashMap::new(),
            period_start: SystemTime::now(),
            max_metrics,
            dropped: 0,
        }
    }

    /// Records one timed call of `name` in `scope` (empty for unscoped).
    pub fn add_duration(&mut self, name: &str, scope: &str, total_secs: f64, exclusive_secs: f64) {
        self.add(key(name, scope), MetricData::duration(total_secs, exclusive_secs));
    }

    /// Increments a count-only metric.
    pub fn add_count(&mut self, name: &str, scope: &str, count: f64) {
        self.add(key(name, scope), MetricData::count(count));
    }

    #[must_use]
    pub fn get(&self, name: &str, scope: &str) -> Option<&MetricData> {
        self.metrics.get(&key(name, scope))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Metrics refused because the table was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn add(&mut self, key: MetricKey, data: MetricData) {
        if let Some(existing) = self.metrics.get_mut(&key) {
            existing.aggregate(&data);
        } else if self.metrics.len() < self.max_metrics {
            self.metrics.insert(key, data);
        } else {
            self.dropped += 1;
        }
    }
}

impl Default for MetricTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_METRICS)
    }
}

fn key(name: &str, scope: &str) -> MetricKey {
    MetricKey {
        name: name.to_string(),
        scope: scope.to_string(),
    }
}

impl Payload for MetricTable {
    fn command(&self) -> Command {
        Command::MetricData
    }

    fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn to_json(
        &self,
        run_id: &RunId,
        harvest_end: SystemTime,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let metrics: Vec<_> = self
            .metrics
            .iter()
            .map(|(key, data)| json!([key, data.to_array()]))
            .collect();
        serde_json::to_vec(&json!([
            run_id,
            unix_seconds(self.period_start),
            unix_seconds(harvest_end),
            metrics
        ]))
    }

    fn merge(&mut self, newer: Self) {
        for (key, data) in newer.metrics {
            self.add(key, data);
        }
        self.dropped += newer.dropped;
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "metric table full, metrics dropped");
        }
    }

    fn take(&mut self) -> Self {
        let fresh = Self::new(self.max_metrics);
        std::mem::replace(self, fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn durations_aggregate_per_key() {
        let mut table = MetricTable::default();
        table.add_duration("Datastore/statement/MySQL/users/select", "", 0.5, 0.5);
        table.add_duration("Datastore/statement/MySQL/users/select", "", 1.5, 1.0);
        table.add_duration("Datastore/statement/MySQL/users/select", "WebTransaction/x", 2.0, 2.0);

        assert_eq!(table.len(), 2);
        let data = table
            .get("Datastore/statement/MySQL/users/select", "")
            .unwrap();
        assert_eq!(data.count, 2.0);
        assert_eq!(data.total, 2.0);
        assert_eq!(data.exclusive, 1.5);
        assert_eq!(data.min, 0.5);
        assert_eq!(data.max, 1.5);
        assert_eq!(data.sum_squares, 2.5);
    }

    #[test]
    fn full_table_drops_new_keys_but_aggregates_existing() {
        let mut table = MetricTable::new(1);
        table.add_count("a", "", 1.0);
        table.add_count("b", "", 1.0);
        table.add_count("a", "", 2.0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a", "").unwrap().count, 3.0);
        assert_eq!(table.dropped(), 1);
    }

    #[test]
    fn merge_combines_retained_and_new_data() {
        let mut retained = MetricTable::default();
        retained.add_duration("m", "", 1.0, 1.0);
        let mut newer = MetricTable::default();
        newer.add_duration("m", "", 3.0, 2.0);
        newer.add_count("n", "", 4.0);

        retained.merge(newer);
        assert_eq!(retained.len(), 2);
        let m = retained.get("m", "").unwrap();
        assert_eq!(m.count, 2.0);
        assert_eq!(m.min, 1.0);
        assert_eq!(m.max, 3.0);
        assert_eq!(retained.get("n", "").unwrap().count, 4.0);
    }

    #[test]
    fn take_leaves_an_empty_table_with_same_capacity() {
        let mut table = MetricTable::new(5);
        table.add_count("a", "", 1.0);
        let taken = table.take();
        assert!(table.is_empty());
        assert_eq!(table.max_metrics, 5);
        assert_eq!(taken.len(), 1);
    }

    #[test]
    fn json_layout() {
        let mut table = MetricTable::default();
        table.period_start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        table.add_count("Supportability/Events", "", 2.0);
        let run_id = RunId::new("run-9").unwrap();

        let bytes = table
            .to_json(&run_id, SystemTime::UNIX_EPOCH + Duration::from_secs(160))
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!([
                "run-9",
                100,
                160,
                [[{"name": "Supportability/Events"}, [2.0, 0.0, 0.0, 0.0, 0.0, 0.0]]]
            ])
        );
    }
}
