//! In-process metrics registry: the default `MetricsSink` wired into the
//! transport layer, plus a text-exposition renderer for `/metrics`.
//!
//! Grounded in the pack's metrics-snapshot shape (`ThirdKeyAI-Symbiont`'s
//! `metrics` module), simplified to counters/gauges/histogram-sums kept in a
//! concurrent map rather than a full exporter pipeline.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::collaborators::MetricsSink;

fn label_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted: Vec<&(&str, &str)> = labels.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    let rendered = sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}{{{rendered}}}")
}

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_ms_times_1000: AtomicU64,
}

/// A process-local registry of counters, gauges, and duration histograms,
/// rendered as a Prometheus-style text exposition.
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicU64>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
        }
    }

    /// Render every tracked series as `text/plain` Prometheus exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.counters.iter() {
            out.push_str(&format!("{} {}\n", entry.key(), entry.value().load(Ordering::Relaxed)));
        }
        for entry in self.gauges.iter() {
            let bits = entry.value().load(Ordering::Relaxed);
            out.push_str(&format!("{} {}\n", entry.key(), f64::from_bits(bits)));
        }
        for entry in self.histograms.iter() {
            let count = entry.value().count.load(Ordering::Relaxed);
            let sum_ms = entry.value().sum_ms_times_1000.load(Ordering::Relaxed) as f64 / 1000.0;
            out.push_str(&format!("{}_count {}\n", entry.key(), count));
            out.push_str(&format!("{}_sum_ms {}\n", entry.key(), sum_ms));
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsRegistry {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let key = label_key(name, labels);
        self.counters.entry(key).or_default().fetch_add(1, Ordering::Relaxed);
    }

    fn observe_duration_ms(&self, name: &str, labels: &[(&str, &str)], duration_ms: f64) {
        let key = label_key(name, labels);
        let entry = self.histograms.entry(key).or_default();
        entry.count.fetch_add(1, Ordering::Relaxed);
        entry
            .sum_ms_times_1000
            .fetch_add((duration_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = label_key(name, labels);
        self.gauges.entry(key).or_default().store(value.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls() {
        let registry = MetricsRegistry::new();
        registry.incr_counter("requests_total", &[("tool", "execute_task_spec")]);
        registry.incr_counter("requests_total", &[("tool", "execute_task_spec")]);
        let rendered = registry.render();
        assert!(rendered.contains("requests_total{tool=\"execute_task_spec\"} 2"));
    }

    #[test]
    fn gauge_reflects_latest_value() {
        let registry = MetricsRegistry::new();
        registry.set_gauge("in_flight_requests", &[], 3.0);
        registry.set_gauge("in_flight_requests", &[], 1.0);
        assert!(registry.render().contains("in_flight_requests 1"));
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let registry = MetricsRegistry::new();
        registry.observe_duration_ms("review_duration_ms", &[], 10.0);
        registry.observe_duration_ms("review_duration_ms", &[], 20.0);
        let rendered = registry.render();
        assert!(rendered.contains("review_duration_ms_count 2"));
        assert!(rendered.contains("review_duration_ms_sum_ms 30"));
    }
}
