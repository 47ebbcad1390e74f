//! Hub metrics for monitoring pool and dispatch activity.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// `(server, tool)` pair used to key latency stats.
pub type ToolKey = (String, String);

/// Counters for connection lifecycle and tool calls.
pub struct McpMetrics {
    // Connection metrics
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
    active_connections: AtomicU64,

    // Call metrics
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,

    tool_latencies: DashMap<ToolKey, LatencyStats>,
}

impl McpMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            tool_latencies: DashMap::new(),
        }
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        // Saturate: a close racing a failed open must not wrap the gauge.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record a finished tool call.
    pub fn record_call(&self, server: &str, tool: &str, success: bool, duration_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }

        self.tool_latencies
            .entry((server.to_string(), tool.to_string()))
            .or_default()
            .record(duration_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
        }
    }

    pub fn tool_latency(&self, server: &str, tool: &str) -> Option<LatencySnapshot> {
        self.tool_latencies
            .get(&(server.to_string(), tool.to_string()))
            .map(|stats| stats.snapshot())
    }
}

impl Default for McpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tool latency statistics.
pub struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }
}

impl LatencyStats {
    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);

        LatencySnapshot {
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub reconnect_attempts: u64,
    pub active_connections: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
}

impl MetricsSnapshot {
    /// Calculate success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            100.0
        } else {
            (self.successful_calls as f64 / completed as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_metrics() {
        let metrics = McpMetrics::new();

        metrics.record_connect_attempt();
        metrics.record_connect_attempt();
        metrics.record_connect_failure();
        metrics.record_connection_opened();
        metrics.record_reconnect_attempt();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connect_attempts, 2);
        assert_eq!(snapshot.connect_failures, 1);
        assert_eq!(snapshot.reconnect_attempts, 1);
        assert_eq!(snapshot.active_connections, 1);

        metrics.record_connection_closed();
        metrics.record_connection_closed();
        assert_eq!(metrics.snapshot().active_connections, 0);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = McpMetrics::new();

        metrics.record_call("server", "tool", true, 100);
        metrics.record_call("server", "tool", true, 200);
        metrics.record_call("server", "tool", false, 150);

        let latency = metrics.tool_latency("server", "tool").unwrap();
        assert_eq!(latency.count, 3);
        assert_eq!(latency.avg_ms, 150);
        assert_eq!(latency.min_ms, 100);
        assert_eq!(latency.max_ms, 200);

        assert!(metrics.tool_latency("server", "other").is_none());
    }

    #[test]
    fn test_success_rate() {
        let metrics = McpMetrics::new();
        assert_eq!(metrics.snapshot().success_rate(), 100.0);

        for _ in 0..3 {
            metrics.record_call("s", "t", true, 10);
        }
        metrics.record_call("s", "t", false, 10);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 4);
        assert!((snapshot.success_rate() - 75.0).abs() < 0.1);
    }
}
