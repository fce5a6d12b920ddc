//! Thread-safe metrics collection
//!
//! Atomic counters and mutex-protected collections for tracking task
//! throughput, per-agent execution statistics and storage traffic. Served
//! as a JSON snapshot on the `/metrics` route.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Task lifecycle counters (atomic for high frequency)
    tasks_created: AtomicU64,
    tasks_processing: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_expired: AtomicU64,

    // Storage traffic
    objects_written: AtomicU64,
    objects_read: AtomicU64,
    upload_urls_issued: AtomicU64,
    download_urls_issued: AtomicU64,

    // Processing times (mutex protected for percentile math)
    processing_times: Mutex<Vec<u64>>, // in milliseconds

    // Per-agent execution statistics
    agent_stats: Mutex<HashMap<String, AgentExecutionStats>>,

    // Service lifecycle
    service_state: Mutex<String>,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_created: AtomicU64::new(0),
            tasks_processing: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_expired: AtomicU64::new(0),
            objects_written: AtomicU64::new(0),
            objects_read: AtomicU64::new(0),
            upload_urls_issued: AtomicU64::new(0),
            download_urls_issued: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            agent_stats: Mutex::new(HashMap::new()),
            service_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Task lifecycle
    pub fn task_created(&self) {
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_processing_started(&self) {
        self.tasks_processing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_processing_completed(&self, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.tasks_processing.fetch_sub(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn task_processing_failed(&self, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.tasks_processing.fetch_sub(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn task_expired(&self) {
        self.tasks_expired.fetch_add(1, Ordering::Relaxed);
    }

    // Storage traffic
    pub fn object_written(&self) {
        self.objects_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn object_read(&self) {
        self.objects_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_urls_issued(&self, count: u64) {
        self.upload_urls_issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn download_urls_issued(&self, count: u64) {
        self.download_urls_issued
            .fetch_add(count, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);
            // Limit to last 1000 measurements to prevent unbounded growth
            if times.len() > 1000 {
                times.remove(0);
            }
        }
    }

    // Agent execution metrics
    pub fn agent_executed(&self, agent: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.agent_stats.lock() {
            let entry = stats
                .entry(agent.to_string())
                .or_insert_with(|| AgentExecutionStats {
                    name: agent.to_string(),
                    executions: 0,
                    failures: 0,
                    execution_times: Vec::new(),
                });
            entry.executions += 1;
            entry.execution_times.push(duration.as_millis() as u64);
            if entry.execution_times.len() > 1000 {
                entry.execution_times.remove(0);
            }
            if !success {
                entry.failures += 1;
            }
        }
    }

    // Lifecycle
    pub fn set_service_state(&self, state: &str) {
        if let Ok(mut current) = self.service_state.lock() {
            *current = state.to_string();
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.tasks_created.store(0, Ordering::Relaxed);
        self.tasks_processing.store(0, Ordering::Relaxed);
        self.tasks_completed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.tasks_expired.store(0, Ordering::Relaxed);
        self.objects_written.store(0, Ordering::Relaxed);
        self.objects_read.store(0, Ordering::Relaxed);
        self.upload_urls_issued.store(0, Ordering::Relaxed);
        self.download_urls_issued.store(0, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.agent_stats.lock() {
            stats.clear();
        }
        if let Ok(mut state) = self.service_state.lock() {
            *state = "initializing".to_string();
        }
    }

    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        if let Ok(times) = self.processing_times.lock() {
            if times.is_empty() {
                (0.0, 0.0, 0.0, 0.0)
            } else {
                let mut sorted = times.clone();
                sorted.sort_unstable();
                let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
                (
                    avg,
                    percentile(&sorted, 50.0),
                    percentile(&sorted, 95.0),
                    percentile(&sorted, 99.0),
                )
            }
        } else {
            (0.0, 0.0, 0.0, 0.0)
        }
    }

    fn agent_statistics(&self) -> HashMap<String, AgentStatsSnapshot> {
        let mut snapshots = HashMap::new();
        if let Ok(stats) = self.agent_stats.lock() {
            for (name, entry) in stats.iter() {
                let avg = if entry.execution_times.is_empty() {
                    0.0
                } else {
                    entry.execution_times.iter().sum::<u64>() as f64
                        / entry.execution_times.len() as f64
                };
                let success_rate = if entry.executions == 0 {
                    0.0
                } else {
                    (entry.executions - entry.failures) as f64 / entry.executions as f64
                };
                snapshots.insert(
                    name.clone(),
                    AgentStatsSnapshot {
                        name: entry.name.clone(),
                        executions: entry.executions,
                        failures: entry.failures,
                        avg_execution_time_ms: avg,
                        success_rate,
                    },
                );
            }
        }
        snapshots
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.processing_time_statistics();

        MetricsSnapshot {
            tasks: TaskMetrics {
                tasks_created: self.tasks_created.load(Ordering::Relaxed),
                tasks_processing: self.tasks_processing.load(Ordering::Relaxed),
                tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
                tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
                tasks_expired: self.tasks_expired.load(Ordering::Relaxed),
                avg_processing_time_ms: avg,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            storage: StorageMetrics {
                objects_written: self.objects_written.load(Ordering::Relaxed),
                objects_read: self.objects_read.load(Ordering::Relaxed),
                upload_urls_issued: self.upload_urls_issued.load(Ordering::Relaxed),
                download_urls_issued: self.download_urls_issued.load(Ordering::Relaxed),
            },
            agents: self.agent_statistics(),
            service_state: self
                .service_state
                .lock()
                .map(|s| s.clone())
                .unwrap_or_else(|_| "unknown".to_string()),
            uptime_seconds: now - self.uptime_start.load(Ordering::Relaxed),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Internal agent statistics (with timing data)
#[derive(Debug)]
struct AgentExecutionStats {
    name: String,
    executions: u64,
    failures: u64,
    execution_times: Vec<u64>, // milliseconds
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: TaskMetrics,
    pub storage: StorageMetrics,
    pub agents: HashMap<String, AgentStatsSnapshot>,
    pub service_state: String,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskMetrics {
    pub tasks_created: u64,
    pub tasks_processing: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_expired: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct StorageMetrics {
    pub objects_written: u64,
    pub objects_read: u64,
    pub upload_urls_issued: u64,
    pub download_urls_issued: u64,
}

#[derive(Debug, Serialize)]
pub struct AgentStatsSnapshot {
    pub name: String,
    pub executions: u64,
    pub failures: u64,
    pub avg_execution_time_ms: f64,
    pub success_rate: f64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_counters() {
        let collector = MetricsCollector::new();

        collector.task_created();
        collector.task_processing_started();
        collector.task_processing_completed(Duration::from_millis(1500));

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 1);
        assert_eq!(metrics.tasks.tasks_completed, 1);
        assert_eq!(metrics.tasks.tasks_processing, 0);
        assert!(metrics.tasks.avg_processing_time_ms > 1400.0);
    }

    #[test]
    fn test_agent_stats() {
        let collector = MetricsCollector::new();

        collector.agent_executed("pii-scanner", Duration::from_millis(500), true);
        collector.agent_executed("pii-scanner", Duration::from_millis(300), false);

        let metrics = collector.get_metrics();
        let stats = metrics.agents.get("pii-scanner").unwrap();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert!(stats.avg_execution_time_ms > 350.0);
    }

    #[test]
    fn test_storage_counters() {
        let collector = MetricsCollector::new();
        collector.object_written();
        collector.object_read();
        collector.upload_urls_issued(3);
        collector.download_urls_issued(2);

        let metrics = collector.get_metrics();
        assert_eq!(metrics.storage.objects_written, 1);
        assert_eq!(metrics.storage.objects_read, 1);
        assert_eq!(metrics.storage.upload_urls_issued, 3);
        assert_eq!(metrics.storage.download_urls_issued, 2);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let collector = Arc::new(MetricsCollector::new());
        let mut handles = vec![];
        for _ in 0..10 {
            let collector = Arc::clone(&collector);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    collector.task_created();
                    collector.object_written();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 1000);
        assert_eq!(metrics.storage.objects_written, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 100.0) - 10.0).abs() < 0.1);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.task_created();
        collector.agent_executed("null-auditor", Duration::from_millis(100), true);

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 0);
        assert!(metrics.agents.is_empty());
    }
}
