//! Performance metrics and statistics tracking for the scoring pipeline.

use crate::error::ErrorKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline runs
pub struct PipelineMetrics {
    /// Uploads that produced predictions
    pub files_processed: AtomicU64,
    /// Uploads rejected with an error
    pub files_failed: AtomicU64,
    /// Data rows read from successful uploads
    pub rows_received: AtomicU64,
    /// Rows that received a probability
    pub rows_scored: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            files_processed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            rows_received: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored upload
    pub fn record_success(&self, processing_time: Duration, input_rows: usize, probabilities: &[f64]) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_received.fetch_add(input_rows as u64, Ordering::Relaxed);
        self.rows_scored
            .fetch_add(probabilities.len() as u64, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut buckets) = self.score_buckets.write() {
            for p in probabilities {
                let bucket = (p * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a rejected upload
    pub fn record_failure(&self, processing_time: Duration, kind: ErrorKind) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.as_str()).or_insert(0) += 1;
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Rows dropped during cleaning across all successful uploads
    pub fn rows_dropped(&self) -> u64 {
        self.rows_received
            .load(Ordering::Relaxed)
            .saturating_sub(self.rows_scored.load(Ordering::Relaxed))
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (uploads per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let files = self.files_processed.load(Ordering::Relaxed) + self.files_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            files as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    /// Get failures by error kind
    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            rows_received: self.rows_received.load(Ordering::Relaxed),
            rows_scored: self.rows_scored.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped(),
            failures_by_kind: self.get_failures_by_kind(),
            processing: self.get_processing_stats(),
            score_distribution: self.get_score_distribution(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total_files = snapshot.files_processed + snapshot.files_failed;
        let failure_rate = if total_files > 0 {
            (snapshot.files_failed as f64 / total_files as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            HEART RISK PIPELINE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Files Processed: {:>8}  │  Failed: {:>6} ({:>5.1}%)       ║",
            snapshot.files_processed, snapshot.files_failed, failure_rate
        );
        info!(
            "║ Rows Received: {:>10}  │  Scored: {:>8}  Dropped: {:>6} ║",
            snapshot.rows_received, snapshot.rows_scored, snapshot.rows_dropped
        );
        info!(
            "║ Throughput: {:>8.2} files/s                                  ║",
            self.get_throughput()
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            snapshot.processing.mean_us,
            snapshot.processing.p50_us,
            snapshot.processing.p95_us,
            snapshot.processing.p99_us
        );
        if !snapshot.failures_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &snapshot.failures_by_kind {
                info!("║   {:24}: {:>6}                            ║", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let total: u64 = snapshot.score_distribution.iter().sum();
        for (i, &count) in snapshot.score_distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view served on `/metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub files_processed: u64,
    pub files_failed: u64,
    pub rows_received: u64,
    pub rows_scored: u64,
    pub rows_dropped: u64,
    pub failures_by_kind: HashMap<String, u64>,
    pub processing: ProcessingStats,
    pub score_distribution: [u64; 10],
    pub uptime_secs: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
