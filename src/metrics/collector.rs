use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::Sample;
use crate::accounting::ChainUsage;

// ─── Configuration ───────────────────────────────────────────────

/// How many individual transactions we keep for the live feed
const MAX_RECENT_SAMPLES: usize = 200;

/// Aggregate timeline resolution (one point per window)
const TIMELINE_WINDOW_MS: u64 = 500;

/// Timeline points kept for the chart, partial window included (10 min)
const MAX_TIMELINE_POINTS: usize = 1_200;

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregate of accounted transactions.
/// The accounting middleware calls `record()`, the SSE stream calls `snapshot()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// A single entry in the live transaction feed.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub finished_at: DateTime<Utc>,
    pub endpoint: String,
    pub status: u16,
    pub hops: u32,
    pub anomalies: u32,
    pub usage: Option<ChainUsage>,
}

/// One aggregated point on the timeline chart (per 500 ms window).
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub timestamp_ms: u64,
    pub avg_time_us: f64,
    pub avg_user_us: f64,
    pub avg_system_us: f64,
    pub count: u64,
}

/// A bucket in the wall-time distribution histogram.
#[derive(Debug, Clone, Serialize)]
pub struct DistBucket {
    pub range_start_us: u64,
    pub range_end_us: u64,
    pub count: u64,
}

/// Complete snapshot shipped to the dashboard on every SSE tick.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    // Percentile breakdowns per accounted quantity
    pub wall_time: PercentileSet,
    pub user_time: PercentileSet,
    pub system_time: PercentileSet,
    pub child_cpu_time: PercentileSet,

    // Counters
    pub total_requests: u64,
    pub redirected_chains: u64,
    pub unaccounted_chains: u64,
    pub total_anomalies: u64,
    pub total_in_blocks: u64,
    pub total_out_blocks: u64,
    pub requests_per_sec: f64,
    pub elapsed_secs: f64,

    // Visual data
    pub recent_samples: Vec<SampleRecord>,
    pub timeline: Vec<TimelinePoint>,
    pub distribution: Vec<DistBucket>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    wall_hist: Histogram<u64>,
    user_hist: Histogram<u64>,
    system_hist: Histogram<u64>,
    child_cpu_hist: Histogram<u64>,

    total_requests: u64,
    redirected_chains: u64,
    unaccounted_chains: u64,
    total_anomalies: u64,
    total_in_blocks: u64,
    total_out_blocks: u64,

    // Rolling window of recent transactions
    recent_samples: VecDeque<SampleRecord>,

    // Timeline aggregation
    timeline: VecDeque<TimelinePoint>,
    current_window: Option<WindowAccumulator>,

    // Wall-clock anchor for elapsed time
    start_time: Option<Instant>,
}

/// Running totals for the current 500 ms timeline window.
struct WindowAccumulator {
    window_start_ms: u64,
    time_sum: u64,
    user_sum: u64,
    system_sum: u64,
    count: u64,
}

impl WindowAccumulator {
    fn point(&self) -> TimelinePoint {
        let n = self.count as f64;
        TimelinePoint {
            timestamp_ms: self.window_start_ms,
            avg_time_us: self.time_sum as f64 / n,
            avg_user_us: self.user_sum as f64 / n,
            avg_system_us: self.system_sum as f64 / n,
            count: self.count,
        }
    }
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Record one accounted transaction.
    pub fn record(&self, sample: Sample) {
        self.inner.lock().record(sample);
    }

    /// Wipe all data.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    /// Produce a read-only snapshot for the dashboard.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

fn histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram bounds are valid")
}

/// Published deltas are never negative; clamp to the histogram range.
fn hist_value(v: i64) -> u64 {
    (v.max(0) as u64).clamp(HIST_LOW, HIST_HIGH)
}

impl Inner {
    fn new() -> Self {
        Self {
            wall_hist: histogram(),
            user_hist: histogram(),
            system_hist: histogram(),
            child_cpu_hist: histogram(),
            total_requests: 0,
            redirected_chains: 0,
            unaccounted_chains: 0,
            total_anomalies: 0,
            total_in_blocks: 0,
            total_out_blocks: 0,
            recent_samples: VecDeque::with_capacity(MAX_RECENT_SAMPLES + 1),
            timeline: VecDeque::with_capacity(MAX_TIMELINE_POINTS),
            current_window: None,
            start_time: None,
        }
    }

    fn record(&mut self, sample: Sample) {
        // Lazily set the anchor on the very first sample
        let start = *self.start_time.get_or_insert_with(Instant::now);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        // ── Counters ────────────────────────────────────────────
        self.total_requests += 1;
        self.total_anomalies += u64::from(sample.anomalies);
        if sample.hops > 0 {
            self.redirected_chains += 1;
        }

        match &sample.usage {
            Some(usage) => {
                let time_us = hist_value(usage.time_us);
                let user_us = hist_value(usage.user_us);
                let system_us = hist_value(usage.system_us);

                let _ = self.wall_hist.record(time_us);
                let _ = self.user_hist.record(user_us);
                let _ = self.system_hist.record(system_us);
                let _ = self.child_cpu_hist.record(hist_value(usage.child_cpu_us()));

                self.total_in_blocks += (usage.in_blocks + usage.child_in_blocks).max(0) as u64;
                self.total_out_blocks += (usage.out_blocks + usage.child_out_blocks).max(0) as u64;

                self.push_to_timeline(elapsed_ms, time_us, user_us, system_us);
            }
            None => self.unaccounted_chains += 1,
        }

        // ── Live feed ───────────────────────────────────────────
        self.recent_samples.push_back(SampleRecord {
            finished_at: Utc::now(),
            endpoint: sample.endpoint,
            status: sample.status,
            hops: sample.hops,
            anomalies: sample.anomalies,
            usage: sample.usage,
        });
        if self.recent_samples.len() > MAX_RECENT_SAMPLES {
            self.recent_samples.pop_front();
        }
    }

    /// Bucket the sample into the current 500 ms window, or roll over.
    fn push_to_timeline(&mut self, elapsed_ms: u64, time_us: u64, user_us: u64, system_us: u64) {
        let window_start = (elapsed_ms / TIMELINE_WINDOW_MS) * TIMELINE_WINDOW_MS;

        if let Some(w) = &mut self.current_window {
            if w.window_start_ms == window_start {
                w.time_sum += time_us;
                w.user_sum += user_us;
                w.system_sum += system_us;
                w.count += 1;
                return;
            }
        }

        // New window: finalize the old one, start fresh
        if let Some(old) = self.current_window.take() {
            self.timeline.push_back(old.point());
            // leave room for the partial window
            if self.timeline.len() >= MAX_TIMELINE_POINTS {
                self.timeline.pop_front();
            }
        }
        self.current_window = Some(WindowAccumulator {
            window_start_ms: window_start,
            time_sum: time_us,
            user_sum: user_us,
            system_sum: system_us,
            count: 1,
        });
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let rps = if elapsed_secs > 0.0 {
            self.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        // Include the current (partial) window
        let timeline = self
            .timeline
            .iter()
            .cloned()
            .chain(self.current_window.as_ref().map(WindowAccumulator::point))
            .collect();

        MetricsSnapshot {
            wall_time: PercentileSet::from(&self.wall_hist),
            user_time: PercentileSet::from(&self.user_hist),
            system_time: PercentileSet::from(&self.system_hist),
            child_cpu_time: PercentileSet::from(&self.child_cpu_hist),

            total_requests: self.total_requests,
            redirected_chains: self.redirected_chains,
            unaccounted_chains: self.unaccounted_chains,
            total_anomalies: self.total_anomalies,
            total_in_blocks: self.total_in_blocks,
            total_out_blocks: self.total_out_blocks,
            requests_per_sec: rps,
            elapsed_secs,

            recent_samples: self.recent_samples.iter().cloned().collect(),
            timeline,
            distribution: Self::compute_distribution(&self.wall_hist),
        }
    }

    // ── Distribution histogram for the bar chart ────────────────

    /// Bucket boundaries (μs), from fast in-memory handlers up to
    /// multi-second chains.
    const DIST_BOUNDARIES: &'static [u64] = &[
        50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000,
        250_000, 500_000, 1_000_000, 5_000_000,
    ];

    fn compute_distribution(hist: &Histogram<u64>) -> Vec<DistBucket> {
        if hist.len() == 0 {
            return Vec::new();
        }

        let bounds = Self::DIST_BOUNDARIES;
        let mut counts = vec![0u64; bounds.len() + 1]; // +1 for overflow

        for iv in hist.iter_recorded() {
            // first boundary >= value, or the overflow bucket
            let idx = bounds.partition_point(|&b| b < iv.value_iterated_to());
            counts[idx] += iv.count_at_value();
        }

        let mut result = Vec::with_capacity(counts.len());
        let mut prev = 0u64;
        for (&boundary, &count) in bounds.iter().zip(&counts) {
            if count > 0 {
                result.push(DistBucket {
                    range_start_us: prev,
                    range_end_us: boundary,
                    count,
                });
            }
            prev = boundary;
        }
        let overflow = counts[bounds.len()];
        if overflow > 0 {
            result.push(DistBucket {
                range_start_us: prev,
                range_end_us: hist.max(),
                count: overflow,
            });
        }

        result
    }
}
