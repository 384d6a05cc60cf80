//! Running request metrics.
//!
//! Counters are atomics so concurrent turns never wait on each other; only
//! the rolling latency window takes a short lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use buddy_common::{Mode, TokenUsage};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Upper bounds (inclusive, ms) of the latency histogram buckets. A final
/// overflow bucket catches everything slower.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

/// What the router reports when a turn finishes.
#[derive(Debug, Clone)]
pub struct TurnSample {
    pub mode: Mode,
    pub category: String,
    pub latency_ms: f64,
    pub tokens: TokenUsage,
    pub degraded: bool,
}

pub struct Metrics {
    started: Instant,
    window_size: usize,
    total_requests: AtomicU64,
    degraded_replies: AtomicU64,
    per_mode: [AtomicU64; 3],
    per_category: DashMap<String, AtomicU64>,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    errors: DashMap<String, AtomicU64>,
    warnings: DashMap<String, AtomicU64>,
    histogram: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    window: Mutex<VecDeque<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Inclusive upper bound in ms; `None` for the overflow bucket
    pub le_ms: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub degraded_replies: u64,
    pub requests_by_mode: BTreeMap<String, u64>,
    pub requests_by_category: BTreeMap<String, u64>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub errors_total: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub warnings_by_kind: BTreeMap<String, u64>,
    pub latency: LatencySummary,
    pub latency_histogram: Vec<HistogramBucket>,
    /// Event log / file-mirroring failures swallowed by the sink
    pub sink_failures: u64,
    pub events_retained: usize,
}

fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
    if let Some(counter) = map.get(key) {
        counter.fetch_add(1, Ordering::Relaxed);
        return;
    }
    map.entry(key.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn collect(map: &DashMap<String, AtomicU64>) -> BTreeMap<String, u64> {
    map.iter()
        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
        .collect()
}

/// Nearest-rank percentile over an ascending slice; 0.0 when empty.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl Metrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            started: Instant::now(),
            window_size: window_size.max(1),
            total_requests: AtomicU64::new(0),
            degraded_replies: AtomicU64::new(0),
            per_mode: Default::default(),
            per_category: DashMap::new(),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            errors: DashMap::new(),
            warnings: DashMap::new(),
            histogram: Default::default(),
            window: Mutex::new(VecDeque::with_capacity(window_size.min(4096))),
        }
    }

    pub fn record_turn(&self, sample: &TurnSample) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.per_mode[sample.mode.index()].fetch_add(1, Ordering::Relaxed);
        bump(&self.per_category, &sample.category);
        if sample.degraded {
            self.degraded_replies.fetch_add(1, Ordering::Relaxed);
        }
        self.prompt_tokens
            .fetch_add(u64::from(sample.tokens.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(sample.tokens.completion_tokens), Ordering::Relaxed);

        let latency = sample.latency_ms.max(0.0);
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|le| latency <= *le as f64)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.histogram[bucket].fetch_add(1, Ordering::Relaxed);

        let mut window = self.window.lock();
        window.push_back(latency);
        while window.len() > self.window_size {
            window.pop_front();
        }
    }

    pub fn record_error(&self, kind: &str) {
        bump(&self.errors, kind);
    }

    pub fn record_warning(&self, kind: &str) {
        bump(&self.warnings, kind);
    }

    pub fn latency_summary(&self) -> LatencySummary {
        let mut values: Vec<f64> = self.window.lock().iter().copied().collect();
        if values.is_empty() {
            return LatencySummary::default();
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        LatencySummary {
            samples: values.len(),
            mean: round2(mean),
            p50: round2(percentile(&values, 0.50)),
            p95: round2(percentile(&values, 0.95)),
            p99: round2(percentile(&values, 0.99)),
        }
    }

    /// Point-in-time copy. `sink_failures` and `events_retained` are filled
    /// in by the sink.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests_by_mode = Mode::ALL
            .iter()
            .map(|m| {
                (
                    m.as_str().to_string(),
                    self.per_mode[m.index()].load(Ordering::Relaxed),
                )
            })
            .collect();

        let latency_histogram = self
            .histogram
            .iter()
            .enumerate()
            .map(|(i, count)| HistogramBucket {
                le_ms: LATENCY_BUCKETS_MS.get(i).copied(),
                count: count.load(Ordering::Relaxed),
            })
            .collect();

        let errors_by_kind = collect(&self.errors);
        let prompt_tokens = self.prompt_tokens.load(Ordering::Relaxed);
        let completion_tokens = self.completion_tokens.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            degraded_replies: self.degraded_replies.load(Ordering::Relaxed),
            requests_by_mode,
            requests_by_category: collect(&self.per_category),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            errors_total: errors_by_kind.values().sum(),
            errors_by_kind,
            warnings_by_kind: collect(&self.warnings),
            latency: self.latency_summary(),
            latency_histogram,
            sink_failures: 0,
            events_retained: 0,
        }
    }
}
