//! Domain types for the JobGrid state store.
//!
//! These types represent the persisted control-plane state: scaling
//! policies, metrics snapshots, scaling decisions, worker records,
//! rate-limiter windows, alert rules, and alerts. All types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Name of a job queue (unique key for policies and metrics).
pub type QueueName = String;

/// Unique identifier for a worker process.
pub type WorkerId = String;

/// Unique identifier for an alert.
pub type AlertId = String;

/// How long an acknowledgment holds before a still-breaching condition
/// may re-fire (seconds).
pub const ACK_EXPIRY_SECS: u64 = 3600;

/// How long a duplicate alert signature is suppressed (seconds).
pub const SUPPRESSION_WINDOW_SECS: u64 = 4 * 3600;

// ── Scaling policy ─────────────────────────────────────────────────

/// Metrics a scaling threshold can be configured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMetric {
    QueueDepth,
    QueueLatencyMs,
    CpuPercent,
    MemoryPercent,
}

impl ScaleMetric {
    /// All metrics, in evaluation order.
    pub const ALL: [Self; 4] = [
        Self::QueueDepth,
        Self::QueueLatencyMs,
        Self::CpuPercent,
        Self::MemoryPercent,
    ];

    /// Human-readable label used in decision reasons and alert messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::QueueDepth => "queue depth",
            Self::QueueLatencyMs => "queue latency ms",
            Self::CpuPercent => "cpu percent",
            Self::MemoryPercent => "memory percent",
        }
    }
}

/// A set of per-metric threshold values. Unset fields are not evaluated.
///
/// Kept as a struct of options rather than a string-keyed map so threshold
/// evaluation over [`ScaleMetric::ALL`] is exhaustive at compile time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub queue_depth: Option<f64>,
    pub queue_latency_ms: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

impl ThresholdSet {
    /// Threshold for a single metric, if configured.
    pub fn get(&self, metric: ScaleMetric) -> Option<f64> {
        match metric {
            ScaleMetric::QueueDepth => self.queue_depth,
            ScaleMetric::QueueLatencyMs => self.queue_latency_ms,
            ScaleMetric::CpuPercent => self.cpu_percent,
            ScaleMetric::MemoryPercent => self.memory_percent,
        }
    }

    /// Iterate over the configured (metric, threshold) pairs.
    pub fn configured(&self) -> impl Iterator<Item = (ScaleMetric, f64)> + '_ {
        ScaleMetric::ALL
            .into_iter()
            .filter_map(|m| self.get(m).map(|v| (m, v)))
    }

    /// True if no metric has a threshold.
    pub fn is_empty(&self) -> bool {
        self.configured().next().is_none()
    }
}

/// Cooldown seconds per scaling direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownConfig {
    pub scale_up_secs: u64,
    pub scale_down_secs: u64,
}

/// Per-queue autoscaling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub queue: QueueName,
    /// Lower bound on the worker pool (>= 1).
    pub min_workers: u32,
    /// Upper bound on the worker pool (<= 50).
    pub max_workers: u32,
    /// Scale up when ANY configured threshold is breached.
    pub scale_up: Option<ThresholdSet>,
    /// Scale down only when ALL configured thresholds are clear.
    pub scale_down: Option<ThresholdSet>,
    pub cooldown: CooldownConfig,
    /// Unix timestamp (seconds) when this policy was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this policy was last updated.
    pub updated_at: u64,
}

// ── Metrics ────────────────────────────────────────────────────────

/// Point-in-time metrics snapshot for a queue, produced by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingMetrics {
    pub queue: QueueName,
    /// Jobs waiting to be dispatched.
    pub queue_depth: u64,
    /// Age of the oldest waiting job in milliseconds.
    pub queue_latency_ms: u64,
    /// Jobs currently being processed.
    pub active_jobs: u32,
    /// Completions per minute over the sampling window.
    pub completed_rate: f64,
    /// Failures as a fraction of completions (0.0-1.0).
    pub error_rate: f64,
    /// Workers currently in the pool.
    pub current_workers: u32,
    /// Aggregate worker CPU usage, when the orchestrator reports it.
    pub cpu_percent: Option<f64>,
    /// Aggregate worker memory usage, when the orchestrator reports it.
    pub memory_percent: Option<f64>,
    /// Unix timestamp (seconds) when the snapshot was taken.
    pub timestamp: u64,
}

impl ScalingMetrics {
    /// The observed value for a scale metric. `None` for cpu/memory when
    /// the orchestrator does not report usage.
    pub fn value_of(&self, metric: ScaleMetric) -> Option<f64> {
        match metric {
            ScaleMetric::QueueDepth => Some(self.queue_depth as f64),
            ScaleMetric::QueueLatencyMs => Some(self.queue_latency_ms as f64),
            ScaleMetric::CpuPercent => self.cpu_percent,
            ScaleMetric::MemoryPercent => self.memory_percent,
        }
    }
}

// ── Scaling decisions ──────────────────────────────────────────────

/// The action a scaling decision resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    Maintain,
}

/// A scaling direction, for cooldown bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

/// Outcome of one decision-engine evaluation for one queue tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub queue: QueueName,
    pub action: ScaleAction,
    pub target_workers: u32,
    pub current_workers: u32,
    /// Names the breaching metric(s) and values, for audit and alerting.
    pub reason: String,
    /// The snapshot the decision was derived from.
    pub metrics: ScalingMetrics,
    /// Unix timestamp (seconds) when the decision was made.
    pub decided_at: u64,
}

impl ScalingDecision {
    /// The cooldown direction this decision applies to, if any.
    pub fn direction(&self) -> Option<ScaleDirection> {
        match self.action {
            ScaleAction::ScaleUp => Some(ScaleDirection::Up),
            ScaleAction::ScaleDown => Some(ScaleDirection::Down),
            ScaleAction::Maintain => None,
        }
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// Lifecycle state of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Accepting and processing jobs.
    Active,
    /// Finishing its current job; the dispatcher assigns it nothing new.
    Draining,
    /// Terminated; the record is removed shortly after entering this state.
    Terminated,
}

/// Control-plane record for a single worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub queue: QueueName,
    /// Unix timestamp (seconds) when the worker was spawned.
    pub started_at: u64,
    /// Jobs completed since start, reported by the worker.
    pub jobs_processed: u64,
    /// Resident memory in MB, reported by the orchestrator.
    pub memory_mb: u64,
    pub state: WorkerState,
    /// Unix timestamp of last record update.
    pub updated_at: u64,
}

impl WorkerRecord {
    /// Worker uptime in seconds at `now`.
    pub fn uptime_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }
}

// ── Rate limiter ───────────────────────────────────────────────────

/// Fixed-window granularities a limiter can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowGranularity {
    Second,
    Minute,
    Hour,
    Day,
}

impl WindowGranularity {
    /// Window length in seconds.
    pub fn secs(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86_400,
        }
    }

    /// The start of the window containing `now`.
    pub fn window_start(self, now: u64) -> u64 {
        now - (now % self.secs())
    }
}

/// One fixed counting window of a named limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub granularity: WindowGranularity,
    pub limit: u64,
    pub current: u64,
    /// Unix timestamp (seconds) of the current window boundary.
    pub window_start_at: u64,
}

impl RateWindow {
    /// A fresh window with zero count starting at the boundary for `now`.
    pub fn new(granularity: WindowGranularity, limit: u64, now: u64) -> Self {
        Self {
            granularity,
            limit,
            current: 0,
            window_start_at: granularity.window_start(now),
        }
    }

    /// When the current window resets.
    pub fn resets_at(&self) -> u64 {
        self.window_start_at + self.granularity.secs()
    }
}

// ── Alerts ─────────────────────────────────────────────────────────

/// Metrics an alert rule can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    QueueDepth,
    QueueLatencyMs,
    ErrorRate,
    CompletedRate,
    CpuPercent,
    MemoryPercent,
}

impl AlertMetric {
    /// Human-readable label used in alert messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::QueueDepth => "queue depth",
            Self::QueueLatencyMs => "queue latency ms",
            Self::ErrorRate => "error rate",
            Self::CompletedRate => "completed rate",
            Self::CpuPercent => "cpu percent",
            Self::MemoryPercent => "memory percent",
        }
    }
}

/// Alert severity tiers, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Urgent,
}

/// Threshold configuration for one alert type.
///
/// At least one severity tier must be set; configured tiers must be
/// strictly increasing (warning < critical < urgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique alert type, e.g. "queue_backlog".
    pub alert_type: String,
    pub metric: AlertMetric,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub urgent: Option<f64>,
    /// Evaluation period; part of the suppression signature.
    pub period_secs: u64,
}

impl AlertRule {
    /// Configured (severity, threshold) pairs, lowest tier first.
    pub fn tiers(&self) -> impl Iterator<Item = (AlertSeverity, f64)> + '_ {
        [
            (AlertSeverity::Warning, self.warning),
            (AlertSeverity::Critical, self.critical),
            (AlertSeverity::Urgent, self.urgent),
        ]
        .into_iter()
        .filter_map(|(s, t)| t.map(|t| (s, t)))
    }
}

/// Acknowledgment state machine: active -> acknowledged -> expired -> active
/// (the final transition happens by a fresh alert being emitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AckState {
    /// Not yet acknowledged.
    Active,
    /// Acknowledged by an operator; holds for [`ACK_EXPIRY_SECS`].
    Acknowledged {
        by: String,
        at: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    /// Acknowledgment lapsed; a still-breaching condition may re-fire.
    Expired { by: String, at: u64 },
}

impl AckState {
    /// Resolve time-based expiry: an acknowledgment older than
    /// [`ACK_EXPIRY_SECS`] is effectively expired.
    pub fn effective(&self, now: u64) -> Self {
        match self {
            Self::Acknowledged { by, at, .. } if now >= at + ACK_EXPIRY_SECS => Self::Expired {
                by: by.clone(),
                at: *at,
            },
            other => other.clone(),
        }
    }

    /// True if this alert still suppresses duplicates at `now`.
    pub fn suppresses(&self, now: u64) -> bool {
        !matches!(self.effective(now), Self::Expired { .. })
    }
}

/// An emitted operational alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub queue: QueueName,
    pub alert_type: String,
    pub severity: AlertSeverity,
    /// The observed metric value at (last) evaluation.
    pub current_value: f64,
    /// The threshold of the breached tier.
    pub threshold: f64,
    pub message: String,
    pub recommendation: String,
    /// Unix timestamp (seconds) when first emitted.
    pub triggered_at: u64,
    pub ack: AckState,
}

// ── Table keys ─────────────────────────────────────────────────────

impl ScalingPolicy {
    /// Key for the policies table (one policy per queue).
    pub fn table_key(&self) -> String {
        self.queue.clone()
    }
}

impl WorkerRecord {
    /// Composite key for the workers table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.queue, self.id)
    }
}

impl ScalingDecision {
    /// Composite key for the decisions table; zero-padded timestamp keeps
    /// redb's lexicographic iteration in chronological order.
    pub fn table_key(&self) -> String {
        format!("{}:{:020}", self.queue, self.decided_at)
    }
}

impl AlertRule {
    /// Key for the alert-rules table (one rule per alert type).
    pub fn table_key(&self) -> String {
        self.alert_type.clone()
    }
}

impl Alert {
    /// Key for the alerts table.
    pub fn table_key(&self) -> String {
        self.id.clone()
    }
}
