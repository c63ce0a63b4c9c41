use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rejection rate above which a route is `Warning`.
pub const WARNING_REJECTION_RATE: f64 = 5.0;

/// Rejection rate above which a route is `Critical`.
pub const CRITICAL_REJECTION_RATE: f64 = 10.0;

/// Percentage of `part` in `total`, 0 when `total` is 0.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Minute-over-minute change in percent.
///
/// - both zero: 0
/// - previous zero, current non-zero: 100
/// - otherwise `round((current - previous) / previous * 100)`, so a drop to
///   zero yields -100
///
/// Rounding follows half-up semantics (`-50.5` rounds to `-50`).
pub fn percent_change(current: u64, previous: u64) -> i64 {
    if previous == 0 {
        return if current == 0 { 0 } else { 100 };
    }
    // floor(x + 1/2) in exact integer arithmetic
    let delta = i128::from(current) - i128::from(previous);
    let previous = i128::from(previous);
    (200 * delta + previous).div_euclid(2 * previous) as i64
}

/// Lifetime request counters from `GET /metrics/requests`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTotals {
    pub total_requests: u64,
    #[serde(default)]
    pub total_rejected: u64,
}

/// Global counters for the current and previous minute bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteMetrics {
    pub requests_current_minute: u64,
    pub requests_previous_minute: u64,
    pub rejected_current_minute: u64,
    pub rejected_previous_minute: u64,
}

impl MinuteMetrics {
    pub fn requests_trend(&self) -> Trend {
        Trend::new(self.requests_current_minute, self.requests_previous_minute)
    }

    pub fn rejections_trend(&self) -> Trend {
        Trend::new(self.rejected_current_minute, self.rejected_previous_minute)
    }
}

/// Direction of a trend indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// A "current vs previous" value with its percent change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub current: u64,
    pub previous: u64,
    pub percent_change: i64,
}

impl Trend {
    pub fn new(current: u64, previous: u64) -> Self {
        Self {
            current,
            previous,
            percent_change: percent_change(current, previous),
        }
    }

    pub fn direction(&self) -> TrendDirection {
        match self.percent_change {
            p if p > 0 => TrendDirection::Up,
            p if p < 0 => TrendDirection::Down,
            _ => TrendDirection::Flat,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:+}%)", self.current, self.percent_change)
    }
}

/// Per-route rate-limit counters, recomputed wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMetricsSnapshot {
    pub route_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_rejections: u64,
    #[serde(default)]
    pub with_rate_limit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_ms: Option<u64>,
}

impl RateLimitMetricsSnapshot {
    /// `totalRejections / totalRequests * 100`, 0 when there was no traffic.
    pub fn rejection_rate(&self) -> f64 {
        percentage(self.total_rejections, self.total_requests)
    }
}

/// Body of `GET /metrics/ratelimit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitReport {
    #[serde(default)]
    pub routes: Vec<RateLimitMetricsSnapshot>,
}

/// Aggregate over all per-route snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSummary {
    pub total_requests: u64,
    pub total_rejections: u64,
    pub rejection_rate: f64,
}

impl RateLimitSummary {
    pub fn from_snapshots<'a>(
        snapshots: impl IntoIterator<Item = &'a RateLimitMetricsSnapshot>,
    ) -> Self {
        let (total_requests, total_rejections) =
            snapshots.into_iter().fold((0u64, 0u64), |(req, rej), s| {
                (
                    req.saturating_add(s.total_requests),
                    rej.saturating_add(s.total_rejections),
                )
            });
        Self {
            total_requests,
            total_rejections,
            rejection_rate: percentage(total_rejections, total_requests),
        }
    }
}

/// One bucket of a route's traffic history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub requests: u64,
    pub rejections: u64,
}

impl RouteHistoryPoint {
    pub fn accepted(&self) -> u64 {
        self.requests.saturating_sub(self.rejections)
    }

    pub fn rejection_rate(&self) -> f64 {
        percentage(self.rejections, self.requests)
    }
}

/// Coarse classification of a route's current rejection rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Disabled,
    Critical,
    Warning,
    Healthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Disabled => write!(f, "disabled"),
            HealthState::Critical => write!(f, "critical"),
            HealthState::Warning => write!(f, "warning"),
            HealthState::Healthy => write!(f, "healthy"),
        }
    }
}

/// Visualization filter over classified routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthFilter {
    #[default]
    All,
    Healthy,
    Warning,
    Critical,
    Disabled,
}

impl HealthFilter {
    pub fn matches(self, state: HealthState) -> bool {
        match self {
            HealthFilter::All => true,
            HealthFilter::Healthy => state == HealthState::Healthy,
            HealthFilter::Warning => state == HealthState::Warning,
            HealthFilter::Critical => state == HealthState::Critical,
            HealthFilter::Disabled => state == HealthState::Disabled,
        }
    }
}
