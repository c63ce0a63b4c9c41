mod route;
mod traffic;

pub use route::{
    AllowedIp, DEFAULT_MAX_REQUESTS, DEFAULT_TIME_WINDOW_MS, RateLimit, Route, RouteDraft,
    SecurityFlag,
};
pub use traffic::{
    CRITICAL_REJECTION_RATE, HealthFilter, HealthState, MinuteMetrics, RateLimitMetricsSnapshot,
    RateLimitReport, RateLimitSummary, RequestTotals, RouteHistoryPoint, Trend, TrendDirection,
    WARNING_REJECTION_RATE, percent_change, percentage,
};
