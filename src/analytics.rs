//! Per-route rate-limit health and traffic history.
//!
//! [`RateLimitAnalytics`] polls `GET /metrics/ratelimit` and keeps the latest
//! per-route snapshot list. Everything derived from it (health state, summary,
//! filtering, ranking) is computed fresh on each read and never cached.
//!
//! History for one route at a time is fetched on demand; a newer request
//! supersedes an older one still in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::dashboard::loops;
use crate::error::ConsoleResult;
use crate::gateway::SessionGateway;
use crate::metrics;
use crate::models::{
    CRITICAL_REJECTION_RATE, HealthFilter, HealthState, RateLimitMetricsSnapshot,
    RateLimitSummary, RouteHistoryPoint, WARNING_REJECTION_RATE,
};
use crate::polling::{PollGroup, PollSlot, SharedSlot};

/// Health of one route from its latest snapshot.
///
/// `Disabled` whenever rate limiting is off, whatever the rejection rate.
/// No smoothing: a single noisy sample can flip the state.
pub fn classify(snapshot: &RateLimitMetricsSnapshot) -> HealthState {
    if !snapshot.with_rate_limit {
        return HealthState::Disabled;
    }

    let rate = snapshot.rejection_rate();
    if rate > CRITICAL_REJECTION_RATE {
        HealthState::Critical
    } else if rate > WARNING_REJECTION_RATE {
        HealthState::Warning
    } else {
        HealthState::Healthy
    }
}

/// A snapshot with its derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRoute {
    #[serde(flatten)]
    pub snapshot: RateLimitMetricsSnapshot,
    pub rejection_rate: f64,
    pub health: HealthState,
}

impl ClassifiedRoute {
    pub fn new(snapshot: RateLimitMetricsSnapshot) -> Self {
        Self {
            rejection_rate: snapshot.rejection_rate(),
            health: classify(&snapshot),
            snapshot,
        }
    }
}

/// The first `n` routes by `totalRequests`, descending.
///
/// Equal traffic keeps fetch order.
pub fn top_by_traffic(mut routes: Vec<ClassifiedRoute>, n: usize) -> Vec<ClassifiedRoute> {
    // sort_by is stable
    routes.sort_by(|a, b| b.snapshot.total_requests.cmp(&a.snapshot.total_requests));
    routes.truncate(n);
    routes
}

/// Latest history for the selected route.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHistory {
    pub route_id: Option<String>,
    pub points: Vec<RouteHistoryPoint>,
    pub error: Option<String>,
}

/// Raises the loading flag for as long as it lives.
struct LoadingGuard(Arc<AtomicUsize>);

impl LoadingGuard {
    fn enter(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Rate-limit analytics over a polled snapshot list.
///
/// Cheap to clone; clones share the loop and state.
#[derive(Clone)]
pub struct RateLimitAnalytics {
    gateway: SessionGateway,
    report: SharedSlot<Vec<RateLimitMetricsSnapshot>>,
    history: Arc<RwLock<RouteHistory>>,
    history_seq: Arc<AtomicU64>,
    history_in_flight: Arc<AtomicUsize>,
    group: PollGroup,
}

impl RateLimitAnalytics {
    /// Start polling per-route snapshots.
    pub fn start(gateway: &SessionGateway) -> Self {
        let analytics = Self {
            gateway: gateway.clone(),
            report: SharedSlot::default(),
            history: Arc::default(),
            history_seq: Arc::new(AtomicU64::new(0)),
            history_in_flight: Arc::new(AtomicUsize::new(0)),
            group: PollGroup::new(),
        };

        let gw = gateway.clone();
        let period = gateway.config().rate_limit_poll_interval;
        analytics
            .group
            .spawn_loop(loops::RATE_LIMIT, period, analytics.report.clone(), move || {
                let gw = gw.clone();
                async move {
                    let routes = gw.rate_limit_report().await?.routes;
                    let critical = routes
                        .iter()
                        .filter(|s| classify(s) == HealthState::Critical)
                        .count();
                    metrics::set_routes_critical(critical);
                    Ok(routes)
                }
            });

        info!(period_secs = period.as_secs(), "Rate-limit analytics started");
        analytics
    }

    /// Latest raw snapshots, in fetch order.
    pub async fn snapshots(&self) -> Vec<RateLimitMetricsSnapshot> {
        self.report.read().await.value.clone().unwrap_or_default()
    }

    /// Raw slot, including the last poll error.
    pub async fn report_slot(&self) -> PollSlot<Vec<RateLimitMetricsSnapshot>> {
        self.report.read().await.clone()
    }

    /// Every route with its health, in fetch order.
    pub async fn classified(&self) -> Vec<ClassifiedRoute> {
        self.snapshots()
            .await
            .into_iter()
            .map(ClassifiedRoute::new)
            .collect()
    }

    pub async fn summary(&self) -> RateLimitSummary {
        RateLimitSummary::from_snapshots(&self.snapshots().await)
    }

    /// Client-side re-filter of the latest snapshots. No network call.
    pub async fn filter(&self, filter: HealthFilter) -> Vec<ClassifiedRoute> {
        self.classified()
            .await
            .into_iter()
            .filter(|route| filter.matches(route.health))
            .collect()
    }

    pub async fn top_by_traffic(&self, n: usize) -> Vec<ClassifiedRoute> {
        top_by_traffic(self.classified().await, n)
    }

    /// Fetch the history of one route and make it the selected history.
    ///
    /// While any history request is in flight, `is_history_loading()` is
    /// `true`. A response superseded by a newer request is returned to its
    /// caller but not stored.
    #[instrument(skip(self))]
    pub async fn load_history(&self, route_id: &str) -> ConsoleResult<Vec<RouteHistoryPoint>> {
        let seq = self.history_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::enter(&self.history_in_flight);

        let result = self.gateway.route_history(route_id).await;

        if self.group.is_cancelled() {
            return result;
        }
        if self.history_seq.load(Ordering::SeqCst) != seq {
            debug!(route_id, seq, "Discarding superseded history response");
            metrics::record_stale_response("history");
            return result;
        }

        let mut history = self.history.write().await;
        history.route_id = Some(route_id.to_string());
        match &result {
            Ok(points) => {
                history.points = points.clone();
                history.error = None;
            }
            Err(e) => {
                history.points.clear();
                history.error = Some(e.user_message());
            }
        }

        result
    }

    pub fn is_history_loading(&self) -> bool {
        self.history_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Currently selected history.
    pub async fn history(&self) -> RouteHistory {
        self.history.read().await.clone()
    }

    pub async fn shutdown(&self) {
        self.group.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::gateway::test_gateway;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot(route_id: &str, requests: u64, rejections: u64, limited: bool) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            route_id: route_id.to_string(),
            path: format!("/{route_id}/**"),
            total_requests: requests,
            total_rejections: rejections,
            with_rate_limit: limited,
            max_requests: limited.then_some(10),
            time_window_ms: limited.then_some(60_000),
        }
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(&snapshot("a", 100, 11, true)), HealthState::Critical);
        assert_eq!(classify(&snapshot("b", 100, 10, true)), HealthState::Warning);
        assert_eq!(classify(&snapshot("c", 100, 6, true)), HealthState::Warning);
        assert_eq!(classify(&snapshot("d", 100, 5, true)), HealthState::Healthy);
        assert_eq!(classify(&snapshot("e", 0, 0, true)), HealthState::Healthy);
    }

    #[test]
    fn test_classify_disabled_regardless_of_rate() {
        assert_eq!(classify(&snapshot("a", 100, 90, false)), HealthState::Disabled);
        assert_eq!(classify(&snapshot("b", 0, 0, false)), HealthState::Disabled);
    }

    #[test]
    fn test_top_by_traffic_is_stable() {
        let routes = vec![
            ClassifiedRoute::new(snapshot("first", 50, 0, true)),
            ClassifiedRoute::new(snapshot("busy", 500, 0, true)),
            ClassifiedRoute::new(snapshot("second", 50, 0, true)),
            ClassifiedRoute::new(snapshot("third", 50, 0, false)),
        ];

        let ids: Vec<String> = top_by_traffic(routes, 3)
            .into_iter()
            .map(|r| r.snapshot.route_id)
            .collect();
        assert_eq!(ids, vec!["busy", "first", "second"]);
    }

    async fn analytics_with_report(server: &MockServer) -> RateLimitAnalytics {
        Mock::given(method("GET"))
            .and(path("/metrics/ratelimit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "routes": [
                    {"routeId": "orders", "path": "/orders/**", "totalRequests": 200,
                     "totalRejections": 40, "withRateLimit": true, "maxRequests": 10, "timeWindowMs": 60000},
                    {"routeId": "users", "path": "/users/**", "totalRequests": 100,
                     "totalRejections": 7, "withRateLimit": true},
                    {"routeId": "static", "path": "/static/**", "totalRequests": 0,
                     "totalRejections": 0, "withRateLimit": false}
                ]
            })))
            .mount(server)
            .await;

        let (gateway, _) = test_gateway(&server.uri());
        let analytics = RateLimitAnalytics::start(&gateway);
        for _ in 0..100 {
            if !analytics.snapshots().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        analytics
    }

    #[tokio::test]
    async fn test_filter_and_summary() {
        let server = MockServer::start().await;
        let analytics = analytics_with_report(&server).await;

        let critical = analytics.filter(HealthFilter::Critical).await;
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].snapshot.route_id, "orders");

        let warning = analytics.filter(HealthFilter::Warning).await;
        assert_eq!(warning[0].snapshot.route_id, "users");

        let disabled = analytics.filter(HealthFilter::Disabled).await;
        assert_eq!(disabled[0].rejection_rate, 0.0);

        assert_eq!(analytics.filter(HealthFilter::All).await.len(), 3);

        let summary = analytics.summary().await;
        assert_eq!(summary.total_requests, 300);
        assert_eq!(summary.total_rejections, 47);

        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_loading_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/ratelimit/orders/history"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([
                        {"timestamp": "2025-01-01T10:00:00Z", "requests": 100, "rejections": 20},
                        {"timestamp": "2025-01-01T10:01:00Z", "requests": 0, "rejections": 0}
                    ]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let analytics = analytics_with_report(&server).await;
        assert!(!analytics.is_history_loading());

        let loader = analytics.clone();
        let handle = tokio::spawn(async move { loader.load_history("orders").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(analytics.is_history_loading());

        let points = handle.await.unwrap().unwrap();
        assert!(!analytics.is_history_loading());
        assert_eq!(points[0].accepted(), 80);
        assert_eq!(points[1].rejection_rate(), 0.0);

        let history = analytics.history().await;
        assert_eq!(history.route_id.as_deref(), Some("orders"));
        assert_eq!(history.points.len(), 2);

        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_failure_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/ratelimit/ghost/history"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (gateway, _) = test_gateway(&server.uri());
        let analytics = RateLimitAnalytics::start(&gateway);

        assert!(analytics.load_history("ghost").await.is_err());
        let history = analytics.history().await;
        assert!(history.points.is_empty());
        assert!(history.error.is_some());
        assert!(!analytics.is_history_loading());

        analytics.shutdown().await;
    }
}
