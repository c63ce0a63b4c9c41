//! Traffic dashboard state refreshed by independent polling loops.
//!
//! [`MetricsPoller`] keeps three loops running, each on its own interval:
//!
//! - **minutely**: current/previous minute buckets (`GET /metrics/minutely`)
//! - **totals**: lifetime request counter (`GET /metrics/requests`)
//! - **routes**: route inventory counts (`GET /routes`)
//!
//! The loops do not coordinate with each other. Each result replaces its own
//! slot wholesale; a failed tick keeps the last good value. The route loop
//! fetches independently and never touches the `RouteStore` cache.
//!
//! # Lifecycle
//!
//! Loops start when the poller is created. Call `shutdown()` before dropping:
//!
//! ```rust,ignore
//! let poller = MetricsPoller::start(&gateway);
//! // ... read poller.snapshot().await ...
//! poller.shutdown().await;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::gateway::SessionGateway;
use crate::models::{MinuteMetrics, RequestTotals, Route, Trend};
use crate::polling::{PollGroup, PollSlot, SharedSlot};

/// Loop names used in logs and metrics labels.
pub mod loops {
    pub const MINUTELY: &str = "minutely";
    pub const TOTALS: &str = "totals";
    pub const ROUTES: &str = "routes";
    pub const RATE_LIMIT: &str = "ratelimit";
}

/// Route counts shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInventory {
    pub total: usize,
    pub with_ip_filter: usize,
    pub with_token: usize,
    pub with_rate_limit: usize,
}

impl RouteInventory {
    pub fn from_routes(routes: &[Route]) -> Self {
        Self {
            total: routes.len(),
            with_ip_filter: routes.iter().filter(|r| r.with_ip_filter).count(),
            with_token: routes.iter().filter(|r| r.with_token).count(),
            with_rate_limit: routes.iter().filter(|r| r.with_rate_limit).count(),
        }
    }
}

/// Point-in-time view of the dashboard.
///
/// Fields are `None` until their loop has produced a first good value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub minute: Option<MinuteMetrics>,
    pub requests_trend: Option<Trend>,
    pub rejections_trend: Option<Trend>,
    pub totals: Option<RequestTotals>,
    pub inventory: Option<RouteInventory>,
    /// Loops whose latest tick failed (their values are stale)
    pub failing_loops: Vec<&'static str>,
    /// Most recent successful update across all loops
    pub last_updated: Option<DateTime<Utc>>,
}

/// Polls global traffic counters and the route inventory.
///
/// Cheap to clone; clones share the same loops and state.
#[derive(Clone)]
pub struct MetricsPoller {
    minute: SharedSlot<MinuteMetrics>,
    totals: SharedSlot<RequestTotals>,
    inventory: SharedSlot<RouteInventory>,
    group: PollGroup,
}

impl MetricsPoller {
    /// Start the three loops with the intervals from the gateway's config.
    pub fn start(gateway: &SessionGateway) -> Self {
        let config = gateway.config();
        let poller = Self {
            minute: SharedSlot::default(),
            totals: SharedSlot::default(),
            inventory: SharedSlot::default(),
            group: PollGroup::new(),
        };

        let gw = gateway.clone();
        poller.group.spawn_loop(
            loops::MINUTELY,
            config.minute_poll_interval,
            poller.minute.clone(),
            move || {
                let gw = gw.clone();
                async move { gw.minute_metrics().await }
            },
        );

        let gw = gateway.clone();
        poller.group.spawn_loop(
            loops::TOTALS,
            config.totals_poll_interval,
            poller.totals.clone(),
            move || {
                let gw = gw.clone();
                async move { gw.request_totals().await }
            },
        );

        let gw = gateway.clone();
        poller.group.spawn_loop(
            loops::ROUTES,
            config.routes_poll_interval,
            poller.inventory.clone(),
            move || {
                let gw = gw.clone();
                async move {
                    let routes = gw.list_routes().await?;
                    Ok(RouteInventory::from_routes(&routes))
                }
            },
        );

        info!(
            minute_secs = config.minute_poll_interval.as_secs(),
            totals_secs = config.totals_poll_interval.as_secs(),
            routes_secs = config.routes_poll_interval.as_secs(),
            "Metrics poller started"
        );
        poller
    }

    /// Current dashboard values with trends derived from the minute buckets.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        let minute = self.minute.read().await.clone();
        let totals = self.totals.read().await.clone();
        let inventory = self.inventory.read().await.clone();

        let failing_loops = [
            (loops::MINUTELY, minute.last_error.is_some()),
            (loops::TOTALS, totals.last_error.is_some()),
            (loops::ROUTES, inventory.last_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, failing)| failing.then_some(name))
        .collect();

        let last_updated = [
            minute.last_updated,
            totals.last_updated,
            inventory.last_updated,
        ]
        .into_iter()
        .flatten()
        .max();

        DashboardSnapshot {
            requests_trend: minute.value.as_ref().map(MinuteMetrics::requests_trend),
            rejections_trend: minute.value.as_ref().map(MinuteMetrics::rejections_trend),
            minute: minute.value,
            totals: totals.value,
            inventory: inventory.value,
            failing_loops,
            last_updated,
        }
    }

    /// Raw minute slot, including its error state.
    pub async fn minute_slot(&self) -> PollSlot<MinuteMetrics> {
        self.minute.read().await.clone()
    }

    /// Stop all loops; no result is applied afterwards.
    pub async fn shutdown(&self) {
        self.group.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::test_gateway;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_inventory_counts_flags() {
        let routes: Vec<Route> = serde_json::from_value(json!([
            {"id": 1, "predicates": "/a/**", "uri": "http://a", "withToken": true},
            {"id": 2, "predicates": "/b/**", "uri": "http://b", "withToken": true, "withRateLimit": true},
            {"id": 3, "predicates": "/c/**", "uri": "http://c", "withIpFilter": true}
        ]))
        .unwrap();

        let inventory = RouteInventory::from_routes(&routes);
        assert_eq!(inventory.total, 3);
        assert_eq!(inventory.with_token, 2);
        assert_eq!(inventory.with_rate_limit, 1);
        assert_eq!(inventory.with_ip_filter, 1);
    }

    #[tokio::test]
    async fn test_snapshot_derives_trends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/minutely"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestsCurrentMinute": 10,
                "requestsPreviousMinute": 20,
                "rejectedCurrentMinute": 5,
                "rejectedPreviousMinute": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/metrics/requests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalRequests": 1234})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (gateway, _) = test_gateway(&server.uri());
        let poller = MetricsPoller::start(&gateway);

        let mut snapshot = poller.snapshot().await;
        for _ in 0..100 {
            if snapshot.minute.is_some()
                && snapshot.totals.is_some()
                && !snapshot.failing_loops.is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            snapshot = poller.snapshot().await;
        }
        poller.shutdown().await;

        assert_eq!(snapshot.requests_trend.unwrap().percent_change, -50);
        assert_eq!(snapshot.rejections_trend.unwrap().percent_change, 100);
        assert_eq!(snapshot.totals.unwrap().total_requests, 1234);
        assert!(snapshot.inventory.is_none());
        assert_eq!(snapshot.failing_loops, vec![loops::ROUTES]);
        assert!(snapshot.last_updated.is_some());
    }
}
