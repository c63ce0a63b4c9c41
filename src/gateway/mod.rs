//! HTTP client for the gateway's Route and Metrics API.
//!
//! Every outbound call made by the console goes through [`SessionGateway`],
//! which:
//!
//! - **Attaches credentials**: `Authorization: Bearer <token>` when the
//!   session holds a token, unauthenticated otherwise
//! - **Bounds latency**: every call is wrapped in the configured timeout
//! - **Handles expiry**: a 401 on any endpoint except login evicts the session
//!   and redirects to the login page, once
//! - **Classifies failures**: failed reads become `Fetch`, failed writes
//!   become `Persistence` carrying the server's message when there is one
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionGateway                         │
//! │  ┌─────────────────┐  ┌──────────────────────────────────┐  │
//! │  │ Session         │  │ Operations                       │  │
//! │  │ - token/profile │  │ - list/create/update/delete route│  │
//! │  │ - evict()       │  │ - request totals, minute buckets │  │
//! │  │ Navigator       │  │ - rate-limit report, history     │  │
//! │  │ - redirect_once │  │ - login / logout                 │  │
//! │  └─────────────────┘  └──────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - `session` - Credential storage and session lifecycle
//! - `navigator` - Navigation seam for the post-eviction redirect
//! - `params` - Request description (`ApiRequest`)

mod navigator;
mod params;
mod session;

use std::sync::Arc;
use std::time::Instant;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{ConsoleError, ConsoleResult};
use crate::metrics;
use crate::models::{
    MinuteMetrics, RateLimitReport, RequestTotals, Route, RouteDraft, RouteHistoryPoint,
};

// Re-exports for public API
pub use navigator::{MemoryNavigator, Navigator, redirect_once};
pub use params::{ApiRequest, RequestKind};
pub use session::{MemorySessionStorage, PROFILE_KEY, Session, SessionStorage, TOKEN_KEY};

// =============================================================================
// Constants
// =============================================================================

/// Longest plain-text error body shown to the operator as-is.
const MAX_PLAIN_ERROR_LEN: usize = 200;

/// Credentials posted to the login endpoint.
#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Body returned by the login endpoint.
#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

// =============================================================================
// SessionGateway
// =============================================================================

/// Authenticated client for the remote Route/Metrics API.
///
/// Cheap to clone; clones share the HTTP connection pool, the session and the
/// navigator.
#[derive(Clone)]
pub struct SessionGateway {
    http: reqwest::Client,
    config: Arc<Config>,
    session: Arc<Session>,
    navigator: Arc<dyn Navigator>,
}

impl SessionGateway {
    /// Create a gateway client.
    ///
    /// If the configuration carries a pre-issued token and the session holds
    /// none, the token is adopted.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::ConfigError` if the HTTP client cannot be built.
    pub fn new(
        config: Config,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
    ) -> ConsoleResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gateway-console/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConsoleError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        if let Some(token) = &config.api_token
            && !session.is_authenticated()
        {
            session.establish(token.clone(), None);
        }

        Ok(Self {
            http,
            config: Arc::new(config),
            session,
            navigator,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Core request path
    // =========================================================================

    /// Send a request, returning the successful response.
    ///
    /// The request is taken by `&mut` so a caller re-sending it after a 401
    /// does not trigger a second eviction.
    pub async fn execute(&self, request: &mut ApiRequest) -> ConsoleResult<Response> {
        let url = self.config.endpoint_url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let timeout = self.config.request_timeout;
        let started = Instant::now();
        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.transport_error(request, &e)),
            Err(_) => return Err(self.timeout_error(request)),
        };

        let status = response.status();
        metrics::record_request_duration(
            request.endpoint,
            request.method.as_str(),
            status.as_str(),
            started.elapsed().as_secs_f64(),
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(self.handle_unauthorized(request));
        }

        if !status.is_success() {
            let server_message = server_message(response).await;
            return Err(self.rejection(request, status, server_message));
        }

        Ok(response)
    }

    /// Send a request and decode its JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &mut ApiRequest,
    ) -> ConsoleResult<T> {
        let response = self.execute(request).await?;
        let bytes = response.bytes().await.map_err(|e| {
            ConsoleError::Fetch(format!("Failed to read {} body: {e}", request.path))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn is_login_endpoint(&self, path: &str) -> bool {
        path == self.config.login_endpoint
    }

    /// Handle a 401: evict and redirect once, unless it came from login.
    fn handle_unauthorized(&self, request: &mut ApiRequest) -> ConsoleError {
        if self.is_login_endpoint(&request.path) {
            return ConsoleError::LoginFailed("Invalid username or password".to_string());
        }

        if !request.mark_retried() {
            debug!(path = %request.path, "401 already handled for this request");
            return ConsoleError::AuthExpired;
        }

        self.session.evict();
        metrics::record_session_eviction();

        if redirect_once(self.navigator.as_ref(), &self.config.login_page) {
            info!(target_page = %self.config.login_page, "Redirected to login");
        }

        ConsoleError::AuthExpired
    }

    fn rejection(
        &self,
        request: &ApiRequest,
        status: StatusCode,
        server_message: Option<String>,
    ) -> ConsoleError {
        if self.is_login_endpoint(&request.path) {
            return ConsoleError::LoginFailed(
                server_message.unwrap_or_else(|| format!("Login rejected ({status})")),
            );
        }

        match request.kind {
            RequestKind::Read => ConsoleError::Fetch(format!(
                "{} {} returned {status}{}",
                request.method,
                request.path,
                server_message
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            )),
            RequestKind::Write => ConsoleError::persistence(Some(status.as_u16()), server_message),
        }
    }

    fn transport_error(&self, request: &ApiRequest, error: &reqwest::Error) -> ConsoleError {
        warn!(method = %request.method, path = %request.path, error = %error, "Request failed");
        match request.kind {
            RequestKind::Read => ConsoleError::Fetch(error.to_string()),
            RequestKind::Write => ConsoleError::persistence(
                None,
                Some("Unable to reach the gateway. The change was not saved.".to_string()),
            ),
        }
    }

    fn timeout_error(&self, request: &ApiRequest) -> ConsoleError {
        let timeout = self.config.request_timeout;
        warn!(method = %request.method, path = %request.path, ?timeout, "Request timed out");

        if self.is_login_endpoint(&request.path) {
            return ConsoleError::OperationTimeout(format!("Login timed out after {timeout:?}"));
        }
        match request.kind {
            RequestKind::Read => ConsoleError::Fetch(format!(
                "{} {} timed out after {timeout:?}",
                request.method, request.path
            )),
            RequestKind::Write => ConsoleError::persistence(
                None,
                Some("The gateway did not respond in time. The change may not have been saved.".to_string()),
            ),
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Sign in and store the returned token and profile.
    ///
    /// A rejected login leaves any existing session untouched.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ConsoleResult<()> {
        let mut request = ApiRequest::post(self.config.login_endpoint.clone(), "/auth/login")
            .with_json(&LoginRequest { username, password })?;

        let body: LoginResponse = self.execute_json(&mut request).await?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConsoleError::LoginFailed("The gateway did not return a token".to_string()))?;

        self.session.establish(token, body.user.as_ref());
        Ok(())
    }

    /// Clear the session.
    pub fn logout(&self) {
        self.session.teardown();
    }

    // =========================================================================
    // Route API
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn list_routes(&self) -> ConsoleResult<Vec<Route>> {
        self.execute_json(&mut ApiRequest::get("/routes", "/routes"))
            .await
    }

    #[instrument(skip(self, draft), fields(predicates = %draft.predicates))]
    pub async fn create_route(&self, draft: &RouteDraft) -> ConsoleResult<Route> {
        let mut request = ApiRequest::post("/routes", "/routes").with_json(draft)?;
        self.execute_json(&mut request).await
    }

    /// Replace a route with `route` (full record, not a patch).
    #[instrument(skip(self, route))]
    pub async fn update_route(&self, id: u64, route: &Route) -> ConsoleResult<Route> {
        let mut request = ApiRequest::put(format!("/routes/{id}"), "/routes/{id}").with_json(route)?;
        self.execute_json(&mut request).await
    }

    #[instrument(skip(self))]
    pub async fn delete_route(&self, id: u64) -> ConsoleResult<()> {
        self.execute(&mut ApiRequest::delete(format!("/routes/{id}"), "/routes/{id}"))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Metrics API
    // =========================================================================

    /// Lifetime request counters.
    pub async fn request_totals(&self) -> ConsoleResult<RequestTotals> {
        self.execute_json(&mut ApiRequest::get("/metrics/requests", "/metrics/requests"))
            .await
    }

    /// Current and previous minute buckets.
    pub async fn minute_metrics(&self) -> ConsoleResult<MinuteMetrics> {
        self.execute_json(&mut ApiRequest::get("/metrics/minutely", "/metrics/minutely"))
            .await
    }

    /// Per-route rate-limit snapshots.
    pub async fn rate_limit_report(&self) -> ConsoleResult<RateLimitReport> {
        self.execute_json(&mut ApiRequest::get("/metrics/ratelimit", "/metrics/ratelimit"))
            .await
    }

    /// Time-bucketed counters for one route.
    #[instrument(skip(self))]
    pub async fn route_history(&self, route_id: &str) -> ConsoleResult<Vec<RouteHistoryPoint>> {
        let mut request = ApiRequest::get(
            format!("/metrics/ratelimit/{}/history", encode_path_segment(route_id)?),
            "/metrics/ratelimit/{routeId}/history",
        );
        self.execute_json(&mut request).await
    }
}

/// Percent-encode `segment` so it stays a single path segment.
fn encode_path_segment(segment: &str) -> ConsoleResult<String> {
    let mut url = reqwest::Url::parse("http://localhost/")
        .map_err(|e| ConsoleError::Internal(format!("Failed to build path: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ConsoleError::Internal("Failed to build path".to_string()))?
        .clear()
        .push(segment);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Extract a human-readable message from an error response.
///
/// Looks for a `message` or `error` string in a JSON body, then falls back to
/// a short plain-text body.
async fn server_message(response: Response) -> Option<String> {
    let text = response.text().await.ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text) {
        return ["message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .filter(|m| !m.trim().is_empty());
    }

    (text.len() <= MAX_PLAIN_ERROR_LEN && !text.starts_with('<')).then(|| text.to_string())
}

/// Gateway against `base_url` with an empty in-memory session, positioned on
/// the routes page.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn test_gateway(base_url: &str) -> (SessionGateway, Arc<MemoryNavigator>) {
    test_gateway_with(Config {
        api_base_url: base_url.to_string(),
        ..Config::default()
    })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn test_gateway_with(config: Config) -> (SessionGateway, Arc<MemoryNavigator>) {
    let navigator = Arc::new(MemoryNavigator::new("/routes"));
    let gateway = SessionGateway::new(config, Arc::new(Session::in_memory()), navigator.clone())
        .expect("test gateway");
    (gateway, navigator)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> (SessionGateway, Arc<MemoryNavigator>) {
        test_gateway(&server.uri())
    }

    #[tokio::test]
    async fn test_bearer_attached_when_token_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/routes"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        gateway.session().establish("abc", None);

        let routes = gateway.list_routes().await.unwrap();
        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_request_has_no_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/requests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalRequests": 7})))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        let totals = gateway.request_totals().await.unwrap();
        assert_eq!(totals.total_requests, 7);

        let received = server.received_requests().await.unwrap();
        assert!(received.iter().all(|r| !r.headers.contains_key("authorization")));
    }

    #[tokio::test]
    async fn test_read_failure_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/minutely"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        let err = gateway.minute_metrics().await.unwrap_err();
        assert!(matches!(err, ConsoleError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_timeout_follows_request_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/requests"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/routes/3"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let (gateway, _) = test_gateway_with(Config {
            api_base_url: server.uri(),
            request_timeout: Duration::from_millis(200),
            ..Config::default()
        });

        let err = gateway.request_totals().await.unwrap_err();
        assert!(matches!(err, ConsoleError::Fetch(_)));

        let err = gateway.delete_route(3).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Persistence { status: None, .. }));
    }

    #[tokio::test]
    async fn test_history_route_id_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/ratelimit/orders%2Fv2%3Fbeta%231/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        let points = gateway.route_history("orders/v2?beta#1").await.unwrap();
        assert!(points.is_empty());
        assert_eq!(encode_path_segment("orders").unwrap(), "orders");
    }

    #[tokio::test]
    async fn test_write_rejection_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/routes/9"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"message": "Route is in use"})),
            )
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        match gateway.delete_route(9).await.unwrap_err() {
            ConsoleError::Persistence { status, message } => {
                assert_eq!(status, Some(409));
                assert_eq!(message, "Route is in use");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_401_evicts_and_redirects_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server);
        gateway
            .session()
            .establish("expired", Some(&json!({"username": "ops"})));

        let err = gateway.list_routes().await.unwrap_err();
        assert!(matches!(err, ConsoleError::AuthExpired));
        assert!(!gateway.session().is_authenticated());
        assert!(gateway.session().profile().is_none());

        // A second protected 401 does not navigate again
        let err = gateway.list_routes().await.unwrap_err();
        assert!(matches!(err, ConsoleError::AuthExpired));
        assert_eq!(navigator.history(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_resent_request_not_handled_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        let mut request = ApiRequest::get("/routes", "/routes");

        let _ = gateway.execute(&mut request).await;
        assert!(request.is_retried());
        assert_eq!(gateway.session().evictions(), 1);

        let _ = gateway.execute(&mut request).await;
        assert_eq!(gateway.session().evictions(), 1);
    }

    #[tokio::test]
    async fn test_login_401_does_not_evict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server);
        gateway.session().establish("still-valid", None);

        let err = gateway.login("ops", "wrong").await.unwrap_err();
        assert!(matches!(err, ConsoleError::LoginFailed(_)));
        assert_eq!(gateway.session().token().as_deref(), Some("still-valid"));
        assert!(navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_login_stores_token_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "fresh",
                "user": {"username": "ops", "role": "admin"}
            })))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server);
        gateway.login("ops", "secret").await.unwrap();

        assert_eq!(gateway.session().token().as_deref(), Some("fresh"));
        assert_eq!(gateway.session().profile().unwrap()["role"], "admin");

        gateway.logout();
        assert!(!gateway.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_config_token_seeds_session() {
        let config = Config {
            api_token: Some("preissued".to_string()),
            ..Config::default()
        };
        let gateway = SessionGateway::new(
            config,
            Arc::new(Session::in_memory()),
            Arc::new(MemoryNavigator::default()),
        )
        .unwrap();

        assert_eq!(gateway.session().token().as_deref(), Some("preissued"));
    }
}
