use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gateway_console::models::HealthFilter;
use gateway_console::utils::{self, ExitOnLoginNavigator, ShutdownReason};
use gateway_console::{
    Config, MetricsPoller, NotificationLevel, RateLimitAnalytics, RouteConsole, Session,
    SessionGateway, metrics,
};

/// Location the watcher reports from; anything but the login page.
const HOME_PAGE: &str = "/dashboard";

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before the subscriber so .env values for RUST_LOG/LOG_FORMAT apply
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info", false);
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };
    init_tracing(&config.log_level, config.log_json);

    info!(
        "Starting Gateway Console watcher v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Run the watcher, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        api = %config.api_base_url,
        report_secs = config.report_interval.as_secs(),
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let session_lost = CancellationToken::new();
    let navigator = Arc::new(ExitOnLoginNavigator::new(
        HOME_PAGE,
        config.login_page.clone(),
        session_lost.clone(),
    ));
    let top_routes = config.top_routes;
    let report_interval = config.report_interval;

    let gateway = SessionGateway::new(config, Arc::new(Session::in_memory()), navigator)
        .map_err(|e| {
            error!("Failed to create gateway client: {e}");
            exitcode::SOFTWARE
        })?;

    authenticate(&gateway).await.map_err(|e| {
        error!("Authentication failed: {e:#}");
        exitcode::NOPERM
    })?;

    let console = RouteConsole::new(gateway.clone());
    if console.refresh().await {
        info!(routes = console.store().len().await, "Route list loaded");
    } else if session_lost.is_cancelled() {
        error!("Session rejected by the gateway");
        return Err(exitcode::NOPERM);
    } else {
        warn!("Initial route list unavailable, continuing with polling");
    }
    log_notifications(&console).await;

    let poller = MetricsPoller::start(&gateway);
    let analytics = RateLimitAnalytics::start(&gateway);

    let shutdown = utils::shutdown_signal(session_lost.clone());
    tokio::pin!(shutdown);

    let mut ticker = interval(report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // Skip the first immediate tick, loops are still warming up

    let reason = loop {
        tokio::select! {
            reason = &mut shutdown => break reason,
            _ = ticker.tick() => report(&poller, &analytics, top_routes).await,
        }
    };

    info!("Stopping polling loops...");
    poller.shutdown().await;
    analytics.shutdown().await;

    if reason == ShutdownReason::SessionExpired {
        error!("Session expired while watching");
        return Err(exitcode::NOPERM);
    }

    gateway.logout();
    info!("Watcher shutdown complete");
    Ok(())
}

/// Make sure the session holds a token, logging in when credentials are set.
async fn authenticate(gateway: &SessionGateway) -> anyhow::Result<()> {
    if gateway.session().is_authenticated() {
        info!("Using pre-issued token");
        return Ok(());
    }

    let config = gateway.config();
    match (config.username.as_deref(), config.password.as_deref()) {
        (Some(username), Some(password)) => gateway
            .login(username, password)
            .await
            .with_context(|| format!("Login as '{username}' failed")),
        _ => bail!("No credentials: set CONSOLE_TOKEN or CONSOLE_USERNAME/CONSOLE_PASSWORD"),
    }
}

/// Log the dashboard: trends, top routes and routes that need attention.
async fn report(poller: &MetricsPoller, analytics: &RateLimitAnalytics, top_routes: usize) {
    let snapshot = poller.snapshot().await;

    let trend = |t: Option<gateway_console::models::Trend>| {
        t.map(|t| t.to_string()).unwrap_or_else(|| "n/a".to_string())
    };
    info!(
        requests_this_minute = %trend(snapshot.requests_trend),
        rejected_this_minute = %trend(snapshot.rejections_trend),
        total_requests = snapshot.totals.as_ref().map(|t| t.total_requests),
        routes = snapshot.inventory.map(|i| i.total),
        "Traffic"
    );
    if !snapshot.failing_loops.is_empty() {
        warn!(loops = ?snapshot.failing_loops, "Showing stale values");
    }

    if let Some(e) = analytics.report_slot().await.last_error {
        warn!(error = %e, "Rate-limit snapshot is stale");
    }

    let summary = analytics.summary().await;
    info!(
        total_requests = summary.total_requests,
        total_rejections = summary.total_rejections,
        rejection_rate = %format!("{:.1}%", summary.rejection_rate),
        "Rate limiting"
    );

    for (rank, route) in analytics
        .top_by_traffic(top_routes)
        .await
        .iter()
        .enumerate()
    {
        info!(
            rank = rank + 1,
            route = %route.snapshot.route_id,
            requests = route.snapshot.total_requests,
            health = %route.health,
            "Top route"
        );
    }

    for filter in [HealthFilter::Critical, HealthFilter::Warning] {
        for route in analytics.filter(filter).await {
            warn!(
                route = %route.snapshot.route_id,
                path = %route.snapshot.path,
                rejection_rate = %format!("{:.1}%", route.rejection_rate),
                health = %route.health,
                "Route rejecting traffic"
            );
        }
    }
}

async fn log_notifications(console: &RouteConsole) {
    for note in console.drain_notifications().await {
        match note.level {
            NotificationLevel::Info => info!("{}", note.message),
            NotificationLevel::Warning => warn!("{}", note.message),
            NotificationLevel::Error => error!("{}", note.message),
        }
    }
}
