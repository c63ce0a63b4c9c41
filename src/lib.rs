//! # Gateway Console
//!
//! Operator console core for a request-routing gateway, featuring:
//!
//! - **Route management**: cached route inventory kept in sync with the
//!   gateway's Route API, confirm-then-apply mutations with a full re-fetch
//! - **Security policy**: per-route IP filter, token and rate-limit switches,
//!   IP allow-list management
//! - **Traffic metrics**: independently polled counters with minute-over-minute
//!   trends, per-route rate-limit health and history
//! - **Session handling**: bearer token attach, eviction and a single redirect
//!   on expiry
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RouteConsole (actions → notifications)                     │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  RouteListView               │  MetricsPoller               │
//! │  SecurityPolicyController    │  RateLimitAnalytics          │
//! │  RouteStore                  │  (PollGroup loops)           │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  SessionGateway (bearer token, 401 eviction, timeouts)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gateway Route/Metrics API (HTTP)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gateway_console::{
//!     Config, MemoryNavigator, MetricsPoller, RouteConsole, Session, SessionGateway,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let gateway = SessionGateway::new(
//!         config,
//!         Arc::new(Session::in_memory()),
//!         Arc::new(MemoryNavigator::default()),
//!     )?;
//!
//!     let console = RouteConsole::new(gateway.clone());
//!     console.refresh().await;
//!
//!     let poller = MetricsPoller::start(&gateway);
//!     // ... read poller.snapshot().await ...
//!     poller.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod polling;
pub mod services;
pub mod utils;
pub mod validation;
pub mod views;

// Re-exports for convenience
pub use analytics::{ClassifiedRoute, RateLimitAnalytics, RouteHistory, classify};
pub use config::Config;
pub use console::RouteConsole;
pub use dashboard::{DashboardSnapshot, MetricsPoller, RouteInventory};
pub use error::{ConsoleError, ConsoleResult, Notification, NotificationLevel};
pub use gateway::{
    MemoryNavigator, MemorySessionStorage, Navigator, Session, SessionGateway, SessionStorage,
};
pub use services::{RouteStore, SecurityPolicyController};
pub use views::{RouteAction, RouteListView};
