//! Route management controller.
//!
//! [`RouteConsole`] owns the route cache, the security policy controller and
//! the list view state. Actions routed up from the list are executed here;
//! their failures become dismissible notifications instead of propagating.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{ConsoleError, ConsoleResult, Notification};
use crate::gateway::SessionGateway;
use crate::models::Route;
use crate::services::{RouteStore, SecurityPolicyController};
use crate::views::{RouteAction, RouteListView, RoutePage};

/// Oldest notifications are dropped beyond this many.
const MAX_NOTIFICATIONS: usize = 50;

/// Parent controller of the route list.
///
/// Cheap to clone; clones share the cache, view state and notifications.
#[derive(Clone)]
pub struct RouteConsole {
    store: RouteStore,
    policy: SecurityPolicyController,
    view: Arc<RwLock<RouteListView>>,
    notifications: Arc<RwLock<VecDeque<Notification>>>,
}

impl RouteConsole {
    pub fn new(gateway: SessionGateway) -> Self {
        let store = RouteStore::new(gateway);
        Self {
            policy: SecurityPolicyController::new(store.clone()),
            store,
            view: Arc::default(),
            notifications: Arc::default(),
        }
    }

    pub fn store(&self) -> &RouteStore {
        &self.store
    }

    /// Reload the route list. Returns whether it succeeded.
    pub async fn refresh(&self) -> bool {
        self.dispatch(RouteAction::Refresh).await
    }

    /// Execute an action from the list view.
    ///
    /// Returns whether it succeeded; failures are queued as notifications.
    #[instrument(skip(self, action))]
    pub async fn dispatch(&self, action: RouteAction) -> bool {
        match self.execute(action).await {
            Ok(Some(message)) => {
                self.notify(Notification::info(message)).await;
                true
            }
            Ok(None) => true,
            Err(e) => {
                self.report(&e).await;
                false
            }
        }
    }

    async fn execute(&self, action: RouteAction) -> ConsoleResult<Option<String>> {
        match action {
            RouteAction::Refresh => {
                self.store.list().await?;
                Ok(None)
            }
            RouteAction::Add(draft) => {
                let route = self.store.create(draft).await?;
                Ok(Some(format!("Route {} created", route.display_id())))
            }
            RouteAction::Edit { id, record } => {
                let route = self.store.update(id, record).await?;
                Ok(Some(format!("Route {} saved", route.display_id())))
            }
            RouteAction::Delete { id } => {
                let label = self.store.get(id).await.map(|r| r.display_id());
                self.store.remove(id).await?;
                self.view.write().await.clear_expanded(id);
                Ok(Some(format!(
                    "Route {} deleted",
                    label.unwrap_or_else(|| format!("route-{id}"))
                )))
            }
            RouteAction::Toggle { id, flag } => {
                let route = self.cached(id).await?;
                let updated = self.policy.toggle(&route, flag).await?;
                let state = if updated.flag(flag) { "enabled" } else { "disabled" };
                Ok(Some(format!("{flag} {state} on {}", updated.display_id())))
            }
            RouteAction::AddAllowedIp { id, ip } => {
                let route = self.cached(id).await?;
                self.policy.add_allowed_ip(&route, &ip).await?;
                Ok(Some(format!("{} added to the allow-list", ip.trim())))
            }
            RouteAction::RemoveAllowedIp { id, ip } => {
                let route = self.cached(id).await?;
                self.policy.remove_allowed_ip(&route, &ip).await?;
                Ok(Some(format!("{} removed from the allow-list", ip.trim())))
            }
        }
    }

    async fn cached(&self, id: u64) -> ConsoleResult<Route> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| ConsoleError::NotFound(format!("Route {id} is not loaded")))
    }

    // =========================================================================
    // View state
    // =========================================================================

    /// Current page of the list.
    pub async fn render(&self) -> RoutePage {
        let routes = self.store.snapshot().await;
        self.view.read().await.render(&routes)
    }

    pub async fn set_search(&self, term: &str) {
        self.view.write().await.set_search(term);
    }

    pub async fn set_page(&self, page: usize) {
        self.view.write().await.set_page(page);
    }

    pub async fn toggle_expanded(&self, id: u64) -> bool {
        self.view.write().await.toggle_expanded(id)
    }

    /// Bring a deep-linked route into view. Unknown ids are reported.
    pub async fn focus(&self, id: u64) -> bool {
        let routes = self.store.snapshot().await;
        let found = self.view.write().await.focus(&routes, id);
        if !found {
            self.report(&ConsoleError::NotFound(format!("Route {id} does not exist")))
                .await;
        }
        found
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    async fn report(&self, error: &ConsoleError) {
        match error.to_notification() {
            Some(notification) => self.notify(notification).await,
            None => debug!(error = %error, "Error handled without notification"),
        }
    }

    async fn notify(&self, notification: Notification) {
        let mut queue = self.notifications.write().await;
        queue.push_back(notification);
        while queue.len() > MAX_NOTIFICATIONS {
            queue.pop_front();
        }
    }

    /// Pending notifications, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.iter().cloned().collect()
    }

    /// Dismiss one notification. Returns whether it existed.
    pub async fn dismiss(&self, id: Uuid) -> bool {
        let mut queue = self.notifications.write().await;
        let before = queue.len();
        queue.retain(|n| n.id != id);
        queue.len() != before
    }

    /// Take every pending notification.
    pub async fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications.write().await.drain(..).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::NotificationLevel;
    use crate::gateway::test_gateway;
    use crate::models::{RouteDraft, SecurityFlag};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_validation_failure_becomes_warning() {
        let server = MockServer::start().await;
        let console = RouteConsole::new(test_gateway(&server.uri()).0);

        let ok = console
            .dispatch(RouteAction::Add(RouteDraft::new("/api", "")))
            .await;
        assert!(!ok);

        let notes = console.notifications().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Warning);
        assert_eq!(notes[0].message, "URI is required");

        assert!(console.dismiss(notes[0].id).await);
        assert!(!console.dismiss(notes[0].id).await);
        assert!(console.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_notified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (gateway, navigator) = test_gateway(&server.uri());
        gateway.session().establish("old", None);
        let console = RouteConsole::new(gateway);

        assert!(!console.refresh().await);
        assert!(console.notifications().await.is_empty());
        assert_eq!(navigator.history(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_toggle_unknown_route_is_reported() {
        let server = MockServer::start().await;
        let console = RouteConsole::new(test_gateway(&server.uri()).0);

        let ok = console
            .dispatch(RouteAction::Toggle {
                id: 42,
                flag: SecurityFlag::Token,
            })
            .await;
        assert!(!ok);
        assert_eq!(
            console.drain_notifications().await[0].level,
            NotificationLevel::Error
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_and_focus() {
        let server = MockServer::start().await;
        let routes: Vec<_> = (1..=7)
            .map(|id| json!({"id": id, "predicates": format!("/r{id}/**"), "uri": "http://up"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(routes))
            .mount(&server)
            .await;

        let console = RouteConsole::new(test_gateway(&server.uri()).0);
        assert!(console.refresh().await);

        assert!(console.focus(7).await);
        let page = console.render().await;
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
        assert!(page.rows.iter().any(|r| r.route.id == 7 && r.highlighted));

        assert!(!console.focus(99).await);
        assert_eq!(console.notifications().await.len(), 1);
    }
}
