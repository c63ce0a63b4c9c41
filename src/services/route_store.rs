use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConsoleError, ConsoleResult};
use crate::gateway::SessionGateway;
use crate::metrics;
use crate::models::{Route, RouteDraft};
use crate::validation::{prepare_route, prepare_update};

/// Local cache of routes, synchronized with the remote Route API.
///
/// The cache is only ever changed after the server confirms an operation,
/// and every mutation is followed by a full re-fetch so server-side defaults
/// show up locally.
///
/// Mutations are not serialized against each other; concurrent updates race
/// at the server and the re-fetch converges on whatever landed last.
#[derive(Clone)]
pub struct RouteStore {
    gateway: SessionGateway,
    routes: Arc<RwLock<Vec<Route>>>,
}

impl RouteStore {
    pub fn new(gateway: SessionGateway) -> Self {
        Self {
            gateway,
            routes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    /// Current cache contents.
    pub async fn snapshot(&self) -> Vec<Route> {
        self.routes.read().await.clone()
    }

    /// Cached route by id.
    pub async fn get(&self, id: u64) -> Option<Route> {
        self.routes.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }

    /// Fetch the full route collection and replace the cache with it.
    ///
    /// On failure the previous cache is kept and the error returned.
    #[instrument(skip(self))]
    pub async fn list(&self) -> ConsoleResult<Vec<Route>> {
        let routes = match self.gateway.list_routes().await {
            Ok(routes) => routes,
            Err(ConsoleError::Serialization(e)) => {
                return Err(ConsoleError::Fetch(format!("Unreadable route list: {e}")));
            }
            Err(e) => return Err(e),
        };

        let mut cache = self.routes.write().await;
        *cache = routes.clone();
        drop(cache);

        metrics::set_routes_tracked(routes.len());
        debug!(count = routes.len(), "Route cache replaced");
        Ok(routes)
    }

    /// Validate, normalize and create a route.
    ///
    /// # Errors
    ///
    /// `Validation` if `predicates` or `uri` is empty (nothing is sent), or
    /// the server's rejection otherwise.
    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: RouteDraft) -> ConsoleResult<Route> {
        let draft = prepare_route(draft)?;

        let created = self
            .gateway
            .create_route(&draft)
            .await
            .inspect_err(|_| metrics::record_route_mutation("create", "error"))?;
        metrics::record_route_mutation("create", "ok");
        info!(id = created.id, predicates = %created.predicates, "Route created");

        self.routes.write().await.push(created.clone());
        self.resync("create").await;

        Ok(created)
    }

    /// Replace route `id` with `record` (full record, not a patch).
    ///
    /// The record is normalized and validated like a new route, except for
    /// allow-list entries the server already holds for it (taken from the
    /// cache, or from `record` itself when the route is not cached).
    #[instrument(skip(self, record))]
    pub async fn update(&self, id: u64, record: Route) -> ConsoleResult<Route> {
        let stored = match self.get(id).await {
            Some(cached) => cached.allowed_ips,
            None => record.allowed_ips.clone(),
        };
        let draft = prepare_update(record.to_draft(), &stored)?;
        let record = Route {
            id,
            ..record.with_draft(draft)
        };

        let updated = self
            .gateway
            .update_route(id, &record)
            .await
            .inspect_err(|_| metrics::record_route_mutation("update", "error"))?;
        metrics::record_route_mutation("update", "ok");
        info!(id, "Route updated");

        {
            let mut cache = self.routes.write().await;
            if let Some(entry) = cache.iter_mut().find(|r| r.id == id) {
                *entry = updated.clone();
            }
        }
        self.resync("update").await;

        Ok(updated)
    }

    /// Delete route `id`. The cache entry goes only after the server confirms.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: u64) -> ConsoleResult<()> {
        self.gateway
            .delete_route(id)
            .await
            .inspect_err(|_| metrics::record_route_mutation("delete", "error"))?;
        metrics::record_route_mutation("delete", "ok");
        info!(id, "Route deleted");

        self.routes.write().await.retain(|r| r.id != id);
        self.resync("delete").await;

        Ok(())
    }

    /// Re-fetch after a confirmed mutation.
    ///
    /// A failed re-fetch keeps the locally applied result.
    async fn resync(&self, operation: &'static str) {
        if let Err(e) = self.list().await {
            warn!(operation, error = %e, "Re-fetch after mutation failed, keeping local result");
        }
    }
}
