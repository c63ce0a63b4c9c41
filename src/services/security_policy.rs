use tracing::{info, instrument, warn};

use crate::error::{ConsoleError, ConsoleResult};
use crate::models::{AllowedIp, RateLimit, Route, SecurityFlag};
use crate::services::RouteStore;
use crate::validation::validate_ip;

/// Flips per-route security switches and manages the IP allow-list.
///
/// Every change is a full-record update through [`RouteStore::update`], so the
/// cache only moves after the server confirms. There is no local flip to roll
/// back when the write fails.
#[derive(Clone)]
pub struct SecurityPolicyController {
    store: RouteStore,
}

impl SecurityPolicyController {
    pub fn new(store: RouteStore) -> Self {
        Self { store }
    }

    /// Invert one security flag on `route` and persist the whole record.
    ///
    /// Enabling rate limiting on a route with no rate-limit block attaches the
    /// default (10 requests / 60s). Enabling the IP filter leaves
    /// `allowedIps` as it is, even when empty.
    #[instrument(skip(self, route, flag), fields(route_id = route.id, flag = %flag))]
    pub async fn toggle(&self, route: &Route, flag: SecurityFlag) -> ConsoleResult<Route> {
        let record = toggled(route, flag);
        let enabled = record.flag(flag);

        let updated = self.persist(record).await?;
        info!(enabled, "Security flag toggled");
        Ok(updated)
    }

    /// Add an address or CIDR block to the route's allow-list.
    ///
    /// Adding an entry that is already present is a no-op. The IP filter flag
    /// is not changed.
    #[instrument(skip(self, route), fields(route_id = route.id))]
    pub async fn add_allowed_ip(&self, route: &Route, ip: &str) -> ConsoleResult<Route> {
        validate_ip(ip)?;
        let ip = ip.trim();

        if route.allowed_ips.iter().any(|entry| entry.ip == ip) {
            return Ok(route.clone());
        }

        let mut record = route.clone();
        record.allowed_ips.push(AllowedIp::new(ip));
        self.persist(record).await
    }

    /// Remove an address from the route's allow-list.
    ///
    /// # Errors
    ///
    /// `NotFound` if the address is not on the list.
    #[instrument(skip(self, route), fields(route_id = route.id))]
    pub async fn remove_allowed_ip(&self, route: &Route, ip: &str) -> ConsoleResult<Route> {
        let ip = ip.trim();
        let mut record = route.clone();
        let before = record.allowed_ips.len();
        record.allowed_ips.retain(|entry| entry.ip != ip);

        if record.allowed_ips.len() == before {
            return Err(ConsoleError::NotFound(format!(
                "{ip} is not on the allow-list of {}",
                route.display_id()
            )));
        }

        self.persist(record).await
    }

    async fn persist(&self, record: Route) -> ConsoleResult<Route> {
        self.store
            .update(record.id, record)
            .await
            .map_err(as_persistence_error)
    }
}

/// Clone of `route` with `flag` inverted.
pub fn toggled(route: &Route, flag: SecurityFlag) -> Route {
    let mut record = route.clone();
    record.highlighted = false;
    match flag {
        SecurityFlag::IpFilter => record.with_ip_filter = !record.with_ip_filter,
        SecurityFlag::Token => record.with_token = !record.with_token,
        SecurityFlag::RateLimit => {
            record.with_rate_limit = !record.with_rate_limit;
            if record.with_rate_limit && record.rate_limit.is_none() {
                record.rate_limit = Some(RateLimit::default());
            }
        }
    }
    record
}

/// Failed policy writes are reported as persistence failures.
fn as_persistence_error(error: ConsoleError) -> ConsoleError {
    match error {
        ConsoleError::Validation(_)
        | ConsoleError::AuthExpired
        | ConsoleError::Persistence { .. } => error,
        other => {
            warn!(error = %other, "Security policy update failed");
            ConsoleError::persistence(None, None)
        }
    }
}
