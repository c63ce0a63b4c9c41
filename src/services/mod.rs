//! Route management services.
//!
//! - [`RouteStore`] - Authoritative local cache of routes
//! - [`SecurityPolicyController`] - Security switches and IP allow-list

mod route_store;
mod security_policy;

pub use route_store::RouteStore;
pub use security_policy::{SecurityPolicyController, toggled};
