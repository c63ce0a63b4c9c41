//! Local validation and normalization of route records.
//!
//! Everything here runs before a request is built; a failure never reaches
//! the network.

use std::net::IpAddr;

use crate::error::{ConsoleError, ConsoleResult};
use crate::models::{AllowedIp, RateLimit, RouteDraft};

// =============================================================================
// Validation Constants
// =============================================================================

/// Suffix every persisted path pattern ends with.
pub const PREDICATE_SUFFIX: &str = "/**";

/// Scheme applied to upstream URIs that do not carry one.
pub const DEFAULT_SCHEME: &str = "http://";

/// Smallest accepted rate-limit window.
pub const MIN_TIME_WINDOW_MS: u64 = 1000;

/// Normalize a path pattern so it ends with `/**`.
///
/// - already ending in `/**`: unchanged
/// - ending in `/`: `**` is appended
/// - otherwise: `/**` is appended
pub fn normalize_predicates(predicates: &str) -> String {
    let predicates = predicates.trim();
    if predicates.ends_with(PREDICATE_SUFFIX) {
        predicates.to_string()
    } else if predicates.ends_with('/') {
        format!("{predicates}**")
    } else {
        format!("{predicates}{PREDICATE_SUFFIX}")
    }
}

/// Normalize an upstream URI so it carries an explicit lowercase `http://`
/// or `https://` scheme, defaulting to `http://`.
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    for scheme in ["http://", "https://"] {
        if let Some((prefix, rest)) = uri.split_at_checked(scheme.len())
            && prefix.eq_ignore_ascii_case(scheme)
        {
            return format!("{scheme}{rest}");
        }
    }
    format!("{DEFAULT_SCHEME}{uri}")
}

/// Validate a rate-limit block.
///
/// Rules:
/// - `maxRequests` must be at least 1
/// - `timeWindowMs` must be at least 1000
pub fn validate_rate_limit(rate_limit: &RateLimit) -> ConsoleResult<()> {
    if rate_limit.max_requests == 0 {
        return Err(ConsoleError::Validation(
            "Max requests must be a positive number".to_string(),
        ));
    }

    if rate_limit.time_window_ms < MIN_TIME_WINDOW_MS {
        return Err(ConsoleError::Validation(format!(
            "Time window must be at least {MIN_TIME_WINDOW_MS} ms (got {})",
            rate_limit.time_window_ms
        )));
    }

    Ok(())
}

/// Validate an allow-list entry: a single IPv4/IPv6 address or a CIDR block.
pub fn validate_ip(ip: &str) -> ConsoleResult<()> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(ConsoleError::Validation(
            "IP address cannot be empty".to_string(),
        ));
    }

    let invalid = || ConsoleError::Validation(format!("'{ip}' is not a valid IP address or CIDR block"));

    match ip.split_once('/') {
        Some((addr, prefix)) => {
            let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
            let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return Err(invalid());
            }
            Ok(())
        }
        None => ip.parse::<IpAddr>().map(|_| ()).map_err(|_| invalid()),
    }
}

/// Validate and normalize a new route before it is sent to the gateway.
///
/// Empty `predicates` or `uri` are rejected before normalization, since the
/// normalized form of an empty pattern would otherwise look valid. Every
/// allow-list entry is checked.
pub fn prepare_route(draft: RouteDraft) -> ConsoleResult<RouteDraft> {
    prepare(draft, &[])
}

/// Validate and normalize a full-record update of an existing route.
///
/// Allow-list entries already stored on the route (`stored`) are passed
/// through as the server holds them; only entries new to the record are
/// checked.
pub fn prepare_update(draft: RouteDraft, stored: &[AllowedIp]) -> ConsoleResult<RouteDraft> {
    prepare(draft, stored)
}

fn prepare(mut draft: RouteDraft, stored: &[AllowedIp]) -> ConsoleResult<RouteDraft> {
    if draft.predicates.trim().is_empty() {
        return Err(ConsoleError::Validation("Path is required".to_string()));
    }

    if draft.uri.trim().is_empty() {
        return Err(ConsoleError::Validation("URI is required".to_string()));
    }

    // A dormant block is kept as stored; it only matters once enabled
    if draft.with_rate_limit
        && let Some(rate_limit) = &draft.rate_limit
    {
        validate_rate_limit(rate_limit)?;
    }

    for entry in &draft.allowed_ips {
        if !stored.iter().any(|s| s.ip.trim() == entry.ip.trim()) {
            validate_ip(&entry.ip)?;
        }
    }

    draft.predicates = normalize_predicates(&draft.predicates);
    draft.uri = normalize_uri(&draft.uri);
    draft.route_id = draft
        .route_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    draft.allowed_ips = draft
        .allowed_ips
        .into_iter()
        .map(|entry| AllowedIp {
            ip: entry.ip.trim().to_string(),
            ..entry
        })
        .collect();

    Ok(draft)
}
