use serde::{Deserialize, Serialize};

/// Default rate limit attached when rate limiting is enabled on a route that
/// has never been configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Default rate-limit window in milliseconds.
pub const DEFAULT_TIME_WINDOW_MS: u64 = 60_000;

/// A routing rule as stored by the gateway.
///
/// Updates are always full-record replacements, so this struct is sent back
/// to the server exactly as held (minus the transient `highlighted` flag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Server-assigned identifier
    pub id: u64,
    /// Optional human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    /// Path pattern, always ending in `/**` once persisted
    pub predicates: String,
    /// Upstream target, always carrying an explicit scheme once persisted
    pub uri: String,
    #[serde(default)]
    pub with_ip_filter: bool,
    #[serde(default)]
    pub with_token: bool,
    #[serde(default)]
    pub with_rate_limit: bool,
    #[serde(default)]
    pub allowed_ips: Vec<AllowedIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    /// Set when the route is the target of a deep link. Never persisted.
    #[serde(skip)]
    pub highlighted: bool,
}

impl Route {
    /// Label shown for the route: its `routeId`, or `route-{id}` when absent.
    pub fn display_id(&self) -> String {
        match self.route_id.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("route-{}", self.id),
        }
    }

    /// Read one of the three security switches.
    pub fn flag(&self, flag: SecurityFlag) -> bool {
        match flag {
            SecurityFlag::IpFilter => self.with_ip_filter,
            SecurityFlag::Token => self.with_token,
            SecurityFlag::RateLimit => self.with_rate_limit,
        }
    }

    /// Rate limit in effect, if rate limiting is on and configured.
    pub fn active_rate_limit(&self) -> Option<&RateLimit> {
        self.rate_limit.as_ref().filter(|_| self.with_rate_limit)
    }

    /// Editable fields of this route, for an edit form or a re-submit.
    pub fn to_draft(&self) -> RouteDraft {
        RouteDraft {
            route_id: self.route_id.clone(),
            predicates: self.predicates.clone(),
            uri: self.uri.clone(),
            with_ip_filter: self.with_ip_filter,
            with_token: self.with_token,
            with_rate_limit: self.with_rate_limit,
            allowed_ips: self.allowed_ips.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }

    /// Apply a draft on top of this route, keeping its identity.
    pub fn with_draft(&self, draft: RouteDraft) -> Route {
        Route {
            id: self.id,
            route_id: draft.route_id,
            predicates: draft.predicates,
            uri: draft.uri,
            with_ip_filter: draft.with_ip_filter,
            with_token: draft.with_token,
            with_rate_limit: draft.with_rate_limit,
            allowed_ips: draft.allowed_ips,
            rate_limit: draft.rate_limit,
            highlighted: false,
        }
    }
}

/// A route before the server has assigned it an id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub predicates: String,
    pub uri: String,
    #[serde(default)]
    pub with_ip_filter: bool,
    #[serde(default)]
    pub with_token: bool,
    #[serde(default)]
    pub with_rate_limit: bool,
    #[serde(default)]
    pub allowed_ips: Vec<AllowedIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

impl RouteDraft {
    pub fn new(predicates: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            predicates: predicates.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_route_id(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.with_rate_limit = true;
        self.rate_limit = Some(rate_limit);
        self
    }
}

/// One entry of a route's IP allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedIp {
    /// Server-assigned id; absent for entries not yet persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub ip: String,
}

impl AllowedIp {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            id: None,
            ip: ip.into(),
        }
    }
}

/// Rate-limit settings of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub max_requests: u32,
    pub time_window_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            time_window_ms: DEFAULT_TIME_WINDOW_MS,
        }
    }
}

impl RateLimit {
    /// Short human summary, e.g. "10 requests / 60s".
    pub fn summary(&self) -> String {
        if self.time_window_ms % 1000 == 0 {
            format!(
                "{} requests / {}s",
                self.max_requests,
                self.time_window_ms / 1000
            )
        } else {
            format!(
                "{} requests / {}ms",
                self.max_requests, self.time_window_ms
            )
        }
    }
}

/// The three independent security switches of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityFlag {
    IpFilter,
    Token,
    RateLimit,
}

impl SecurityFlag {
    pub const ALL: [SecurityFlag; 3] = [
        SecurityFlag::IpFilter,
        SecurityFlag::Token,
        SecurityFlag::RateLimit,
    ];
}

impl std::fmt::Display for SecurityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityFlag::IpFilter => write!(f, "ip-filter"),
            SecurityFlag::Token => write!(f, "token"),
            SecurityFlag::RateLimit => write!(f, "rate-limit"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn route(id: u64) -> Route {
        Route {
            id,
            route_id: None,
            predicates: "/api/**".to_string(),
            uri: "http://backend:8080".to_string(),
            with_ip_filter: false,
            with_token: false,
            with_rate_limit: false,
            allowed_ips: vec![],
            rate_limit: None,
            highlighted: false,
        }
    }

    #[test]
    fn test_display_id_defaults_to_route_prefix() {
        assert_eq!(route(7).display_id(), "route-7");

        let labelled = Route {
            route_id: Some("orders".to_string()),
            ..route(7)
        };
        assert_eq!(labelled.display_id(), "orders");

        let blank = Route {
            route_id: Some("  ".to_string()),
            ..route(7)
        };
        assert_eq!(blank.display_id(), "route-7");
    }

    #[test]
    fn test_highlighted_is_never_serialized() {
        let r = Route {
            highlighted: true,
            ..route(1)
        };
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("highlighted").is_none());
        assert_eq!(json["withIpFilter"], false);
        assert!(json.get("rateLimit").is_none());
    }

    #[test]
    fn test_route_deserializes_with_missing_flags() {
        let json = r#"{"id": 3, "predicates": "/a/**", "uri": "http://a"}"#;
        let r: Route = serde_json::from_str(json).unwrap();

        assert!(!r.with_token);
        assert!(r.allowed_ips.is_empty());
        assert!(r.rate_limit.is_none());
        assert!(!r.highlighted);
    }

    #[test]
    fn test_active_rate_limit_requires_flag() {
        let configured = Route {
            rate_limit: Some(RateLimit::default()),
            ..route(1)
        };
        assert!(configured.active_rate_limit().is_none());

        let enabled = Route {
            with_rate_limit: true,
            ..configured
        };
        assert_eq!(enabled.active_rate_limit(), Some(&RateLimit::default()));
    }

    #[test]
    fn test_rate_limit_summary() {
        assert_eq!(RateLimit::default().summary(), "10 requests / 60s");
        let odd = RateLimit {
            max_requests: 3,
            time_window_ms: 1500,
        };
        assert_eq!(odd.summary(), "3 requests / 1500ms");
    }

    #[test]
    fn test_with_draft_keeps_identity() {
        let original = route(42);
        let draft = RouteDraft::new("/b/**", "https://b").with_route_id("b");
        let updated = original.with_draft(draft);

        assert_eq!(updated.id, 42);
        assert_eq!(updated.route_id.as_deref(), Some("b"));
        assert_eq!(updated.uri, "https://b");
    }
}
