use std::collections::HashSet;

use serde::Serialize;

use crate::models::{Route, RouteDraft, SecurityFlag};

/// Rows per page.
pub const PAGE_SIZE: usize = 5;

/// User intent routed up from the list to the controller that owns the data.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    Refresh,
    Add(RouteDraft),
    Edit { id: u64, record: Route },
    Delete { id: u64 },
    Toggle { id: u64, flag: SecurityFlag },
    AddAllowedIp { id: u64, ip: String },
    RemoveAllowedIp { id: u64, ip: String },
}

/// What an expanded row reveals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetails {
    /// The three security switches, in display order
    pub switches: Vec<(SecurityFlag, bool)>,
    /// Allow-list chips, only when the IP filter is on
    pub allowed_ips: Option<Vec<String>>,
    /// Rate-limit summary, only when rate limiting is on and configured
    pub rate_limit: Option<String>,
}

impl RouteDetails {
    pub fn of(route: &Route) -> Self {
        Self {
            switches: SecurityFlag::ALL
                .iter()
                .map(|flag| (*flag, route.flag(*flag)))
                .collect(),
            allowed_ips: route
                .with_ip_filter
                .then(|| route.allowed_ips.iter().map(|e| e.ip.clone()).collect()),
            rate_limit: route.active_rate_limit().map(|rl| rl.summary()),
        }
    }
}

/// One visible row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRow {
    pub display_id: String,
    pub route: Route,
    pub highlighted: bool,
    pub expanded: bool,
    pub details: Option<RouteDetails>,
}

/// The current page of the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePage {
    pub rows: Vec<RouteRow>,
    /// 1-based page number
    pub page: usize,
    pub total_pages: usize,
    /// Number of routes matching the search
    pub total_items: usize,
}

/// Search, pagination and row-expansion state over a route snapshot.
///
/// Holds no routes of its own and never talks to the network; every method
/// that needs data takes the snapshot it should project.
#[derive(Debug, Clone)]
pub struct RouteListView {
    search: String,
    page: usize,
    expanded: HashSet<u64>,
    highlighted: Option<u64>,
}

impl Default for RouteListView {
    fn default() -> Self {
        Self {
            search: String::new(),
            page: 1,
            expanded: HashSet::new(),
            highlighted: None,
        }
    }
}

impl RouteListView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Change the search term. A changed term returns to page 1.
    pub fn set_search(&mut self, term: impl Into<String>) {
        let term = term.into();
        if term != self.search {
            self.search = term;
            self.page = 1;
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Jump to a 1-based page. Pages past the end render empty.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Routes matching the search term, in snapshot order.
    ///
    /// Matching is a case-insensitive substring test against `routeId`,
    /// `predicates` and `uri` concatenated.
    pub fn filtered<'a>(&self, routes: &'a [Route]) -> Vec<&'a Route> {
        let term = self.search.trim().to_lowercase();
        routes
            .iter()
            .filter(|route| term.is_empty() || search_text(route).contains(&term))
            .collect()
    }

    pub fn total_pages(&self, routes: &[Route]) -> usize {
        self.filtered(routes).len().div_ceil(PAGE_SIZE)
    }

    pub fn is_expanded(&self, id: u64) -> bool {
        self.expanded.contains(&id)
    }

    /// Flip one row's expansion. Returns the new state.
    pub fn toggle_expanded(&mut self, id: u64) -> bool {
        if self.expanded.remove(&id) {
            false
        } else {
            self.expanded.insert(id);
            true
        }
    }

    /// Forget the expansion state of a route that no longer exists.
    pub fn clear_expanded(&mut self, id: u64) {
        self.expanded.remove(&id);
    }

    pub fn highlighted(&self) -> Option<u64> {
        self.highlighted
    }

    /// Bring route `id` into view as a deep-link target.
    ///
    /// Marks it highlighted, clears a search that would hide it and moves to
    /// the page that contains it. Returns `false` if the route is not in the
    /// snapshot.
    pub fn focus(&mut self, routes: &[Route], id: u64) -> bool {
        if !routes.iter().any(|r| r.id == id) {
            return false;
        }

        self.highlighted = Some(id);
        if !self.filtered(routes).iter().any(|r| r.id == id) {
            self.search.clear();
        }

        if let Some(position) = self.filtered(routes).iter().position(|r| r.id == id) {
            self.page = position / PAGE_SIZE + 1;
        }
        true
    }

    pub fn clear_highlight(&mut self) {
        self.highlighted = None;
    }

    /// Project the current page of `routes`.
    pub fn render(&self, routes: &[Route]) -> RoutePage {
        let filtered = self.filtered(routes);
        let total_items = filtered.len();

        let rows = filtered
            .into_iter()
            .skip((self.page - 1).saturating_mul(PAGE_SIZE))
            .take(PAGE_SIZE)
            .map(|route| self.row(route))
            .collect();

        RoutePage {
            rows,
            page: self.page,
            total_pages: total_items.div_ceil(PAGE_SIZE),
            total_items,
        }
    }

    fn row(&self, route: &Route) -> RouteRow {
        let highlighted = route.highlighted || self.highlighted == Some(route.id);
        let expanded = self.is_expanded(route.id);
        RouteRow {
            display_id: route.display_id(),
            route: Route {
                highlighted,
                ..route.clone()
            },
            highlighted,
            expanded,
            details: expanded.then(|| RouteDetails::of(route)),
        }
    }
}

fn search_text(route: &Route) -> String {
    format!(
        "{}{}{}",
        route.route_id.as_deref().unwrap_or_default(),
        route.predicates,
        route.uri
    )
    .to_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::models::{AllowedIp, RateLimit};

    fn route(id: u64, predicates: &str) -> Route {
        Route {
            id,
            route_id: None,
            predicates: predicates.to_string(),
            uri: format!("http://svc-{id}"),
            with_ip_filter: false,
            with_token: false,
            with_rate_limit: false,
            allowed_ips: Vec::new(),
            rate_limit: None,
            highlighted: false,
        }
    }

    fn inventory(n: u64) -> Vec<Route> {
        (1..=n)
            .map(|id| {
                let prefix = if id % 2 == 0 { "/orders" } else { "/users" };
                route(id, &format!("{prefix}/{id}/**"))
            })
            .collect()
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let mut routes = inventory(3);
        routes[0].route_id = Some("Billing-API".to_string());

        let mut view = RouteListView::new();
        view.set_search("billing");
        assert_eq!(view.filtered(&routes).len(), 1);

        view.set_search("SVC-2");
        assert_eq!(view.filtered(&routes)[0].id, 2);

        view.set_search("ORDERS");
        assert_eq!(view.filtered(&routes).len(), 1);
    }

    #[test]
    fn test_search_is_idempotent() {
        let routes = inventory(12);
        let mut view = RouteListView::new();
        view.set_search("users");

        let once: Vec<Route> = view.filtered(&routes).into_iter().cloned().collect();
        let twice: Vec<u64> = view.filtered(&once).iter().map(|r| r.id).collect();
        let once_ids: Vec<u64> = once.iter().map(|r| r.id).collect();
        assert_eq!(once_ids, twice);
    }

    #[test]
    fn test_search_change_resets_page() {
        let routes = inventory(12);
        let mut view = RouteListView::new();
        view.set_page(3);
        assert_eq!(view.render(&routes).rows.len(), 2);

        view.set_search("users");
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn test_pages_partition_filtered_set() {
        let routes = inventory(12);
        let mut view = RouteListView::new();
        view.set_search("orders");

        let total_pages = view.total_pages(&routes);
        assert_eq!(total_pages, 2);

        let mut seen = Vec::new();
        for page in 1..=total_pages {
            view.set_page(page);
            let rendered = view.render(&routes);
            assert!(rendered.rows.len() <= PAGE_SIZE);
            seen.extend(rendered.rows.iter().map(|row| row.route.id));
        }

        let expected: Vec<u64> = view.filtered(&routes).iter().map(|r| r.id).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let routes = inventory(4);
        let mut view = RouteListView::new();
        view.set_page(9);

        let rendered = view.render(&routes);
        assert!(rendered.rows.is_empty());
        assert_eq!(rendered.total_pages, 1);
    }

    #[test]
    fn test_no_routes_means_zero_pages() {
        let view = RouteListView::new();
        assert_eq!(view.total_pages(&[]), 0);
    }

    #[test]
    fn test_expansion_is_per_row() {
        let routes = inventory(3);
        let mut view = RouteListView::new();

        assert!(view.toggle_expanded(2));
        let rendered = view.render(&routes);
        assert!(rendered.rows[1].expanded);
        assert!(!rendered.rows[0].expanded);
        assert!(rendered.rows[0].details.is_none());

        assert!(!view.toggle_expanded(2));
        assert!(!view.is_expanded(2));
    }

    #[test]
    fn test_details_reveal_conditional_sections() {
        let mut route = route(1, "/a/**");
        route.allowed_ips = vec![AllowedIp::new("10.0.0.1")];
        route.rate_limit = Some(RateLimit::default());

        // Flags off: both sections hidden even though data exists
        let details = RouteDetails::of(&route);
        assert!(details.allowed_ips.is_none());
        assert!(details.rate_limit.is_none());
        assert_eq!(details.switches.len(), 3);

        route.with_ip_filter = true;
        route.with_rate_limit = true;
        let details = RouteDetails::of(&route);
        assert_eq!(details.allowed_ips.unwrap(), vec!["10.0.0.1".to_string()]);
        assert_eq!(details.rate_limit.unwrap(), "10 requests / 60s");
    }

    #[test]
    fn test_rate_limit_without_block_has_no_summary() {
        let mut route = route(1, "/a/**");
        route.with_rate_limit = true;
        assert!(RouteDetails::of(&route).rate_limit.is_none());
    }

    #[test]
    fn test_focus_clears_hiding_search_and_jumps_to_page() {
        let routes = inventory(12);
        let mut view = RouteListView::new();
        view.set_search("users");

        assert!(view.focus(&routes, 12));
        assert_eq!(view.search(), "");
        assert_eq!(view.page(), 3);

        let rendered = view.render(&routes);
        let row = rendered.rows.iter().find(|r| r.route.id == 12).unwrap();
        assert!(row.highlighted);
        assert!(row.route.highlighted);
    }

    #[test]
    fn test_focus_keeps_matching_search() {
        let routes = inventory(12);
        let mut view = RouteListView::new();
        view.set_search("orders");

        assert!(view.focus(&routes, 12));
        assert_eq!(view.search(), "orders");
        assert_eq!(view.page(), 2);
    }

    #[test]
    fn test_clear_highlight() {
        let routes = inventory(2);
        let mut view = RouteListView::new();
        view.focus(&routes, 2);
        view.clear_highlight();

        assert!(view.render(&routes).rows.iter().all(|r| !r.highlighted));
    }

    #[test]
    fn test_focus_unknown_route() {
        let mut view = RouteListView::new();
        assert!(!view.focus(&inventory(2), 99));
        assert!(view.highlighted().is_none());
    }
}
