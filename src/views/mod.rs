//! Pure projections over cached data.

mod route_list;

pub use route_list::{PAGE_SIZE, RouteAction, RouteDetails, RouteListView, RoutePage, RouteRow};
