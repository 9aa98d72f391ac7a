pub mod dashboard_routes;
pub mod station_routes;
