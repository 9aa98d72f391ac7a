pub mod dashboard_service;

pub use dashboard_service::{DashboardError, DashboardOutcome, DashboardService};
