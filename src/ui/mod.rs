pub mod dashboard;

pub use dashboard::{format_dashboard, format_project, DashboardView};
