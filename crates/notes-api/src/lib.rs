//! Monitoring API: concurrent health probing and the HTTP endpoints the
//! dashboard polls (`/health`, `/health/all`, `/count`, `/stats`).

pub mod error;
pub mod handlers;
pub mod probe;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use probe::HealthMonitor;
pub use routes::{create_router, start_server};
pub use state::AppState;
