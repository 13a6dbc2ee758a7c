pub mod config;
pub mod error;
pub mod extract;
pub mod limit;
pub mod routes;
pub mod state;
pub mod templates;

pub use config::Config;
pub use routes::{app, RouteLimits};
pub use state::AppState;
