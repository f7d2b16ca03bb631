pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{AppState, ClinicaServer, ServerBuilder, build_app};
