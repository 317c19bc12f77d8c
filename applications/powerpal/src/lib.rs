pub mod aggregate;
pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod store;
pub mod telemetry;
pub mod ws;

// Re-export commonly used items
pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Device, DeviceStatus};
pub use store::{DocumentStore, InMemoryStore, PostgresStore};
pub use telemetry::{Analytics, Environment};
pub use ws::{ClientMessage, ServerMessage};
