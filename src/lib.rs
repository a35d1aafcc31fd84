pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use database::{StoreError, User, UserStore};
pub use error::ApiError;
pub use server::{app, app_with_config, serve, shutdown_signal, with_middleware};
