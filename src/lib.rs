pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod experiment;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod recommendation;
pub mod redis;
pub mod server;

pub use config::Config;
pub use error::{Result, ServiceError};
pub use server::create_app;
