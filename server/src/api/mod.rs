//! API server and routes

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
mod server;

pub use server::ApiServer;
