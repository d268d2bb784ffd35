//! Application HTTP server.
//!
//! Hosts the metrics endpoint and a few built-in handlers behind the request
//! interceptor.

mod listener;
mod routes;

pub use listener::AppServer;
pub use routes::Router;
