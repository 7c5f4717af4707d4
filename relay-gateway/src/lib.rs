//! OpenAI-compatible HTTP surface hosting the relay dispatch core: request
//! authentication, configuration, error-to-HTTP mapping, an in-memory
//! reference repository, and the axum server assembly.

pub mod auth;
pub mod config;
pub mod echo_adapter;
pub mod gateway_error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod moderation;
pub mod repository;
pub mod server;
pub mod webhook;

pub use server::create_server;
