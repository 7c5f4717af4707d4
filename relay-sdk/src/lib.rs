//! Request-dispatch core for a multi-tenant AI inference gateway: quota and
//! authorization gate, two-level load balancer with per-sub-provider rate
//! limiting and circuit breaking, the retry-with-exclusion dispatch loop, and
//! the accounting finalizer. No HTTP, no vendor wire formats — those live in
//! the gateway crate that hosts this one.

pub mod accounting;
pub mod adapter;
pub mod capacity;
pub mod circuit_breaker;
pub mod common;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod gate;
pub mod health;
pub mod registry;
pub mod repository;
pub mod routing;

pub use error::CoreError;

pub type Result<T> = std::result::Result<T, CoreError>;
