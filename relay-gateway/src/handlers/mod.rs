//! # Request Handlers
//!
//! Every OpenAI-compatible endpoint follows the same pipeline — authenticate,
//! authorize, dispatch, account — so each handler module is a thin wrapper
//! around [`pipeline::handle`] naming its own endpoint path and whether
//! moderation applies. Vendor request/response shapes are a non-goal (spec.md
//! §1): the body is passed through as an opaque JSON value, the only field
//! the pipeline itself inspects is `model`.

pub mod admin;
pub mod audio;
pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod images;
pub mod models;
pub mod moderations;
pub mod pipeline;
