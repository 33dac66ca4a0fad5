//! modsense — AI-assisted content moderation for chat communities.
//!
//! A two-tier pipeline: a deterministic pattern scan catches obvious
//! abuse instantly, an AI judge handles the rest (cached, failing open),
//! and per-community policy decides what enforcement actually runs.

pub mod admin;
pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod moderation;
pub mod storage;
pub mod transport;

pub use error::{Error, Result};
