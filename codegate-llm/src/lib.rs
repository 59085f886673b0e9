//! Codegate LLM - Chat-completions reviewer for codegate
//!
//! This crate provides a [`codegate_core::Reviewer`] that talks to any
//! endpoint speaking the OpenAI chat-completions format, which covers every
//! provider codegate supports.

pub mod client;
pub mod error;
mod wire;

pub use client::ChatReviewer;
pub use error::{Error, Result};
