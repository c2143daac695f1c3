#![deny(missing_docs)]
//! Gemini Scout: a Telegram chat bot with AI chat, image analysis and web search.
//!
//! Shared logic for routing, providers and storage; the binary wires it to Telegram.

/// Telegram transport, routing and replies.
pub mod bot;
/// Configuration management.
pub mod config;
/// AI responder abstraction and the Gemini provider.
pub mod llm;
/// Log setup with secret redaction.
pub mod logging;
/// Web search providers.
pub mod search;
/// Session and history storage (R2/S3 or in-memory).
pub mod storage;
/// Utility functions.
pub mod utils;
