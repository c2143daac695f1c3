//! Concrete AI responder implementations

/// Google Gemini REST provider
pub mod gemini;

pub use gemini::GeminiProvider;
