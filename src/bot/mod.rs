/// Telegram command and message handlers
pub mod handlers;
/// Fixed reply texts and rendering
pub mod replies;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Routing and registration gating of inbound updates
pub mod router;

pub use router::{InboundUpdate, RegistrationPolicy, Router};
