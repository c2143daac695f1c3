//! Fixed reply texts and reply rendering

use crate::bot::router::RegistrationPolicy;
use crate::search::SearchResult;
use std::fmt::Write;

/// Sent when a gated action is used before `/register`
pub const NOT_REGISTERED: &str = "⚠️ You need to register first using /register.";
/// Sent by `/register` for a new conversation
pub const REGISTERED: &str = "✅ Registration successful! You can now use the bot.";
/// Sent by `/register` for a known conversation
pub const ALREADY_REGISTERED: &str = "✅ You are already registered!";

/// Usage hint for `/chat` without a message
pub const CHAT_USAGE: &str = "❌ Please provide a message! Example: /chat Hello";
/// Usage hint for `/websearch` without a query
pub const SEARCH_USAGE: &str = "❌ Please provide a search query! Example: /websearch AI news";
/// Sent when image analysis is requested without a photo
pub const NO_PHOTO: &str = "❌ Please send an image for analysis!";
/// Sent when the search provider found nothing
pub const NO_RESULTS: &str = "❌ No results found. Try a different query.";

/// Used and logged when the model returns no usable chat text
pub const CHAT_FALLBACK: &str = "⚠️ Sorry, I couldn't generate a response.";
/// Stored and sent when the model returns no usable description
pub const IMAGE_FALLBACK: &str = "⚠️ Could not generate a description.";

/// Prefix of chat and registration failures
pub const CHAT_ERROR_PREFIX: &str = "⚠️ Error: ";
/// Prefix of image analysis failures
pub const IMAGE_ERROR_PREFIX: &str = "⚠️ Error processing image: ";
/// Prefix of web search failures
pub const SEARCH_ERROR_PREFIX: &str = "⚠️ Error fetching search results: ";

const HELP: &str = "Here are the available commands:\n\n\
/register - Register yourself to use the bot.\n\
/start - Start the bot and get an introduction.\n\
/help - Display available commands.\n\
/chat <message> - Chat with AI.\n\
/websearch <query> - Search the web for information.\n\
/analyze - Send an image for analysis.\n\n\
Just send a message or image, and the bot will assist you!";

/// Greeting for `/start`; mentions `/register` only when it is required
#[must_use]
pub fn start_greeting(policy: RegistrationPolicy) -> String {
    let mut text = String::from("Welcome to AI Chatbot! 🤖\n");
    if policy == RegistrationPolicy::Required {
        text.push_str("Please register first using /register.\n");
    }
    text.push_str("Type /help to see available commands.");
    text
}

/// Command list for `/help`
#[must_use]
pub const fn help_text() -> &'static str {
    HELP
}

/// Reply for a finished image analysis
#[must_use]
pub fn image_analysis(description: &str) -> String {
    format!("📷 Image Analysis:\n{description}")
}

/// Render search hits as title/link pairs in the given order
#[must_use]
pub fn search_results(results: &[SearchResult]) -> String {
    let mut output = String::from("🌍 Top Search Results:\n\n");
    for result in results {
        let _ = write!(output, "🔹 {}\n🔗 {}\n\n", result.title, result.link);
    }
    output.truncate(output.trim_end().len());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_results_layout() {
        let text = search_results(&[
            SearchResult::new("First", "https://a.example"),
            SearchResult::new("Second", "https://b.example"),
        ]);
        assert_eq!(
            text,
            "🌍 Top Search Results:\n\n🔹 First\n🔗 https://a.example\n\n🔹 Second\n🔗 https://b.example"
        );
    }

    #[test]
    fn test_start_greeting_depends_on_policy() {
        assert!(start_greeting(RegistrationPolicy::Required).contains("/register"));
        assert!(!start_greeting(RegistrationPolicy::Disabled).contains("/register"));
    }

    #[test]
    fn test_image_analysis_prefix() {
        assert_eq!(image_analysis("a cat"), "📷 Image Analysis:\na cat");
    }
}
