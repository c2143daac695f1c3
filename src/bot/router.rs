//! Message routing and session gating
//!
//! Every inbound update is classified into exactly one [`Route`], checked
//! against the [`RegistrationPolicy`] and handed to a single action. Actions
//! never let an error escape: whatever happens, [`Router::handle`] yields
//! exactly one reply text.

use crate::bot::replies;
use crate::config::{IMAGE_ANALYSIS_PROMPT, PROVIDER_TIMEOUT_SECS, SEARCH_MAX_RESULTS};
use crate::llm::{AiResponder, ImageInput, LlmError};
use crate::search::{SearchError, SearchProvider};
use crate::storage::{HistoryLog, SessionStore, StorageError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Whether gated actions require a prior `/register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Chat, image analysis and web search are refused until `/register`
    #[default]
    Required,
    /// Everything is open; `/register` only records the username
    Disabled,
}

/// One size variant of an attached photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    /// Transport file id used to download the variant
    pub file_id: String,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
}

/// Transport-neutral view of an incoming message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundUpdate {
    /// Conversation id
    pub chat_id: i64,
    /// Sender username, if any
    pub username: Option<String>,
    /// Message text (or photo caption)
    pub text: Option<String>,
    /// All size variants of an attached photo
    pub photos: Vec<PhotoRef>,
}

/// A downloaded attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Source reference stored alongside the analysis
    pub file_path: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

/// Downloads photo variants through the messaging transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Fetch the bytes of one photo variant
    async fn fetch(&self, photo: &PhotoRef) -> anyhow::Result<DownloadedFile>;
}

/// The single action chosen for an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/register`
    Register,
    /// `/start`
    StartGreeting,
    /// `/help`
    HelpRequest,
    /// `/chat <text>` or any other text
    ChatQuery(String),
    /// A photo, or `/analyze` without one
    ImageAnalysis(Option<PhotoRef>),
    /// `/websearch <query>`
    WebSearch(String),
}

impl Route {
    /// Classify an update. Photos win over text; unknown commands and plain
    /// text become chat queries.
    #[must_use]
    pub fn classify(update: &InboundUpdate) -> Self {
        if let Some(photo) = largest_photo(&update.photos) {
            return Self::ImageAnalysis(Some(photo.clone()));
        }

        let text = update.text.as_deref().unwrap_or_default();
        let Some((command, payload)) = split_command(text) else {
            return Self::ChatQuery(text.to_string());
        };

        match command.as_str() {
            "register" => Self::Register,
            "start" => Self::StartGreeting,
            "help" => Self::HelpRequest,
            "chat" => Self::ChatQuery(payload.to_string()),
            "websearch" => Self::WebSearch(join_query(payload)),
            "analyze" => Self::ImageAnalysis(None),
            _ => Self::ChatQuery(text.to_string()),
        }
    }

    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::StartGreeting => "start",
            Self::HelpRequest => "help",
            Self::ChatQuery(_) => "chat",
            Self::ImageAnalysis(_) => "image_analysis",
            Self::WebSearch(_) => "web_search",
        }
    }

    const fn is_gated(&self) -> bool {
        matches!(
            self,
            Self::ChatQuery(_) | Self::ImageAnalysis(_) | Self::WebSearch(_)
        )
    }

    const fn error_prefix(&self) -> &'static str {
        match self {
            Self::ImageAnalysis(_) => replies::IMAGE_ERROR_PREFIX,
            Self::WebSearch(_) => replies::SEARCH_ERROR_PREFIX,
            _ => replies::CHAT_ERROR_PREFIX,
        }
    }
}

/// Highest-resolution variant
fn largest_photo(photos: &[PhotoRef]) -> Option<&PhotoRef> {
    photos
        .iter()
        .max_by_key(|photo| u64::from(photo.width) * u64::from(photo.height))
}

/// Split `/command@bot payload` into the lowercase command and the payload
/// with its separating whitespace removed.
fn split_command(text: &str) -> Option<(String, &str)> {
    let rest = text.strip_prefix('/')?;
    let (token, payload) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let command = token.split('@').next().unwrap_or(token);
    if command.is_empty() {
        return None;
    }
    Some((command.to_lowercase(), payload.trim_start()))
}

fn join_query(payload: &str) -> String {
    payload.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Failures of a downstream call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// AI responder failure
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// Search provider failure
    #[error(transparent)]
    Search(#[from] SearchError),
    /// Session store or history log failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Attachment download failure
    #[error("Download failed: {0}")]
    Download(String),
    /// Attachment is not a decodable image
    #[error("Invalid image: {0}")]
    Image(#[from] image::ImageError),
    /// The call exceeded the provider timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The blocking decode task panicked or was cancelled
    #[error("Image decoding aborted: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),
}

impl From<anyhow::Error> for ProviderError {
    fn from(e: anyhow::Error) -> Self {
        Self::Download(format!("{e:#}"))
    }
}

/// Why an action did not produce its normal reply
#[derive(Debug, Error)]
pub enum RouteError {
    /// Gated action before `/register`
    #[error("conversation is not registered")]
    NotRegistered,
    /// `/chat` or `/websearch` without a payload
    #[error("missing argument for /{0}")]
    MissingArgument(&'static str),
    /// Image analysis without a photo
    #[error("no photo attached")]
    NoAttachment,
    /// A downstream call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RouteError {
    fn into_reply(self, route: &Route) -> String {
        match self {
            Self::NotRegistered => replies::NOT_REGISTERED.to_string(),
            Self::MissingArgument("websearch") => replies::SEARCH_USAGE.to_string(),
            Self::MissingArgument(_) => replies::CHAT_USAGE.to_string(),
            Self::NoAttachment => replies::NO_PHOTO.to_string(),
            Self::Provider(e) => format!("{}{e}", route.error_prefix()),
        }
    }
}

/// Classifies updates and runs the matching action
pub struct Router {
    sessions: Arc<dyn SessionStore>,
    history: Arc<dyn HistoryLog>,
    responder: Arc<dyn AiResponder>,
    search: Arc<dyn SearchProvider>,
    policy: RegistrationPolicy,
    timeout: Duration,
}

impl Router {
    /// Create a router with registration required and the default timeout
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        history: Arc<dyn HistoryLog>,
        responder: Arc<dyn AiResponder>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            sessions,
            history,
            responder,
            search,
            policy: RegistrationPolicy::default(),
            timeout: Duration::from_secs(PROVIDER_TIMEOUT_SECS),
        }
    }

    /// Set the registration gate
    #[must_use]
    pub fn with_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the timeout applied to each downstream call
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured registration gate
    #[must_use]
    pub const fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Handle one update and return the single reply to send.
    pub async fn handle(&self, update: &InboundUpdate, photos: &dyn PhotoSource) -> String {
        let route = Route::classify(update);
        let chat_id = update.chat_id;
        info!(chat_id, route = route.name(), "Dispatching update");

        match self.dispatch(&route, update, photos).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    RouteError::Provider(err) => {
                        warn!(chat_id, route = route.name(), error = %err, "Provider call failed");
                    }
                    other => debug!(chat_id, route = route.name(), reason = %other, "Short-circuited"),
                }
                e.into_reply(&route)
            }
        }
    }

    async fn dispatch(
        &self,
        route: &Route,
        update: &InboundUpdate,
        photos: &dyn PhotoSource,
    ) -> Result<String, RouteError> {
        match route {
            Route::ChatQuery(text) if text.trim().is_empty() => {
                return Err(RouteError::MissingArgument("chat"))
            }
            Route::WebSearch(query) if query.is_empty() => {
                return Err(RouteError::MissingArgument("websearch"))
            }
            _ => {}
        }

        if route.is_gated() {
            self.ensure_registered(update.chat_id).await?;
        }

        match route {
            Route::Register => self.register(update).await,
            Route::StartGreeting => Ok(replies::start_greeting(self.policy)),
            Route::HelpRequest => Ok(replies::help_text().to_string()),
            Route::ChatQuery(text) => self.chat(update.chat_id, text).await,
            Route::ImageAnalysis(photo) => {
                let photo = photo.as_ref().ok_or(RouteError::NoAttachment)?;
                self.analyze_image(update.chat_id, photo, photos).await
            }
            Route::WebSearch(query) => self.web_search(query).await,
        }
    }

    async fn ensure_registered(&self, chat_id: i64) -> Result<(), RouteError> {
        if self.policy == RegistrationPolicy::Disabled {
            return Ok(());
        }
        if self.bounded(self.sessions.is_registered(chat_id)).await? {
            Ok(())
        } else {
            Err(RouteError::NotRegistered)
        }
    }

    async fn register(&self, update: &InboundUpdate) -> Result<String, RouteError> {
        let created = self
            .bounded(self.sessions.register(update.chat_id, update.username.clone()))
            .await?;

        if created {
            info!(chat_id = update.chat_id, "Conversation registered");
            Ok(replies::REGISTERED.to_string())
        } else {
            Ok(replies::ALREADY_REGISTERED.to_string())
        }
    }

    async fn chat(&self, chat_id: i64, text: &str) -> Result<String, RouteError> {
        let reply = self
            .bounded(self.responder.generate_text(text))
            .await?
            .unwrap_or_else(|| replies::CHAT_FALLBACK.to_string());

        self.bounded(self.history.append(chat_id, text.to_string(), reply.clone()))
            .await?;

        Ok(reply)
    }

    async fn analyze_image(
        &self,
        chat_id: i64,
        photo: &PhotoRef,
        photos: &dyn PhotoSource,
    ) -> Result<String, RouteError> {
        let DownloadedFile { file_path, bytes } = self.bounded(photos.fetch(photo)).await?;
        let image = decode_image(bytes).await?;
        debug!(chat_id, width = image.width, height = image.height, "Photo decoded");

        let description = self
            .bounded(self.responder.generate_from_image(IMAGE_ANALYSIS_PROMPT, image))
            .await?
            .unwrap_or_else(|| replies::IMAGE_FALLBACK.to_string());

        self.bounded(
            self.sessions
                .append_file_analysis(chat_id, file_path, description.clone()),
        )
        .await?;

        Ok(replies::image_analysis(&description))
    }

    async fn web_search(&self, query: &str) -> Result<String, RouteError> {
        let mut results = self
            .bounded(self.search.search(query, SEARCH_MAX_RESULTS))
            .await?;
        results.truncate(SEARCH_MAX_RESULTS);
        debug!(provider = self.search.name(), hits = results.len(), "Search finished");

        if results.is_empty() {
            return Ok(replies::NO_RESULTS.to_string());
        }
        Ok(replies::search_results(&results))
    }

    /// Run a downstream call under the provider timeout
    async fn bounded<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>> + Send,
    ) -> Result<T, ProviderError>
    where
        ProviderError: From<E>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ProviderError::from),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }
}

/// Full decodes of large photos run on the blocking pool, off the async workers.
async fn decode_image(bytes: Vec<u8>) -> Result<ImageInput, ProviderError> {
    let decoded = tokio::task::spawn_blocking(move || ImageInput::decode(bytes)).await?;
    Ok(decoded?)
}
