use gemini_scout::bot::replies;
use gemini_scout::bot::router::{DownloadedFile, PhotoRef, PhotoSource};
use gemini_scout::bot::{InboundUpdate, RegistrationPolicy, Router};
use gemini_scout::llm::{AiResponder, ImageInput, LlmError};
use gemini_scout::search::{SearchError, SearchProvider, SearchResult};
use gemini_scout::storage::{HistoryLog, MemoryStorage, SessionStore};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct EchoResponder {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait::async_trait]
impl AiResponder for EchoResponder {
    async fn generate_text(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::ApiError("quota exceeded".to_string()));
        }
        Ok(Some(format!("echo: {prompt}")))
    }

    async fn generate_from_image(
        &self,
        _instruction: &str,
        image: ImageInput,
    ) -> Result<Option<String>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("a {}x{} picture", image.width, image.height)))
    }
}

struct FixedSearch {
    calls: AtomicUsize,
    results: Vec<SearchResult>,
}

impl FixedSearch {
    fn with_hits(count: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            results: (1..=count)
                .map(|i| SearchResult::new(format!("Result {i}"), format!("https://example.com/{i}")))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for FixedSearch {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Ignores the limit on purpose so the router's own cap is exercised.
        Ok(self.results.clone())
    }
}

struct PngPhotos {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PhotoSource for PngPhotos {
    async fn fetch(&self, photo: &PhotoRef) -> anyhow::Result<DownloadedFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bytes = Vec::new();
        RgbImage::new(photo.width, photo.height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(DownloadedFile {
            file_path: format!("photos/{}.png", photo.file_id),
            bytes,
        })
    }
}

struct Harness {
    storage: Arc<MemoryStorage>,
    responder: Arc<EchoResponder>,
    search: Arc<FixedSearch>,
    photos: PngPhotos,
    router: Router,
}

impl Harness {
    fn new(policy: RegistrationPolicy, responder: EchoResponder, search: FixedSearch) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let responder = Arc::new(responder);
        let search = Arc::new(search);
        let router = Router::new(
            storage.clone(),
            storage.clone(),
            responder.clone(),
            search.clone(),
        )
        .with_policy(policy);
        Self {
            storage,
            responder,
            search,
            photos: PngPhotos {
                calls: AtomicUsize::new(0),
            },
            router,
        }
    }

    fn gated() -> Self {
        Self::new(
            RegistrationPolicy::Required,
            EchoResponder::default(),
            FixedSearch::with_hits(5),
        )
    }

    async fn send(&self, chat_id: i64, text: &str) -> String {
        let update = InboundUpdate {
            chat_id,
            username: Some("alice".to_string()),
            text: Some(text.to_string()),
            photos: Vec::new(),
        };
        self.router.handle(&update, &self.photos).await
    }

    async fn send_photo(&self, chat_id: i64, caption: Option<&str>) -> String {
        let update = InboundUpdate {
            chat_id,
            username: None,
            text: caption.map(str::to_string),
            photos: vec![
                PhotoRef {
                    file_id: "small".to_string(),
                    width: 4,
                    height: 3,
                },
                PhotoRef {
                    file_id: "large".to_string(),
                    width: 16,
                    height: 12,
                },
            ],
        };
        self.router.handle(&update, &self.photos).await
    }

    fn provider_calls(&self) -> usize {
        self.responder.calls.load(Ordering::SeqCst)
            + self.search.calls.load(Ordering::SeqCst)
            + self.photos.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_registered_chat_is_answered_and_logged() -> anyhow::Result<()> {
    let h = Harness::gated();

    assert_eq!(h.send(42, "/register").await, replies::REGISTERED);
    let reply = h.send(42, "/chat What is Rust?").await;
    assert_eq!(reply, "echo: What is Rust?");

    let history = h.storage.entries(42).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "What is Rust?");
    assert_eq!(history[0].bot_reply, "echo: What is Rust?");
    Ok(())
}

#[tokio::test]
async fn test_unregistered_chat_is_gated_without_provider_calls() -> anyhow::Result<()> {
    let h = Harness::gated();

    assert_eq!(h.send(7, "hello there").await, replies::NOT_REGISTERED);
    assert_eq!(h.send(7, "/websearch rust").await, replies::NOT_REGISTERED);
    assert_eq!(h.send_photo(7, None).await, replies::NOT_REGISTERED);

    assert_eq!(h.provider_calls(), 0);
    assert!(h.storage.entries(7).await?.is_empty());
    assert!(h.storage.get_conversation(7).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_registration_is_permanent() -> anyhow::Result<()> {
    let h = Harness::gated();

    assert_eq!(h.send(1, "/register").await, replies::REGISTERED);
    assert_eq!(h.send(1, "/register").await, replies::ALREADY_REGISTERED);
    assert_eq!(h.send(1, "/start").await, replies::start_greeting(RegistrationPolicy::Required));
    assert!(h.storage.is_registered(1).await?);

    let record = h.storage.get_conversation(1).await?;
    assert_eq!(record.and_then(|r| r.username), Some("alice".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_photo_analysis_uses_largest_variant_and_records_it() -> anyhow::Result<()> {
    let h = Harness::gated();
    h.send(1, "/register").await;

    let reply = h.send_photo(1, Some("/chat ignore me")).await;
    assert_eq!(reply, replies::image_analysis("a 16x12 picture"));

    let record = h.storage.get_conversation(1).await?;
    let files = record.map(|r| r.files).unwrap_or_default();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_path, "photos/large.png");
    assert_eq!(files[0].description, "a 16x12 picture");
    assert!(h.storage.entries(1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_search_renders_top_three() {
    let h = Harness::gated();
    h.send(1, "/register").await;

    let reply = h.send(1, "/websearch   rust   async ").await;
    assert!(reply.starts_with("🌍 Top Search Results:"));
    assert!(reply.contains("Result 3"));
    assert!(!reply.contains("Result 4"));
    assert_eq!(reply.matches("🔗").count(), 3);
}

#[tokio::test]
async fn test_search_without_hits_says_so() {
    let h = Harness::new(
        RegistrationPolicy::Disabled,
        EchoResponder::default(),
        FixedSearch::with_hits(0),
    );

    assert_eq!(h.send(1, "/websearch nothing here").await, replies::NO_RESULTS);
}

#[tokio::test]
async fn test_failed_chat_reports_error_and_skips_history() -> anyhow::Result<()> {
    let h = Harness::new(
        RegistrationPolicy::Disabled,
        EchoResponder {
            calls: AtomicUsize::new(0),
            fail: true,
        },
        FixedSearch::with_hits(1),
    );

    let reply = h.send(1, "hello").await;
    assert!(reply.starts_with(replies::CHAT_ERROR_PREFIX));
    assert!(reply.contains("quota exceeded"));
    assert!(h.storage.entries(1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_disabled_policy_serves_unregistered_chats() {
    let h = Harness::new(
        RegistrationPolicy::Disabled,
        EchoResponder::default(),
        FixedSearch::with_hits(1),
    );

    assert_eq!(h.send(5, "hi").await, "echo: hi");
    assert!(!h.send(5, "/start").await.contains("/register"));
}

#[tokio::test]
async fn test_ungated_photo_creates_unregistered_record() -> anyhow::Result<()> {
    let h = Harness::new(
        RegistrationPolicy::Disabled,
        EchoResponder::default(),
        FixedSearch::with_hits(1),
    );

    let reply = h.send_photo(8, None).await;
    assert_eq!(reply, replies::image_analysis("a 16x12 picture"));

    let record = h.storage.get_conversation(8).await?;
    let Some(record) = record else {
        panic!("photo analysis should create a conversation record");
    };
    assert!(!record.registered);
    assert_eq!(record.files.len(), 1);
    assert_eq!(record.files[0].file_path, "photos/large.png");
    assert!(!h.storage.is_registered(8).await?);
    Ok(())
}
