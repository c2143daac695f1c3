//! Storage layer for conversation records and chat history
//!
//! Provides a persistent implementation using Cloudflare R2 / AWS S3 and an
//! in-process implementation for local runs and tests.

use crate::config::{Settings, STORAGE_CACHE_CAPACITY, STORAGE_CACHE_TTL_SECS};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting object into S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Description produced for one analyzed file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileAnalysis {
    /// Where the file was fetched from
    pub file_path: String,
    /// Generated description
    pub description: String,
    /// When the analysis was stored
    pub created_at: DateTime<Utc>,
}

/// Per-conversation record
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Telegram chat id
    pub chat_id: i64,
    /// Telegram username at registration time
    pub username: Option<String>,
    /// Set by `/register`; never reset
    #[serde(default)]
    pub registered: bool,
    /// When `/register` first succeeded
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
    /// File analyses in insertion order
    #[serde(default)]
    pub files: Vec<FileAnalysis>,
}

impl ConversationRecord {
    /// Create an empty, unregistered record
    #[must_use]
    pub const fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            username: None,
            registered: false,
            registered_at: None,
            files: Vec::new(),
        }
    }

    /// Mark the conversation as registered.
    ///
    /// Returns `false` when it already was; the existing record is left as is.
    pub fn mark_registered(&mut self, username: Option<String>) -> bool {
        if self.registered {
            return false;
        }
        self.registered = true;
        self.registered_at = Some(Utc::now());
        if username.is_some() {
            self.username = username;
        }
        true
    }

    /// Append a file analysis at the end of the list
    pub fn push_file(&mut self, file_path: String, description: String) {
        self.files.push(FileAnalysis {
            file_path,
            description,
            created_at: Utc::now(),
        });
    }
}

/// One logged chat exchange
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Telegram chat id
    pub chat_id: i64,
    /// Text sent to the AI responder
    pub user_message: String,
    /// Text replied to the user
    pub bot_reply: String,
    /// When the exchange was logged
    pub created_at: DateTime<Utc>,
}

/// Registration and file-analysis records keyed by conversation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the full record for a conversation
    async fn get_conversation(
        &self,
        chat_id: i64,
    ) -> Result<Option<ConversationRecord>, StorageError>;
    /// Whether `/register` has succeeded for this conversation
    async fn is_registered(&self, chat_id: i64) -> Result<bool, StorageError>;
    /// Register a conversation; returns `false` if it was already registered
    async fn register(&self, chat_id: i64, username: Option<String>)
        -> Result<bool, StorageError>;
    /// Append a file analysis, creating the record if needed
    async fn append_file_analysis(
        &self,
        chat_id: i64,
        file_path: String,
        description: String,
    ) -> Result<(), StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// Append-only log of chat exchanges
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryLog: Send + Sync {
    /// Append one exchange
    async fn append(
        &self,
        chat_id: i64,
        user_message: String,
        bot_reply: String,
    ) -> Result<(), StorageError>;
    /// All exchanges for a conversation, oldest first
    async fn entries(&self, chat_id: i64) -> Result<Vec<HistoryEntry>, StorageError>;
}

/// R2-backed storage implementation
pub struct R2Storage {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let cache = Cache::builder()
            .max_capacity(STORAGE_CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(STORAGE_CACHE_TTL_SECS))
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body_bytes = serde_json::to_string_pretty(data)?.into_bytes();

        // Write-through
        self.cache
            .insert(key.to_string(), Arc::new(body_bytes.clone()))
            .await;

        if let Err(e) = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body_bytes))
            .content_type("application/json")
            .send()
            .await
        {
            self.cache.invalidate(key).await;
            return Err(StorageError::S3Put(e.to_string()));
        }

        Ok(())
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        if let Some(cached_data) = self.cache.get(key).await {
            match serde_json::from_slice(&cached_data) {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    warn!("Cache deserialization failed for {}: {}", key, e);
                    self.cache.invalidate(key).await;
                }
            }
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();

                self.cache
                    .insert(key.to_string(), Arc::new(data.to_vec()))
                    .await;

                Ok(Some(serde_json::from_slice(&data)?))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    /// Load, modify and save a conversation record.
    ///
    /// Missing records start from [`ConversationRecord::new`].
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub async fn modify_conversation<F, R>(&self, chat_id: i64, modifier: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut ConversationRecord) -> R + Send,
    {
        let key = conversation_key(chat_id);
        let mut record = self
            .load_json(&key)
            .await?
            .unwrap_or_else(|| ConversationRecord::new(chat_id));
        let result = modifier(&mut record);
        self.save_json(&key, &record).await?;
        Ok(result)
    }
}

#[async_trait]
impl SessionStore for R2Storage {
    async fn get_conversation(
        &self,
        chat_id: i64,
    ) -> Result<Option<ConversationRecord>, StorageError> {
        self.load_json(&conversation_key(chat_id)).await
    }

    async fn is_registered(&self, chat_id: i64) -> Result<bool, StorageError> {
        Ok(self
            .get_conversation(chat_id)
            .await?
            .is_some_and(|record| record.registered))
    }

    async fn register(
        &self,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<bool, StorageError> {
        if self.is_registered(chat_id).await? {
            return Ok(false);
        }
        self.modify_conversation(chat_id, |record| record.mark_registered(username))
            .await
    }

    async fn append_file_analysis(
        &self,
        chat_id: i64,
        file_path: String,
        description: String,
    ) -> Result<(), StorageError> {
        self.modify_conversation(chat_id, |record| record.push_file(file_path, description))
            .await
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

#[async_trait]
impl HistoryLog for R2Storage {
    async fn append(
        &self,
        chat_id: i64,
        user_message: String,
        bot_reply: String,
    ) -> Result<(), StorageError> {
        let key = history_key(chat_id);
        let mut history: Vec<HistoryEntry> = self.load_json(&key).await?.unwrap_or_default();
        history.push(HistoryEntry {
            chat_id,
            user_message,
            bot_reply,
            created_at: Utc::now(),
        });
        self.save_json(&key, &history).await
    }

    async fn entries(&self, chat_id: i64) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(self
            .load_json(&history_key(chat_id))
            .await?
            .unwrap_or_default())
    }
}

/// In-process storage used when R2 is not configured
#[derive(Default)]
pub struct MemoryStorage {
    conversations: RwLock<HashMap<i64, ConversationRecord>>,
    history: RwLock<HashMap<i64, Vec<HistoryEntry>>>,
}

impl MemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn get_conversation(
        &self,
        chat_id: i64,
    ) -> Result<Option<ConversationRecord>, StorageError> {
        Ok(self.conversations.read().await.get(&chat_id).cloned())
    }

    async fn is_registered(&self, chat_id: i64) -> Result<bool, StorageError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(&chat_id)
            .is_some_and(|record| record.registered))
    }

    async fn register(
        &self,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<bool, StorageError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .entry(chat_id)
            .or_insert_with(|| ConversationRecord::new(chat_id));
        Ok(record.mark_registered(username))
    }

    async fn append_file_analysis(
        &self,
        chat_id: i64,
        file_path: String,
        description: String,
    ) -> Result<(), StorageError> {
        self.conversations
            .write()
            .await
            .entry(chat_id)
            .or_insert_with(|| ConversationRecord::new(chat_id))
            .push_file(file_path, description);
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), String> {
        debug!("In-memory storage is always reachable");
        Ok(())
    }
}

#[async_trait]
impl HistoryLog for MemoryStorage {
    async fn append(
        &self,
        chat_id: i64,
        user_message: String,
        bot_reply: String,
    ) -> Result<(), StorageError> {
        self.history
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .push(HistoryEntry {
                chat_id,
                user_message,
                bot_reply,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn entries(&self, chat_id: i64) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(self
            .history
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Object key of a conversation record
#[must_use]
pub fn conversation_key(chat_id: i64) -> String {
    format!("conversations/{chat_id}/record.json")
}

/// Object key of a conversation's chat history
#[must_use]
pub fn history_key(chat_id: i64) -> String {
    format!("conversations/{chat_id}/history.json")
}
