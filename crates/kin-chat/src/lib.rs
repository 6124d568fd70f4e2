//! Chat core: membership guard, chat directory, message store façade and
//! the read-through cache in front of them.

mod convert;
pub mod directory;
pub mod error;
pub mod friends;
pub mod keys;
pub mod membership;
pub mod messages;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use tracing::error;
use uuid::Uuid;

use kin_cache::TtlCache;
use kin_db::Database;
use kin_types::models::{Chat, FriendProfile, Message};

pub use error::ChatError;
pub use messages::AppendedMessage;

/// Default lifetime of a cached read.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Values held by the chat read cache.
#[derive(Debug, Clone)]
pub enum Cached {
    Chats(Vec<Chat>),
    Messages(Vec<Message>),
    Friends(Vec<FriendProfile>),
}

/// Entry point for every chat operation, shared by the REST handlers and
/// the realtime gateway.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    cache: Arc<TtlCache<Cached>>,
    cache_ttl: Duration,
}

impl ChatService {
    pub fn new(db: Arc<Database>, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: Arc::new(TtlCache::new()),
            cache_ttl,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ChatError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
            })?
            .map_err(ChatError::Internal)
    }

    /// Store a read-through result loaded after `generation` was taken.
    /// Dropped if an invalidation ran meanwhile, since the load may predate it.
    fn cache_fill(&self, key: String, value: Cached, generation: u64) {
        self.cache.set_if_current(key, value, self.cache_ttl, generation);
    }

    /// Drop the chat-list and message-list entries of every member for `chat_id`.
    fn invalidate_chat(&self, chat_id: Uuid, members: impl IntoIterator<Item = Uuid>) {
        for member in members {
            self.cache.delete(&keys::chats_key(member));
            self.cache.delete(&keys::messages_key(member, chat_id));
        }
    }
}

/// Timestamp format stored in the database: RFC 3339, UTC, millisecond
/// precision, so string order is chronological order.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
