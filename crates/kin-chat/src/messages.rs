use tracing::debug;
use uuid::Uuid;

use kin_types::models::Message;

use crate::membership::ensure_member;
use crate::{Cached, ChatError, ChatService, convert, keys, now_timestamp};

/// A freshly persisted message plus the chat's members at send time, so
/// callers can fan it out without another lookup.
#[derive(Debug, Clone)]
pub struct AppendedMessage {
    pub message: Message,
    pub members: Vec<Uuid>,
}

impl ChatService {
    /// Persist a message from `sender` into `chat_id`.
    ///
    /// The sender must be a member at the time of the call. On success the
    /// chat's latest-message pointer references the new message and every
    /// member's cached chat list and message list for this chat is dropped.
    pub async fn append_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &str,
    ) -> Result<AppendedMessage, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::invalid("Invalid data"));
        }

        let chat = self.get_chat(chat_id).await?;
        ensure_member(&chat, sender)?;

        let message_id = Uuid::new_v4().to_string();
        let cid = chat_id.to_string();
        let sid = sender.to_string();
        let body = content.to_string();
        let row = self
            .blocking(move |db| db.append_message(&message_id, &cid, &sid, &body, &now_timestamp()))
            .await?
            // Deleted after the membership check
            .ok_or_else(ChatError::chat_not_found)?;

        let members: Vec<Uuid> = chat.member_ids().collect();
        self.invalidate_chat(chat_id, members.iter().copied());

        let message = convert::message(row);
        debug!("Message {} appended to chat {} by {}", message.id, chat_id, sender);
        Ok(AppendedMessage { message, members })
    }

    /// All messages of a chat in chronological order, for a member.
    pub async fn list_messages(
        &self,
        chat_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<Message>, ChatError> {
        // Only ever populated after the guard below passed for this requester
        let key = keys::messages_key(requester, chat_id);
        if let Some(Cached::Messages(messages)) = self.cache.get(&key) {
            return Ok(messages);
        }

        let generation = self.cache.generation();
        let chat = self.get_chat(chat_id).await?;
        ensure_member(&chat, requester)?;

        let cid = chat_id.to_string();
        let messages: Vec<Message> = self
            .blocking(move |db| db.get_messages(&cid))
            .await?
            .into_iter()
            .map(convert::message)
            .collect();

        self.cache_fill(key, Cached::Messages(messages.clone()), generation);
        Ok(messages)
    }
}
