use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use kin_types::models::Chat;

use crate::membership::ensure_member;
use crate::{Cached, ChatError, ChatService, convert, keys, now_timestamp};

impl ChatService {
    /// Open the direct chat between `requester` and the user owning `email`,
    /// creating it on first contact. Returns the same chat on every call for
    /// the same pair.
    pub async fn access_or_create_direct_chat(
        &self,
        requester: Uuid,
        email: Option<&str>,
    ) -> Result<Chat, ChatError> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ChatError::invalid("Email required"))?
            .to_string();

        let other = self
            .blocking(move |db| db.get_user_by_email(&email))
            .await?
            .ok_or_else(ChatError::user_not_found)?;

        if other.id == requester.to_string() {
            return Err(ChatError::invalid("Cannot open a chat with yourself"));
        }

        let name = if other.full_name.is_empty() {
            other.username.clone()
        } else {
            other.full_name.clone()
        };
        let new_id = Uuid::new_v4().to_string();
        let me = requester.to_string();
        let other_id = other.id.clone();

        let (record, created) = self
            .blocking(move |db| {
                db.find_or_create_direct_chat(&new_id, &me, &other_id, &name, &now_timestamp())
            })
            .await?;

        let chat = convert::chat(record);
        if created {
            info!("Direct chat {} created between {} and {}", chat.id, requester, other.id);
            for member in chat.member_ids() {
                self.cache.delete(&keys::chats_key(member));
            }
        }
        Ok(chat)
    }

    /// Explicitly create a group chat. The creator is always the first member.
    pub async fn create_group_chat(
        &self,
        creator: Uuid,
        name: Option<&str>,
        member_ids: &[Uuid],
    ) -> Result<Chat, ChatError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ChatError::invalid("Group name required"))?
            .to_string();

        let mut seen = HashSet::from([creator]);
        let mut members = vec![creator];
        members.extend(member_ids.iter().copied().filter(|id| seen.insert(*id)));
        if members.len() < 3 {
            return Err(ChatError::invalid(
                "A group needs at least two members besides its creator",
            ));
        }

        let ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
        let chat_id = Uuid::new_v4().to_string();

        let record = self
            .blocking(move |db| {
                for id in &ids {
                    if db.get_user_by_id(id)?.is_none() {
                        return Ok(None);
                    }
                }
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                db.create_group_chat(&chat_id, &name, &refs, &now_timestamp())
                    .map(Some)
            })
            .await?
            .ok_or_else(ChatError::user_not_found)?;

        let chat = convert::chat(record);
        info!("Group chat {} '{}' created by {} with {} members", chat.id, chat.chat_name, creator, chat.users.len());
        for member in chat.member_ids() {
            self.cache.delete(&keys::chats_key(member));
        }
        Ok(chat)
    }

    /// Fetch a chat with members and latest message, or `NotFound`.
    pub async fn get_chat(&self, chat_id: Uuid) -> Result<Chat, ChatError> {
        let id = chat_id.to_string();
        self.blocking(move |db| db.get_chat(&id))
            .await?
            .map(convert::chat)
            .ok_or_else(ChatError::chat_not_found)
    }

    /// Every chat `user_id` belongs to, most recently updated first.
    pub async fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>, ChatError> {
        let key = keys::chats_key(user_id);
        if let Some(Cached::Chats(chats)) = self.cache.get(&key) {
            return Ok(chats);
        }

        let generation = self.cache.generation();
        let uid = user_id.to_string();
        let chats: Vec<Chat> = self
            .blocking(move |db| db.get_chats_for_user(&uid))
            .await?
            .into_iter()
            .map(convert::chat)
            .collect();

        self.cache_fill(key, Cached::Chats(chats.clone()), generation);
        Ok(chats)
    }

    /// Delete a chat and all its messages. Only members may do this.
    /// Returns the deleted chat as it was just before deletion.
    pub async fn delete_chat(&self, chat_id: Uuid, requester: Uuid) -> Result<Chat, ChatError> {
        let chat = self.get_chat(chat_id).await?;
        ensure_member(&chat, requester)?;

        let id = chat_id.to_string();
        let removed = self.blocking(move |db| db.delete_chat(&id)).await?;
        // Raced with another member's delete
        if !removed {
            return Err(ChatError::chat_not_found());
        }

        self.invalidate_chat(chat_id, chat.member_ids());
        info!("Chat {} deleted by {}", chat_id, requester);
        Ok(chat)
    }
}
