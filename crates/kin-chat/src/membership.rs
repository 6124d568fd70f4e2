use uuid::Uuid;

use kin_types::models::Chat;

use crate::ChatError;

/// True iff `user_id` is one of the chat's members.
pub fn is_member(chat: &Chat, user_id: Uuid) -> bool {
    chat.member_ids().any(|id| id == user_id)
}

/// [`is_member`] as a guard: a non-member gets `Forbidden`, never a silent no-op.
pub fn ensure_member(chat: &Chat, user_id: Uuid) -> Result<(), ChatError> {
    if is_member(chat, user_id) {
        Ok(())
    } else {
        Err(ChatError::not_member())
    }
}
