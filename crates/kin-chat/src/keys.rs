use uuid::Uuid;

pub fn chats_key(user_id: Uuid) -> String {
    format!("chats:{}", user_id)
}

pub fn messages_key(user_id: Uuid, chat_id: Uuid) -> String {
    format!("messages:{}:{}", user_id, chat_id)
}

pub fn friends_key(user_id: Uuid) -> String {
    format!("friends:{}", user_id)
}
