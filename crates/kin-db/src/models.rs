/// Database row types, mapped directly from SQLite rows.
/// Distinct from kin-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub cover_image: Option<String>,
    pub password: String,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
}

/// The user columns the chat core is allowed to see.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub is_group: bool,
    pub name: String,
    pub latest_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A message joined with its sender's profile.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender: ProfileRow,
    pub content: String,
    pub created_at: String,
}

/// A chat with members (in stored order) and latest message populated.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub chat: ChatRow,
    pub members: Vec<ProfileRow>,
    pub latest_message: Option<MessageRow>,
}
