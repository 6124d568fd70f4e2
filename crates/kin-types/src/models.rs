use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public projection of a user, attached to chats and messages.
/// Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

/// Profile shape returned by the friends listing (adds the cover image).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub cover_image: Option<String>,
}

/// A persisted chat message, enriched with the sender's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Profile,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A direct or group conversation with its members and latest message populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    #[serde(rename = "isGroupChat")]
    pub is_group: bool,
    pub chat_name: String,
    pub users: Vec<Profile>,
    pub latest_message: Option<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn member_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.users.iter().map(|u| u.id)
    }
}
