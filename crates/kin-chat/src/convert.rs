//! Row → API model conversion. Corrupt stored values are logged and
//! defaulted rather than failing the whole read.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use kin_db::models::{ChatRecord, MessageRow, ProfileRow, UserRow};
use kin_types::models::{Chat, FriendProfile, Message, Profile};

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone: "YYYY-MM-DD HH:MM:SS"
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn profile(row: ProfileRow) -> Profile {
    Profile {
        id: parse_id(&row.id, "user id"),
        username: row.username,
        full_name: row.full_name,
        email: row.email,
        profile_picture: row.profile_picture,
    }
}

pub fn friend(row: UserRow) -> FriendProfile {
    FriendProfile {
        id: parse_id(&row.id, "user id"),
        username: row.username,
        full_name: row.full_name,
        email: row.email,
        profile_picture: row.profile_picture,
        cover_image: row.cover_image,
    }
}

pub fn message(row: MessageRow) -> Message {
    Message {
        id: parse_id(&row.id, "message id"),
        chat_id: parse_id(&row.chat_id, "chat id"),
        sender: profile(row.sender),
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn chat(record: ChatRecord) -> Chat {
    Chat {
        id: parse_id(&record.chat.id, "chat id"),
        is_group: record.chat.is_group,
        chat_name: record.chat.name,
        users: record.members.into_iter().map(profile).collect(),
        latest_message: record.latest_message.map(message),
        created_at: parse_timestamp(&record.chat.created_at),
        updated_at: parse_timestamp(&record.chat.updated_at),
    }
}
