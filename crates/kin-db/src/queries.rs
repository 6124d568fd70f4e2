use crate::models::{ChatRecord, ChatRow, MessageRow, NewUser, ProfileRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, username, email, full_name, profile_picture, cover_image, password, created_at";

const CHAT_COLUMNS: &str = "c.id, c.is_group, c.name, c.latest_message_id, c.created_at, c.updated_at";

// Sender profile columns come last so `message_from_row` can read them at offset 4.
const MESSAGE_SELECT: &str = "SELECT m.id, m.chat_id, m.content, m.created_at,
            u.id, u.username, u.full_name, u.email, u.profile_picture
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

/// Deterministic key for the unordered member pair of a direct chat.
pub fn direct_key(user_a: &str, user_b: &str) -> String {
    if user_a <= user_b {
        format!("{}:{}", user_a, user_b)
    } else {
        format!("{}:{}", user_b, user_a)
    }
}

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user.id, user.username, user.email, user.full_name, user.password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    // -- Friends --

    /// Record a friendship in both directions. Idempotent.
    pub fn add_friendship(&self, user_a: &str, user_b: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                (user_a, user_b),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                (user_b, user_a),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_friends(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.email, u.full_name, u.profile_picture, u.cover_image, u.password, u.created_at
                 FROM friendships f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chats --

    /// Return the direct chat between two users, creating it if none exists.
    ///
    /// Lookup and insert share one transaction under the connection lock, and
    /// `direct_key` is UNIQUE, so concurrent first contact yields one chat.
    /// Returns `(chat, created)`.
    pub fn find_or_create_direct_chat(
        &self,
        new_chat_id: &str,
        user_a: &str,
        user_b: &str,
        name: &str,
        now: &str,
    ) -> Result<(ChatRecord, bool)> {
        let key = direct_key(user_a, user_b);
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM chats WHERE direct_key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;

            let (chat_id, created) = match existing {
                Some(id) => (id, false),
                None => {
                    tx.execute(
                        "INSERT INTO chats (id, is_group, name, direct_key, created_at, updated_at)
                         VALUES (?1, 0, ?2, ?3, ?4, ?4)",
                        rusqlite::params![new_chat_id, name, &key, now],
                    )?;
                    insert_members(&tx, new_chat_id, &[user_a, user_b])?;
                    (new_chat_id.to_string(), true)
                }
            };
            tx.commit()?;

            let record = load_chat_record(conn, &chat_id)?
                .ok_or_else(|| anyhow::anyhow!("Chat {} vanished after upsert", chat_id))?;
            Ok((record, created))
        })
    }

    pub fn create_group_chat(
        &self,
        chat_id: &str,
        name: &str,
        member_ids: &[&str],
        now: &str,
    ) -> Result<ChatRecord> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chats (id, is_group, name, created_at, updated_at) VALUES (?1, 1, ?2, ?3, ?3)",
                rusqlite::params![chat_id, name, now],
            )?;
            insert_members(&tx, chat_id, member_ids)?;
            tx.commit()?;

            load_chat_record(conn, chat_id)?
                .ok_or_else(|| anyhow::anyhow!("Chat {} vanished after insert", chat_id))
        })
    }

    pub fn get_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        self.with_conn(|conn| load_chat_record(conn, chat_id))
    }

    /// All chats the user belongs to, most recently updated first.
    pub fn get_chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS}
                 FROM chats c
                 JOIN chat_members cm ON cm.chat_id = c.id
                 WHERE cm.user_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let chats = stmt
                .query_map([user_id], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            chats
                .into_iter()
                .map(|chat| populate_chat(conn, chat))
                .collect()
        })
    }

    /// Delete a chat and all of its messages. Returns false if it did not exist.
    pub fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            let removed = tx.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    // -- Messages --

    /// Insert a message and point the chat's latest message at it, in one
    /// transaction. `now` also becomes the chat's `updated_at`.
    /// Returns `None` without writing if the chat no longer exists.
    pub fn append_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        now: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, chat_id, sender_id, content, now],
            )?;
            tx.execute(
                "UPDATE chats SET latest_message_id = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![chat_id, id, now],
            )?;
            tx.commit()?;

            query_message(conn, id)?
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Message {} vanished after insert", id))
        })
    }

    /// All messages of a chat, oldest first.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.chat_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_members(conn: &Connection, chat_id: &str, member_ids: &[&str]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, ?3)")?;
    for (position, user_id) in member_ids.iter().enumerate() {
        stmt.execute(rusqlite::params![chat_id, user_id, position as i64])?;
    }
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn load_chat_record(conn: &Connection, chat_id: &str) -> Result<Option<ChatRecord>> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1");
    let chat = conn.query_row(&sql, [chat_id], chat_from_row).optional()?;
    chat.map(|chat| populate_chat(conn, chat)).transpose()
}

fn populate_chat(conn: &Connection, chat: ChatRow) -> Result<ChatRecord> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.full_name, u.email, u.profile_picture
         FROM chat_members cm
         JOIN users u ON u.id = cm.user_id
         WHERE cm.chat_id = ?1
         ORDER BY cm.position",
    )?;
    let members = stmt
        .query_map([&chat.id], |row| profile_from_row(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let latest_message = match &chat.latest_message_id {
        Some(id) => query_message(conn, id)?,
        None => None,
    };

    Ok(ChatRecord {
        chat,
        members,
        latest_message,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        profile_picture: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn profile_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        full_name: row.get(offset + 2)?,
        email: row.get(offset + 3)?,
        profile_picture: row.get(offset + 4)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        is_group: row.get::<_, i64>(1)? != 0,
        name: row.get(2)?,
        latest_message_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        sender: profile_from_row(row, 4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
