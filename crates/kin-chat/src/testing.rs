use std::sync::Arc;

use uuid::Uuid;

use kin_db::Database;
use kin_db::models::NewUser;
use kin_types::models::{Chat, Profile};

use crate::{ChatService, DEFAULT_CACHE_TTL};

pub struct TestEnv {
    pub service: ChatService,
}

impl TestEnv {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Self {
            service: ChatService::new(db, DEFAULT_CACHE_TTL),
        }
    }

    /// Creates `<name>` with email `<name>@x.com` and full name "<Name> Example".
    pub fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let email = format!("{}@x.com", name);
        let full_name = full_name(name);
        self.service
            .db()
            .create_user(&NewUser {
                id: &id_str,
                username: name,
                email: &email,
                full_name: &full_name,
                password_hash: "not-a-real-hash",
            })
            .unwrap();
        id
    }
}

fn full_name(name: &str) -> String {
    let mut chars = name.chars();
    let first = chars.next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
    format!("{}{} Example", first, chars.as_str())
}

pub fn profile(name: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        username: name.to_string(),
        full_name: full_name(name),
        email: format!("{}@x.com", name),
        profile_picture: None,
    }
}

pub fn chat_with(users: Vec<Profile>) -> Chat {
    let now = chrono::Utc::now();
    Chat {
        id: Uuid::new_v4(),
        is_group: users.len() > 2,
        chat_name: "test".into(),
        users,
        latest_message: None,
        created_at: now,
        updated_at: now,
    }
}
