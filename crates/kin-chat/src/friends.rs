use tracing::info;
use uuid::Uuid;

use kin_types::models::FriendProfile;

use crate::{Cached, ChatError, ChatService, convert, keys};

impl ChatService {
    /// Profiles of everyone `user_id` is friends with. `NotFound` when the
    /// user itself no longer exists.
    pub async fn list_friends(&self, user_id: Uuid) -> Result<Vec<FriendProfile>, ChatError> {
        let key = keys::friends_key(user_id);
        if let Some(Cached::Friends(friends)) = self.cache.get(&key) {
            return Ok(friends);
        }

        let generation = self.cache.generation();
        let uid = user_id.to_string();
        let rows = self
            .blocking(move |db| {
                if db.get_user_by_id(&uid)?.is_none() {
                    return Ok(None);
                }
                db.get_friends(&uid).map(Some)
            })
            .await?
            .ok_or_else(ChatError::user_not_found)?;

        let friends: Vec<FriendProfile> = rows.into_iter().map(convert::friend).collect();
        self.cache_fill(key, Cached::Friends(friends.clone()), generation);
        Ok(friends)
    }

    /// Befriend the user owning `email`. The relation is symmetric and
    /// befriending an existing friend is a no-op. Both users' cached friend
    /// lists are dropped.
    pub async fn add_friend(
        &self,
        requester: Uuid,
        email: Option<&str>,
    ) -> Result<FriendProfile, ChatError> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ChatError::invalid("Email required"))?
            .to_string();

        let friend = self
            .blocking(move |db| db.get_user_by_email(&email))
            .await?
            .ok_or_else(ChatError::user_not_found)?;
        let me = requester.to_string();
        if friend.id == me {
            return Err(ChatError::invalid("Cannot befriend yourself"));
        }

        let other = friend.id.clone();
        self.blocking(move |db| db.add_friendship(&me, &other)).await?;

        let friend = convert::friend(friend);

        self.cache.delete(&keys::friends_key(requester));
        self.cache.delete(&keys::friends_key(friend.id));
        info!("{} befriended {}", requester, friend.id);
        Ok(friend)
    }
}
