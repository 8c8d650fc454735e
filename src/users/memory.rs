use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, PublicUser, User, UserPatch};

/// Vec-backed store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn stored_refresh_token(&self, id: Uuid) -> Option<String> {
        let users = self.users.lock().unwrap();
        users.iter().find(|u| u.id == id).and_then(|u| u.refresh_token.clone())
    }

    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identity(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| {
                username.is_some_and(|n| u.username == n) || email.is_some_and(|e| u.email == e)
            })
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_public_by_id(&self, id: Uuid) -> Result<Option<PublicUser>, StoreError> {
        Ok(self.find_by_id(id).await?.map(PublicUser::from))
    }

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        users.push(User {
            id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            avatar: user.avatar,
            cover_image: user.cover_image,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<PublicUser>, StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &patch.email {
            if users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Duplicate);
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(v) = patch.full_name {
            user.full_name = v;
        }
        if let Some(v) = patch.email {
            user.email = v;
        }
        if let Some(v) = patch.avatar {
            user.avatar = v;
        }
        if let Some(v) = patch.cover_image {
            user.cover_image = v;
        }
        if let Some(v) = patch.password_hash {
            user.password_hash = v;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(PublicUser::from(user.clone())))
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError> {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.refresh_token = token.map(str::to_string);
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.lock().unwrap();
        match users
            .iter_mut()
            .find(|u| u.id == id && u.refresh_token.as_deref() == Some(current))
        {
            Some(user) => {
                user.refresh_token = Some(next.to_string());
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            full_name: "Ada Lovelace".into(),
            password_hash: "$argon2id$stub".into(),
            avatar: "https://assets.test/a.png".into(),
            cover_image: "https://assets.test/c.png".into(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username_or_email() {
        let store = InMemoryUserStore::new();
        store.create(new_user("ada", "a@x.com")).await.unwrap();
        assert!(matches!(
            store.create(new_user("ada", "b@x.com")).await,
            Err(StoreError::Duplicate)
        ));
        assert!(matches!(
            store.create(new_user("bob", "a@x.com")).await,
            Err(StoreError::Duplicate)
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rotate_only_swaps_matching_token() {
        let store = InMemoryUserStore::new();
        let id = store.create(new_user("ada", "a@x.com")).await.unwrap();
        assert!(store.set_refresh_token(id, Some("t1")).await.unwrap());

        assert!(!store.rotate_refresh_token(id, "stale", "t2").await.unwrap());
        assert!(store.rotate_refresh_token(id, "t1", "t2").await.unwrap());
        assert!(!store.rotate_refresh_token(id, "t1", "t3").await.unwrap());
        assert_eq!(store.stored_refresh_token(id).as_deref(), Some("t2"));
    }
}
