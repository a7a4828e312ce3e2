use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo::{CreateUserError, UserStore};
use crate::users::repo_types::{NewUser, User, UserChanges};

/// In-process store backing `AppState::fake()`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    /// Inserts a ready-made record, bypassing registration.
    pub async fn insert(&self, user: User) {
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_active: false,
            is_staff: false,
            token: Some(new_user.token),
            first_name: new_user.profile.first_name,
            last_name: new_user.profile.last_name,
            phone: new_user.profile.phone,
            country: new_user.profile.country,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.token.as_deref() == Some(token))
            .cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.read().await.clone())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()> {
        if let Some(u) = self.users.write().await.iter_mut().find(|u| u.id == id) {
            u.is_active = active;
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        if let Some(u) = self.users.write().await.iter_mut().find(|u| u.id == id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(u) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        let p = &changes.profile;
        if let Some(v) = &p.first_name {
            u.first_name = Some(v.clone());
        }
        if let Some(v) = &p.last_name {
            u.last_name = Some(v.clone());
        }
        if let Some(v) = &p.phone {
            u.phone = Some(v.clone());
        }
        if let Some(v) = &p.country {
            u.country = Some(v.clone());
        }
        if let Some(active) = changes.is_active {
            u.is_active = active;
        }
        Ok(Some(u.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::ProfileFields;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "hash".into(),
            token: "0123456789abcdef0123456789abcdef".into(),
            profile: ProfileFields::default(),
        }
    }

    #[tokio::test]
    async fn second_insert_of_an_email_is_a_duplicate() {
        let store = MemoryUserStore::default();
        let first = store.create(new_user("ann@example.com")).await.unwrap();
        assert!(!first.is_active);

        let err = store.create(new_user("ann@example.com")).await.unwrap_err();
        assert!(matches!(err, CreateUserError::DuplicateEmail));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
