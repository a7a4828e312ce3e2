use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{ProfileFields, User};

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

/// Request body for a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

/// Request body for updating a user by id.
#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    #[serde(flatten)]
    pub profile: ProfileFields,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            is_active: u.is_active,
            first_name: u.first_name,
            last_name: u.last_name,
            phone: u.phone,
            country: u.country,
            created_at: u.created_at,
        }
    }
}
