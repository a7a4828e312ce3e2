use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::claims::TokenKind;
use crate::{error::AppError, state::AppState, users::repo_types::User};

/// The signed-in account, loaded fresh from the store on every request.
///
/// Rejects requests without a valid access token (401), tokens whose account no
/// longer exists (401), and accounts that are not active (403).
pub struct AuthUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

        let claims = state.keys.decode(token, TokenKind::Access).map_err(|e| {
            warn!(error = %e, "rejected session token");
            AppError::Unauthorized(e.to_string())
        })?;

        let Some(user) = state.users.find_by_id(claims.sub).await? else {
            warn!(account_id = %claims.sub, "session for missing account");
            return Err(AppError::Unauthorized("User not found".into()));
        };
        if !user.is_active {
            warn!(account_id = %user.id, "session for inactive account");
            return Err(AppError::Forbidden("Account not activated".into()));
        }
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::users::memory::MemoryUserStore;

    fn account(is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: String::new(),
            is_active,
            is_staff: false,
            token: None,
            first_name: None,
            last_name: None,
            phone: None,
            country: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    async fn state_with(users: Vec<User>) -> AppState {
        let store = Arc::new(MemoryUserStore::default());
        for u in users {
            store.insert(u).await;
        }
        AppState::fake().with_users(store)
    }

    async fn extract(state: &AppState, authorization: Option<String>) -> Result<User, StatusCode> {
        let mut builder = Request::builder().uri("/users/profile");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state)
            .await
            .map(|AuthUser(u)| u)
            .map_err(|e| e.into_response().status())
    }

    fn bearer(state: &AppState, id: Uuid, kind: TokenKind) -> Option<String> {
        Some(format!("Bearer {}", state.keys.issue(id, kind).unwrap()))
    }

    #[tokio::test]
    async fn active_account_is_loaded() {
        let me = account(true);
        let state = state_with(vec![me.clone()]).await;
        let loaded = extract(&state, bearer(&state, me.id, TokenKind::Access))
            .await
            .expect("active account");
        assert_eq!(loaded.id, me.id);
        assert_eq!(loaded.email, me.email);
    }

    #[tokio::test]
    async fn inactive_account_is_forbidden_even_with_valid_token() {
        let dormant = account(false);
        let state = state_with(vec![dormant.clone()]).await;
        let status = extract(&state, bearer(&state, dormant.id, TokenKind::Access))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn token_for_deleted_account_is_unauthorized() {
        let state = state_with(vec![]).await;
        let status = extract(&state, bearer(&state, Uuid::new_v4(), TokenKind::Access))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_cannot_open_a_session() {
        let me = account(true);
        let state = state_with(vec![me.clone()]).await;
        let status = extract(&state, bearer(&state, me.id, TokenKind::Refresh))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        let state = state_with(vec![]).await;
        assert_eq!(extract(&state, None).await.unwrap_err(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            extract(&state, Some("Basic dXNlcjpwYXNz".into())).await.unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            extract(&state, Some("Bearer ".into())).await.unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }
}
