use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::TokenKind,
        dto::{AuthResponse, LoginRequest, RefreshRequest},
        password::verify_password,
    },
    error::AppError,
    state::AppState,
    users::{dto::PublicUser, services::normalize_email},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/token/refresh", post(refresh))
}

fn start_session(state: &AppState, user: PublicUser) -> Result<AuthResponse, AppError> {
    let pair = state.keys.issue_pair(user.id)?;
    Ok(AuthResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        user,
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_active {
        warn!(user_id = %user.id, "login before email confirmation");
        return Err(AppError::Forbidden("Account not activated".into()));
    }

    info!(user_id = %user.id, "user logged in");
    Ok(Json(start_session(&state, user.into())?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let claims = state
        .keys
        .decode(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    Ok(Json(start_session(&state, user.into())?))
}
