use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::AuthUser,
        password::{generate_password, hash_password, GENERATED_PASSWORD_LEN},
    },
    error::{AppError, FieldErrors},
    mail::{confirmation_email, password_reset_email},
    state::AppState,
    users::{
        dto::{PublicUser, RegisterRequest, ResetPasswordRequest, UserUpdateRequest},
        repo::CreateUserError,
        repo_types::{NewUser, ProfileFields, UserChanges},
        services::{
            authorize_update, confirmation_url, generate_confirmation_token, normalize_email,
            request_host, validate_profile, validate_registration,
        },
    },
};

pub const LOGIN_PATH: &str = "/users/login";
pub const PROFILE_PATH: &str = "/users/profile";
pub const USERS_LIST_PATH: &str = "/users";

const DUPLICATE_EMAIL: &str = "A user with this email already exists.";

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/email-confirm/:token", get(confirm_email))
        .route("/users/profile", get(get_profile).post(update_profile))
        .route("/users/reset-password", post(reset_password))
        .route("/users", get(list_users))
        .route("/users/edit/:id", get(get_user).post(update_user))
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Redirect, AppError> {
    payload.email = normalize_email(&payload.email);

    let mut errors = validate_registration(&payload);
    if errors.get("email").is_none() && state.users.find_by_email(&payload.email).await?.is_some() {
        errors.add("email", DUPLICATE_EMAIL);
    }
    if !errors.is_empty() {
        warn!(email = %payload.email, ?errors, "registration rejected");
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password(&payload.password)?;
    let token = generate_confirmation_token();
    let created = state
        .users
        .create(NewUser {
            email: payload.email.clone(),
            password_hash,
            token: token.clone(),
            profile: payload.profile,
        })
        .await;
    let user = match created {
        Ok(user) => user,
        Err(CreateUserError::DuplicateEmail) => {
            warn!(email = %payload.email, "registration lost race for email");
            let mut errors = FieldErrors::default();
            errors.add("email", DUPLICATE_EMAIL);
            return Err(AppError::Validation(errors));
        }
        Err(CreateUserError::Store(e)) => return Err(e.into()),
    };
    info!(user_id = %user.id, "user registered");

    let host = request_host(&headers, &state.config.public_host);
    let url = confirmation_url(&host, &token);
    state
        .mailer
        .send(confirmation_email(&state.config.mail.from, &user.email, &url))
        .await?;
    info!(user_id = %user.id, "confirmation email sent");

    Ok(Redirect::to(LOGIN_PATH))
}

#[instrument(skip(state, token))]
pub async fn confirm_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Redirect, AppError> {
    let Some(user) = state.users.find_by_token(&token).await? else {
        warn!("unknown confirmation token");
        return Err(AppError::NotFound);
    };

    state.users.set_active(user.id, true).await?;
    info!(user_id = %user.id, was_active = user.is_active, "email confirmed");
    Ok(Redirect::to(LOGIN_PATH))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(profile): Json<ProfileFields>,
) -> Result<Redirect, AppError> {
    let mut errors = FieldErrors::default();
    validate_profile(&profile, &mut errors);
    errors.into_result()?;

    let changes = UserChanges {
        profile,
        is_active: None,
    };
    state
        .users
        .update(user.id, &changes)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    info!("profile updated");
    Ok(Redirect::to(PROFILE_PATH))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Redirect, AppError> {
    let email = normalize_email(&payload.email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "password reset for unknown email");
        return Err(AppError::NotFound);
    };

    let password = generate_password(GENERATED_PASSWORD_LEN);
    let password_hash = hash_password(&password)?;
    state.users.set_password_hash(user.id, &password_hash).await?;
    info!(user_id = %user.id, "password reset");

    state
        .mailer
        .send(password_reset_email(&state.config.mail.from, &user.email, &password))
        .await?;

    Ok(Redirect::to(LOGIN_PATH))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip_all, fields(user_id = %user.id, target_id = %id))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    let target = state.users.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(target.into()))
}

#[instrument(skip_all, fields(actor_id = %actor.id, target_id = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> Result<Redirect, AppError> {
    let changes = UserChanges {
        profile: payload.profile,
        is_active: payload.is_active,
    };
    authorize_update(&actor, id, &changes).inspect_err(|_| {
        warn!(sets_active = ?changes.is_active, "update denied");
    })?;

    let mut errors = FieldErrors::default();
    validate_profile(&changes.profile, &mut errors);
    errors.into_result()?;

    state
        .users
        .update(id, &changes)
        .await?
        .ok_or(AppError::NotFound)?;

    info!("user updated");
    Ok(Redirect::to(USERS_LIST_PATH))
}
