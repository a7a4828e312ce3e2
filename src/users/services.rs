use axum::http::{header::HOST, HeaderMap};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::users::dto::RegisterRequest;
use crate::users::repo_types::{ProfileFields, User, UserChanges};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 150;
const MAX_PHONE_LEN: usize = 35;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 32 lowercase hex characters from 16 bytes of OS randomness.
pub fn generate_confirmation_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn confirmation_url(host: &str, token: &str) -> String {
    format!("http://{host}/users/email-confirm/{token}")
}

/// The request's `Host` header, or `fallback` when absent or not valid UTF-8.
pub fn request_host(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Field checks for registration. Expects an already normalized email.
pub fn validate_registration(req: &RegisterRequest) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if !is_valid_email(&req.email) {
        errors.add("email", "Enter a valid email address.");
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    if req.password != req.password_confirm {
        errors.add("password_confirm", "Passwords do not match.");
    }
    validate_profile(&req.profile, &mut errors);
    errors
}

pub fn validate_profile(profile: &ProfileFields, errors: &mut FieldErrors) {
    let checks: [(&'static str, &Option<String>, usize); 4] = [
        ("first_name", &profile.first_name, MAX_NAME_LEN),
        ("last_name", &profile.last_name, MAX_NAME_LEN),
        ("phone", &profile.phone, MAX_PHONE_LEN),
        ("country", &profile.country, MAX_NAME_LEN),
    ];
    for (field, value, max) in checks {
        if value.as_ref().is_some_and(|v| v.chars().count() > max) {
            errors.add(field, format!("Ensure this value has at most {max} characters."));
        }
    }
}

/// Users may update their own profile fields; staff may update anyone's,
/// and only staff may change `is_active`.
pub fn authorize_update(actor: &User, target_id: Uuid, changes: &UserChanges) -> Result<(), AppError> {
    if actor.is_staff {
        return Ok(());
    }
    if actor.id != target_id {
        return Err(AppError::Forbidden(
            "Not allowed to modify this user".to_string(),
        ));
    }
    if changes.is_active.is_some() {
        return Err(AppError::Forbidden(
            "Only staff may change account activation".to_string(),
        ));
    }
    Ok(())
}
