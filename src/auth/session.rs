use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use axum_extra::extract::SignedCookieJar;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::auth::models::{Role, Session, User, UserProfile};
use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::config::AuthSettings;
use crate::db::models::Timestamp;
use crate::db::repository::{Filter, Repository};
use crate::error::AppError;

/// Name of the signed session cookie.
pub const SESSION_COOKIE: &str = "tripnest_session";

/// Build the cookie signing key.
///
/// A configured secret is stretched to the 64 bytes the signer needs. Without
/// one a random key is generated, so sessions do not survive a restart.
pub fn cookie_key(secret: Option<&str>) -> Key {
    match secret.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
        None => {
            tracing::warn!("auth.session_secret is not set, generating an ephemeral cookie key");
            let mut bytes = [0u8; 64];
            rand::rng().fill(&mut bytes);
            Key::from(&bytes)
        }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, Key::from_ref(state));
        let cookie = jar
            .get(SESSION_COOKIE)
            .ok_or_else(|| AppError::Auth("Not logged in".into()))?;
        decode_session(cookie.value(), Utc::now().timestamp())
    }
}

/// Parse a verified cookie payload and reject it once expired.
fn decode_session(raw: &str, now: i64) -> Result<Session, AppError> {
    let session: Session = serde_json::from_str(raw)
        .map_err(|e| AppError::Auth(format!("Invalid session: {}", e)))?;
    if session.expires_at <= now {
        return Err(AppError::Auth("Session expired".into()));
    }
    Ok(session)
}

/// Registration request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Logout response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Core registration logic.
///
/// The first account and any address listed in `auth.admin_emails` get the
/// admin role.
pub async fn process_register(
    users: &dyn Repository<User>,
    settings: &AuthSettings,
    request: RegisterRequest,
) -> Result<UserProfile, AppError> {
    let name = request.name.trim();
    let email = request.email.trim().to_lowercase();

    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let taken = users.list(&Filter::new().eq("email", email.as_str())).await?;
    if !taken.is_empty() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let first_account = users.list(&Filter::new()).await?.is_empty();
    let listed_admin = settings
        .admin_emails
        .iter()
        .any(|admin| admin.trim().eq_ignore_ascii_case(&email));
    let role = if first_account || listed_admin {
        Role::Admin
    } else {
        Role::User
    };

    let password_hash = hash_password(&request.password)?;
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        email,
        role,
        password_hash,
        created_at: Timestamp::now(),
    };
    users.insert(&user).await?;

    tracing::info!("Registered user {} with role {}", user.email, user.role);
    Ok(user.into())
}

/// Core login logic: check credentials and return the matching account.
pub async fn process_login(
    users: &dyn Repository<User>,
    request: &LoginRequest,
) -> Result<User, AppError> {
    let email = request.email.trim().to_lowercase();
    let user = users
        .list(&Filter::new().eq("email", email.as_str()))
        .await?
        .into_iter()
        .next()
        .filter(|u| verify_password(&request.password, &u.password_hash))
        .ok_or_else(|| AppError::Auth("Invalid email or password".into()))?;
    Ok(user)
}

/// Session issued for `user`, valid for `ttl_hours` from `now`.
pub fn session_for(user: &User, ttl_hours: u64, now: i64) -> Session {
    let ttl = i64::try_from(ttl_hours).unwrap_or(i64::MAX / 3600) * 3600;
    Session {
        user_id: user.id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        expires_at: now.saturating_add(ttl),
    }
}

/// `POST /api/auth/register`
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, ApiJson<UserProfile>), AppError> {
    let profile =
        process_register(state.stores.users.as_ref(), &state.auth, request).await?;
    Ok((StatusCode::CREATED, ok(profile)))
}

/// `POST /api/auth/login`
///
/// On success sets the signed `tripnest_session` cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(SignedCookieJar, ApiJson<UserProfile>), AppError> {
    let user = process_login(state.stores.users.as_ref(), &request).await?;
    let session = session_for(&user, state.auth.session_ttl_hours, Utc::now().timestamp());
    let payload = serde_json::to_string(&session)
        .map_err(|e| AppError::Internal(format!("Failed to serialize session: {}", e)))?;

    let max_age = i64::try_from(state.auth.session_ttl_hours).unwrap_or(i64::MAX / 3600);
    let cookie = Cookie::build((SESSION_COOKIE, payload))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(max_age))
        .build();

    tracing::info!("User {} logged in", user.email);
    Ok((jar.add(cookie), ok(user.into())))
}

/// `GET /api/auth/me`
pub async fn me_handler(session: Session) -> ApiJson<Session> {
    ok(session)
}

/// `POST /api/auth/logout`
pub async fn logout_handler(jar: SignedCookieJar) -> (SignedCookieJar, ApiJson<LogoutResponse>) {
    let cookie = Cookie::build((SESSION_COOKIE, "")).path("/").removal().build();
    (
        jar.remove(cookie),
        ok(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    )
}
