use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::models::Timestamp;
use crate::db::repository::{Direction, Record};
use crate::error::AppError;

/// Account role. `Admin` may manage all catalog content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// A registered account as stored in the `users` collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Lowercased, unique.
    pub email: String,
    pub role: Role,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub created_at: Timestamp,
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const KEY_FIELD: &'static str = "id";
    const UNIQUE_FIELDS: &'static [&'static str] = &["email"];
    const SORT: &'static [(&'static str, Direction)] = &[("createdAt", Direction::Asc)];

    fn key(&self) -> &str {
        &self.id
    }
}

/// Public view of a `User`, without credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: Timestamp,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// The signed-in caller, decoded from the session cookie.
///
/// Handlers receive it as an explicit extractor value; core functions that
/// need a privilege take the capability derived from it instead of looking
/// at ambient request state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Unix seconds after which the session is rejected.
    pub expires_at: i64,
}

/// Proof that the caller passed the admin check.
///
/// Only obtainable through [`Session::require_admin`].
#[derive(Debug)]
pub struct AdminGrant {
    _private: (),
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<AdminGrant, AppError> {
        if self.is_admin() {
            Ok(AdminGrant { _private: () })
        } else {
            Err(AppError::Forbidden("Admin access required".into()))
        }
    }

    /// Whether this caller may edit or delete content owned by `owner_id`.
    pub fn can_modify(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

#[cfg(test)]
impl AdminGrant {
    /// Capability for unit tests that exercise admin-only core functions.
    pub(crate) fn for_tests() -> Self {
        AdminGrant { _private: () }
    }
}
