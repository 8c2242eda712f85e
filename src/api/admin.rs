use axum::extract::State;

use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::auth::models::{AdminGrant, Session, User, UserProfile};
use crate::db::repository::{Filter, Repository};
use crate::error::AppError;

/// All accounts, oldest first, without credentials.
pub async fn process_list_users(
    users: &dyn Repository<User>,
    _grant: &AdminGrant,
) -> Result<Vec<UserProfile>, AppError> {
    Ok(users
        .list(&Filter::new())
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect())
}

/// `GET /api/admin/users` (admin)
pub async fn list_users_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<ApiJson<Vec<UserProfile>>, AppError> {
    let grant = session.require_admin()?;
    let users = process_list_users(state.stores.users.as_ref(), &grant).await?;
    Ok(ok(users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::db::memory::MemoryRepository;
    use crate::db::models::Timestamp;

    #[tokio::test]
    async fn test_list_users_strips_credentials() {
        let users = MemoryRepository::<User>::new();
        users
            .insert(&User {
                id: "u-1".to_string(),
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                role: Role::Admin,
                password_hash: "hash".to_string(),
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();

        let listed = process_list_users(&users, &AdminGrant::for_tests())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email, "asha@example.com");
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("hash"));
    }
}
