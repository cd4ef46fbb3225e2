//! Group/permission directory lookups.
//!
//! Thin query layer over the `users` / `groups` tables. Password
//! verification is bcrypt; session management is deliberately absent, every
//! request authenticates anew via Basic auth.

use sqlx::PgPool;

use crate::auth::ActingIdentity;
use crate::error::Result;
use crate::models::group::Group;
use crate::models::user::User;

/// Resolve Basic credentials to an acting identity.
///
/// Returns `Ok(None)` for unknown users, inactive accounts and bad
/// passwords alike, so callers cannot distinguish the cases.
pub async fn resolve_identity(
    db: &PgPool,
    username: &str,
    password: &str,
) -> Result<Option<ActingIdentity>> {
    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT id, username, password_hash, is_superuser, is_active, created_at
        FROM users
        WHERE username = $1 AND is_active = true
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    let Some(ref hash) = user.password_hash else {
        return Ok(None);
    };

    if !bcrypt::verify(password, hash).unwrap_or(false) {
        return Ok(None);
    }

    let groups = groups_of(db, user.id).await?;

    Ok(Some(ActingIdentity {
        user_id: user.id,
        username: user.username,
        is_superuser: user.is_superuser,
        groups,
    }))
}

/// Group memberships of a user, in membership order.
pub async fn groups_of(db: &PgPool, user_id: uuid::Uuid) -> Result<Vec<Group>> {
    let groups: Vec<Group> = sqlx::query_as(
        r#"
        SELECT g.id, g.name
        FROM groups g
        JOIN user_groups ug ON ug.group_id = g.id
        WHERE ug.user_id = $1
        ORDER BY ug.created_at, g.name
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(groups)
}

/// Does the group hold the given capability (e.g. `add_package`)?
pub async fn group_has_capability(
    db: &PgPool,
    group_id: uuid::Uuid,
    capability: &str,
) -> Result<bool> {
    let exists: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM group_capabilities WHERE group_id = $1 AND capability = $2",
    )
    .bind(group_id)
    .bind(capability)
    .fetch_optional(db)
    .await?;

    Ok(exists.is_some())
}

/// Look up a group by name.
pub async fn group_by_name(db: &PgPool, name: &str) -> Result<Option<Group>> {
    let group: Option<Group> = sqlx::query_as("SELECT id, name FROM groups WHERE name = $1")
        .bind(name)
        .fetch_optional(db)
        .await?;
    Ok(group)
}

/// Look up a user by username.
pub async fn user_by_name(db: &PgPool, username: &str) -> Result<Option<User>> {
    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT id, username, password_hash, is_superuser, is_active, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}
