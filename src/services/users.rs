//! User service: team accounts and roles.
//!
//! The team must always keep one admin: demoting or deleting the last admin
//! is rejected with a conflict. Both checks run inside a transaction that
//! locks the admin rows so two concurrent demotions cannot both pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::pagination::{Page, PageParams};

const USER_COLUMNS: &str = "id, name, email, role, created_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Captain,
    #[default]
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Captain => "captain",
            Self::Member => "member",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "captain" => Some(Self::Captain),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

type UserRow = (Uuid, String, String, String, DateTime<Utc>);

impl From<UserRow> for User {
    fn from((id, name, email, role, created_at): UserRow) -> Self {
        Self { id, name, email, role: Role::parse(&role).unwrap_or_default(), created_at }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// True when moving a user from `current` to `next` would leave no admin.
#[must_use]
pub fn removes_last_admin(current: Role, next: Option<Role>, admin_count: i64) -> bool {
    current == Role::Admin && next != Some(Role::Admin) && admin_count <= 1
}

fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServiceError::Invalid(format!("invalid email: {raw}"))),
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// # Errors
///
/// Returns a validation error, a conflict on a duplicate email, or a
/// database error.
pub async fn create_user(pool: &PgPool, input: NewUser) -> Result<User, ServiceError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ServiceError::Invalid("user name is required".into()));
    }
    let email = normalize_email(&input.email)?;
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(input.role.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| ServiceError::unique_violation(e, "a user with this email already exists"))?;
    Ok(row.into())
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_users(pool: &PgPool, page: PageParams) -> Result<Page<User>, ServiceError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC OFFSET $1 LIMIT $2"
    ))
    .bind(page.offset())
    .bind(page.limit())
    .fetch_all(pool)
    .await?;
    Ok(Page::new(rows.into_iter().map(User::from).collect(), page, total))
}

/// Look up a user's role and the current admin count with the admin rows
/// locked for the rest of the transaction.
async fn lock_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<(Role, i64), ServiceError> {
    let admins: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' FOR UPDATE")
        .fetch_all(&mut **tx)
        .await?;
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    let role = role.ok_or(ServiceError::not_found("user", id))?;
    Ok((Role::parse(&role).unwrap_or_default(), i64::try_from(admins.len()).unwrap_or(i64::MAX)))
}

/// Change a user's role.
///
/// # Errors
///
/// Returns not found, a conflict when demoting the last admin, or a
/// database error.
pub async fn change_role(pool: &PgPool, id: Uuid, role: Role) -> Result<User, ServiceError> {
    let mut tx = pool.begin().await?;
    let (current, admins) = lock_role(&mut tx, id).await?;
    if removes_last_admin(current, Some(role), admins) {
        return Err(ServiceError::Conflict("cannot demote the last admin".into()));
    }
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    tracing::info!(user_id = %id, from = current.as_str(), to = role.as_str(), "role changed");
    Ok(row.into())
}

/// # Errors
///
/// Returns not found, a conflict when deleting the last admin, or a
/// database error.
pub async fn delete_user(pool: &PgPool, id: Uuid) -> Result<(), ServiceError> {
    let mut tx = pool.begin().await?;
    let (current, admins) = lock_role(&mut tx, id).await?;
    if removes_last_admin(current, None, admins) {
        return Err(ServiceError::Conflict("cannot delete the last admin".into()));
    }
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
