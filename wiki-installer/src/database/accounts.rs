// Administrator account provisioning

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::database::connection::DatabaseConnection;

pub const ADMIN_ROLE: &str = "Admin";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("An administrator account already exists")]
    AdminAlreadyExists,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Number of accounts holding the admin role.
pub async fn count_admins(conn: &DatabaseConnection) -> anyhow::Result<i64> {
    const SQL: &str = "SELECT COUNT(*) FROM wiki_users WHERE role = 'Admin'";
    let count = match conn {
        DatabaseConnection::SqlServer(c) => {
            let client = c.client();
            let mut client = client.lock().await;
            let row = client
                .simple_query(SQL)
                .await?
                .into_row()
                .await?
                .context("admin count query returned no row")?;
            i64::from(row.get::<i32, _>(0).unwrap_or(0))
        }
        DatabaseConnection::Postgres(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await?,
        DatabaseConnection::MySql(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await?,
        DatabaseConnection::Sqlite(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await?,
    };
    Ok(count)
}

/// Insert the initial administrator. Refuses if any administrator exists already.
pub async fn create_admin(
    conn: &DatabaseConnection,
    email: &str,
    password_hash: &str,
) -> Result<AdminAccount, AccountError> {
    let existing = count_admins(conn)
        .await
        .context("Failed to check for existing administrator")?;
    if existing > 0 {
        warn!(
            "[PHASE: finalize] [STEP: admin_account] Refusing to create administrator: {} already present",
            existing
        );
        return Err(AccountError::AdminAlreadyExists);
    }

    let account = AdminAccount {
        id: Uuid::new_v4(),
        email: email.trim().to_string(),
        role: ADMIN_ROLE.to_string(),
        created_at: Utc::now(),
    };
    insert_user(conn, &account, password_hash)
        .await
        .context("Failed to insert administrator account")?;

    info!(
        "[PHASE: finalize] [STEP: admin_account] Administrator account created (id={})",
        account.id
    );
    Ok(account)
}

async fn insert_user(conn: &DatabaseConnection, account: &AdminAccount, password_hash: &str) -> anyhow::Result<()> {
    match conn {
        DatabaseConnection::SqlServer(c) => {
            let client = c.client();
            let mut client = client.lock().await;
            let id = account.id.to_string();
            client
                .execute(
                    "INSERT INTO dbo.wiki_users (id, email, username, password_hash, role, is_admin, is_activated, created_at) \
                     VALUES (CONVERT(UNIQUEIDENTIFIER, @P1), @P2, @P3, @P4, @P5, 1, 1, SYSUTCDATETIME())",
                    &[&id, &account.email, &account.email, &password_hash, &account.role],
                )
                .await?;
        }
        DatabaseConnection::Postgres(pool) => {
            sqlx::query(
                "INSERT INTO wiki_users (id, email, username, password_hash, role, is_admin, is_activated, created_at) \
                 VALUES ($1, $2, $3, $4, $5, TRUE, TRUE, $6)",
            )
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.email)
            .bind(password_hash)
            .bind(&account.role)
            .bind(account.created_at)
            .execute(pool)
            .await?;
        }
        DatabaseConnection::MySql(pool) => {
            sqlx::query(
                "INSERT INTO wiki_users (id, email, username, password_hash, role, is_admin, is_activated, created_at) \
                 VALUES (?, ?, ?, ?, ?, TRUE, TRUE, ?)",
            )
            .bind(account.id.to_string())
            .bind(&account.email)
            .bind(&account.email)
            .bind(password_hash)
            .bind(&account.role)
            .bind(account.created_at)
            .execute(pool)
            .await?;
        }
        DatabaseConnection::Sqlite(pool) => {
            sqlx::query(
                "INSERT INTO wiki_users (id, email, username, password_hash, role, is_admin, is_activated, created_at) \
                 VALUES (?, ?, ?, ?, ?, 1, 1, ?)",
            )
            .bind(account.id.to_string())
            .bind(&account.email)
            .bind(&account.email)
            .bind(password_hash)
            .bind(&account.role)
            .bind(account.created_at.to_rfc3339())
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
