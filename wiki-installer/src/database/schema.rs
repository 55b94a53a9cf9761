// Core schema initialization
//
// Every statement is guarded (IF NOT EXISTS / catalog lookup / insert-if-absent), so running
// `initialize` against an already-initialized store is a no-op. An operator may retry finalize
// after a partial failure.

use anyhow::{Context, Result};
use log::info;

use crate::database::connection::{DataStoreType, DatabaseConnection};

pub const SCHEMA_VERSION: i32 = 1;

pub const CORE_TABLES: [&str; 4] = [
    "wiki_schema_version",
    "wiki_users",
    "wiki_pages",
    "wiki_page_content",
];

const SQLITE_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wiki_schema_version (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS wiki_users (
        id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        is_admin INTEGER NOT NULL DEFAULT 0,
        is_activated INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wiki_pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        is_locked INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS wiki_page_content (
        id TEXT PRIMARY KEY NOT NULL,
        page_id INTEGER NOT NULL REFERENCES wiki_pages(id),
        text TEXT NOT NULL,
        edited_by TEXT NOT NULL,
        edited_at TEXT NOT NULL,
        version_number INTEGER NOT NULL
    )",
    "INSERT INTO wiki_schema_version (version) VALUES (1) ON CONFLICT (version) DO NOTHING",
];

const POSTGRES_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wiki_schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS wiki_users (
        id UUID PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        username VARCHAR(255) NOT NULL,
        password_hash VARCHAR(255) NOT NULL,
        role VARCHAR(32) NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        is_activated BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wiki_pages (
        id SERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        tags VARCHAR(255) NOT NULL DEFAULT '',
        created_by VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        is_locked BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS wiki_page_content (
        id UUID PRIMARY KEY,
        page_id INTEGER NOT NULL REFERENCES wiki_pages(id),
        text TEXT NOT NULL,
        edited_by VARCHAR(255) NOT NULL,
        edited_at TIMESTAMPTZ NOT NULL,
        version_number INTEGER NOT NULL
    )",
    "INSERT INTO wiki_schema_version (version) VALUES (1) ON CONFLICT (version) DO NOTHING",
];

const MYSQL_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wiki_schema_version (
        version INT NOT NULL PRIMARY KEY,
        applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS wiki_users (
        id CHAR(36) NOT NULL PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        username VARCHAR(255) NOT NULL,
        password_hash VARCHAR(255) NOT NULL,
        role VARCHAR(32) NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        is_activated BOOLEAN NOT NULL DEFAULT TRUE,
        created_at DATETIME NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wiki_pages (
        id INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        tags VARCHAR(255) NOT NULL DEFAULT '',
        created_by VARCHAR(255) NOT NULL,
        created_at DATETIME NOT NULL,
        is_locked BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS wiki_page_content (
        id CHAR(36) NOT NULL PRIMARY KEY,
        page_id INT NOT NULL,
        text LONGTEXT NOT NULL,
        edited_by VARCHAR(255) NOT NULL,
        edited_at DATETIME NOT NULL,
        version_number INT NOT NULL,
        FOREIGN KEY (page_id) REFERENCES wiki_pages(id)
    )",
    "INSERT IGNORE INTO wiki_schema_version (version) VALUES (1)",
];

/// SQL Server has no `CREATE TABLE IF NOT EXISTS`; batches are guarded by catalog lookups.
const SQL_SERVER_DDL: &str = r#"
IF OBJECT_ID(N'dbo.wiki_schema_version', N'U') IS NULL
CREATE TABLE dbo.wiki_schema_version (
    version INT NOT NULL PRIMARY KEY,
    applied_at DATETIME2 NOT NULL DEFAULT SYSUTCDATETIME()
);
GO
IF OBJECT_ID(N'dbo.wiki_users', N'U') IS NULL
CREATE TABLE dbo.wiki_users (
    id UNIQUEIDENTIFIER NOT NULL PRIMARY KEY,
    email NVARCHAR(255) NOT NULL UNIQUE,
    username NVARCHAR(255) NOT NULL,
    password_hash NVARCHAR(255) NOT NULL,
    role NVARCHAR(32) NOT NULL,
    is_admin BIT NOT NULL DEFAULT 0,
    is_activated BIT NOT NULL DEFAULT 1,
    created_at DATETIME2 NOT NULL
);
GO
IF OBJECT_ID(N'dbo.wiki_pages', N'U') IS NULL
CREATE TABLE dbo.wiki_pages (
    id INT IDENTITY(1,1) NOT NULL PRIMARY KEY,
    title NVARCHAR(255) NOT NULL,
    tags NVARCHAR(255) NOT NULL DEFAULT '',
    created_by NVARCHAR(255) NOT NULL,
    created_at DATETIME2 NOT NULL,
    is_locked BIT NOT NULL DEFAULT 0
);
GO
IF OBJECT_ID(N'dbo.wiki_page_content', N'U') IS NULL
CREATE TABLE dbo.wiki_page_content (
    id UNIQUEIDENTIFIER NOT NULL PRIMARY KEY,
    page_id INT NOT NULL REFERENCES dbo.wiki_pages(id),
    text NVARCHAR(MAX) NOT NULL,
    edited_by NVARCHAR(255) NOT NULL,
    edited_at DATETIME2 NOT NULL,
    version_number INT NOT NULL
);
GO
IF NOT EXISTS (SELECT 1 FROM dbo.wiki_schema_version WHERE version = 1)
INSERT INTO dbo.wiki_schema_version (version) VALUES (1);
"#;

/// Statements to run, in order, for the given store.
pub fn statements_for(store: DataStoreType) -> Vec<String> {
    match store {
        DataStoreType::SqlServer => split_sql_server_batches(SQL_SERVER_DDL),
        DataStoreType::Postgres => POSTGRES_DDL.iter().map(|s| s.to_string()).collect(),
        DataStoreType::MySql => MYSQL_DDL.iter().map(|s| s.to_string()).collect(),
        DataStoreType::Sqlite => SQLITE_DDL.iter().map(|s| s.to_string()).collect(),
    }
}

/// Create the core schema if missing and record the schema version once.
/// Returns the schema version present afterwards.
pub async fn initialize(conn: &DatabaseConnection) -> Result<i32> {
    let store = conn.store_type();
    let statements = statements_for(store);
    info!(
        "[PHASE: finalize] [STEP: schema_init] Applying {} guarded statement(s) (store={})",
        statements.len(),
        store
    );

    for (i, sql) in statements.iter().enumerate() {
        conn.execute(sql)
            .await
            .with_context(|| format!("Schema statement {} of {} failed (store={})", i + 1, statements.len(), store))?;
    }

    let version = current_version(conn).await?;
    info!(
        "[PHASE: finalize] [STEP: schema_init] Schema ready at version {} (store={})",
        version, store
    );
    Ok(version)
}

/// Highest recorded schema version (0 if the table is empty).
pub async fn current_version(conn: &DatabaseConnection) -> Result<i32> {
    const SQL: &str = "SELECT COALESCE(MAX(version), 0) FROM wiki_schema_version";
    let version = match conn {
        DatabaseConnection::SqlServer(c) => {
            let client = c.client();
            let mut client = client.lock().await;
            let row = client
                .simple_query(SQL)
                .await?
                .into_row()
                .await?
                .context("schema version query returned no row")?;
            row.get::<i32, _>(0).unwrap_or(0)
        }
        DatabaseConnection::Postgres(pool) => sqlx::query_scalar::<_, i32>(SQL).fetch_one(pool).await?,
        // MySQL widens COALESCE over INT to BIGINT.
        DatabaseConnection::MySql(pool) => {
            let v = sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await?;
            i32::try_from(v).context("schema version out of range")?
        }
        DatabaseConnection::Sqlite(pool) => {
            let v = sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await?;
            i32::try_from(v).context("schema version out of range")?
        }
    };
    Ok(version)
}

/// Split a T-SQL script on `GO` batch separator lines.
fn split_sql_server_batches(sql: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        if line.trim().eq_ignore_ascii_case("GO") {
            if !current.trim().is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        batches.push(current);
    }
    batches
}
