// Data-store connection management
//
// One closed set of store variants behind the `DbConnector` capability. Production code uses
// `RealDbConnector`; tests plug in stubs to drive failure paths without a live server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySql, Pool, Postgres, Sqlite};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::utils::logging::mask_connection_string;
use crate::utils::path_resolver::{expand_data_directory, resolve_under_root};
use crate::utils::validation::{ado_value, check_connection_string, is_url_form, parse_ado_pairs, sqlite_database_path};

// =============================================================================
// Store variants
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataStoreType {
    #[serde(rename = "SQLServer", alias = "SqlServer", alias = "sqlserver")]
    SqlServer,
    #[serde(rename = "PostgreSQL", alias = "Postgres", alias = "postgres")]
    Postgres,
    #[serde(rename = "MySQL", alias = "MySql", alias = "mysql")]
    MySql,
    #[default]
    #[serde(rename = "SQLite", alias = "Sqlite", alias = "sqlite")]
    Sqlite,
}

impl DataStoreType {
    pub const ALL: [DataStoreType; 4] = [
        DataStoreType::SqlServer,
        DataStoreType::Postgres,
        DataStoreType::MySql,
        DataStoreType::Sqlite,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            DataStoreType::SqlServer => "SQLServer",
            DataStoreType::Postgres => "PostgreSQL",
            DataStoreType::MySql => "MySQL",
            DataStoreType::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for DataStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DataStoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '_', '-'], "");
        match norm.as_str() {
            "sqlserver" | "mssql" | "sqlserver2008" | "sqlserver2012" | "sqlserver2019" => {
                Ok(DataStoreType::SqlServer)
            }
            "postgres" | "postgresql" | "pg" => Ok(DataStoreType::Postgres),
            "mysql" | "mariadb" => Ok(DataStoreType::MySql),
            "sqlite" | "sqlite3" => Ok(DataStoreType::Sqlite),
            _ => Err(format!("Unsupported data store type: '{}'", s.trim())),
        }
    }
}

// =============================================================================
// DbConnector boundary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// The connection string is unusable for the selected store.
    InvalidInput,
    /// The target (e.g. an SQLite file) does not exist.
    NotFound,
    Unreachable,
    Timeout,
}

/// Error returned by connection attempts.
/// Keeps the operator-facing message separate from internal details.
#[derive(Debug, Clone)]
pub struct ConnectError {
    pub kind: ConnectErrorKind,
    /// Safe to show in the UI.
    pub user_message: String,
    /// For logs; driver message preserved, secrets masked.
    pub internal_details: String,
}

impl ConnectError {
    pub fn new(kind: ConnectErrorKind, user_message: impl Into<String>, internal_details: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: user_message.into(),
            internal_details: internal_details.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(
            ConnectErrorKind::Timeout,
            "Connection timed out. Check network connectivity and firewall.",
            format!("Connection attempt timed out after {:?}", after),
        )
    }

    /// Worth another attempt (network-level trouble, not bad input).
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ConnectErrorKind::Unreachable | ConnectErrorKind::Timeout)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message)
    }
}

impl std::error::Error for ConnectError {}

/// Opens connections to a data store. The wizard never talks to a driver directly.
#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&self, store: DataStoreType, connection_string: &str) -> Result<DatabaseConnection, ConnectError>;

    /// Bound for a single connection attempt.
    fn timeout_duration(&self) -> Duration {
        Duration::from_secs(20)
    }

    /// Attempts made by `connect_with_retry` (including the first).
    fn max_retries(&self) -> u32 {
        3
    }

    /// Base delay of the exponential backoff between attempts.
    fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(100)
    }
}

/// Connect with a per-attempt timeout, retrying transient failures with jittered backoff.
pub async fn connect_with_retry(
    connector: &dyn DbConnector,
    store: DataStoreType,
    connection_string: &str,
) -> Result<DatabaseConnection, ConnectError> {
    let per_attempt = connector.timeout_duration();
    let base_ms = connector.retry_base_delay().as_millis().max(1) as u64;
    let retry_strategy = ExponentialBackoff::from_millis(base_ms)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(connector.max_retries().saturating_sub(1) as usize)
        .map(jitter);

    let mut attempt_no = 0u32;
    let attempt = || {
        attempt_no += 1;
        let n = attempt_no;
        async move {
            let result = match timeout(per_attempt, connector.connect(store, connection_string)).await {
                Ok(inner) => inner,
                Err(_) => Err(ConnectError::timed_out(per_attempt)),
            };
            if let Err(e) = &result {
                log::warn!(
                    "[PHASE: database] [STEP: connect] Attempt {} failed (store={}): {}",
                    n,
                    store,
                    e.internal_details
                );
            }
            result
        }
    };

    RetryIf::spawn(retry_strategy, attempt, |e: &ConnectError| e.is_transient()).await
}

/// Production connector. Resolves `|DataDirectory|` and relative SQLite paths against the install root.
pub struct RealDbConnector {
    install_root: PathBuf,
    timeout: Duration,
    retries: u32,
}

impl RealDbConnector {
    pub fn new(install_root: impl Into<PathBuf>, timeout: Duration, retries: u32) -> Self {
        Self {
            install_root: install_root.into(),
            timeout,
            retries: retries.max(1),
        }
    }

    async fn open(&self, store: DataStoreType, conn_str: &str) -> Result<DatabaseConnection, ConnectError> {
        let expanded = expand_data_directory(conn_str, &self.install_root);
        check_connection_string(store, &expanded).map_err(|msg| {
            ConnectError::new(ConnectErrorKind::InvalidInput, msg.clone(), msg)
        })?;

        let opened = match store {
            DataStoreType::Sqlite => {
                let path = self.sqlite_path(&expanded)?;
                DatabaseConnection::sqlite(&path, self.timeout).await
            }
            DataStoreType::SqlServer => DatabaseConnection::sql_server(&expanded).await,
            DataStoreType::Postgres => DatabaseConnection::postgres(&expanded, self.timeout).await,
            DataStoreType::MySql => DatabaseConnection::mysql(&expanded, self.timeout).await,
        };

        opened.map_err(|e| {
            ConnectError::new(
                ConnectErrorKind::Unreachable,
                format!("Unable to connect to the {} data store: {}", store, root_cause(&e)),
                format!(
                    "Connection error (store={}, masked_conn_str={}): {:#}",
                    store,
                    mask_connection_string(&expanded),
                    e
                ),
            )
        })
    }

    fn sqlite_path(&self, expanded: &str) -> Result<PathBuf, ConnectError> {
        let raw = sqlite_database_path(expanded).ok_or_else(|| {
            ConnectError::new(
                ConnectErrorKind::InvalidInput,
                "SQLite connection string must name a database file.",
                "no data source in sqlite connection string",
            )
        })?;
        let path = resolve_under_root(&self.install_root, &raw).map_err(|e| {
            ConnectError::new(
                ConnectErrorKind::InvalidInput,
                "The SQLite database file must be inside the install root.",
                e.to_string(),
            )
        })?;
        // Probing must never create the database file.
        if !path.is_file() {
            return Err(ConnectError::new(
                ConnectErrorKind::NotFound,
                format!("Database file not found: {}", path.display()),
                format!("sqlite file missing at {:?}", path),
            ));
        }
        Ok(path)
    }
}

#[async_trait]
impl DbConnector for RealDbConnector {
    async fn connect(&self, store: DataStoreType, connection_string: &str) -> Result<DatabaseConnection, ConnectError> {
        match timeout(self.timeout, self.open(store, connection_string)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::timed_out(self.timeout)),
        }
    }

    fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }
}

/// Driver message without anyhow's context chain (which may carry the masked string).
fn root_cause(e: &anyhow::Error) -> String {
    e.root_cause().to_string()
}

// =============================================================================
// Connections
// =============================================================================

/// SQL Server client wrapper. tiberius clients are not `Clone`; share behind a mutex.
pub struct SqlServerConnection {
    client: Arc<Mutex<Client<Compat<TcpStream>>>>,
}

impl Clone for SqlServerConnection {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl SqlServerConnection {
    pub fn client(&self) -> Arc<Mutex<Client<Compat<TcpStream>>>> {
        Arc::clone(&self.client)
    }
}

#[derive(Clone)]
pub enum DatabaseConnection {
    SqlServer(SqlServerConnection),
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

impl DatabaseConnection {
    pub fn store_type(&self) -> DataStoreType {
        match self {
            DatabaseConnection::SqlServer(_) => DataStoreType::SqlServer,
            DatabaseConnection::Postgres(_) => DataStoreType::Postgres,
            DatabaseConnection::MySql(_) => DataStoreType::MySql,
            DatabaseConnection::Sqlite(_) => DataStoreType::Sqlite,
        }
    }

    /// Open an existing SQLite database file (never created here).
    pub async fn sqlite(path: &Path, acquire_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {:?}", path))?;
        Ok(DatabaseConnection::Sqlite(pool))
    }

    /// PostgreSQL from a URL or `Host=..;Port=..;Database=..;Username=..;Password=..` pairs.
    pub async fn postgres(conn_str: &str, acquire_timeout: Duration) -> Result<Self> {
        let options = if is_url_form(conn_str) {
            PgConnectOptions::from_str(conn_str).context("Invalid PostgreSQL connection URL")?
        } else {
            let pairs = parse_ado_pairs(conn_str);
            let mut options = PgConnectOptions::new();
            if let Some(host) = ado_value(&pairs, &["host", "server", "data source"]) {
                options = options.host(host);
            }
            if let Some(port) = ado_value(&pairs, &["port"]).and_then(|p| p.parse::<u16>().ok()) {
                options = options.port(port);
            }
            if let Some(db) = ado_value(&pairs, &["database", "initial catalog"]) {
                options = options.database(db);
            }
            if let Some(user) = ado_value(&pairs, &["username", "user id", "uid", "user"]) {
                options = options.username(user);
            }
            if let Some(pass) = ado_value(&pairs, &["password", "pwd"]) {
                options = options.password(pass);
            }
            options
        };
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(DatabaseConnection::Postgres(pool))
    }

    /// MySQL from a URL or `Server=..;Port=..;Database=..;Uid=..;Pwd=..` pairs.
    pub async fn mysql(conn_str: &str, acquire_timeout: Duration) -> Result<Self> {
        let options = if is_url_form(conn_str) {
            MySqlConnectOptions::from_str(conn_str).context("Invalid MySQL connection URL")?
        } else {
            let pairs = parse_ado_pairs(conn_str);
            let mut options = MySqlConnectOptions::new();
            if let Some(host) = ado_value(&pairs, &["server", "host", "data source"]) {
                options = options.host(host);
            }
            if let Some(port) = ado_value(&pairs, &["port"]).and_then(|p| p.parse::<u16>().ok()) {
                options = options.port(port);
            }
            if let Some(db) = ado_value(&pairs, &["database", "initial catalog"]) {
                options = options.database(db);
            }
            if let Some(user) = ado_value(&pairs, &["uid", "user id", "user", "username"]) {
                options = options.username(user);
            }
            if let Some(pass) = ado_value(&pairs, &["pwd", "password"]) {
                options = options.password(pass);
            }
            options
        };
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .context("Failed to connect to MySQL")?;
        Ok(DatabaseConnection::MySql(pool))
    }

    pub async fn sql_server(conn_str: &str) -> Result<Self> {
        let config = Config::from_ado_string(conn_str).context("Invalid SQL Server connection string")?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .context("Failed to reach SQL Server host")?;
        tcp.set_nodelay(true)?;

        // tiberius expects a futures-io stream.
        let client = Client::connect(config, tcp.compat_write())
            .await
            .context("SQL Server login failed")?;
        Ok(DatabaseConnection::SqlServer(SqlServerConnection {
            client: Arc::new(Mutex::new(client)),
        }))
    }

    /// Trivial round trip (`SELECT 1`).
    pub async fn ping(&self) -> Result<()> {
        match self {
            DatabaseConnection::SqlServer(conn) => {
                let client = conn.client();
                let mut client = client.lock().await;
                client.simple_query("SELECT 1").await?.into_row().await?;
            }
            DatabaseConnection::Postgres(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
            DatabaseConnection::MySql(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
            DatabaseConnection::Sqlite(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
        }
        Ok(())
    }

    /// Execute one statement (no result rows expected).
    pub async fn execute(&self, sql: &str) -> Result<()> {
        match self {
            DatabaseConnection::SqlServer(conn) => {
                let client = conn.client();
                let mut client = client.lock().await;
                client.execute(sql, &[]).await?;
            }
            DatabaseConnection::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            DatabaseConnection::MySql(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            DatabaseConnection::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Release the connection. Pools are closed; the SQL Server client is closed when unshared.
    pub async fn close(self) {
        match self {
            DatabaseConnection::SqlServer(conn) => {
                if let Ok(client) = Arc::try_unwrap(conn.client) {
                    if let Err(e) = client.into_inner().close().await {
                        log::debug!("[PHASE: database] [STEP: close] SQL Server close failed: {}", e);
                    }
                }
            }
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql(pool) => pool.close().await,
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

// =============================================================================
// Tests: deterministic connection failure behavior
// =============================================================================
