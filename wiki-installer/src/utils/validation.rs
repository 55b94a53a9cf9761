// Connection-string syntax checks
//
// Fail-closed checks run before any network activity. They never echo the raw string back:
// messages name the missing piece only.

use std::collections::HashMap;
use url::Url;

use crate::database::connection::DataStoreType;

/// Parse `key=value;key=value` pairs. Keys are lowercased; a bare segment maps to "".
pub fn parse_ado_pairs(conn_str: &str) -> HashMap<String, String> {
    conn_str
        .split(';')
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .filter_map(|seg| {
            let (k, v) = seg
                .split_once('=')
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .unwrap_or_else(|| (seg.to_ascii_lowercase(), String::new()));
            (!k.is_empty()).then_some((k, v))
        })
        .collect()
}

/// First non-empty value among `keys`.
pub fn ado_value<'a>(pairs: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| pairs.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

pub fn is_url_form(conn_str: &str) -> bool {
    conn_str.trim().contains("://")
}

/// File path named by an SQLite connection string.
///
/// Accepts `sqlite://<path>`, `sqlite:<path>`, `Data Source=<path>` (also `DataSource`/`Filename`),
/// or a bare path.
pub fn sqlite_database_path(conn_str: &str) -> Option<String> {
    let s = conn_str.trim();
    let lower = s.to_ascii_lowercase();

    let path = if lower.starts_with("sqlite:") {
        let rest = &s["sqlite:".len()..];
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        rest.split('?').next().unwrap_or_default().to_string()
    } else if s.contains('=') {
        let pairs = parse_ado_pairs(s);
        ado_value(&pairs, &["data source", "datasource", "filename"])?.to_string()
    } else {
        s.to_string()
    };

    let path = path.trim().to_string();
    (!path.is_empty()).then_some(path)
}

/// Validate that a connection string is usable for the selected store.
pub fn check_connection_string(store: DataStoreType, conn_str: &str) -> Result<(), String> {
    let s = conn_str.trim();
    if s.is_empty() {
        return Err("Connection string is required.".to_string());
    }

    match store {
        DataStoreType::SqlServer => check_sql_server_ado(s),
        DataStoreType::Postgres => check_server_store(s, &["postgres", "postgresql"], "PostgreSQL"),
        DataStoreType::MySql => check_server_store(s, &["mysql", "mariadb"], "MySQL"),
        DataStoreType::Sqlite => sqlite_database_path(s)
            .map(|_| ())
            .ok_or_else(|| "SQLite connection string must name a database file (Data Source=...).".to_string()),
    }
}

fn check_sql_server_ado(conn_str: &str) -> Result<(), String> {
    if is_url_form(conn_str) {
        return Err("SQL Server connection string must use key=value pairs (Server=...;Database=...).".to_string());
    }
    let pairs = parse_ado_pairs(conn_str);
    if ado_value(&pairs, &["server", "data source", "address", "addr"]).is_none() {
        return Err("Connection string is missing the server (Server=...).".to_string());
    }
    let has_user = ado_value(&pairs, &["user id", "uid", "user"]).is_some();
    let has_password = ado_value(&pairs, &["password", "pwd"]).is_some();
    if has_user && !has_password {
        return Err("Connection string names a user but no password.".to_string());
    }
    Ok(())
}

fn check_server_store(conn_str: &str, schemes: &[&str], label: &str) -> Result<(), String> {
    if is_url_form(conn_str) {
        let url = Url::parse(conn_str)
            .map_err(|_| format!("{} connection URL could not be parsed.", label))?;
        if !schemes.contains(&url.scheme()) {
            return Err(format!(
                "{} connection URL must start with {}://",
                label, schemes[0]
            ));
        }
        if url.host_str().map(str::trim).unwrap_or_default().is_empty() {
            return Err(format!("{} connection URL is missing the host.", label));
        }
        return Ok(());
    }

    let pairs = parse_ado_pairs(conn_str);
    if ado_value(&pairs, &["host", "server", "data source"]).is_none() {
        return Err(format!(
            "{} connection string is missing the host (Host=... or Server=...).",
            label
        ));
    }
    Ok(())
}
