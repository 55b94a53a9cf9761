// Logging utilities
// `[PHASE: ..] [STEP: ..]` tag extraction, JSON/text line formatting, and secret masking.

use log::Level;
use serde_json::json;
use url::Url;

/// Keys whose values are secrets in `key=value;` connection strings.
const SECRET_KEYS: &[&str] = &["password", "pwd"];
/// Keys that identify a principal; shown partially.
const PRINCIPAL_KEYS: &[&str] = &["userid", "user", "username", "uid"];

/// Partially mask an identifier (short values are hidden entirely).
pub fn mask_sensitive(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Mask credentials in a connection string, keeping host/database visible for troubleshooting.
///
/// Handles URL forms (`postgres://`, `mysql://`, `sqlite:`) and `key=value;` forms.
pub fn mask_connection_string(conn_str: &str) -> String {
    let s = conn_str.trim();
    if s.is_empty() {
        return String::new();
    }

    if s.contains("://") {
        // Unparseable URL: never echo it back, it may carry a password.
        return mask_url_credentials(s).unwrap_or_else(|| "***".to_string());
    }

    s.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(mask_kv_part)
        .collect::<Vec<_>>()
        .join(";")
}

fn mask_kv_part(part: &str) -> String {
    let Some((k, v)) = part.split_once('=') else {
        return part.to_string();
    };
    let key = k.trim();
    let norm_key = key.to_ascii_lowercase().replace([' ', '_'], "");

    if SECRET_KEYS.contains(&norm_key.as_str()) {
        format!("{}=***", key)
    } else if PRINCIPAL_KEYS.contains(&norm_key.as_str()) {
        format!("{}={}", key, mask_sensitive(v.trim()))
    } else {
        part.to_string()
    }
}

fn mask_url_credentials(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    if url.password().is_some() {
        url.set_password(Some("***")).ok()?;
    }
    if !url.username().is_empty() {
        let masked = mask_sensitive(url.username());
        url.set_username(&masked).ok()?;
    }
    Some(url.to_string())
}

/// Split `[PHASE: x]` and `[STEP: y]` tags out of a log message.
/// Returns `(phase, step, remaining_message)`.
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, rest) = take_tag(message, "[PHASE:");
    let (step, rest) = take_tag(&rest, "[STEP:");
    (phase, step, rest)
}

fn take_tag(message: &str, marker: &str) -> (Option<String>, String) {
    let Some(start) = message.find(marker) else {
        return (None, message.to_string());
    };
    let Some(len) = message[start..].find(']') else {
        return (None, message.to_string());
    };
    let value = message[start + marker.len()..start + len].trim().to_string();
    let rest = format!("{} {}", &message[..start], &message[start + len + 1..])
        .trim()
        .to_string();
    (Some(value), rest)
}

/// One JSON object per line for the `.log` sink.
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });
    if let Some(phase) = phase {
        entry["phase"] = json!(phase);
    }
    if let Some(step) = step {
        entry["step"] = json!(step);
    }
    serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string())
}

/// Human-readable line for the `.txt` sink and stdout.
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut line = format!("[{}] [{}]", timestamp, level.as_str());
    if let Some(phase) = phase {
        line.push_str(&format!(" [PHASE: {}]", phase));
    }
    if let Some(step) = step {
        line.push_str(&format!(" [STEP: {}]", step));
    }
    line.push_str(&format!(" [{}] {}", target, message));
    line
}
