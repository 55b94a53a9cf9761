// Wizard response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{Language, ProbeKind, WizardStep};
use crate::settings::artifact::ConfigArtifact;

// =========================
// Generic wrapper (what the presentation layer receives)
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    /// Request was handled but the outcome is negative (violations, probe failure).
    pub fn rejected(data: T, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            message: None,
        }
    }
}

// =========================
// Probes
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeFailureKind {
    NotFound,
    PermissionDenied,
    NotADirectory,
    OutsideInstallRoot,
    Unreachable,
    Timeout,
    InvalidInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub succeeded: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProbeFailureKind>,
}

impl ProbeResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            failure: None,
        }
    }

    pub fn failure(kind: ProbeFailureKind, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            failure: Some(kind),
        }
    }
}

// =========================
// Validation
// =========================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub field_name: String,
    pub message_key: String,
}

impl Violation {
    pub fn new(field_name: &str, message_key: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            message_key: message_key.to_string(),
        }
    }
}

/// All violations for one submission. Empty means the step may advance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, field_name: &str, message_key: &str) {
        self.violations.push(Violation::new(field_name, message_key));
    }

    pub fn has_violation(&self, field_name: &str) -> bool {
        self.violations.iter().any(|v| v.field_name == field_name)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field_name.as_str()).collect()
    }
}

// =========================
// Step views
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageOption {
    pub tag: String,
    pub native_name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub step: WizardStep,
    pub step_index: usize,
    pub step_count: usize,
    pub title: String,
    pub language: String,
    #[serde(default)]
    pub languages: Vec<LanguageOption>,
    #[serde(default)]
    pub fields: Vec<FieldView>,
    #[serde(default)]
    pub probes: Vec<ProbeKind>,
    pub can_retreat: bool,
    pub installed: bool,
}

impl StepView {
    pub fn language_options(selected: Language) -> Vec<LanguageOption> {
        Language::ALL
            .iter()
            .map(|l| LanguageOption {
                tag: l.tag().to_string(),
                native_name: l.native_name().to_string(),
                selected: *l == selected,
            })
            .collect()
    }
}

/// Payload of every wizard round-trip: the view after the action plus whatever the action produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub view: StepView,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalization: Option<FinalizationRecord>,
}

impl StepResponse {
    pub fn view(view: StepView) -> Self {
        Self {
            view,
            violations: Vec::new(),
            probe: None,
            finalization: None,
        }
    }
}

// =========================
// Finalize
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStoreDescriptor {
    pub data_store_type: String,
    /// Secrets masked; the artifact on disk holds the real value.
    pub connection_string_masked: String,
    pub schema_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCredentialRecord {
    pub email: String,
    pub role: String,
    pub password_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// What one successful finalize produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationRecord {
    pub config_path: String,
    pub config: ConfigArtifact,
    pub data_store: DataStoreDescriptor,
    pub admin: AdminCredentialRecord,
    pub installed_at: DateTime<Utc>,
}
