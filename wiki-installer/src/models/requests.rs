// Wizard request models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::step::{
    ProbeKind, WizardStep, ADMIN_EMAIL, ADMIN_PASSWORD, ALLOWED_FILE_TYPES, ATTACHMENTS_FOLDER,
    CONNECTION_STRING, DATA_STORE_TYPE, MARKUP_TYPE, PASSWORD_CONFIRMATION, SITE_NAME, SITE_URL,
    USE_BROWSER_CACHE, USE_OBJECT_CACHE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardAction {
    View,
    Advance,
    Retreat,
    Test,
    SelectLanguage,
}

/// One round-trip from the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    pub action: WizardAction,
    /// Submitted values for the current step (advance) or the probe inputs (test).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub probe: Option<ProbeKind>,
    #[serde(default)]
    pub language: Option<String>,
}

impl StepRequest {
    pub fn new(action: WizardAction) -> Self {
        Self {
            action,
            fields: BTreeMap::new(),
            probe: None,
            language: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Unattended answers for `--answers=<file.toml>`. Missing keys fall back to step defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersFile {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub data_store_type: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    /// Defaults to `admin_password` when omitted.
    #[serde(default)]
    pub password_confirmation: Option<String>,
    #[serde(default)]
    pub attachments_folder: Option<String>,
    #[serde(default)]
    pub use_object_cache: Option<bool>,
    #[serde(default)]
    pub use_browser_cache: Option<bool>,
    #[serde(default)]
    pub allowed_file_types: Option<String>,
    #[serde(default)]
    pub markup_type: Option<String>,
}

impl AnswersFile {
    /// Submission for `step`. Omitted keys are left out so step defaults apply.
    pub fn fields_for(&self, step: WizardStep) -> BTreeMap<String, String> {
        let toggle = |v: Option<bool>| v.map(|on| on.to_string());
        let pairs: Vec<(&str, Option<String>)> = match step {
            WizardStep::Environment | WizardStep::Complete => Vec::new(),
            WizardStep::SiteAndDataStore => vec![
                (SITE_NAME, self.site_name.clone()),
                (SITE_URL, self.site_url.clone()),
                (DATA_STORE_TYPE, self.data_store_type.clone()),
                (CONNECTION_STRING, self.connection_string.clone()),
            ],
            WizardStep::AdminAccount => vec![
                (ADMIN_EMAIL, self.admin_email.clone()),
                (ADMIN_PASSWORD, self.admin_password.clone()),
                (
                    PASSWORD_CONFIRMATION,
                    self.password_confirmation
                        .clone()
                        .or_else(|| self.admin_password.clone()),
                ),
            ],
            WizardStep::AttachmentsAndOptions => vec![
                (ATTACHMENTS_FOLDER, self.attachments_folder.clone()),
                (USE_OBJECT_CACHE, toggle(self.use_object_cache)),
                (USE_BROWSER_CACHE, toggle(self.use_browser_cache)),
                (ALLOWED_FILE_TYPES, self.allowed_file_types.clone()),
                (MARKUP_TYPE, self.markup_type.clone()),
            ],
        };
        let mut fields: BTreeMap<String, String> = pairs
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect();
        // Unattended runs have no form to pre-fill, so fall back to the shown defaults.
        for &name in step.field_names() {
            if !fields.contains_key(name) {
                if let Some(default) = WizardStep::default_value(name) {
                    fields.insert(name.to_string(), default.to_string());
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_request_deserializes_camel_case() {
        let json = r#"{"action":"test","probe":"dataStoreConnection","fields":{"ConnectionString":"x"}}"#;
        let req: StepRequest = serde_json::from_str(json).expect("parse");
        assert_eq!(req.action, WizardAction::Test);
        assert_eq!(req.probe, Some(ProbeKind::DataStoreConnection));
        assert_eq!(req.fields.get("ConnectionString").map(String::as_str), Some("x"));
        assert!(req.language.is_none());
    }

    #[test]
    fn answers_file_tolerates_missing_keys() {
        let answers: AnswersFile = toml::from_str(
            r#"
adminEmail = "admin@localhost"
adminPassword = "password"
useObjectCache = true
"#,
        )
        .expect("parse");
        assert_eq!(answers.admin_email.as_deref(), Some("admin@localhost"));
        assert_eq!(answers.use_object_cache, Some(true));
        assert!(answers.site_name.is_none());
    }

    #[test]
    fn answers_map_to_step_fields() {
        let answers = AnswersFile {
            admin_email: Some("admin@localhost".into()),
            admin_password: Some("password".into()),
            use_object_cache: Some(true),
            ..Default::default()
        };

        let admin = answers.fields_for(WizardStep::AdminAccount);
        assert_eq!(admin.get(PASSWORD_CONFIRMATION).map(String::as_str), Some("password"));

        let site = answers.fields_for(WizardStep::SiteAndDataStore);
        assert_eq!(site.get(SITE_NAME).map(String::as_str), Some("My Wiki"));
        assert!(!site.contains_key(CONNECTION_STRING));

        let options = answers.fields_for(WizardStep::AttachmentsAndOptions);
        assert_eq!(options.get(USE_OBJECT_CACHE).map(String::as_str), Some("true"));
        assert_eq!(options.get(USE_BROWSER_CACHE).map(String::as_str), Some("false"));
        assert!(answers.fields_for(WizardStep::Environment).is_empty());
    }
}
