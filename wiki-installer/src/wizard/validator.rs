// Per-step field validation
//
// Pure functions: no I/O, no live connectivity checks. Every violated field is reported in one
// pass so the operator never needs a second round-trip to discover the next problem.

use regex::Regex;
use std::collections::BTreeMap;

use crate::database::connection::DataStoreType;
use crate::models::responses::ValidationResult;
use crate::models::step::{
    MarkupType, WizardStep, ADMIN_EMAIL, ADMIN_PASSWORD, ALLOWED_FILE_TYPES, ATTACHMENTS_FOLDER,
    CONNECTION_STRING, DATA_STORE_TYPE, MARKUP_TYPE, PASSWORD_CONFIRMATION, SITE_NAME, SITE_URL,
};

// Accepts single-label domains ("admin@localhost").
const EMAIL_PATTERN: &str =
    r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";
const FILE_TYPE_PATTERN: &str = r"^[A-Za-z0-9]{1,16}$";

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub min_password_length: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_password_length: 6,
        }
    }
}

/// Run the validator bound to `step`.
pub fn validate_step(
    step: WizardStep,
    fields: &BTreeMap<String, String>,
    rules: &ValidationRules,
) -> ValidationResult {
    match step {
        WizardStep::Environment | WizardStep::Complete => ValidationResult::default(),
        WizardStep::SiteAndDataStore => validate_site_and_data_store(fields),
        WizardStep::AdminAccount => validate_admin_account(fields, rules),
        WizardStep::AttachmentsAndOptions => validate_attachments_and_options(fields),
    }
}

pub fn validate_site_and_data_store(fields: &BTreeMap<String, String>) -> ValidationResult {
    let mut result = ValidationResult::default();
    if value(fields, SITE_NAME).is_none() {
        result.push(SITE_NAME, "siteNameRequired");
    }
    if value(fields, SITE_URL).is_none() {
        result.push(SITE_URL, "siteUrlRequired");
    }
    // Blank falls back to the default store; only an unknown name is a violation.
    if let Some(name) = value(fields, DATA_STORE_TYPE) {
        if name.parse::<DataStoreType>().is_err() {
            result.push(DATA_STORE_TYPE, "dataStoreTypeUnknown");
        }
    }
    if value(fields, CONNECTION_STRING).is_none() {
        result.push(CONNECTION_STRING, "connectionStringRequired");
    }
    result
}

pub fn validate_admin_account(
    fields: &BTreeMap<String, String>,
    rules: &ValidationRules,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    match value(fields, ADMIN_EMAIL) {
        None => result.push(ADMIN_EMAIL, "adminEmailRequired"),
        Some(email) if !is_well_formed_email(email) => result.push(ADMIN_EMAIL, "adminEmailInvalid"),
        Some(_) => {}
    }

    let password = fields.get(ADMIN_PASSWORD).map(String::as_str).unwrap_or_default();
    if password.trim().is_empty() {
        result.push(ADMIN_PASSWORD, "adminPasswordRequired");
        // A mismatch against an empty password says nothing new.
        return result;
    }
    if password.chars().count() < rules.min_password_length {
        result.push(ADMIN_PASSWORD, "adminPasswordTooShort");
    }

    let confirmation = fields
        .get(PASSWORD_CONFIRMATION)
        .map(String::as_str)
        .unwrap_or_default();
    if confirmation != password {
        result.push(PASSWORD_CONFIRMATION, "passwordConfirmationMismatch");
    }
    result
}

pub fn validate_attachments_and_options(fields: &BTreeMap<String, String>) -> ValidationResult {
    let mut result = ValidationResult::default();
    if value(fields, ATTACHMENTS_FOLDER).is_none() {
        result.push(ATTACHMENTS_FOLDER, "attachmentsFolderRequired");
    }
    if let Some(list) = value(fields, ALLOWED_FILE_TYPES) {
        if !is_file_type_list(list) {
            result.push(ALLOWED_FILE_TYPES, "allowedFileTypesInvalid");
        }
    }
    if let Some(markup) = value(fields, MARKUP_TYPE) {
        if markup.parse::<MarkupType>().is_err() {
            result.push(MARKUP_TYPE, "markupTypeUnknown");
        }
    }
    result
}

pub fn is_well_formed_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN)
        .map(|re| re.is_match(email.trim()))
        .unwrap_or(false)
}

fn is_file_type_list(list: &str) -> bool {
    let Ok(re) = Regex::new(FILE_TYPE_PATTERN) else {
        return false;
    };
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.'))
        .all(|ext| re.is_match(ext))
}

fn value<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_site() -> BTreeMap<String, String> {
        fields(&[
            (SITE_NAME, "Acceptance Tests"),
            (SITE_URL, "http://localhost"),
            (DATA_STORE_TYPE, "SQLite"),
            (CONNECTION_STRING, "Data Source=|DataDirectory|wiki.db"),
        ])
    }

    fn valid_admin() -> BTreeMap<String, String> {
        fields(&[
            (ADMIN_EMAIL, "admin@localhost"),
            (ADMIN_PASSWORD, "password"),
            (PASSWORD_CONFIRMATION, "password"),
        ])
    }

    fn valid_attachments() -> BTreeMap<String, String> {
        fields(&[(ATTACHMENTS_FOLDER, "~/App_Data/Attachments")])
    }

    #[test]
    fn environment_step_has_no_required_fields() {
        let result = validate_step(WizardStep::Environment, &BTreeMap::new(), &ValidationRules::default());
        assert!(result.is_valid());
    }

    #[test]
    fn valid_steps_pass() {
        let rules = ValidationRules::default();
        assert!(validate_step(WizardStep::SiteAndDataStore, &valid_site(), &rules).is_valid());
        assert!(validate_step(WizardStep::AdminAccount, &valid_admin(), &rules).is_valid());
        assert!(validate_step(WizardStep::AttachmentsAndOptions, &valid_attachments(), &rules).is_valid());
    }

    #[test]
    fn each_empty_required_field_is_reported_alone() {
        let rules = ValidationRules::default();
        let cases: [(WizardStep, fn() -> BTreeMap<String, String>, &[&str]); 3] = [
            (WizardStep::SiteAndDataStore, valid_site, &[SITE_NAME, SITE_URL, CONNECTION_STRING]),
            (WizardStep::AdminAccount, valid_admin, &[ADMIN_EMAIL, ADMIN_PASSWORD]),
            (WizardStep::AttachmentsAndOptions, valid_attachments, &[ATTACHMENTS_FOLDER]),
        ];
        for (step, make, required) in cases {
            for field in required {
                let mut submitted = make();
                submitted.insert(field.to_string(), "  ".to_string());
                let result = validate_step(step, &submitted, &rules);
                assert_eq!(result.fields(), vec![*field], "{} / {}", step, field);
            }
        }
    }

    #[test]
    fn all_violations_reported_together() {
        let result = validate_site_and_data_store(&BTreeMap::new());
        assert_eq!(result.fields(), vec![SITE_NAME, SITE_URL, CONNECTION_STRING]);
    }

    #[test]
    fn blank_store_type_uses_default_but_unknown_is_rejected() {
        let mut submitted = valid_site();
        submitted.insert(DATA_STORE_TYPE.to_string(), String::new());
        assert!(validate_site_and_data_store(&submitted).is_valid());

        submitted.insert(DATA_STORE_TYPE.to_string(), "Oracle".to_string());
        let result = validate_site_and_data_store(&submitted);
        assert_eq!(result.fields(), vec![DATA_STORE_TYPE]);
        assert_eq!(result.violations[0].message_key, "dataStoreTypeUnknown");
    }

    #[test]
    fn one_character_password_is_rejected() {
        let submitted = fields(&[
            (ADMIN_EMAIL, "admin@localhost"),
            (ADMIN_PASSWORD, "1"),
            (PASSWORD_CONFIRMATION, "1"),
        ]);
        let result = validate_admin_account(&submitted, &ValidationRules::default());
        assert_eq!(result.fields(), vec![ADMIN_PASSWORD]);
        assert_eq!(result.violations[0].message_key, "adminPasswordTooShort");
    }

    #[test]
    fn mismatch_is_reported_on_confirmation_field() {
        let submitted = fields(&[
            (ADMIN_EMAIL, "admin@localhost"),
            (ADMIN_PASSWORD, "secret1"),
            (PASSWORD_CONFIRMATION, "secret2"),
        ]);
        let result = validate_admin_account(&submitted, &ValidationRules::default());
        assert_eq!(result.fields(), vec![PASSWORD_CONFIRMATION]);
        assert!(!result.has_violation(ADMIN_PASSWORD));
    }

    #[test]
    fn minimum_length_comes_from_rules() {
        let submitted = fields(&[
            (ADMIN_EMAIL, "admin@localhost"),
            (ADMIN_PASSWORD, "password"),
            (PASSWORD_CONFIRMATION, "password"),
        ]);
        let strict = ValidationRules { min_password_length: 12 };
        assert_eq!(validate_admin_account(&submitted, &strict).fields(), vec![ADMIN_PASSWORD]);
    }

    #[test]
    fn email_syntax() {
        for ok in ["admin@localhost", "a.b+c@example.co.uk", "o'brien@example.org"] {
            assert!(is_well_formed_email(ok), "{}", ok);
        }
        for bad in ["admin", "@localhost", "admin@", "a b@example.com", "a@b@c", "admin@-bad.com"] {
            assert!(!is_well_formed_email(bad), "{}", bad);
        }
    }

    #[test]
    fn attachments_options_checks() {
        let mut submitted = valid_attachments();
        submitted.insert(ALLOWED_FILE_TYPES.to_string(), "jpg, .png,gif".to_string());
        submitted.insert(MARKUP_TYPE.to_string(), "markdown".to_string());
        assert!(validate_attachments_and_options(&submitted).is_valid());

        submitted.insert(ALLOWED_FILE_TYPES.to_string(), "jpg,,exe;rm".to_string());
        submitted.insert(MARKUP_TYPE.to_string(), "BBCode".to_string());
        let result = validate_attachments_and_options(&submitted);
        assert_eq!(result.fields(), vec![ALLOWED_FILE_TYPES, MARKUP_TYPE]);
    }
}
