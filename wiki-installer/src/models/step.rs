// Wizard step catalog
//
// The wizard is strictly linear: Environment -> SiteAndDataStore -> AdminAccount ->
// AttachmentsAndOptions -> Complete. Entering Complete is what triggers finalize.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =========================
// Field names (as submitted by the presentation layer)
// =========================

pub const SITE_NAME: &str = "SiteName";
pub const SITE_URL: &str = "SiteUrl";
pub const DATA_STORE_TYPE: &str = "DataStoreTypeName";
pub const CONNECTION_STRING: &str = "ConnectionString";
pub const ADMIN_EMAIL: &str = "AdminEmail";
pub const ADMIN_PASSWORD: &str = "AdminPassword";
pub const PASSWORD_CONFIRMATION: &str = "PasswordConfirmation";
pub const ATTACHMENTS_FOLDER: &str = "AttachmentsFolder";
pub const USE_OBJECT_CACHE: &str = "UseObjectCache";
pub const USE_BROWSER_CACHE: &str = "UseBrowserCache";
pub const ALLOWED_FILE_TYPES: &str = "AllowedFileTypes";
pub const MARKUP_TYPE: &str = "MarkupType";

pub const DEFAULT_SITE_NAME: &str = "My Wiki";
pub const DEFAULT_SITE_URL: &str = "http://localhost";
pub const DEFAULT_ATTACHMENTS_FOLDER: &str = "~/App_Data/Attachments";
pub const DEFAULT_ALLOWED_FILE_TYPES: &str = "jpg,png,gif,zip,xml,pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    Environment,
    SiteAndDataStore,
    AdminAccount,
    AttachmentsAndOptions,
    Complete,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Environment,
        WizardStep::SiteAndDataStore,
        WizardStep::AdminAccount,
        WizardStep::AttachmentsAndOptions,
        WizardStep::Complete,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            WizardStep::Environment => 0,
            WizardStep::SiteAndDataStore => 1,
            WizardStep::AdminAccount => 2,
            WizardStep::AttachmentsAndOptions => 3,
            WizardStep::Complete => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The following step, or `None` at the terminal step.
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// The preceding step, or `None` at the first step.
    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Steps that collect operator input (everything but the terminal step).
    pub fn input_steps() -> &'static [WizardStep] {
        &Self::ALL[..Self::COUNT - 1]
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Environment => "Environment",
            WizardStep::SiteAndDataStore => "Site and data store",
            WizardStep::AdminAccount => "Administrator account",
            WizardStep::AttachmentsAndOptions => "Attachments and options",
            WizardStep::Complete => "Complete",
        }
    }

    /// Fields owned by this step, in display order.
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            WizardStep::Environment | WizardStep::Complete => &[],
            WizardStep::SiteAndDataStore => {
                &[SITE_NAME, SITE_URL, DATA_STORE_TYPE, CONNECTION_STRING]
            }
            WizardStep::AdminAccount => &[ADMIN_EMAIL, ADMIN_PASSWORD, PASSWORD_CONFIRMATION],
            WizardStep::AttachmentsAndOptions => &[
                ATTACHMENTS_FOLDER,
                USE_OBJECT_CACHE,
                USE_BROWSER_CACHE,
                ALLOWED_FILE_TYPES,
                MARKUP_TYPE,
            ],
        }
    }

    /// Probes the operator may run while on this step.
    pub fn probes(self) -> &'static [ProbeKind] {
        match self {
            WizardStep::Environment => &[ProbeKind::ConfigWritable],
            WizardStep::SiteAndDataStore => &[ProbeKind::DataStoreConnection],
            WizardStep::AttachmentsAndOptions => &[ProbeKind::AttachmentsFolder],
            WizardStep::AdminAccount | WizardStep::Complete => &[],
        }
    }

    /// Value shown for a field the operator has not submitted yet.
    pub fn default_value(field: &str) -> Option<&'static str> {
        match field {
            SITE_NAME => Some(DEFAULT_SITE_NAME),
            SITE_URL => Some(DEFAULT_SITE_URL),
            ATTACHMENTS_FOLDER => Some(DEFAULT_ATTACHMENTS_FOLDER),
            USE_OBJECT_CACHE | USE_BROWSER_CACHE => Some("false"),
            ALLOWED_FILE_TYPES => Some(DEFAULT_ALLOWED_FILE_TYPES),
            MARKUP_TYPE => Some(MarkupType::default().as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.index() + 1, self.title())
    }
}

/// On-demand checks of external resources. Each belongs to the step whose fields it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeKind {
    ConfigWritable,
    DataStoreConnection,
    AttachmentsFolder,
}

impl ProbeKind {
    pub fn owning_step(self) -> WizardStep {
        match self {
            ProbeKind::ConfigWritable => WizardStep::Environment,
            ProbeKind::DataStoreConnection => WizardStep::SiteAndDataStore,
            ProbeKind::AttachmentsFolder => WizardStep::AttachmentsAndOptions,
        }
    }
}

// =========================
// Languages
// =========================

/// Display locale. Changes rendered text only; never validation or probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Czech,
    German,
    Dutch,
    Spanish,
    Hindi,
    Italian,
    Polish,
    Portuguese,
    Russian,
    Swedish,
}

impl Language {
    /// Ordered as offered on the first page (English first, then by native name).
    pub const ALL: [Language; 11] = [
        Language::English,
        Language::Czech,
        Language::German,
        Language::Dutch,
        Language::Spanish,
        Language::Hindi,
        Language::Italian,
        Language::Polish,
        Language::Portuguese,
        Language::Russian,
        Language::Swedish,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Czech => "cs",
            Language::German => "de",
            Language::Dutch => "nl",
            Language::Spanish => "es",
            Language::Hindi => "hi",
            Language::Italian => "it",
            Language::Polish => "pl",
            Language::Portuguese => "pt",
            Language::Russian => "ru",
            Language::Swedish => "sv",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Czech => "Čeština",
            Language::German => "Deutsch",
            Language::Dutch => "Nederlands",
            Language::Spanish => "Español",
            Language::Hindi => "हिंदी",
            Language::Italian => "Italiano",
            Language::Polish => "Polski",
            Language::Portuguese => "Português",
            Language::Russian => "Русский",
            Language::Swedish => "Svenska",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        // Accept "pt-BR" style tags by their primary subtag.
        let primary = wanted.split(['-', '_']).next().unwrap_or_default();
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.tag() == primary || format!("{:?}", l).eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("Unsupported language: '{}'", s.trim()))
    }
}

// =========================
// Step 4 options
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkupType {
    #[default]
    Creole,
    Markdown,
    MediaWiki,
}

impl MarkupType {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkupType::Creole => "Creole",
            MarkupType::Markdown => "Markdown",
            MarkupType::MediaWiki => "MediaWiki",
        }
    }
}

impl FromStr for MarkupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creole" => Ok(MarkupType::Creole),
            "markdown" => Ok(MarkupType::Markdown),
            "mediawiki" => Ok(MarkupType::MediaWiki),
            other => Err(format!("Unknown markup type: '{}'", other)),
        }
    }
}

/// Lenient toggle parsing: checkbox-style values count as on, anything else as off.
pub fn parse_toggle(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "on" | "1" | "yes" | "checked")
    )
}
