// Installer runtime settings
//
// Layered: built-in defaults, then `<install root>/installer.toml` (optional), then
// `WIKI_INSTALLER_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::connection::DataStoreType;

pub const SETTINGS_FILE_NAME: &str = "installer.toml";
pub const ENV_PREFIX: &str = "WIKI_INSTALLER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerSettings {
    /// Filled in by `load`; every operator path is confined to it.
    #[serde(skip)]
    pub install_root: PathBuf,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default)]
    pub default_data_store: DataStoreType,
    #[serde(default = "default_true")]
    pub log_to_stdout: bool,
}

fn default_config_file() -> String {
    "wiki.toml".to_string()
}

fn default_min_password_length() -> usize {
    6
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_connect_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl InstallerSettings {
    /// Defaults for a given root, no file or environment lookup.
    pub fn for_root(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            config_file: default_config_file(),
            min_password_length: default_min_password_length(),
            probe_timeout_secs: default_probe_timeout_secs(),
            connect_retries: default_connect_retries(),
            default_data_store: DataStoreType::default(),
            log_to_stdout: true,
        }
    }

    /// Load layered settings for `install_root`.
    pub fn load(install_root: &Path) -> Result<Self> {
        Self::load_with_env(install_root, true)
    }

    fn load_with_env(install_root: &Path, with_env: bool) -> Result<Self> {
        let file = install_root.join(SETTINGS_FILE_NAME);
        let mut builder = config::Config::builder()
            .add_source(config::File::from(file.clone()).required(false));
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        }

        let mut settings: InstallerSettings = builder
            .build()
            .with_context(|| format!("Failed to load installer settings ({:?})", file))?
            .try_deserialize()
            .context("Installer settings are invalid")?;
        settings.install_root = install_root.to_path_buf();

        if settings.min_password_length == 0 {
            anyhow::bail!("min_password_length must be at least 1");
        }
        if settings.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be at least 1");
        }
        Ok(settings)
    }

    /// Absolute path of the configuration artifact.
    pub fn config_path(&self) -> PathBuf {
        let p = Path::new(&self.config_file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.install_root.join(p)
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
