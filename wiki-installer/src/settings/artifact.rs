// Configuration artifact (the wiki's settings file)
//
// Read once at startup to decide whether the wizard is reachable; written exactly once, by a
// successful finalize.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::database::connection::DataStoreType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigArtifact {
    pub installed: bool,
    pub site_name: String,
    pub site_url: String,
    pub data_store_type: DataStoreType,
    pub connection_string: String,
    pub attachments_folder: String,
    pub use_object_cache: bool,
    pub use_browser_cache: bool,
    pub allowed_file_types: String,
    pub markup_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    pub installer_version: String,
}

impl ConfigArtifact {
    /// `Ok(None)` when no artifact exists yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config artifact {:?}", path))?;
        let artifact = toml::from_str(&raw)
            .with_context(|| format!("Config artifact {:?} is not valid TOML", path))?;
        Ok(Some(artifact))
    }

    /// Write via a temp file in the same directory plus rename, so readers never see a partial file.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).context("Failed to serialize config artifact")?;
        let tmp = temp_path_for(path);

        let written = (|| -> Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)
                .with_context(|| format!("Failed to create {:?}", tmp))?;
            file.write_all(body.as_bytes())
                .with_context(|| format!("Failed to write {:?}", tmp))?;
            file.sync_all()
                .with_context(|| format!("Failed to flush {:?}", tmp))?;
            std::fs::rename(&tmp, path)
                .with_context(|| format!("Failed to move config artifact into place at {:?}", path))?;
            Ok(())
        })();

        if written.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        written
    }

    /// Copy safe to hand back to the presentation layer or logs.
    pub fn redacted(&self) -> Self {
        Self {
            connection_string: crate::utils::logging::mask_connection_string(&self.connection_string),
            ..self.clone()
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}
