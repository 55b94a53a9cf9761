// Wizard session state + process-wide install gate
//
// `WizardState` is one operator's session: it is owned by the engine and never shared.
// `InstallGate` is process-wide: it answers "is this deployment installed?" and admits at most
// one finalize at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::step::{Language, WizardStep};
use crate::settings::artifact::ConfigArtifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub current_step: WizardStep,
    /// Submitted values by field name. Only written by a successful advance.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub language: Language,
    /// Set once finalize completes; the session is then read-only.
    #[serde(default)]
    pub installed: bool,
    /// Set after a finalize failure that left the deployment partially configured.
    #[serde(default)]
    pub failed: Option<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: WizardStep::Environment,
            fields: BTreeMap::new(),
            language: Language::default(),
            installed: false,
            failed: None,
        }
    }
}

impl WizardState {
    pub fn current_step_index(&self) -> usize {
        self.current_step.index()
    }

    /// Trimmed field value; blank counts as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Stored value, falling back to the step default.
    pub fn field_or_default(&self, name: &str) -> Option<&str> {
        self.field(name).or_else(|| WizardStep::default_value(name))
    }

    pub fn is_terminal(&self) -> bool {
        self.installed || self.failed.is_some()
    }
}

/// Process-wide installed flag plus single-flight admission for finalize.
#[derive(Debug, Default)]
pub struct InstallGate {
    installed: AtomicBool,
    finalizing: AtomicBool,
}

impl InstallGate {
    /// Seeds the installed flag from the config artifact. Only a missing artifact opens the wizard;
    /// one that exists but cannot be read keeps it closed.
    pub fn load(config_path: &Path) -> Self {
        let installed = match ConfigArtifact::read(config_path) {
            Ok(Some(artifact)) => artifact.installed,
            Ok(None) => false,
            Err(e) => {
                log::error!(
                    "[PHASE: initialization] [STEP: install_gate] Config artifact {:?} is unreadable; wizard stays closed: {:#}",
                    config_path,
                    e
                );
                true
            }
        };
        Self {
            installed: AtomicBool::new(installed),
            finalizing: AtomicBool::new(false),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Admits one finalize. Returns `None` if one is already running.
    pub fn try_begin_finalize(&self) -> Option<FinalizeGuard<'_>> {
        self.finalizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FinalizeGuard { gate: self })
    }

    pub fn mark_installed(&self) {
        self.installed.store(true, Ordering::SeqCst);
    }
}

/// Releases the finalize slot on drop, including on early return.
#[derive(Debug)]
pub struct FinalizeGuard<'a> {
    gate: &'a InstallGate,
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        self.gate.finalizing.store(false, Ordering::SeqCst);
    }
}
