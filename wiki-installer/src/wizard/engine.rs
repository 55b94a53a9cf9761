// Wizard state machine
//
// Linear: Environment -> SiteAndDataStore -> AdminAccount -> AttachmentsAndOptions -> Complete.
// Only a validated advance writes fields. Leaving step 4 runs the finalizer.

use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::connection::{DataStoreType, DbConnector};
use crate::models::responses::{FieldView, FinalizationRecord, ProbeFailureKind, ProbeResult, StepView, ValidationResult};
use crate::models::state::{InstallGate, WizardState};
use crate::models::step::{
    parse_toggle, Language, ProbeKind, WizardStep, ADMIN_PASSWORD, ATTACHMENTS_FOLDER, CONNECTION_STRING,
    DATA_STORE_TYPE, PASSWORD_CONFIRMATION, USE_BROWSER_CACHE, USE_OBJECT_CACHE,
};
use crate::settings::installer::InstallerSettings;
use crate::wizard::error::WizardError;
use crate::wizard::finalizer::InstallationFinalizer;
use crate::wizard::probe::ProbeService;
use crate::wizard::validator::{validate_step, ValidationRules};

const TOGGLE_FIELDS: [&str; 2] = [USE_OBJECT_CACHE, USE_BROWSER_CACHE];
/// Held in state but never echoed back in a view.
const SECRET_FIELDS: [&str; 2] = [ADMIN_PASSWORD, PASSWORD_CONFIRMATION];

#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    Advanced { step: WizardStep },
    /// Nothing was stored; the step did not change.
    Rejected { violations: ValidationResult },
    Installed { record: FinalizationRecord },
}

pub struct WizardEngine {
    settings: InstallerSettings,
    gate: Arc<InstallGate>,
    probes: ProbeService,
    finalizer: InstallationFinalizer,
    rules: ValidationRules,
    state: WizardState,
}

impl WizardEngine {
    /// Start a fresh session. Refused once the deployment is installed.
    pub fn new(
        settings: InstallerSettings,
        connector: Arc<dyn DbConnector>,
        gate: Arc<InstallGate>,
    ) -> Result<Self, WizardError> {
        if gate.is_installed() {
            info!("[PHASE: wizard] [STEP: session] Wizard unavailable: system is already installed");
            return Err(WizardError::AlreadyInstalled);
        }
        let probes = ProbeService::new(
            settings.install_root.clone(),
            connector.clone(),
            settings.probe_timeout(),
        );
        let finalizer = InstallationFinalizer::new(settings.clone(), connector, gate.clone());
        let rules = ValidationRules {
            min_password_length: settings.min_password_length,
        };
        info!(
            "[PHASE: wizard] [STEP: session] New installation session (root={:?})",
            settings.install_root
        );
        Ok(Self {
            settings,
            gate,
            probes,
            finalizer,
            rules,
            state: WizardState::default(),
        })
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn current_step(&self) -> WizardStep {
        self.state.current_step
    }

    pub fn view(&self) -> StepView {
        let step = self.state.current_step;
        let fields = step
            .field_names()
            .iter()
            .map(|&name| {
                let stored = self.state.field(name).map(str::to_string);
                let default = self.default_for(name);
                let is_default = stored.is_none() && default.is_some();
                let value = if SECRET_FIELDS.contains(&name) {
                    None
                } else {
                    stored.or(default)
                };
                FieldView {
                    name: name.to_string(),
                    value,
                    is_default,
                }
            })
            .collect();

        StepView {
            step,
            step_index: step.index(),
            step_count: WizardStep::COUNT,
            title: step.title().to_string(),
            language: self.state.language.tag().to_string(),
            languages: StepView::language_options(self.state.language),
            fields,
            probes: if self.state.is_terminal() { Vec::new() } else { step.probes().to_vec() },
            can_retreat: step.index() > 0 && !self.state.is_terminal(),
            installed: self.state.installed,
        }
    }

    /// Callable at any point; affects nothing but the locale tag.
    pub fn select_language(&mut self, tag: &str) -> Result<Language, WizardError> {
        let language = tag
            .parse::<Language>()
            .map_err(|_| WizardError::UnsupportedLanguage(tag.trim().to_string()))?;
        self.state.language = language;
        debug!("[PHASE: wizard] [STEP: language] Language set to {}", language.tag());
        Ok(language)
    }

    /// Step back without validating. A no-op on the first step.
    pub fn retreat(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_active()?;
        if let Some(prev) = self.state.current_step.prev() {
            self.state.current_step = prev;
            debug!("[PHASE: wizard] [STEP: navigate] Retreated to {}", prev);
        }
        Ok(self.state.current_step)
    }

    /// Validate the current step's submission; store it and move forward only if it is clean.
    pub async fn advance(&mut self, submitted: &BTreeMap<String, String>) -> Result<AdvanceOutcome, WizardError> {
        self.ensure_active()?;
        let step = self.state.current_step;
        let Some(next) = step.next() else {
            return Err(WizardError::AlreadyInstalled);
        };

        let merged = merge_step_fields(step, &self.state.fields, submitted);
        let violations = validate_step(step, &merged, &self.rules);
        if !violations.is_valid() {
            info!(
                "[PHASE: wizard] [STEP: validate] {} rejected: {:?}",
                step,
                violations.fields()
            );
            return Ok(AdvanceOutcome::Rejected { violations });
        }

        if next != WizardStep::Complete {
            self.state.fields = merged;
            self.state.current_step = next;
            debug!("[PHASE: wizard] [STEP: navigate] Advanced to {}", next);
            return Ok(AdvanceOutcome::Advanced { step: next });
        }

        let candidate = WizardState {
            fields: merged.clone(),
            ..self.state.clone()
        };
        // Collected values survive every outcome so a retry needs no re-entry.
        self.state.fields = merged;
        match self.finalizer.finalize(&candidate).await {
            Ok(record) => {
                self.state.current_step = WizardStep::Complete;
                self.state.installed = true;
                Ok(AdvanceOutcome::Installed { record })
            }
            Err(e) if e.is_fatal() => {
                error!("[PHASE: wizard] [STEP: finalize] Session failed: {}", e);
                self.state.failed = Some(e.to_string());
                Err(WizardError::Finalize(e))
            }
            Err(e) => {
                warn!("[PHASE: wizard] [STEP: finalize] Finalize failed, staying on {}: {}", step, e);
                Err(WizardError::Finalize(e))
            }
        }
    }

    /// Run one probe. Inputs come from `submitted`, then stored values, then defaults.
    pub async fn probe(&self, kind: ProbeKind, submitted: &BTreeMap<String, String>) -> Result<ProbeResult, WizardError> {
        self.ensure_active()?;
        let owner = kind.owning_step();
        if owner.index() > self.state.current_step_index() {
            return Err(WizardError::ProbeNotAvailable { probe: kind, step: owner });
        }

        let input = |name: &str| -> Option<String> {
            submitted
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| self.state.field(name).map(str::to_string))
                .or_else(|| self.default_for(name))
        };

        let result = match kind {
            ProbeKind::ConfigWritable => self.probes.test_config_writable(&self.settings.config_path()),
            ProbeKind::DataStoreConnection => {
                let store = input(DATA_STORE_TYPE).map(|name| name.parse::<DataStoreType>());
                match (store, input(CONNECTION_STRING)) {
                    (Some(Err(msg)), _) => ProbeResult::failure(ProbeFailureKind::InvalidInput, msg),
                    (_, None) => ProbeResult::failure(
                        ProbeFailureKind::InvalidInput,
                        "A connection string is required to test the data store.",
                    ),
                    (store, Some(conn)) => {
                        let store = store
                            .and_then(Result::ok)
                            .unwrap_or(self.settings.default_data_store);
                        self.probes.test_data_store_connection(store, &conn).await
                    }
                }
            }
            ProbeKind::AttachmentsFolder => {
                let folder = input(ATTACHMENTS_FOLDER).unwrap_or_default();
                self.probes.test_attachments_folder(&folder)
            }
        };
        Ok(result)
    }

    fn ensure_active(&self) -> Result<(), WizardError> {
        if let Some(reason) = &self.state.failed {
            return Err(WizardError::SessionFailed(reason.clone()));
        }
        if self.state.installed || self.gate.is_installed() {
            return Err(WizardError::AlreadyInstalled);
        }
        Ok(())
    }

    fn default_for(&self, name: &str) -> Option<String> {
        if name == DATA_STORE_TYPE {
            return Some(self.settings.default_data_store.to_string());
        }
        WizardStep::default_value(name).map(str::to_string)
    }
}

/// Stored fields overlaid with the fields this step owns. Unchecked toggles arrive absent.
fn merge_step_fields(
    step: WizardStep,
    stored: &BTreeMap<String, String>,
    submitted: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = stored.clone();
    for &name in step.field_names() {
        if TOGGLE_FIELDS.contains(&name) {
            let on = parse_toggle(submitted.get(name).map(String::as_str));
            merged.insert(name.to_string(), on.to_string());
        } else if let Some(value) = submitted.get(name) {
            merged.insert(name.to_string(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::accounts;
    use crate::database::connection::tests::{HangingStub, ImmediateFailureStub};
    use crate::database::connection::RealDbConnector;
    use crate::models::step::{ADMIN_EMAIL, MARKUP_TYPE, SITE_NAME, SITE_URL};
    use crate::settings::artifact::ConfigArtifact;
    use crate::wizard::error::FinalizeError;
    use crate::wizard::finalizer::tests::{open_test_db, prepare_root, TEST_CONN_STR};
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn site() -> BTreeMap<String, String> {
        fields(&[
            (SITE_NAME, "Acceptance Tests"),
            (SITE_URL, "http://localhost"),
            (DATA_STORE_TYPE, "SQLite"),
            (CONNECTION_STRING, TEST_CONN_STR),
        ])
    }

    fn admin() -> BTreeMap<String, String> {
        fields(&[
            (ADMIN_EMAIL, "admin@localhost"),
            (ADMIN_PASSWORD, "password"),
            (PASSWORD_CONFIRMATION, "password"),
        ])
    }

    fn attachments() -> BTreeMap<String, String> {
        fields(&[(ATTACHMENTS_FOLDER, "~/App_Data/Attachments"), (USE_OBJECT_CACHE, "on")])
    }

    fn engine_with(settings: InstallerSettings, connector: Arc<dyn DbConnector>) -> WizardEngine {
        let gate = Arc::new(InstallGate::load(&settings.config_path()));
        WizardEngine::new(settings, connector, gate).expect("engine")
    }

    fn engine(root: &Path) -> WizardEngine {
        engine_with(
            InstallerSettings::for_root(root),
            Arc::new(RealDbConnector::new(root, Duration::from_secs(5), 1)),
        )
    }

    async fn advance_to_step4(engine: &mut WizardEngine) {
        for submission in [BTreeMap::new(), site(), admin()] {
            let outcome = engine.advance(&submission).await.expect("advance");
            assert!(matches!(outcome, AdvanceOutcome::Advanced { .. }), "{:?}", outcome);
        }
        assert_eq!(engine.current_step(), WizardStep::AttachmentsAndOptions);
    }

    fn view_value(engine: &WizardEngine, name: &str) -> Option<String> {
        engine
            .view()
            .fields
            .into_iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value)
    }

    #[tokio::test]
    async fn new_session_starts_on_environment_and_cannot_retreat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());

        let view = engine.view();
        assert_eq!(view.step, WizardStep::Environment);
        assert!(!view.can_retreat);
        assert_eq!(view.probes, vec![ProbeKind::ConfigWritable]);
        assert_eq!(engine.retreat().expect("retreat"), WizardStep::Environment);
    }

    #[tokio::test]
    async fn values_survive_forward_and_backward_navigation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());
        advance_to_step4(&mut engine).await;

        engine.retreat().expect("retreat");
        engine.retreat().expect("retreat");

        assert_eq!(engine.current_step(), WizardStep::SiteAndDataStore);
        assert_eq!(view_value(&engine, SITE_NAME).as_deref(), Some("Acceptance Tests"));
        assert_eq!(view_value(&engine, CONNECTION_STRING).as_deref(), Some(TEST_CONN_STR));
        // Retreat never validates and never drops later answers.
        assert_eq!(engine.state().field(ADMIN_EMAIL), Some("admin@localhost"));
    }

    #[tokio::test]
    async fn rejected_advance_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());
        engine.advance(&BTreeMap::new()).await.expect("step 1");
        let before = engine.state().clone();

        let outcome = engine
            .advance(&fields(&[(SITE_NAME, ""), (SITE_URL, ""), (CONNECTION_STRING, "x")]))
            .await
            .expect("advance");

        match outcome {
            AdvanceOutcome::Rejected { violations } => {
                assert_eq!(violations.fields(), vec![SITE_NAME, SITE_URL]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(engine.current_step(), before.current_step);
        assert_eq!(engine.state().fields, before.fields);
    }

    #[tokio::test]
    async fn fields_of_other_steps_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());

        engine
            .advance(&fields(&[(ADMIN_EMAIL, "sneaky@localhost")]))
            .await
            .expect("advance");

        assert_eq!(engine.state().field(ADMIN_EMAIL), None);
    }

    #[tokio::test]
    async fn passwords_are_not_echoed_in_views() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());
        advance_to_step4(&mut engine).await;
        engine.retreat().expect("retreat");

        assert_eq!(engine.current_step(), WizardStep::AdminAccount);
        assert_eq!(view_value(&engine, ADMIN_EMAIL).as_deref(), Some("admin@localhost"));
        assert_eq!(view_value(&engine, ADMIN_PASSWORD), None);
    }

    #[tokio::test]
    async fn language_selection_touches_nothing_else() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());
        engine.advance(&BTreeMap::new()).await.expect("step 1");
        let before = engine.state().clone();
        let blank = fields(&[(SITE_NAME, ""), (SITE_URL, ""), (CONNECTION_STRING, "x")]);
        let rejected_keys = |outcome: AdvanceOutcome| match outcome {
            AdvanceOutcome::Rejected { violations } => violations
                .violations
                .iter()
                .map(|v| (v.field_name.clone(), v.message_key.clone()))
                .collect::<Vec<_>>(),
            other => panic!("expected rejection, got {:?}", other),
        };
        let english = rejected_keys(engine.advance(&blank).await.expect("advance"));
        let english_probes = engine.view().probes;

        assert_eq!(engine.select_language("de").expect("de"), Language::German);
        assert!(matches!(
            engine.select_language("tlh"),
            Err(WizardError::UnsupportedLanguage(_))
        ));

        assert_eq!(engine.view().language, "de");
        assert_eq!(engine.current_step(), before.current_step);
        assert_eq!(engine.state().fields, before.fields);

        // Same submission, same rules and the same checks offered.
        let german = rejected_keys(engine.advance(&blank).await.expect("advance"));
        assert_eq!(german, english);
        assert_eq!(german.len(), 2);
        assert_eq!(engine.view().probes, english_probes);
        assert_eq!(engine.view().probes, vec![ProbeKind::DataStoreConnection]);
        assert_eq!(engine.current_step(), before.current_step);
        assert_eq!(engine.state().fields, before.fields);
    }

    #[tokio::test]
    async fn probe_is_unavailable_before_its_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine(dir.path());

        let result = engine.probe(ProbeKind::AttachmentsFolder, &BTreeMap::new()).await;

        assert!(matches!(
            result,
            Err(WizardError::ProbeNotAvailable { step: WizardStep::AttachmentsAndOptions, .. })
        ));
    }

    #[tokio::test]
    async fn failed_probe_does_not_block_or_mutate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine(dir.path());
        engine.advance(&BTreeMap::new()).await.expect("step 1");
        let before = engine.state().clone();

        // No database file exists yet.
        let result = engine
            .probe(ProbeKind::DataStoreConnection, &site())
            .await
            .expect("probe");
        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(ProbeFailureKind::NotFound));
        assert_eq!(engine.state().fields, before.fields);

        let outcome = engine.advance(&site()).await.expect("advance");
        assert!(matches!(outcome, AdvanceOutcome::Advanced { step: WizardStep::AdminAccount }));
    }

    #[tokio::test]
    async fn data_store_probe_is_bounded_by_configured_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = InstallerSettings::for_root(dir.path());
        settings.probe_timeout_secs = 1;
        let mut engine = engine_with(settings, Arc::new(HangingStub::new()));
        engine.advance(&BTreeMap::new()).await.expect("step 1");
        let started = Instant::now();

        let result = engine
            .probe(
                ProbeKind::DataStoreConnection,
                &fields(&[(DATA_STORE_TYPE, "PostgreSQL"), (CONNECTION_STRING, "postgres://db.invalid/wiki")]),
            )
            .await
            .expect("probe");

        assert_eq!(result.failure, Some(ProbeFailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn completing_step4_installs_and_closes_the_wizard() {
        let dir = tempfile::tempdir().expect("tempdir");
        prepare_root(dir.path()).await;
        let mut engine = engine(dir.path());
        advance_to_step4(&mut engine).await;

        let outcome = engine
            .advance(&fields(&[
                (ATTACHMENTS_FOLDER, "~/App_Data/Attachments"),
                (USE_OBJECT_CACHE, "on"),
                (MARKUP_TYPE, "Markdown"),
            ]))
            .await
            .expect("finalize");

        let AdvanceOutcome::Installed { record } = outcome else {
            panic!("expected installation, got {:?}", outcome);
        };
        assert_eq!(record.admin.email, "admin@localhost");
        assert_eq!(engine.current_step(), WizardStep::Complete);
        assert!(engine.view().installed);
        assert!(matches!(engine.retreat(), Err(WizardError::AlreadyInstalled)));

        let artifact = ConfigArtifact::read(&dir.path().join("wiki.toml"))
            .expect("read")
            .expect("artifact");
        assert!(artifact.installed);
        assert!(artifact.use_object_cache);
        assert_eq!(artifact.markup_type, "Markdown");

        let conn = open_test_db(dir.path()).await;
        assert_eq!(accounts::count_admins(&conn).await.expect("count"), 1);
        conn.close().await;

        // A fresh process reads the artifact and refuses to start the wizard.
        let settings = InstallerSettings::for_root(dir.path());
        let gate = Arc::new(InstallGate::load(&settings.config_path()));
        let again = WizardEngine::new(
            settings,
            Arc::new(RealDbConnector::new(dir.path(), Duration::from_secs(5), 1)),
            gate,
        );
        assert!(matches!(again, Err(WizardError::AlreadyInstalled)));
    }

    #[tokio::test]
    async fn retryable_finalize_failure_stays_on_step4_with_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = engine_with(
            InstallerSettings::for_root(dir.path()),
            Arc::new(ImmediateFailureStub::unreachable()),
        );
        advance_to_step4(&mut engine).await;

        let err = engine.advance(&attachments()).await.expect_err("must fail");

        assert!(matches!(
            err,
            WizardError::Finalize(FinalizeError::DataStoreUnreachable { .. })
        ));
        assert_eq!(engine.current_step(), WizardStep::AttachmentsAndOptions);
        assert_eq!(engine.state().field(SITE_NAME), Some("Acceptance Tests"));
        assert_eq!(engine.state().field(ATTACHMENTS_FOLDER), Some("~/App_Data/Attachments"));
        assert_eq!(engine.state().field(USE_OBJECT_CACHE), Some("true"));
        assert!(!dir.path().join("wiki.toml").exists());
        // Still usable: the operator can go back and fix the connection.
        assert_eq!(engine.retreat().expect("retreat"), WizardStep::AdminAccount);
    }

    #[tokio::test]
    async fn fatal_finalize_failure_ends_the_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        prepare_root(dir.path()).await;
        let mut settings = InstallerSettings::for_root(dir.path());
        settings.config_file = "missing-dir/wiki.toml".to_string();
        let mut engine = engine_with(
            settings,
            Arc::new(RealDbConnector::new(dir.path(), Duration::from_secs(5), 1)),
        );
        advance_to_step4(&mut engine).await;

        let err = engine.advance(&attachments()).await.expect_err("must fail");
        assert!(matches!(err, WizardError::Finalize(ref e) if e.is_fatal()));

        // Never retried automatically.
        assert!(matches!(
            engine.advance(&attachments()).await,
            Err(WizardError::SessionFailed(_))
        ));
        assert!(matches!(engine.retreat(), Err(WizardError::SessionFailed(_))));
    }
}
