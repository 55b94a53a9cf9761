// Installation commit path
//
// Order: admission, re-validation, live connection, schema, administrator, config artifact,
// installed flag. Nothing durable outside the data store happens before the artifact write,
// and the installed flag flips only after the artifact is in place.

use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::database::accounts::{self, AccountError};
use crate::database::connection::{connect_with_retry, DataStoreType, DbConnector};
use crate::database::schema;
use crate::models::responses::{AdminCredentialRecord, DataStoreDescriptor, FinalizationRecord};
use crate::models::state::{InstallGate, WizardState};
use crate::models::step::{
    parse_toggle, MarkupType, WizardStep, ADMIN_EMAIL, ADMIN_PASSWORD, ALLOWED_FILE_TYPES,
    ATTACHMENTS_FOLDER, CONNECTION_STRING, DATA_STORE_TYPE, MARKUP_TYPE, SITE_NAME, SITE_URL,
    USE_BROWSER_CACHE, USE_OBJECT_CACHE,
};
use crate::security::crypto::{hash_password, secret_fingerprint};
use crate::settings::artifact::ConfigArtifact;
use crate::settings::installer::InstallerSettings;
use crate::utils::logging::mask_connection_string;
use crate::wizard::error::FinalizeError;
use crate::wizard::validator::{validate_step, ValidationRules};

pub struct InstallationFinalizer {
    settings: InstallerSettings,
    connector: Arc<dyn DbConnector>,
    gate: Arc<InstallGate>,
}

impl InstallationFinalizer {
    pub fn new(settings: InstallerSettings, connector: Arc<dyn DbConnector>, gate: Arc<InstallGate>) -> Self {
        Self {
            settings,
            connector,
            gate,
        }
    }

    /// Commit a fully validated session. At most one call runs at a time per gate.
    pub async fn finalize(&self, state: &WizardState) -> Result<FinalizationRecord, FinalizeError> {
        if self.gate.is_installed() {
            warn!("[PHASE: finalize] [STEP: admission] Rejected: system is already installed");
            return Err(FinalizeError::AlreadyInstalled);
        }
        let Some(_guard) = self.gate.try_begin_finalize() else {
            warn!("[PHASE: finalize] [STEP: admission] Rejected: another finalize is in flight");
            return Err(FinalizeError::InProgress);
        };
        // Re-check under the guard: a finalize that just finished has already flipped the flag.
        if self.gate.is_installed() {
            return Err(FinalizeError::AlreadyInstalled);
        }

        let rules = ValidationRules {
            min_password_length: self.settings.min_password_length,
        };
        for &step in WizardStep::input_steps() {
            if !validate_step(step, &state.fields, &rules).is_valid() {
                warn!("[PHASE: finalize] [STEP: validation] {} no longer validates", step);
                return Err(FinalizeError::Incomplete { step });
            }
        }

        let store = state
            .field(DATA_STORE_TYPE)
            .and_then(|name| name.parse::<DataStoreType>().ok())
            .unwrap_or(self.settings.default_data_store);
        let connection_string = state.field(CONNECTION_STRING).unwrap_or_default().to_string();
        info!(
            "[PHASE: finalize] [STEP: connect] Starting installation (store={}, masked_conn_str={})",
            store,
            mask_connection_string(&connection_string)
        );

        // 1. Live connection, retried for transient failures.
        let conn = connect_with_retry(self.connector.as_ref(), store, &connection_string)
            .await
            .map_err(|e| FinalizeError::DataStoreUnreachable { message: e.user_message })?;

        // 2 + 3. Schema and administrator, then release the connection on every path.
        let budget = self.provisioning_budget();
        let provisioned = timeout(budget, async {
            conn.ping()
                .await
                .map_err(|e| FinalizeError::DataStoreUnreachable {
                    message: e.root_cause().to_string(),
                })?;

            let version = schema::initialize(&conn)
                .await
                .map_err(|e| FinalizeError::SchemaInit {
                    message: e.root_cause().to_string(),
                })?;

            let email = state.field(ADMIN_EMAIL).unwrap_or_default();
            let password = state.fields.get(ADMIN_PASSWORD).map(String::as_str).unwrap_or_default();
            let password_hash = hash_password(password).map_err(|e| FinalizeError::AdminAccount {
                message: e.to_string(),
            })?;
            let account = accounts::create_admin(&conn, email, &password_hash)
                .await
                .map_err(|e| match e {
                    AccountError::AdminAlreadyExists => FinalizeError::AdminAlreadyExists,
                    AccountError::Database(inner) => FinalizeError::AdminAccount {
                        message: inner.root_cause().to_string(),
                    },
                })?;
            Ok::<_, FinalizeError>((version, account, password_hash))
        })
        .await
        .unwrap_or_else(|_| {
            Err(FinalizeError::DataStoreUnreachable {
                message: format!("The data store stopped responding after {}s.", budget.as_secs()),
            })
        });
        conn.close().await;

        let (version, account, password_hash) = provisioned.map_err(|e| {
            warn!("[PHASE: finalize] [STEP: provision] Aborted before writing configuration: {}", e);
            e
        })?;

        // 4. Point of no return.
        let installed_at = Utc::now();
        let artifact = self.build_artifact(state, store, &connection_string, installed_at);
        let config_path = self.settings.config_path();
        if let Err(e) = artifact.write_atomic(&config_path) {
            error!(
                "[PHASE: finalize] [STEP: config_write] Data store provisioned but configuration artifact {:?} could not be written: {:#}",
                config_path,
                e
            );
            return Err(FinalizeError::ConfigWrite {
                message: e.root_cause().to_string(),
            });
        }

        // 5.
        self.gate.mark_installed();
        info!(
            "[PHASE: finalize] [STEP: complete] Installation complete (config={:?}, schema_version={})",
            config_path, version
        );

        Ok(FinalizationRecord {
            config_path: config_path.display().to_string(),
            config: artifact.redacted(),
            data_store: DataStoreDescriptor {
                data_store_type: store.to_string(),
                connection_string_masked: mask_connection_string(&connection_string),
                schema_version: i64::from(version),
            },
            admin: AdminCredentialRecord {
                email: account.email,
                role: account.role,
                password_fingerprint: secret_fingerprint(&password_hash),
                created_at: account.created_at,
            },
            installed_at,
        })
    }

    /// Ping, schema and admin share one bound; a store that stalls mid-provisioning must not pin the gate.
    fn provisioning_budget(&self) -> Duration {
        self.settings.probe_timeout() * 4
    }

    fn build_artifact(
        &self,
        state: &WizardState,
        store: DataStoreType,
        connection_string: &str,
        installed_at: chrono::DateTime<Utc>,
    ) -> ConfigArtifact {
        let markup = state
            .field(MARKUP_TYPE)
            .and_then(|m| m.parse::<MarkupType>().ok())
            .unwrap_or_default();
        ConfigArtifact {
            installed: true,
            site_name: state.field_or_default(SITE_NAME).unwrap_or_default().to_string(),
            site_url: state.field_or_default(SITE_URL).unwrap_or_default().to_string(),
            data_store_type: store,
            connection_string: connection_string.to_string(),
            attachments_folder: state.field_or_default(ATTACHMENTS_FOLDER).unwrap_or_default().to_string(),
            use_object_cache: parse_toggle(state.field(USE_OBJECT_CACHE)),
            use_browser_cache: parse_toggle(state.field(USE_BROWSER_CACHE)),
            allowed_file_types: state
                .field_or_default(ALLOWED_FILE_TYPES)
                .unwrap_or_default()
                .to_string(),
            markup_type: markup.as_str().to_string(),
            installed_at: Some(installed_at),
            installer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
