// Wizard error taxonomy
//
// Validation failures are data (`ValidationResult`), probe failures are data (`ProbeResult`).
// Only engine rejections and finalize failures are errors.

use thiserror::Error;

use crate::models::step::{ProbeKind, WizardStep};

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("The system is already installed")]
    AlreadyInstalled,

    #[error("Installation is already in progress")]
    InProgress,

    #[error("Installation cannot start: {step} is incomplete")]
    Incomplete { step: WizardStep },

    #[error("The data store could not be reached: {message}")]
    DataStoreUnreachable { message: String },

    #[error("Data store schema initialization failed: {message}")]
    SchemaInit { message: String },

    #[error("An administrator account already exists in this data store")]
    AdminAlreadyExists,

    #[error("The administrator account could not be created: {message}")]
    AdminAccount { message: String },

    /// Written after data-store work succeeded; never retried automatically.
    #[error("Installation did not complete cleanly: the configuration file could not be written ({message}). Check the server logs and environment before retrying.")]
    ConfigWrite { message: String },
}

impl FinalizeError {
    /// The session cannot continue; the operator must inspect the environment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FinalizeError::ConfigWrite { .. })
    }

    /// Nothing durable was committed; the operator may correct input and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FinalizeError::Incomplete { .. }
                | FinalizeError::DataStoreUnreachable { .. }
                | FinalizeError::SchemaInit { .. }
                | FinalizeError::AdminAccount { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("The wizard is not available: the system is already installed")]
    AlreadyInstalled,

    #[error("This installation session has failed and cannot continue: {0}")]
    SessionFailed(String),

    #[error("The {probe:?} check is not available until {step} has been reached")]
    ProbeNotAvailable { probe: ProbeKind, step: WizardStep },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}
