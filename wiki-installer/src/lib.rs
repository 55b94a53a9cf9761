// Wiki installation wizard
// Library entry point: logging setup plus the headless runners used by the binary.

pub mod api;
pub mod database;
pub mod models;
pub mod security;
pub mod settings;
pub mod utils;
pub mod wizard;

use anyhow::Context;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::database::connection::RealDbConnector;
use crate::models::requests::AnswersFile;
use crate::models::state::InstallGate;
use crate::models::step::WizardStep;
use crate::settings::installer::InstallerSettings;
use crate::wizard::engine::{AdvanceOutcome, WizardEngine};
use crate::wizard::error::WizardError;

pub const EXIT_OK: i32 = 0;
/// Validation failure, retryable finalize failure, or nothing to do.
pub const EXIT_RETRYABLE: i32 = 1;
/// The deployment may be partially configured; inspect before retrying.
pub const EXIT_FATAL: i32 = 2;

type LineFormatter = fn(&str, log::Level, &str, &str, Option<&str>, Option<&str>) -> String;

/// One fern chain: lift `[PHASE]`/`[STEP]` tags out of the message, then format.
fn sink(format_line: LineFormatter, utc: bool, newline: bool) -> fern::Dispatch {
    fern::Dispatch::new().format(move |out, message, record| {
        let timestamp = if utc {
            chrono::Utc::now().to_rfc3339()
        } else {
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        };
        let message_str = format!("{}", message);
        let (phase, step, cleaned_message) = utils::logging::parse_log_metadata(&message_str);
        let line = format_line(
            &timestamp,
            record.level(),
            record.target(),
            &cleaned_message,
            phase.as_deref(),
            step.as_deref(),
        );
        if newline {
            out.finish(format_args!("{}\n", line));
        } else {
            out.finish(format_args!("{}", line));
        }
    })
}

/// Dual-format logging: JSON lines to `.log`, human-readable to `.txt`, optionally stdout.
pub fn init_logging(log_dir: &Path, with_stdout: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log folder {:?}", log_dir))?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("installer-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("installer-{}.txt", timestamp));

    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);
    if with_stdout {
        dispatch = dispatch.chain(
            sink(utils::logging::format_human_readable_log, false, false)
                .level(log::LevelFilter::Info)
                .chain(std::io::stdout()),
        );
    }
    dispatch
        .chain(sink(utils::logging::format_json_log, true, true).chain(fern::log_file(json_log_file)?))
        .chain(sink(utils::logging::format_human_readable_log, false, true).chain(fern::log_file(txt_log_file)?))
        .apply()
        .context("Logger already initialized")?;

    info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Root, settings and logging. Errors here are fatal for any runner.
fn bootstrap(install_root: Option<&Path>) -> anyhow::Result<InstallerSettings> {
    let root = utils::path_resolver::resolve_install_root(install_root)?;
    let settings = InstallerSettings::load(&root)?;
    let log_dir = utils::path_resolver::resolve_log_folder(&root)?;
    if let Err(e) = init_logging(&log_dir, settings.log_to_stdout) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }
    info!("[PHASE: initialization] Install root: {:?}", root);
    Ok(settings)
}

/// `--status`: is the wizard reachable for this install root?
pub fn run_status(install_root: Option<&Path>) -> i32 {
    let settings = match bootstrap(install_root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Installer failed to start: {:#}", e);
            return EXIT_FATAL;
        }
    };
    let gate = InstallGate::load(&settings.config_path());
    if gate.is_installed() {
        println!("installed: the wizard is not reachable ({})", settings.config_path().display());
    } else {
        println!("not installed: the wizard is reachable ({})", settings.config_path().display());
    }
    EXIT_OK
}

/// `--answers=<file>`: load settings and answers, then drive the wizard to completion.
pub async fn run_answers(install_root: Option<&Path>, answers_path: &Path) -> i32 {
    let settings = match bootstrap(install_root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Installer failed to start: {:#}", e);
            return EXIT_FATAL;
        }
    };
    let answers = match load_answers(answers_path) {
        Ok(a) => a,
        Err(e) => {
            error!("[PHASE: unattended] [STEP: answers] {:#}", e);
            eprintln!("{:#}", e);
            return EXIT_RETRYABLE;
        }
    };
    run_unattended(settings, &answers).await
}

pub fn load_answers(path: &Path) -> anyhow::Result<AnswersFile> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read answers file {:?}", path))?;
    toml::from_str(&raw).with_context(|| format!("Answers file {:?} is not valid TOML", path))
}

/// Walk every step with `answers`, running each step's probes first (informational only).
pub async fn run_unattended(settings: InstallerSettings, answers: &AnswersFile) -> i32 {
    let gate = Arc::new(InstallGate::load(&settings.config_path()));
    let connector = Arc::new(RealDbConnector::new(
        settings.install_root.clone(),
        settings.probe_timeout(),
        settings.connect_retries,
    ));
    let mut engine = match WizardEngine::new(settings, connector, gate) {
        Ok(e) => e,
        Err(e) => {
            println!("{}", e);
            return EXIT_RETRYABLE;
        }
    };

    if let Some(tag) = answers.language.as_deref() {
        if let Err(e) = engine.select_language(tag) {
            warn!("[PHASE: unattended] [STEP: language] {}; keeping {}", e, engine.view().language);
        }
    }

    while engine.current_step() != WizardStep::Complete {
        let step = engine.current_step();
        let fields = answers.fields_for(step);

        for &kind in step.probes() {
            match engine.probe(kind, &fields).await {
                Ok(r) if r.succeeded => println!("[ok]   {:?}: {}", kind, r.message),
                Ok(r) => println!("[warn] {:?}: {}", kind, r.message),
                Err(e) => warn!("[PHASE: unattended] [STEP: probe] {}", e),
            }
        }

        match engine.advance(&fields).await {
            Ok(AdvanceOutcome::Advanced { .. }) => {}
            Ok(AdvanceOutcome::Rejected { violations }) => {
                eprintln!("{} is invalid:", step);
                for v in &violations.violations {
                    eprintln!("  {}: {}", v.field_name, v.message_key);
                }
                return EXIT_RETRYABLE;
            }
            Ok(AdvanceOutcome::Installed { record }) => {
                println!(
                    "Installed: {} ({} via {}), administrator {}, configuration {}",
                    record.config.site_name,
                    record.data_store.data_store_type,
                    record.data_store.connection_string_masked,
                    record.admin.email,
                    record.config_path
                );
                return EXIT_OK;
            }
            Err(WizardError::Finalize(e)) if e.is_fatal() => {
                eprintln!("{}", e);
                return EXIT_FATAL;
            }
            Err(e) => {
                eprintln!("{}", e);
                return EXIT_RETRYABLE;
            }
        }
    }
    EXIT_OK
}
