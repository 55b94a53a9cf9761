// External-resource probes
//
// Informational only: a probe never touches wizard state and never blocks navigation.
// Every resource a probe opens is released before it returns, on success and failure alike.

use log::{info, warn};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::database::connection::{ConnectError, ConnectErrorKind, DataStoreType, DbConnector};
use crate::models::responses::{ProbeFailureKind, ProbeResult};
use crate::utils::logging::mask_connection_string;
use crate::utils::path_resolver::{resolve_under_root, PathResolveError};

#[derive(Clone)]
pub struct ProbeService {
    install_root: PathBuf,
    connector: Arc<dyn DbConnector>,
    timeout: Duration,
}

impl ProbeService {
    pub fn new(install_root: impl Into<PathBuf>, connector: Arc<dyn DbConnector>, timeout: Duration) -> Self {
        Self {
            install_root: install_root.into(),
            connector,
            timeout,
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Can the configuration artifact at `path` be written?
    ///
    /// An existing file is opened for write (never truncated). A missing file is simulated by
    /// creating and deleting a probe file next to it.
    pub fn test_config_writable(&self, path: &Path) -> ProbeResult {
        let result = match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => ProbeResult::failure(
                ProbeFailureKind::InvalidInput,
                format!("{} is a directory, not a configuration file.", path.display()),
            ),
            Ok(meta) if meta.permissions().readonly() => ProbeResult::failure(
                ProbeFailureKind::PermissionDenied,
                format!("The configuration file {} is read-only.", path.display()),
            ),
            Ok(_) => match OpenOptions::new().write(true).open(path) {
                Ok(_file) => ProbeResult::success(format!(
                    "The configuration file {} is writable.",
                    path.display()
                )),
                Err(e) => io_failure(&e, &format!("The configuration file {} cannot be opened for writing", path.display())),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let parent = path.parent().unwrap_or_else(|| Path::new("."));
                if !parent.is_dir() {
                    ProbeResult::failure(
                        ProbeFailureKind::NotFound,
                        format!("The folder {} for the configuration file does not exist.", parent.display()),
                    )
                } else {
                    match write_and_remove_probe_file(parent) {
                        Ok(()) => ProbeResult::success(format!(
                            "The configuration file {} can be created.",
                            path.display()
                        )),
                        Err(e) => io_failure(&e, &format!("The folder {} is not writable", parent.display())),
                    }
                }
            }
            Err(e) => io_failure(&e, &format!("The configuration file {} is not accessible", path.display())),
        };
        log_outcome("config_writable", &result);
        result
    }

    /// Open a short-lived connection, run a trivial round trip, release the connection.
    pub async fn test_data_store_connection(&self, store: DataStoreType, connection_string: &str) -> ProbeResult {
        let started = Instant::now();
        info!(
            "[PHASE: probe] [STEP: data_store] Testing connection (store={}, masked_conn_str={})",
            store,
            mask_connection_string(connection_string)
        );

        let attempt = async {
            let conn = self.connector.connect(store, connection_string).await?;
            let ping = conn.ping().await;
            conn.close().await;
            ping.map_err(|e| {
                ConnectError::new(
                    ConnectErrorKind::Unreachable,
                    format!("Connected, but the test query failed: {}", e.root_cause()),
                    format!("SELECT 1 failed: {:#}", e),
                )
            })
        };

        let result = match timeout(self.timeout, attempt).await {
            Ok(Ok(())) => ProbeResult::success(format!(
                "Connected to the {} data store ({} ms).",
                store,
                started.elapsed().as_millis()
            )),
            Ok(Err(e)) => {
                warn!(
                    "[PHASE: probe] [STEP: data_store] Connection test failed (store={}): {}",
                    store, e.internal_details
                );
                ProbeResult::failure(failure_kind(e.kind), e.user_message)
            }
            Err(_) => {
                warn!(
                    "[PHASE: probe] [STEP: data_store] Connection test timed out after {:?} (store={})",
                    self.timeout, store
                );
                ProbeResult::failure(
                    ProbeFailureKind::Timeout,
                    format!(
                        "The {} data store did not respond within {} seconds. Check the host name, port and firewall.",
                        store,
                        self.timeout.as_secs().max(1)
                    ),
                )
            }
        };
        log_outcome("data_store", &result);
        result
    }

    /// Does the attachments folder exist under the install root and accept writes?
    pub fn test_attachments_folder(&self, raw_path: &str) -> ProbeResult {
        let result = match resolve_under_root(&self.install_root, raw_path) {
            Err(PathResolveError::Empty) => {
                ProbeResult::failure(ProbeFailureKind::InvalidInput, "The attachments folder is required.")
            }
            Err(e @ PathResolveError::OutsideRoot(_)) => {
                ProbeResult::failure(ProbeFailureKind::OutsideInstallRoot, e.to_string())
            }
            Ok(folder) => probe_folder(&folder),
        };
        log_outcome("attachments_folder", &result);
        result
    }
}

fn probe_folder(folder: &Path) -> ProbeResult {
    match std::fs::metadata(folder) {
        Err(e) if e.kind() == ErrorKind::NotFound => ProbeResult::failure(
            ProbeFailureKind::NotFound,
            format!("The attachments folder {} does not exist.", folder.display()),
        ),
        Err(e) => io_failure(&e, &format!("The attachments folder {} is not accessible", folder.display())),
        Ok(meta) if !meta.is_dir() => ProbeResult::failure(
            ProbeFailureKind::NotADirectory,
            format!("{} exists but is not a folder.", folder.display()),
        ),
        Ok(_) => match write_and_remove_probe_file(folder) {
            Ok(()) => ProbeResult::success(format!(
                "The attachments folder {} exists and is writable.",
                folder.display()
            )),
            Err(_) => ProbeResult::failure(
                ProbeFailureKind::PermissionDenied,
                format!("The attachments folder {} exists but is not writable.", folder.display()),
            ),
        },
    }
}

/// Create `.probe-<uuid>` in `dir`, write a byte, delete it.
fn write_and_remove_probe_file(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(format!(".probe-{}", uuid::Uuid::new_v4().simple()));
    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .and_then(|mut f| f.write_all(b"0"));
    let removed = std::fs::remove_file(&probe);
    written?;
    removed
}

fn io_failure(e: &std::io::Error, context: &str) -> ProbeResult {
    let kind = match e.kind() {
        ErrorKind::NotFound => ProbeFailureKind::NotFound,
        _ => ProbeFailureKind::PermissionDenied,
    };
    ProbeResult::failure(kind, format!("{}: {}", context, e))
}

fn failure_kind(kind: ConnectErrorKind) -> ProbeFailureKind {
    match kind {
        ConnectErrorKind::InvalidInput => ProbeFailureKind::InvalidInput,
        ConnectErrorKind::NotFound => ProbeFailureKind::NotFound,
        ConnectErrorKind::Unreachable => ProbeFailureKind::Unreachable,
        ConnectErrorKind::Timeout => ProbeFailureKind::Timeout,
    }
}

fn log_outcome(step: &str, result: &ProbeResult) {
    if result.succeeded {
        info!("[PHASE: probe] [STEP: {}] {}", step, result.message);
    } else {
        warn!(
            "[PHASE: probe] [STEP: {}] {:?}: {}",
            step,
            result.failure.unwrap_or(ProbeFailureKind::Unreachable),
            result.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::tests::{create_sqlite_file, HangingStub, ImmediateFailureStub};
    use crate::database::connection::RealDbConnector;

    fn service(root: &Path) -> ProbeService {
        ProbeService::new(
            root,
            Arc::new(RealDbConnector::new(root, Duration::from_secs(5), 1)),
            Duration::from_secs(5),
        )
    }

    fn probe_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".probe-"))
            .count()
    }

    #[test]
    fn config_writable_for_missing_file_in_existing_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wiki.toml");

        let result = service(dir.path()).test_config_writable(&path);

        assert!(result.succeeded, "{}", result.message);
        assert!(!path.exists(), "probe must not create the artifact");
        assert_eq!(probe_files(dir.path()), 0);
    }

    #[test]
    fn config_writable_keeps_existing_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wiki.toml");
        std::fs::write(&path, "installed = false\n").expect("seed");

        let result = service(dir.path()).test_config_writable(&path);

        assert!(result.succeeded, "{}", result.message);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "installed = false\n");
    }

    #[test]
    fn config_writable_fails_for_read_only_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wiki.toml");
        std::fs::write(&path, "installed = false\n").expect("seed");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).expect("chmod");

        let result = service(dir.path()).test_config_writable(&path);

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(ProbeFailureKind::PermissionDenied));
    }

    #[test]
    fn config_writable_fails_for_missing_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = service(dir.path()).test_config_writable(&dir.path().join("nope").join("wiki.toml"));
        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(ProbeFailureKind::NotFound));
    }

    #[test]
    fn attachments_folder_existing_and_writable() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("App_Data/Attachments")).expect("mkdir");

        let result = service(dir.path()).test_attachments_folder("~/App_Data/Attachments");

        assert!(result.succeeded, "{}", result.message);
        assert_eq!(probe_files(&dir.path().join("App_Data/Attachments")), 0);
    }

    #[test]
    fn attachments_folder_missing_vs_not_a_folder_are_distinct() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("file.txt"), "x").expect("seed");
        let svc = service(dir.path());

        let missing = svc.test_attachments_folder(&format!("~/AcceptanceTests/{}", uuid::Uuid::new_v4()));
        let not_dir = svc.test_attachments_folder("file.txt");

        assert_eq!(missing.failure, Some(ProbeFailureKind::NotFound));
        assert!(missing.message.contains("does not exist"));
        assert_eq!(not_dir.failure, Some(ProbeFailureKind::NotADirectory));
        assert_ne!(missing.message, not_dir.message);
    }

    #[test]
    fn attachments_folder_outside_root_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = service(dir.path()).test_attachments_folder("~/../../etc");
        assert_eq!(result.failure, Some(ProbeFailureKind::OutsideInstallRoot));
    }

    #[cfg(unix)]
    #[test]
    fn attachments_folder_read_only_is_reported_apart_from_missing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("Attachments");
        std::fs::create_dir_all(&folder).expect("mkdir");
        std::fs::set_permissions(&folder, std::fs::Permissions::from_mode(0o555)).expect("chmod");

        // Root ignores mode bits; nothing to assert there.
        let writable_anyway = write_and_remove_probe_file(&folder).is_ok();
        let svc = service(dir.path());
        let read_only = svc.test_attachments_folder("~/Attachments");
        let missing = svc.test_attachments_folder("~/Nope");
        std::fs::set_permissions(&folder, std::fs::Permissions::from_mode(0o755)).expect("chmod back");
        if writable_anyway {
            return;
        }

        assert_eq!(read_only.failure, Some(ProbeFailureKind::PermissionDenied));
        assert!(read_only.message.contains("not writable"), "{}", read_only.message);
        assert_eq!(missing.failure, Some(ProbeFailureKind::NotFound));
        assert_ne!(read_only.message, missing.message);
        assert_eq!(probe_files(&folder), 0);
    }

    #[tokio::test]
    async fn data_store_check_refuses_sqlite_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).expect("mkdir");
        create_sqlite_file(dir.path(), "outside.db").await;

        let result = service(&root)
            .test_data_store_connection(DataStoreType::Sqlite, "Data Source=../outside.db")
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(ProbeFailureKind::InvalidInput));
    }

    #[tokio::test]
    async fn data_store_probe_succeeds_for_existing_sqlite() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_sqlite_file(dir.path(), "wiki.db").await;

        let result = service(dir.path())
            .test_data_store_connection(DataStoreType::Sqlite, "Data Source=wiki.db")
            .await;

        assert!(result.succeeded, "{}", result.message);
    }

    #[tokio::test]
    async fn data_store_probe_reports_missing_target_without_raising() {
        let dir = tempfile::tempdir().expect("tempdir");

        let result = service(dir.path())
            .test_data_store_connection(DataStoreType::Sqlite, "Data Source=|DataDirectory|nope.db")
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(ProbeFailureKind::NotFound));
    }

    #[tokio::test]
    async fn data_store_probe_preserves_driver_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stub = Arc::new(ImmediateFailureStub::unreachable());
        let svc = ProbeService::new(dir.path(), stub.clone(), Duration::from_secs(1));

        let result = svc
            .test_data_store_connection(DataStoreType::SqlServer, "Server=db;Password=Hunter2")
            .await;

        assert_eq!(result.failure, Some(ProbeFailureKind::Unreachable));
        assert!(result.message.contains("Unable to connect"));
        assert!(!result.message.contains("Hunter2"));
        assert_eq!(stub.call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn data_store_probe_is_bounded_by_timeout() {
        // INTENT: an unreachable host must not hang the wizard.
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = ProbeService::new(dir.path(), Arc::new(HangingStub::new()), Duration::from_millis(200));
        let started = Instant::now();

        let result = svc
            .test_data_store_connection(DataStoreType::Postgres, "postgres://h/db")
            .await;

        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert_eq!(result.failure, Some(ProbeFailureKind::Timeout));
    }
}
