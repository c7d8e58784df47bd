//! Package installation.
//!
//! One install at a time: `Downloading -> Extracting -> finished`. The archive
//! is streamed into `<install_root>/<name>/app.zip`, unpacked in place by the
//! external archive tool, then removed. Installed state is just "the app
//! directory exists", so a failed install that got as far as creating the
//! directory still counts as installed.

use crate::catalog::{AppRecord, is_valid_app_name};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::events::{EventBus, InstallPhase, InstallProgress, StoreEvent};
use crate::format::format_bytes;
use crate::transport::Transport;
use log::{error, info, warn};
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const ARCHIVE_NAME: &str = "app.zip";
const CHUNK_SIZE: usize = 8192;

/// Result of an uninstall request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    Cancelled,
}

/// Claim on the single install slot. Releases the slot when dropped.
pub struct InstallSession {
    app: AppRecord,
    slot: Arc<Mutex<Option<String>>>,
}

impl InstallSession {
    pub fn app(&self) -> &AppRecord {
        &self.app
    }
}

impl Drop for InstallSession {
    fn drop(&mut self) {
        *lock_slot(&self.slot) = None;
    }
}

/// The slot only holds a name, so a poisoned lock is still usable.
fn lock_slot(slot: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InstallManager {
    config: Arc<StoreConfig>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    active: Arc<Mutex<Option<String>>>,
}

impl InstallManager {
    pub fn new(config: Arc<StoreConfig>, transport: Arc<dyn Transport>, events: EventBus) -> Self {
        Self {
            config,
            transport,
            events,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_installed(&self, app: &AppRecord) -> bool {
        self.app_dir(app).is_ok_and(|dir| dir.is_dir())
    }

    /// Install directory of `app`. Names that would resolve outside the
    /// install root are rejected.
    fn app_dir(&self, app: &AppRecord) -> Result<PathBuf, StoreError> {
        if !is_valid_app_name(&app.name) {
            return Err(StoreError::InvalidAppName(app.name.clone()));
        }
        Ok(self.config.install_dir(&app.name))
    }

    /// Name of the app currently being installed.
    pub fn active_install(&self) -> Option<String> {
        lock_slot(&self.active).clone()
    }

    /// Reserve the install slot for `app`.
    /// Fails with [`StoreError::Busy`] while another install holds it.
    pub fn begin(&self, app: &AppRecord) -> Result<InstallSession, StoreError> {
        self.app_dir(app)?;

        let mut active = lock_slot(&self.active);
        if let Some(current) = active.as_ref() {
            return Err(StoreError::Busy {
                active: current.clone(),
            });
        }
        *active = Some(app.name.clone());

        Ok(InstallSession {
            app: app.clone(),
            slot: self.active.clone(),
        })
    }

    /// Run a reserved install to completion, reporting through the event bus.
    /// Blocks for the download and the extraction.
    pub fn run(&self, session: InstallSession) -> Result<(), StoreError> {
        let app = session.app();
        let app_dir = self.config.install_dir(&app.name);
        let archive = app_dir.join(ARCHIVE_NAME);

        info!("Installing {} into {:?}", app.name, app_dir);
        let result = self.install_into(app, &app_dir, &archive);

        if archive.exists() {
            if let Err(e) = fs::remove_file(&archive) {
                warn!("Failed to remove {:?}: {}", archive, e);
            }
        }

        match &result {
            Ok(()) => {
                info!("{} installed", app.name);
                self.events.send(StoreEvent::InstallFinished {
                    app: app.name.clone(),
                    success: true,
                    message: format!("{} was installed successfully.", app.name),
                });
                self.events.send(StoreEvent::AppStatusChanged);
            }
            Err(e) => {
                error!("Installing {} failed: {}", app.name, e);
                self.events.send(StoreEvent::InstallFinished {
                    app: app.name.clone(),
                    success: false,
                    message: format!("Installation failed: {e}"),
                });
            }
        }

        result
    }

    fn install_into(&self, app: &AppRecord, app_dir: &Path, archive: &Path) -> Result<(), StoreError> {
        self.progress(app, InstallPhase::Downloading, 0, "Connecting...", String::new());
        fs::create_dir_all(app_dir)?;

        self.download(app, archive)?;

        self.progress(app, InstallPhase::Extracting, 100, "Extracting files...", String::new());
        self.extract(archive, app_dir)?;

        fs::remove_file(archive)?;
        self.mark_entry_point_executable(app);
        Ok(())
    }

    fn download(&self, app: &AppRecord, archive: &Path) -> Result<(), StoreError> {
        let download = self.transport.get(&app.download_url)?;
        let total = download.content_length.filter(|t| *t > 0);
        let mut body = download.body;
        let mut file = BufWriter::new(fs::File::create(archive)?);

        let status = format!("Downloading {}...", app.name);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received: u64 = 0;
        let mut last_percentage = 0u8;

        loop {
            let n = body.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            received += n as u64;

            // No percentage until the size is known
            let Some(total) = total else { continue };
            let percentage = (received.saturating_mul(100) / total).min(100) as u8;
            if percentage > last_percentage {
                last_percentage = percentage;
                let info = format!("{} / {}", format_bytes(received), format_bytes(total));
                self.progress(app, InstallPhase::Downloading, percentage, &status, info);
            }
        }

        file.flush()?;
        info!("Downloaded {} ({})", app.name, format_bytes(received));
        Ok(())
    }

    fn extract(&self, archive: &Path, target: &Path) -> Result<(), StoreError> {
        let status = Command::new(&self.config.archive_tool)
            .arg("-x")
            .arg("-f")
            .arg(archive)
            .arg("-C")
            .arg(target)
            .stdin(Stdio::null())
            .status()?;

        if !status.success() {
            return Err(StoreError::Extraction(status));
        }
        Ok(())
    }

    #[cfg(unix)]
    fn mark_entry_point_executable(&self, app: &AppRecord) {
        use std::os::unix::fs::PermissionsExt;

        let entry = self.config.entry_point_path(&app.name);
        if entry.is_file() {
            if let Err(e) = fs::set_permissions(&entry, fs::Permissions::from_mode(0o755)) {
                warn!("Failed to make {:?} executable: {}", entry, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn mark_entry_point_executable(&self, _app: &AppRecord) {}

    fn progress(&self, app: &AppRecord, phase: InstallPhase, percentage: u8, status: &str, info: String) {
        self.events.send(StoreEvent::InstallProgress(InstallProgress {
            app: app.name.clone(),
            phase,
            percentage,
            status: status.to_string(),
            info,
        }));
    }

    /// Delete the app directory once `confirm` agrees.
    /// Does not check whether the app is still running.
    pub fn uninstall(
        &self,
        app: &AppRecord,
        confirm: impl FnOnce(&AppRecord) -> bool,
    ) -> Result<UninstallOutcome, StoreError> {
        let app_dir = self.app_dir(app)?;
        if !confirm(app) {
            return Ok(UninstallOutcome::Cancelled);
        }

        fs::remove_dir_all(&app_dir)?;
        info!("Removed {:?}", app_dir);

        let shortcut = self.shortcut_path(app);
        if shortcut.symlink_metadata().is_ok() {
            if let Err(e) = fs::remove_file(&shortcut) {
                warn!("Failed to remove shortcut {:?}: {}", shortcut, e);
            }
        }

        self.events.send(StoreEvent::AppStatusChanged);
        Ok(UninstallOutcome::Removed)
    }

    /// Start the entry point detached, from inside its own directory.
    pub fn launch(&self, app: &AppRecord) -> Result<(), StoreError> {
        let app_dir = self.app_dir(app)?;
        let entry = app_dir.join(&self.config.entry_point);
        if !entry.is_file() {
            return Err(StoreError::EntryPointMissing(entry));
        }

        let mut child = Command::new(&entry)
            .current_dir(&app_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!("Launched {} (pid {})", app.name, child.id());

        // Reap without looking at the exit status
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    pub fn shortcut_path(&self, app: &AppRecord) -> PathBuf {
        self.config.shortcut_dir.join(&app.name)
    }

    /// Link the entry point into the shortcut directory. Best effort, no fallback.
    pub fn create_shortcut(&self, app: &AppRecord) -> Result<PathBuf, StoreError> {
        let entry = self.app_dir(app)?.join(&self.config.entry_point);
        if !entry.is_file() {
            return Err(StoreError::EntryPointMissing(entry));
        }

        let link = self.shortcut_path(app);
        fs::create_dir_all(&self.config.shortcut_dir)?;
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        link_file(&entry, &link)?;

        info!("Created shortcut {:?} -> {:?}", link, entry);
        Ok(link)
    }
}

#[cfg(unix)]
fn link_file(target: &Path, link: &Path) -> Result<(), StoreError> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(windows)]
fn link_file(target: &Path, link: &Path) -> Result<(), StoreError> {
    std::os::windows::fs::symlink_file(target, link)?;
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn link_file(_target: &Path, _link: &Path) -> Result<(), StoreError> {
    Err(StoreError::ShortcutUnsupported)
}

#[cfg(test)]
pub(crate) fn sample_archive(entry_point: &str, padding: usize) -> Vec<u8> {
    let files: [(&str, Vec<u8>); 3] = [
        (entry_point, b"#!/bin/sh\nexit 0\n".to_vec()),
        ("data/readme.txt", b"hello".to_vec()),
        ("data/blob.bin", vec![7u8; padding]),
    ];

    let mut builder = tar::Builder::new(Vec::new());
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, body.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;
    use crate::transport::mock::MockTransport;
    use tokio::sync::broadcast::Receiver;

    const ZIP_URL: &str = "http://x/f.zip";

    struct Fixture {
        _root: tempfile::TempDir,
        config: Arc<StoreConfig>,
        transport: Arc<MockTransport>,
        manager: InstallManager,
        rx: Receiver<StoreEvent>,
    }

    fn fixture(tweak: impl FnOnce(&mut StoreConfig)) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::with_root(root.path());
        tweak(&mut config);
        let config = Arc::new(config);
        let transport = Arc::new(MockTransport::new());
        let events = EventBus::new();
        let rx = events.subscribe();
        let manager = InstallManager::new(config.clone(), transport.clone(), events);
        Fixture {
            _root: root,
            config,
            transport,
            manager,
            rx,
        }
    }

    fn foo() -> AppRecord {
        AppRecord {
            name: "Foo".to_string(),
            download_url: ZIP_URL.to_string(),
            website_url: "http://x".to_string(),
            icon_url: String::new(),
        }
    }

    fn progress_of(events: &[StoreEvent]) -> Vec<(InstallPhase, u8)> {
        events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::InstallProgress(p) => Some((p.phase, p.percentage)),
                _ => None,
            })
            .collect()
    }

    fn finished(events: &[StoreEvent]) -> Option<(bool, String)> {
        events.iter().find_map(|e| match e {
            StoreEvent::InstallFinished { success, message, .. } => Some((*success, message.clone())),
            _ => None,
        })
    }

    #[test]
    fn test_second_install_is_busy() {
        let f = fixture(|_| {});
        let other = AppRecord {
            name: "Bar".to_string(),
            ..foo()
        };

        let session = f.manager.begin(&foo()).unwrap();
        assert_eq!(f.manager.active_install().as_deref(), Some("Foo"));
        match f.manager.begin(&other) {
            Err(StoreError::Busy { active }) => assert_eq!(active, "Foo"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second session should be rejected"),
        }

        drop(session);
        assert!(f.manager.active_install().is_none());
        assert!(f.manager.begin(&other).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_install_sequence() {
        let mut f = fixture(|_| {});
        let entry = f.config.entry_point.clone();
        f.transport.serve(ZIP_URL, sample_archive(&entry, 64 * 1024));

        let session = f.manager.begin(&foo()).unwrap();
        f.manager.run(session).unwrap();

        let events = drain(&mut f.rx);
        let progress = progress_of(&events);
        assert_eq!(progress.first(), Some(&(InstallPhase::Downloading, 0)));
        assert_eq!(progress.last(), Some(&(InstallPhase::Extracting, 100)));

        let downloading: Vec<u8> = progress
            .iter()
            .filter(|(phase, _)| *phase == InstallPhase::Downloading)
            .map(|(_, pct)| *pct)
            .collect();
        assert!(downloading.len() > 2);
        assert!(downloading.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(downloading.last(), Some(&100));

        let (success, message) = finished(&events).unwrap();
        assert!(success);
        assert_eq!(message, "Foo was installed successfully.");
        assert!(matches!(events.last(), Some(StoreEvent::AppStatusChanged)));

        let app_dir = f.config.install_dir("Foo");
        assert!(f.manager.is_installed(&foo()));
        assert_eq!(fs::read(app_dir.join("data/readme.txt")).unwrap(), b"hello");
        assert!(!app_dir.join(ARCHIVE_NAME).exists());
        assert!(f.manager.active_install().is_none());

        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(app_dir.join(&entry)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_unknown_size_reports_no_percentages() {
        let mut f = fixture(|_| {});
        let entry = f.config.entry_point.clone();
        f.transport.serve_unsized(ZIP_URL, sample_archive(&entry, 32 * 1024));

        let session = f.manager.begin(&foo()).unwrap();
        f.manager.run(session).unwrap();

        let events = drain(&mut f.rx);
        assert_eq!(
            progress_of(&events),
            [(InstallPhase::Downloading, 0), (InstallPhase::Extracting, 100)]
        );
        assert!(finished(&events).unwrap().0);
    }

    #[test]
    fn test_failed_download_never_extracts() {
        let mut f = fixture(|_| {});

        let session = f.manager.begin(&foo()).unwrap();
        assert!(f.manager.run(session).is_err());

        let events = drain(&mut f.rx);
        assert_eq!(progress_of(&events), [(InstallPhase::Downloading, 0)]);
        let (success, message) = finished(&events).unwrap();
        assert!(!success);
        assert!(message.starts_with("Installation failed"));
        assert!(!events.iter().any(|e| matches!(e, StoreEvent::AppStatusChanged)));

        // The directory was created before the download, so it reads as installed
        let app_dir = f.config.install_dir("Foo");
        assert_eq!(f.manager.is_installed(&foo()), app_dir.is_dir());
        assert!(f.manager.is_installed(&foo()));
        assert!(!app_dir.join(ARCHIVE_NAME).exists());
        assert!(f.manager.active_install().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_extraction_failure_is_reported() {
        let mut f = fixture(|config| config.archive_tool = "false".to_string());
        f.transport.serve(ZIP_URL, b"not an archive".to_vec());

        let session = f.manager.begin(&foo()).unwrap();
        let result = f.manager.run(session);
        assert!(matches!(result, Err(StoreError::Extraction(_))));

        let events = drain(&mut f.rx);
        assert_eq!(progress_of(&events).last(), Some(&(InstallPhase::Extracting, 100)));
        assert!(!finished(&events).unwrap().0);
        assert!(f.manager.is_installed(&foo()));
        assert!(!f.config.install_dir("Foo").join(ARCHIVE_NAME).exists());
    }

    #[test]
    fn test_uninstall_needs_confirmation() {
        let mut f = fixture(|_| {});
        let app_dir = f.config.install_dir("Foo");
        fs::create_dir_all(app_dir.join("nested")).unwrap();
        fs::write(app_dir.join("nested/file"), b"x").unwrap();

        let outcome = f.manager.uninstall(&foo(), |_| false).unwrap();
        assert_eq!(outcome, UninstallOutcome::Cancelled);
        assert!(app_dir.exists());
        assert!(drain(&mut f.rx).is_empty());

        let outcome = f.manager.uninstall(&foo(), |app| app.name == "Foo").unwrap();
        assert_eq!(outcome, UninstallOutcome::Removed);
        assert!(!app_dir.exists());
        assert!(!f.manager.is_installed(&foo()));
        let events = drain(&mut f.rx);
        assert!(matches!(events.as_slice(), [StoreEvent::AppStatusChanged]));
    }

    #[test]
    fn test_uninstall_missing_dir_fails() {
        let f = fixture(|_| {});
        assert!(matches!(
            f.manager.uninstall(&foo(), |_| true),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_launch_without_entry_point() {
        let f = fixture(|_| {});
        fs::create_dir_all(f.config.install_dir("Foo")).unwrap();

        match f.manager.launch(&foo()) {
            Err(StoreError::EntryPointMissing(path)) => {
                assert_eq!(path, f.config.entry_point_path("Foo"))
            }
            other => panic!("expected missing entry point, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_runs_entry_point_in_its_directory() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture(|config| config.entry_point = "run.sh".to_string());
        let app_dir = f.config.install_dir("Foo");
        fs::create_dir_all(&app_dir).unwrap();
        let entry = app_dir.join("run.sh");
        fs::write(&entry, "#!/bin/sh\ntouch launched\n").unwrap();
        fs::set_permissions(&entry, fs::Permissions::from_mode(0o755)).unwrap();

        f.manager.launch(&foo()).unwrap();

        let marker = app_dir.join("launched");
        for _ in 0..100 {
            if marker.exists() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_shortcut_created_and_removed_on_uninstall() {
        let f = fixture(|_| {});
        let entry = f.config.entry_point_path("Foo");
        fs::create_dir_all(entry.parent().unwrap()).unwrap();
        fs::write(&entry, b"").unwrap();

        let link = f.manager.create_shortcut(&foo()).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), entry);

        // Recreating replaces the old link
        assert_eq!(f.manager.create_shortcut(&foo()).unwrap(), link);

        f.manager.uninstall(&foo(), |_| true).unwrap();
        assert!(link.symlink_metadata().is_err());
    }

    #[test]
    fn test_names_outside_install_root_are_refused() {
        let f = fixture(|_| {});
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("keep"), b"x").unwrap();
        fs::create_dir_all(&f.config.install_root).unwrap();

        let absolute = outside.path().to_string_lossy().into_owned();
        for name in [absolute.as_str(), "", ".", "..", "a/../.."] {
            let app = AppRecord {
                name: name.to_string(),
                ..foo()
            };
            assert!(!f.manager.is_installed(&app), "{name:?} reads as installed");
            assert!(matches!(
                f.manager.uninstall(&app, |_| true),
                Err(StoreError::InvalidAppName(_))
            ));
            assert!(matches!(f.manager.begin(&app), Err(StoreError::InvalidAppName(_))));
            assert!(matches!(f.manager.launch(&app), Err(StoreError::InvalidAppName(_))));
            assert!(matches!(
                f.manager.create_shortcut(&app),
                Err(StoreError::InvalidAppName(_))
            ));
        }

        assert!(outside.path().join("keep").exists());
        assert!(f.config.install_root.is_dir());
        assert!(f.manager.active_install().is_none());
    }

    #[test]
    fn test_poisoned_slot_is_still_released() {
        let f = fixture(|_| {});
        let session = f.manager.begin(&foo()).unwrap();

        let slot = f.manager.active.clone();
        let _ = std::thread::spawn(move || {
            let _guard = slot.lock().unwrap();
            panic!("poison the install slot");
        })
        .join();
        assert!(f.manager.active.is_poisoned());

        assert_eq!(f.manager.active_install().as_deref(), Some("Foo"));
        drop(session);
        assert!(f.manager.active_install().is_none());
        assert!(f.manager.begin(&foo()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_large_download_keeps_whole_event_sequence() {
        let mut f = fixture(|_| {});
        let entry = f.config.entry_point.clone();
        f.transport.serve(ZIP_URL, sample_archive(&entry, 2 * 1024 * 1024));

        let session = f.manager.begin(&foo()).unwrap();
        f.manager.run(session).unwrap();

        let events = drain(&mut f.rx);
        match events.first() {
            Some(StoreEvent::InstallProgress(p)) => {
                assert_eq!((p.phase, p.percentage), (InstallPhase::Downloading, 0));
                assert_eq!(p.status, "Connecting...");
            }
            other => panic!("expected the connecting event first, got {other:?}"),
        }

        let downloading: Vec<u8> = progress_of(&events)
            .into_iter()
            .filter(|(phase, _)| *phase == InstallPhase::Downloading)
            .map(|(_, pct)| pct)
            .collect();
        assert_eq!(downloading.len(), 101);
        assert!(downloading.windows(2).all(|w| w[0] < w[1]));
        assert!(finished(&events).unwrap().0);
        assert!(matches!(events.last(), Some(StoreEvent::AppStatusChanged)));
    }

    #[test]
    fn test_shortcut_requires_entry_point() {
        let f = fixture(|_| {});
        assert!(matches!(
            f.manager.create_shortcut(&foo()),
            Err(StoreError::EntryPointMissing(_))
        ));
    }
}
