//! Driver for the external game installer (SteamCMD-style).
//!
//! Every invocation, including the one-time bootstrap download and the
//! tool's own self-update, runs under a single gate so at most one installer
//! process is alive on the host at a time. The gate is a mutex guard held
//! for the duration of the call and released on every exit path.

use crate::error::InstallerError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Case-insensitive stdout marker the installer prints once it is done
pub const COMPLETION_MARKER: &str = "install state:";

/// How long stderr keeps draining after the marker while the process lives on
const STDERR_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Path of the installer executable
    pub executable: PathBuf,
    /// Archive fetched when the executable is missing (`.zip` or `.tar.gz`)
    pub download_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerOutcome {
    /// True when the marker was seen, false when the process exited first
    pub saw_marker: bool,
    /// Everything the process wrote to stderr up to completion
    pub stderr: String,
}

/// Runs one installer command and decides when it is finished
#[async_trait]
pub trait InstallerRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> Result<InstallerOutcome, InstallerError>;
}

/// Scans stdout for [`COMPLETION_MARKER`] and returns as soon as it shows up.
///
/// The process is not waited on after the marker; if it exits first that
/// is a normal completion too. There is no timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerRunner;

#[async_trait]
impl InstallerRunner for MarkerRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<InstallerOutcome, InstallerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InstallerError::Spawn(program.to_path_buf(), e))?;

        let stderr_buffer = Arc::new(std::sync::Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|mut stderr| {
            let buffer = stderr_buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                while let Ok(n) = stderr.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    if let Ok(mut text) = buffer.lock() {
                        text.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    }
                }
            })
        });

        let mut saw_marker = false;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.map_err(InstallerError::Read)? {
                debug!("installer: {}", line);
                if line.to_ascii_lowercase().contains(COMPLETION_MARKER) {
                    saw_marker = true;
                    break;
                }
            }
        }

        if saw_marker {
            // The process may keep stderr open; give what it already wrote time to land
            if let Some(task) = stderr_task {
                let _ = tokio::time::timeout(STDERR_DRAIN, task).await;
            }
        } else {
            // stdout closed: the process is exiting, collect all of stderr
            let _ = child.wait().await;
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
        }

        let stderr = stderr_buffer
            .lock()
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        Ok(InstallerOutcome { saw_marker, stderr })
    }
}

/// Splits a command line into arguments, honouring double quotes
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// The templated install/update command line
pub fn app_update_command(install_dir: &Path, app_id: u32, validate: bool) -> String {
    let mut line = format!(
        "+force_install_dir \"{}\" +login anonymous +app_update {}",
        install_dir.display(),
        app_id
    );
    if validate {
        line.push_str(" validate");
    }
    line.push_str(" +quit");
    line
}

/// Owns the installer executable and every process started from it.
///
/// Each public call takes the gate first, downloads and unpacks the
/// installer when `config.executable` is missing, and only then starts the
/// process through the [`InstallerRunner`]. Calls made while another one
/// runs wait for it to finish.
///
/// # Example
///
/// ```rust,no_run
/// use host_agent::installer::{InstallerConfig, InstallerDriver, MarkerRunner};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<(), host_agent::error::InstallerError> {
/// let driver = InstallerDriver::new(
///     InstallerConfig {
///         executable: "steamcmd/steamcmd.sh".into(),
///         download_url: "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz"
///             .to_string(),
///     },
///     Arc::new(MarkerRunner),
/// );
/// driver.install_app(Path::new("/srv/valheim"), 896660, true).await?;
/// # Ok(())
/// # }
/// ```
pub struct InstallerDriver {
    config: InstallerConfig,
    runner: Arc<dyn InstallerRunner>,
    http: reqwest::Client,
    gate: Mutex<()>,
}

impl InstallerDriver {
    pub fn new(config: InstallerConfig, runner: Arc<dyn InstallerRunner>) -> Self {
        Self {
            config,
            runner,
            http: reqwest::Client::new(),
            gate: Mutex::new(()),
        }
    }

    /// Installs, updates or validates a game into `install_dir`.
    ///
    /// # Arguments
    ///
    /// * `install_dir` - created when missing and passed as `+force_install_dir`
    /// * `app_id` - the store's application id
    /// * `validate` - also verify every installed file
    ///
    /// # Returns
    ///
    /// `Ok(())` once the installer printed its completion marker or exited.
    /// Stderr output is reported as an [`InstallerError`].
    #[instrument(skip(self))]
    pub async fn install_app(
        &self,
        install_dir: &Path,
        app_id: u32,
        validate: bool,
    ) -> Result<(), InstallerError> {
        let _gate = self.gate.lock().await;
        self.bootstrap().await?;

        tokio::fs::create_dir_all(install_dir)
            .await
            .map_err(|e| InstallerError::Io(install_dir.to_path_buf(), e))?;
        let args = split_command_line(&app_update_command(install_dir, app_id, validate));
        self.run(&args).await?;
        info!("📦 App {} installed into {}", app_id, install_dir.display());
        Ok(())
    }

    /// Lets the installer update itself
    #[instrument(skip(self))]
    pub async fn self_update(&self) -> Result<(), InstallerError> {
        let _gate = self.gate.lock().await;
        self.bootstrap().await?;
        self.run(&split_command_line("+login anonymous +quit")).await?;
        info!("🔧 Installer self-update finished");
        Ok(())
    }

    async fn run(&self, args: &[String]) -> Result<(), InstallerError> {
        let outcome = self.runner.run(&self.config.executable, args).await?;
        if !outcome.stderr.is_empty() {
            return Err(InstallerError::Stderr(outcome.stderr));
        }
        if !outcome.saw_marker {
            debug!("Installer exited without printing the completion marker");
        }
        Ok(())
    }

    /// Downloads and unpacks the installer when its executable is missing.
    /// Callers hold the gate.
    async fn bootstrap(&self) -> Result<(), InstallerError> {
        let executable = &self.config.executable;
        if executable.exists() {
            return Ok(());
        }

        let url = &self.config.download_url;
        let archive_kind = ArchiveKind::from_url(url)?;
        let target_dir = executable
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!("⬇️ Installer missing, downloading from {}", url);

        let download_err = |e: reqwest::Error| InstallerError::Download(url.clone(), e.to_string());
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?
            .bytes()
            .await
            .map_err(download_err)?;

        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| InstallerError::Io(target_dir.clone(), e))?;
        let archive_path = target_dir.join(archive_kind.file_name());
        tokio::fs::write(&archive_path, &bytes)
            .await
            .map_err(|e| InstallerError::Io(archive_path.clone(), e))?;

        let extract_from = archive_path.clone();
        let extract_into = target_dir.clone();
        tokio::task::spawn_blocking(move || archive_kind.extract(&extract_from, &extract_into))
            .await
            .map_err(|e| InstallerError::Extract(archive_path.clone(), e.to_string()))??;

        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            warn!("Could not remove {}: {}", archive_path.display(), e);
        }
        make_executable(executable).await;

        if !executable.exists() {
            return Err(InstallerError::MissingBinary(executable.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    fn from_url(url: &str) -> Result<Self, InstallerError> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".zip") {
            Ok(Self::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else {
            Err(InstallerError::UnsupportedArchive(url.to_string()))
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::Zip => "installer.zip",
            Self::TarGz => "installer.tar.gz",
        }
    }

    fn extract(self, archive: &Path, into: &Path) -> Result<(), InstallerError> {
        let extract_err = |e: String| InstallerError::Extract(archive.to_path_buf(), e);
        let file = std::fs::File::open(archive)
            .map_err(|e| InstallerError::Io(archive.to_path_buf(), e))?;
        match self {
            Self::Zip => zip::ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(into))
                .map_err(|e| extract_err(e.to_string())),
            Self::TarGz => tar::Archive::new(flate2::read::GzDecoder::new(file))
                .unpack(into)
                .map_err(|e| extract_err(e.to_string())),
        }
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        let _ = tokio::fs::set_permissions(path, permissions).await;
    }
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) {}
