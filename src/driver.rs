// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Orchestration of external tooling.
//!
//! Everything that leaves the process lives here: cloning the Overleaf
//! toolkit, driving the compose lifecycle, and talking to the database
//! container. The installer only ever sees the [`Orchestrator`] trait, which
//! keeps the install sequence testable without Docker or network access.
//!
//! # Compose Flavors
//!
//! Docker ships compose in two flavors: the `docker compose` plugin, and the
//! older standalone `docker-compose` binary. The plugin is preferred, the
//! standalone binary is only used when the plugin is unavailable.
//!
//! # Blocking
//!
//! All operations block the calling thread until the external process exits.
//! No timeout is applied, so a hung container runtime hangs the caller.

pub mod clone;
pub mod replica;

pub use replica::{classify_replica_response, ReadinessPolicy, ReplicaStatus};

use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};
use tracing::{debug, info, instrument, warn};

/// Layer of indirection for external tooling.
pub trait Orchestrator: Send + Sync + 'static {
    /// Check if program exists on the user's `PATH`.
    fn command_exists(&self, name: &str) -> bool;

    /// Check if a compose command is available.
    fn compose_available(&self) -> bool;

    /// Check if the Docker daemon responds.
    fn docker_is_running(&self) -> bool;

    /// Clone remote repository into target path.
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()>;

    /// Determine commit that HEAD of repository at target path points at.
    fn head_commit(&self, path: &Path) -> Result<String>;

    /// Create and start compose stack in the background.
    fn compose_up(&self, path: &Path) -> Result<()>;

    /// Stop and remove compose stack.
    fn compose_down(&self, path: &Path) -> Result<()>;

    /// Stop compose stack without removing it.
    fn compose_stop(&self, path: &Path) -> Result<()>;

    /// Start previously stopped compose stack.
    fn compose_start(&self, path: &Path) -> Result<()>;

    /// Initialize replica set of database running in target container.
    fn initialize_database_replica(&self, container: &str) -> Result<ReplicaStatus>;
}

/// Compose command flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    /// `docker compose` plugin.
    Plugin,

    /// Standalone `docker-compose` binary.
    Standalone,
}

impl ComposeCommand {
    /// Detect available compose flavor.
    ///
    /// Returns `None` if neither flavor is available.
    #[instrument(level = "debug")]
    pub fn detect() -> Option<Self> {
        let plugin = Command::new("docker")
            .args(["compose", "version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);

        if plugin {
            debug!("using docker compose plugin");
            return Some(Self::Plugin);
        }

        if find_on_path("docker-compose").is_some() {
            debug!("using standalone docker-compose");
            return Some(Self::Standalone);
        }

        None
    }

    /// Program to execute.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Plugin => "docker",
            Self::Standalone => "docker-compose",
        }
    }

    /// Expand compose subcommand into full argument listing.
    pub fn args<'a>(&self, subcommand: &[&'a str]) -> Vec<&'a str> {
        let mut args = match self {
            Self::Plugin => vec!["compose"],
            Self::Standalone => Vec::new(),
        };
        args.extend_from_slice(subcommand);
        args
    }
}

impl Display for ComposeCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Plugin => fmt.write_str("docker compose"),
            Self::Standalone => fmt.write_str("docker-compose"),
        }
    }
}

/// Orchestration through system binaries and libgit2.
#[derive(Debug, Clone)]
pub struct SystemOrchestrator {
    compose: Option<ComposeCommand>,
    readiness: ReadinessPolicy,
}

impl SystemOrchestrator {
    /// Construct new orchestrator, detecting compose flavor up front.
    pub fn new(readiness: ReadinessPolicy) -> Self {
        Self {
            compose: ComposeCommand::detect(),
            readiness,
        }
    }

    /// Compose flavor in use.
    pub fn compose(&self) -> Option<ComposeCommand> {
        self.compose
    }

    fn compose_call(&self, path: &Path, subcommand: &[&str]) -> Result<()> {
        let compose = self.compose.ok_or(DriverError::ComposeMissing)?;
        syscall_interactive(compose.program(), compose.args(subcommand), path)
    }

    fn database_ready(&self, container: &str) -> bool {
        syscall_capture(
            "docker",
            ["exec", container, "mongosh", "--quiet", "--eval", replica::PING_EVAL],
        )
        .map(|(success, output)| success && output.trim() == "1")
        .unwrap_or(false)
    }

    #[instrument(skip(self), level = "debug")]
    fn wait_for_database(&self, container: &str) -> Result<()> {
        for (attempt, delay) in self.readiness.delays().enumerate() {
            thread::sleep(delay);
            if self.database_ready(container) {
                debug!("database in {container:?} ready after {} checks", attempt + 1);
                return Ok(());
            }
            debug!("database in {container:?} not ready yet");
        }

        Err(DriverError::DatabaseNotReady {
            container: container.to_owned(),
            attempts: self.readiness.attempts,
        })
    }
}

impl Default for SystemOrchestrator {
    fn default() -> Self {
        Self::new(ReadinessPolicy::default())
    }
}

impl Orchestrator for SystemOrchestrator {
    fn command_exists(&self, name: &str) -> bool {
        find_on_path(name).is_some()
    }

    fn compose_available(&self) -> bool {
        self.compose.is_some()
    }

    fn docker_is_running(&self) -> bool {
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        clone::clone_with_progress(url, dest)
    }

    fn head_commit(&self, path: &Path) -> Result<String> {
        clone::head_commit(path)
    }

    #[instrument(skip(self, path), level = "debug")]
    fn compose_up(&self, path: &Path) -> Result<()> {
        info!("bring up compose stack in {:?}", path.display());
        self.compose_call(path, &["up", "-d"])
    }

    #[instrument(skip(self, path), level = "debug")]
    fn compose_down(&self, path: &Path) -> Result<()> {
        info!("tear down compose stack in {:?}", path.display());
        self.compose_call(path, &["down"])
    }

    #[instrument(skip(self, path), level = "debug")]
    fn compose_stop(&self, path: &Path) -> Result<()> {
        info!("stop compose stack in {:?}", path.display());
        self.compose_call(path, &["stop"])
    }

    #[instrument(skip(self, path), level = "debug")]
    fn compose_start(&self, path: &Path) -> Result<()> {
        info!("start compose stack in {:?}", path.display());
        self.compose_call(path, &["start"])
    }

    #[instrument(skip(self), level = "debug")]
    fn initialize_database_replica(&self, container: &str) -> Result<ReplicaStatus> {
        self.wait_for_database(container)?;

        let initiate = replica::initiate_eval();
        let (_, output) = syscall_capture(
            "docker",
            ["exec", container, "mongosh", "--quiet", "--eval", initiate.as_str()],
        )?;

        match classify_replica_response(&output) {
            Some(status) => {
                debug!("replica set status: {status:?}");
                Ok(status)
            }
            None => Err(DriverError::ReplicaInit(output)),
        }
    }
}

/// Locate executable program on the user's `PATH`.
pub fn find_on_path(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Open URL with the platform's default browser.
///
/// Failure is logged, never fatal.
pub fn open_browser(url: &str) {
    let result = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", url]).status()
    } else if cfg!(target_os = "macos") {
        Command::new("open").arg(url).status()
    } else {
        Command::new("xdg-open").arg(url).status()
    };

    match result {
        Ok(status) if status.success() => debug!("opened {url} in browser"),
        Ok(status) => warn!("browser launcher exited with {status}, open {url} manually"),
        Err(error) => warn!("cannot launch browser ({error}), open {url} manually"),
    }
}

pub(crate) fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: impl AsRef<Path>,
) -> Result<()> {
    let status = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(cwd.as_ref())
        .spawn()?
        .wait()?;
    if !status.success() {
        return Err(DriverError::Syscall(std::io::Error::other(format!(
            "command {:?} failed with {status}",
            cmd.as_ref()
        ))));
    }

    Ok(())
}

/// Run command, capturing stdout and stderr together.
///
/// Reports whether the command succeeded along with its output rather than
/// failing on a non-zero exit, since some tools report expected conditions
/// through their exit code.
pub(crate) fn syscall_capture(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<(bool, String)> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let mut message = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    message.push_str(String::from_utf8_lossy(output.stderr.as_slice()).as_ref());

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_owned();

    Ok((output.status.success(), message))
}

/// Orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No compose flavor could be found.
    #[error("neither 'docker compose' nor 'docker-compose' is available")]
    ComposeMissing,

    /// Database did not become ready within the polling budget.
    #[error("database in container {container:?} not ready after {attempts} checks")]
    DatabaseNotReady { container: String, attempts: u32 },

    /// Replica set initiation reported failure.
    #[error("replica set initialization failed: {0}")]
    ReplicaInit(String),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// External process could not run, or exited with failure.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn compose_plugin_args() {
        let result = ComposeCommand::Plugin.args(&["up", "-d"]);
        assert_eq!(result, vec!["compose", "up", "-d"]);
        assert_eq!(ComposeCommand::Plugin.program(), "docker");
        assert_eq!(ComposeCommand::Plugin.to_string(), "docker compose");
    }

    #[test]
    fn compose_standalone_args() {
        let result = ComposeCommand::Standalone.args(&["down"]);
        assert_eq!(result, vec!["down"]);
        assert_eq!(ComposeCommand::Standalone.program(), "docker-compose");
    }

    #[sealed_test(env = [("PATH", "")])]
    fn nothing_found_on_empty_path() {
        assert_eq!(find_on_path("git"), None);
    }

    #[cfg(unix)]
    #[sealed_test]
    fn find_only_executable_program_on_path() -> anyhow::Result<()> {
        let bin = std::env::current_dir()?.join("bin");
        std::fs::create_dir(&bin)?;
        std::fs::write(bin.join("tailscale"), "#!/bin/sh\n")?;
        std::env::set_var("PATH", &bin);

        assert_eq!(find_on_path("tailscale"), None);

        let mut permissions = std::fs::metadata(bin.join("tailscale"))?.permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut permissions, 0o755);
        std::fs::set_permissions(bin.join("tailscale"), permissions)?;

        assert_eq!(find_on_path("tailscale"), Some(bin.join("tailscale")));
        assert_eq!(find_on_path("docker"), None);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn capture_reports_failure_with_output() -> anyhow::Result<()> {
        let (success, output) = syscall_capture("sh", ["-c", "echo out; echo err >&2; exit 3"])?;
        assert!(!success);
        assert_eq!(output, "out\nerr");

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn interactive_call_fails_on_nonzero_exit() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(syscall_interactive("sh", ["-c", "exit 1"], dir.path()).is_err());
        assert!(syscall_interactive("sh", ["-c", "exit 0"], dir.path()).is_ok());
    }
}
