// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation sequence.
//!
//! The [`Installer`] carries all state an installation run needs: the user's
//! settings and the orchestrator used to reach external tooling. Front ends
//! construct one installer, then hand it requests. Progress flows back
//! through a [`Reporter`] as structured [`InstallEvent`]s, so no front end
//! ever has to be touched directly by the install sequence.
//!
//! # Install Sequence
//!
//! 1. Preflight: `git` and a compose command must be available, and the
//!    Docker daemon must be running.
//! 2. Resolve the advertised host. Local installs use `localhost`, remote
//!    installs validate the user's host input.
//! 3. Probe the requested port. A conflict is only a warning, the reporter
//!    decides whether to carry on.
//! 4. Clone the Overleaf toolkit unless it already exists, then verify its
//!    pinned commit if one is configured.
//! 5. Materialize the secrets file and topology manifest.
//! 6. Bring the compose stack up.
//! 7. Initialize the database replica set. Failure here is only a warning.
//!
//! Nothing is retried or rolled back. Recovery is re-running the installer,
//! which is safe since secrets are never regenerated.

use crate::{
    config::Settings,
    driver::{DriverError, Orchestrator, ReadinessPolicy, ReplicaStatus, SystemOrchestrator},
    host::{HostError, HostSpec},
    materialize::{
        InstallationConfig, MaterializeError, Materializer, PermissionOutcome, SecretsOutcome,
    },
    probe,
};

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// How the server is going to be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Only reachable from this machine.
    Local,

    /// Reachable through a VPN address or hostname.
    Remote {
        /// Raw host input, optionally carrying a port.
        host: String,
    },
}

/// Request to install a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub mode: Mode,

    /// Port to expose, unless remote host input carries its own.
    pub port: u16,
}

/// Progress event emitted by the install sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// A new phase started.
    Step(String),

    /// Something noteworthy happened.
    Info(String),

    /// Something went wrong, but the sequence carries on.
    Warning(String),
}

impl InstallEvent {
    /// Log event through tracing.
    pub fn log(&self) {
        match self {
            Self::Step(message) => info!("==> {message}"),
            Self::Info(message) => info!("{message}"),
            Self::Warning(message) => warn!("{message}"),
        }
    }
}

/// Receiver of progress events and decisions.
pub trait Reporter {
    /// Receive progress event.
    fn report(&self, event: InstallEvent);

    /// Decide whether to continue when requested port is already in use.
    fn confirm_port_conflict(&self, port: u16) -> bool;

    /// Check if caller wants the sequence to stop before its next step.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Reporter that logs every event, and answers decisions up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    pub continue_on_port_conflict: bool,
}

impl Reporter for TracingReporter {
    fn report(&self, event: InstallEvent) {
        event.log();
    }

    fn confirm_port_conflict(&self, _: u16) -> bool {
        self.continue_on_port_conflict
    }
}

/// Result of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// URL the server is reachable at.
    pub url: String,

    /// Directory holding the toolkit and generated artifacts.
    pub install_dir: PathBuf,

    /// Whether secrets were created by this run.
    pub secrets: SecretsOutcome,

    /// Replica set status, `None` if initialization failed.
    pub replica: Option<ReplicaStatus>,
}

/// Installer application state.
#[derive(Debug)]
pub struct Installer<O = SystemOrchestrator>
where
    O: Orchestrator,
{
    settings: Settings,
    orchestrator: O,
}

impl Installer<SystemOrchestrator> {
    /// Construct installer that talks to the real system.
    pub fn from_settings(settings: Settings) -> Self {
        let orchestrator = SystemOrchestrator::new(ReadinessPolicy::from(&settings.readiness));
        Self::new(settings, orchestrator)
    }
}

impl<O> Installer<O>
where
    O: Orchestrator,
{
    /// Construct new installer.
    pub fn new(settings: Settings, orchestrator: O) -> Self {
        Self {
            settings,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    /// Directory the toolkit gets installed into.
    pub fn install_dir(&self) -> &Path {
        self.settings.toolkit.install_dir.as_path()
    }

    /// Verify that required tooling is available.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::MissingDependency`] if `git` or a compose
    ///   command cannot be found.
    /// - Return [`InstallError::DockerNotRunning`] if the Docker daemon does
    ///   not respond.
    #[instrument(skip(self), level = "debug")]
    pub fn preflight(&self) -> Result<()> {
        if !self.orchestrator.command_exists("git") {
            return Err(InstallError::MissingDependency("git"));
        }

        if !self.orchestrator.compose_available() {
            return Err(InstallError::MissingDependency("docker compose"));
        }

        if !self.orchestrator.docker_is_running() {
            return Err(InstallError::DockerNotRunning {
                hint: docker_start_hint(),
            });
        }

        debug!("preflight passed");
        Ok(())
    }

    /// Determine the host that the server gets advertised at.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::InvalidHost`] if remote host input fails
    ///   validation.
    pub fn resolve_domain(&self, request: &InstallRequest) -> Result<HostSpec> {
        match &request.mode {
            Mode::Local => Ok(HostSpec::localhost(request.port)),
            Mode::Remote { host } => Ok(HostSpec::parse(host, request.port)?),
        }
    }

    /// Run full install sequence.
    ///
    /// # Errors
    ///
    /// Every [`InstallError`] except [`InstallError::NotInstalled`] can be
    /// returned. Replica set initialization failure is reported as a
    /// warning event instead.
    #[instrument(skip(self, reporter), level = "debug")]
    pub fn install(
        &self,
        request: &InstallRequest,
        reporter: &dyn Reporter,
    ) -> Result<InstallOutcome> {
        reporter.report(InstallEvent::Step("Checking dependencies".into()));
        self.preflight()?;

        let domain = self.resolve_domain(request)?;
        reporter.report(InstallEvent::Info(format!("server will be advertised at {}", domain.url())));

        if !probe::is_available(domain.port()) {
            reporter.report(InstallEvent::Warning(format!(
                "port {} is already in use",
                domain.port()
            )));
            if !reporter.confirm_port_conflict(domain.port()) {
                return Err(InstallError::PortInUse(domain.port()));
            }
        }

        checkpoint(reporter)?;
        self.ensure_toolkit(reporter)?;

        checkpoint(reporter)?;
        reporter.report(InstallEvent::Step("Writing configuration".into()));
        let config = InstallationConfig::load_or_generate(domain, self.install_dir())?;
        let materialized = Materializer::new(self.install_dir())
            .with_database_container(&self.settings.server.database_container)
            .materialize(&config)?;
        match materialized.secrets {
            SecretsOutcome::Created => reporter.report(InstallEvent::Info(format!(
                "generated new secrets in {}",
                materialized.env_path.display()
            ))),
            SecretsOutcome::Preserved => reporter.report(InstallEvent::Info(format!(
                "{} already exists, keeping existing secrets",
                materialized.env_path.display()
            ))),
        }
        if materialized.permissions == PermissionOutcome::Unsupported {
            reporter.report(InstallEvent::Info(
                "platform has no POSIX permissions, secrets file left with default access".into(),
            ));
        }

        checkpoint(reporter)?;
        reporter.report(InstallEvent::Step("Launching containers".into()));
        reporter.report(InstallEvent::Info(
            "pulling images, TeX Live is large so this may take a while".into(),
        ));
        self.orchestrator
            .compose_up(self.install_dir())
            .map_err(InstallError::Compose)?;

        reporter.report(InstallEvent::Step("Initializing database replica set".into()));
        let replica = match self
            .orchestrator
            .initialize_database_replica(&self.settings.server.database_container)
        {
            Ok(status) => {
                reporter.report(InstallEvent::Info(match status {
                    ReplicaStatus::Initialized => "replica set initialized".into(),
                    ReplicaStatus::AlreadyInitialized => "replica set already initialized".into(),
                }));
                Some(status)
            }
            Err(error) => {
                reporter.report(InstallEvent::Warning(format!(
                    "{error}, the server may still be usable"
                )));
                None
            }
        };

        Ok(InstallOutcome {
            url: config.domain.url(),
            install_dir: self.install_dir().to_path_buf(),
            secrets: materialized.secrets,
            replica,
        })
    }

    /// Start previously stopped server.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::NotInstalled`] if install directory is missing.
    /// - Return [`InstallError::Compose`] if compose fails.
    pub fn start(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.report(InstallEvent::Step("Starting server".into()));
        let dir = self.installed_dir()?;
        self.orchestrator
            .compose_start(dir)
            .map_err(InstallError::Compose)
    }

    /// Stop running server without removing its containers.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::NotInstalled`] if install directory is missing.
    /// - Return [`InstallError::Compose`] if compose fails.
    pub fn stop(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.report(InstallEvent::Step("Stopping server".into()));
        let dir = self.installed_dir()?;
        self.orchestrator
            .compose_stop(dir)
            .map_err(InstallError::Compose)
    }

    /// Stop server and remove its containers. Data volumes are kept.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::NotInstalled`] if install directory is missing.
    /// - Return [`InstallError::Compose`] if compose fails.
    pub fn down(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.report(InstallEvent::Step("Removing server containers".into()));
        let dir = self.installed_dir()?;
        self.orchestrator
            .compose_down(dir)
            .map_err(InstallError::Compose)
    }

    fn installed_dir(&self) -> Result<&Path> {
        let dir = self.install_dir();
        if !dir.is_dir() {
            return Err(InstallError::NotInstalled(dir.to_path_buf()));
        }

        Ok(dir)
    }

    fn ensure_toolkit(&self, reporter: &dyn Reporter) -> Result<()> {
        let dir = self.install_dir();
        let url = self.settings.toolkit.repo_url.as_str();

        if dir.exists() {
            reporter.report(InstallEvent::Info(format!(
                "{} already exists, using current version",
                dir.display()
            )));
        } else {
            reporter.report(InstallEvent::Step("Cloning Overleaf toolkit".into()));
            self.orchestrator
                .clone_repository(url, dir)
                .map_err(|source| InstallError::Clone {
                    source,
                    url: url.to_owned(),
                })?;
        }

        if let Some(expected) = &self.settings.toolkit.expected_commit {
            let found = self
                .orchestrator
                .head_commit(dir)
                .map_err(InstallError::Verify)?;
            if !found.eq_ignore_ascii_case(expected) {
                return Err(InstallError::Integrity {
                    expected: expected.clone(),
                    found,
                });
            }
            reporter.report(InstallEvent::Info(format!("toolkit verified at commit {found}")));
        }

        Ok(())
    }
}

fn checkpoint(reporter: &dyn Reporter) -> Result<()> {
    if reporter.is_cancelled() {
        return Err(InstallError::Cancelled);
    }

    Ok(())
}

fn docker_start_hint() -> &'static str {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        "open Docker Desktop and wait for it to start"
    } else {
        "run 'sudo systemctl start docker'"
    }
}

/// Installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Required tool is not installed.
    #[error("{0} is not installed")]
    MissingDependency(&'static str),

    /// Docker daemon does not respond.
    #[error("docker is not running, {hint}")]
    DockerNotRunning { hint: &'static str },

    /// Host input failed validation.
    #[error(transparent)]
    InvalidHost(#[from] HostError),

    /// Requested port is taken and caller chose not to continue.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// Toolkit cannot be cloned.
    #[error("failed to clone toolkit from {url}")]
    Clone {
        #[source]
        source: DriverError,
        url: String,
    },

    /// Toolkit commit cannot be determined.
    #[error("failed to determine toolkit commit")]
    Verify(#[source] DriverError),

    /// Toolkit is not at the pinned commit.
    #[error("toolkit is at commit {found}, expected {expected}")]
    Integrity { expected: String, found: String },

    /// Secrets file or topology manifest cannot be written.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// Compose lifecycle command fails.
    #[error("compose command failed")]
    Compose(#[source] DriverError),

    /// Nothing is installed at the install directory.
    #[error("no installation found at {:?}", .0.display())]
    NotInstalled(PathBuf),

    /// Caller cancelled the sequence.
    #[error("installation cancelled")]
    Cancelled,
}

/// Friendly result alias :3
pub type Result<T, E = InstallError> = std::result::Result<T, E>;
