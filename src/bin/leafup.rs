// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use leafup::{
    driver::open_browser,
    path::default_settings_path,
    probe,
    vpn::{self, InstallMethod},
    InstallError, InstallRequest, Installer, Job, JobResult, Mode, Settings, Worker,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use inquire::{validator::Validation, Confirm, CustomType, InquireError, Select, Text};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "leafup [<command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = Settings::load(default_settings_path()?)?;
        let worker = Worker::new(Installer::from_settings(settings));

        let job = match self.command.unwrap_or(Command::Install) {
            Command::Install => prompt_install(worker.installer())?,
            Command::Start => Job::Start,
            Command::Stop => Job::Stop,
            Command::Down => Job::Down,
        };

        run_job(&worker, job).await
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Interactively install Overleaf server (default).
    Install,

    /// Start previously stopped server.
    Start,

    /// Stop running server.
    Stop,

    /// Stop server and remove its containers.
    Down,
}

#[derive(Debug, Clone, Copy)]
enum ModeChoice {
    Local,
    Remote,
}

impl Display for ModeChoice {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Local => fmt.write_str("Local (only reachable from this machine)"),
            Self::Remote => fmt.write_str("Remote (reachable through Tailscale or another VPN)"),
        }
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run().await {
        if is_user_cancel(&error) {
            warn!("cancelled by user");
            exit(0);
        }

        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn is_user_cancel(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<InquireError>(),
        Some(InquireError::OperationCanceled | InquireError::OperationInterrupted)
    )
}

fn prompt_install(installer: &Installer) -> Result<Job> {
    // INVARIANT: Missing tooling stops us before any question or side effect.
    installer.preflight()?;

    let mode = Select::new(
        "How will the server be reached?",
        vec![ModeChoice::Local, ModeChoice::Remote],
    )
    .prompt()?;

    let port = CustomType::<u16>::new("Port to expose:")
        .with_default(installer.settings().server.default_port)
        .with_error_message("enter a number between 1 and 65535")
        .with_validator(|port: &u16| {
            if *port == 0 {
                Ok(Validation::Invalid("port 0 cannot be exposed".into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;

    let request = match mode {
        ModeChoice::Local => InstallRequest {
            mode: Mode::Local,
            port,
        },
        ModeChoice::Remote => prompt_remote(installer, port)?,
    };

    let domain = installer.resolve_domain(&request)?;
    if !probe::is_available(domain.port()) {
        let proceed = Confirm::new(&format!(
            "Port {} is already in use. Continue anyway?",
            domain.port()
        ))
        .with_default(false)
        .prompt()?;
        if !proceed {
            return Err(InstallError::PortInUse(domain.port()).into());
        }
    }

    Ok(Job::Install {
        request,
        continue_on_port_conflict: true,
    })
}

fn prompt_remote(installer: &Installer, port: u16) -> Result<InstallRequest> {
    if !vpn::is_installed() && InstallMethod::current() != InstallMethod::Unsupported {
        let install = Confirm::new("Tailscale is not installed. Install it now?")
            .with_default(false)
            .prompt()?;
        if install {
            match vpn::install_tailscale() {
                Ok(InstallMethod::Browser) => {
                    info!("finish the Tailscale setup in your browser, then continue here")
                }
                Ok(_) => {}
                Err(error) => warn!("{error}"),
            }
        }
    }

    let default_host = vpn::tailscale_ipv4().unwrap_or_else(|| "localhost".into());
    loop {
        let host = Text::new("Tailscale IP or hostname:")
            .with_default(&default_host)
            .with_help_message("a port may be appended as host:port")
            .prompt()?;
        let request = InstallRequest {
            mode: Mode::Remote { host },
            port,
        };

        match installer.resolve_domain(&request) {
            Ok(_) => return Ok(request),
            Err(error) => warn!("{error}, try again"),
        }
    }
}

async fn run_job(worker: &Worker, job: Job) -> Result<()> {
    let mut handle = worker.submit(job)?;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => event.log(),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                warn!("cancelled by user");
                exit(0);
            }
        }
    }

    match handle.join().await? {
        JobResult::Installed(outcome) => {
            info!("Overleaf is running at {}", outcome.url);
            info!("installed in {:?}", outcome.install_dir.display());
            info!("run 'leafup down' to stop the server");
            open_browser(&outcome.url);
        }
        JobResult::Completed => info!("done"),
        JobResult::Cancelled => warn!("cancelled by user"),
        JobResult::Failed(error) => return Err(error.into()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("PATH", "")])]
    fn install_checks_dependencies_before_prompting() {
        let installer = Installer::from_settings(Settings::default());
        let error = prompt_install(&installer).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<InstallError>(),
            Some(InstallError::MissingDependency("git"))
        ));
    }
}
