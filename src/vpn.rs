// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tailscale mesh VPN helpers.
//!
//! Remote installs are meant to be reached over a Tailscale tailnet. These
//! helpers detect the client, look up the machine's tailnet address to offer
//! as a default host, and install the client when the user asks for it.

use crate::driver::{find_on_path, open_browser, syscall_capture, syscall_interactive};

use std::{env::temp_dir, ffi::OsStr, net::Ipv4Addr};
use tracing::{debug, info, instrument};

const LINUX_INSTALL_SCRIPT: &str = "https://tailscale.com/install.sh";
const WINDOWS_DOWNLOAD_PAGE: &str = "https://tailscale.com/download/windows";

/// How the Tailscale client gets installed on the current platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    /// Official install script, run directly.
    Script,

    /// Download page opened in a browser for the user to finish.
    Browser,

    /// Automatic installation is not offered.
    Unsupported,
}

impl InstallMethod {
    /// Install method for the current platform.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Script
        } else if cfg!(target_os = "windows") {
            Self::Browser
        } else {
            Self::Unsupported
        }
    }
}

/// Check if the Tailscale client is on the user's `PATH`.
pub fn is_installed() -> bool {
    find_on_path("tailscale").is_some()
}

/// Look up this machine's tailnet IPv4 address.
///
/// Only attempted on Linux. Returns `None` if the client is missing, not
/// logged in, or reports something that is not an IPv4 address.
#[instrument(level = "debug")]
pub fn tailscale_ipv4() -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }

    let (success, output) = syscall_capture("tailscale", ["ip", "-4"]).ok()?;
    if !success {
        debug!("tailscale ip failed: {output}");
        return None;
    }

    parse_ipv4_listing(&output)
}

fn parse_ipv4_listing(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.parse::<Ipv4Addr>().is_ok())
        .map(str::to_owned)
}

/// Install the Tailscale client.
///
/// On Linux the official install script is downloaded and executed. On
/// Windows the download page is opened instead. The user still has to log
/// into their tailnet afterwards.
///
/// # Errors
///
/// - Return [`VpnError::Unsupported`] on platforms without an install method.
/// - Return [`VpnError::Download`] if the install script cannot be fetched.
/// - Return [`VpnError::Install`] if the install script fails.
#[instrument(level = "debug")]
pub fn install_tailscale() -> Result<InstallMethod> {
    match InstallMethod::current() {
        InstallMethod::Script => {
            install_with_script()?;
            Ok(InstallMethod::Script)
        }
        InstallMethod::Browser => {
            info!("opening Tailscale download page");
            open_browser(WINDOWS_DOWNLOAD_PAGE);
            Ok(InstallMethod::Browser)
        }
        InstallMethod::Unsupported => Err(VpnError::Unsupported),
    }
}

fn install_with_script() -> Result<()> {
    let script = temp_dir().join("tailscale_install.sh");
    info!("download {LINUX_INSTALL_SCRIPT} to {:?}", script.display());

    let args = [
        OsStr::new("-fsSL"),
        OsStr::new("-o"),
        script.as_os_str(),
        OsStr::new(LINUX_INSTALL_SCRIPT),
    ];
    let (success, output) =
        syscall_capture("curl", args).map_err(|error| VpnError::Download(error.to_string()))?;
    if !success {
        return Err(VpnError::Download(output));
    }

    // INVARIANT: Script is only readable and executable by its owner.
    #[cfg(unix)]
    {
        use std::{fs::set_permissions, os::unix::fs::PermissionsExt};
        set_permissions(&script, std::fs::Permissions::from_mode(0o700))
            .map_err(VpnError::Script)?;
    }

    syscall_interactive(&script, std::iter::empty::<&str>(), temp_dir())
        .map_err(|error| VpnError::Install(error.to_string()))?;

    info!("Tailscale installed, run 'sudo tailscale up' to join your tailnet");
    Ok(())
}

/// VPN helper error types.
#[derive(Debug, thiserror::Error)]
pub enum VpnError {
    /// No automatic install method for this platform.
    #[error("automatic Tailscale installation is not supported on this platform")]
    Unsupported,

    /// Install script cannot be downloaded.
    #[error("failed to download Tailscale install script: {0}")]
    Download(String),

    /// Install script cannot be made executable.
    #[error("failed to mark Tailscale install script executable")]
    Script(#[source] std::io::Error),

    /// Install script failed.
    #[error("Tailscale install script failed: {0}")]
    Install(String),
}

/// Friendly result alias :3
type Result<T, E = VpnError> = std::result::Result<T, E>;
