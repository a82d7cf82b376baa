// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the installer settings file. Every field has a
//! sensible default, so a missing settings file, or a settings file that only
//! sets a handful of keys, is perfectly valid.

use crate::{driver::ReadinessPolicy, host::DEFAULT_PORT, topology::DATABASE_SERVICE};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, instrument};

/// Installer settings layout.
///
/// # General Layout
///
/// Settings are split into three sections: the toolkit section describes
/// where the Overleaf toolkit comes from and where it lives locally, the
/// server section describes how the server is exposed, and the readiness
/// section controls how long the installer waits for the database before
/// initializing its replica set.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Toolkit source and location.
    pub toolkit: ToolkitSettings,

    /// Server exposure.
    pub server: ServerSettings,

    /// Database readiness polling.
    pub readiness: ReadinessSettings,
}

impl Settings {
    /// Load settings from target path.
    ///
    /// Falls back to default settings if nothing exists at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if settings file exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if settings file is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => {
                debug!("load settings from {:?}", path.as_ref().display());
                data.parse()
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(
                    "no settings at {:?}, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            Err(error) => Err(ConfigError::Read {
                source: error,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on install directory field.
        settings.toolkit.install_dir = PathBuf::from(
            shellexpand::full(settings.toolkit.install_dir.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Overleaf toolkit settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolkitSettings {
    /// Remote URL to clone the toolkit from.
    pub repo_url: String,

    /// Local directory to clone the toolkit into.
    pub install_dir: PathBuf,

    /// Commit that the toolkit's HEAD must point at after cloning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_commit: Option<String>,
}

impl Default for ToolkitSettings {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/overleaf/toolkit.git".into(),
            install_dir: PathBuf::from("overleaf-toolkit"),
            expected_commit: None,
        }
    }
}

/// Server exposure settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port offered when the user does not pick one.
    pub default_port: u16,

    /// Name of the database container to initialize a replica set in.
    pub database_container: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            database_container: DATABASE_SERVICE.into(),
        }
    }
}

/// Database readiness polling settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Maximum number of readiness checks.
    pub attempts: u32,

    /// Delay before the first readiness check in milliseconds.
    pub initial_delay_ms: u64,

    /// Longest delay between two readiness checks in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl From<&ReadinessSettings> for ReadinessPolicy {
    fn from(settings: &ReadinessSettings) -> Self {
        ReadinessPolicy {
            attempts: settings.attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
