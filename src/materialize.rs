// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment materialization.
//!
//! An installation directory carries two generated artifacts:
//!
//! - The __secrets file__ (`overleaf.env`), holding session and JWT signing
//!   secrets plus fixed connection parameters. It is written exactly once.
//!   Rewriting it would rotate the secrets of a live deployment, so an
//!   existing secrets file is always authoritative.
//! - The __topology manifest__ (`docker-compose.yml`), which is rewritten on
//!   every run so it always reflects the latest requested host and port.
//!
//! On unix the secrets file is created with owner read/write permissions
//! only. Other platforms skip that step with an informational notice.

use crate::{
    env_file::EnvFile,
    host::HostSpec,
    secret::generate_token,
    topology::{ServiceTopology, DATABASE_SERVICE, REPLICA_SET},
};

use std::{
    fs::{read_to_string, write, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// File name of the secrets file inside an installation directory.
pub const ENV_FILE_NAME: &str = "overleaf.env";

/// File name of the topology manifest inside an installation directory.
pub const MANIFEST_FILE_NAME: &str = "docker-compose.yml";

const SITE_URL_KEY: &str = "OVERLEAF_SITE_URL";
const SESSION_SECRET_KEY: &str = "OVERLEAF_SESSION_SECRET";
const JWT_SECRET_KEY: &str = "OVERLEAF_JWT_SECRET";

/// Signing secrets of an installation.
#[derive(Clone, PartialEq, Eq)]
pub enum Secrets {
    /// Freshly generated secrets, not yet written anywhere.
    Generated {
        session_secret: String,
        jwt_secret: String,
    },

    /// Secrets already live in an existing secrets file.
    ///
    /// The file is authoritative whatever keys it uses, so its contents are
    /// never extracted.
    Persisted,
}

impl Secrets {
    /// Generate new session and JWT signing secrets.
    pub fn generate() -> Self {
        Self::Generated {
            session_secret: generate_token(),
            jwt_secret: generate_token(),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated { .. } => fmt
                .debug_struct("Generated")
                .field("session_secret", &"<redacted>")
                .field("jwt_secret", &"<redacted>")
                .finish(),
            Self::Persisted => fmt.write_str("Persisted"),
        }
    }
}

/// Everything needed to materialize an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationConfig {
    /// Externally advertised host.
    pub domain: HostSpec,

    /// Session and JWT signing secrets.
    pub secrets: Secrets,
}

impl InstallationConfig {
    /// Construct configuration with freshly generated secrets.
    pub fn generate(domain: HostSpec) -> Self {
        Self {
            domain,
            secrets: Secrets::generate(),
        }
    }

    /// Reuse persisted secrets of installation, or generate new ones.
    ///
    /// If a secrets file already exists in the installation directory, it is
    /// taken as-is and no token is generated. Its layout is not inspected
    /// beyond warning about a stale site URL.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError::ReadEnv`] if existence of secrets file
    ///   cannot be determined.
    #[instrument(skip(domain, install_path), level = "debug")]
    pub fn load_or_generate(domain: HostSpec, install_path: impl AsRef<Path>) -> Result<Self> {
        let env_path = install_path.as_ref().join(ENV_FILE_NAME);
        let data = match read_to_string(&env_path) {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no secrets at {:?}, generating", env_path.display());
                return Ok(Self::generate(domain));
            }
            Err(error) if error.kind() == ErrorKind::InvalidData => {
                debug!("secrets file {:?} is not UTF-8, keeping it as-is", env_path.display());
                String::new()
            }
            Err(error) => {
                return Err(MaterializeError::ReadEnv {
                    source: error,
                    path: env_path,
                })
            }
        };

        match data.parse::<EnvFile>() {
            Ok(env) => match env.get(SITE_URL_KEY) {
                Some(url) if url != domain.url() => warn!(
                    "existing secrets advertise {url}, keeping them while topology uses {}",
                    domain.url()
                ),
                Some(_) => {}
                None => debug!("secrets file {:?} has no site URL", env_path.display()),
            },
            Err(error) => debug!("secrets file {:?} kept as-is: {error}", env_path.display()),
        }

        Ok(Self {
            domain,
            secrets: Secrets::Persisted,
        })
    }

    /// Render secrets file contents.
    ///
    /// Returns `None` for persisted secrets, which are never rewritten.
    pub fn to_env_file(&self) -> Option<EnvFile> {
        let Secrets::Generated {
            session_secret,
            jwt_secret,
        } = &self.secrets
        else {
            return None;
        };

        let mut env = EnvFile::new().with_header("Generated by leafup, do not share.");
        env.set("OVERLEAF_APP_NAME", "Overleaf Community Edition");
        env.set(SITE_URL_KEY, self.domain.url());
        env.set(SESSION_SECRET_KEY, session_secret.as_str());
        env.set(JWT_SECRET_KEY, jwt_secret.as_str());
        env.set(
            "OVERLEAF_MONGO_URL",
            format!("mongodb://{DATABASE_SERVICE}/sharelatex?replicaSet={REPLICA_SET}"),
        );
        env.set("OVERLEAF_REDIS_HOST", "redis");
        env.set("OVERLEAF_REDIS_PORT", "6379");
        Some(env)
    }
}

/// What happened to the secrets file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsOutcome {
    /// Secrets file was created by this run.
    Created,

    /// Secrets file already existed and was left untouched.
    Preserved,
}

/// Whether restrictive permissions were applied to a new secrets file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Owner read/write only (0600).
    Restricted,

    /// Platform lacks POSIX permission bits.
    Unsupported,

    /// Secrets file was not created by this run.
    Untouched,
}

/// Report of a materialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub secrets: SecretsOutcome,
    pub permissions: PermissionOutcome,
    pub env_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Writer of installation artifacts.
#[derive(Debug, Clone)]
pub struct Materializer {
    install_path: PathBuf,
    database_container: String,
}

impl Materializer {
    /// Construct new materializer for target installation directory.
    pub fn new(install_path: impl Into<PathBuf>) -> Self {
        Self {
            install_path: install_path.into(),
            database_container: DATABASE_SERVICE.into(),
        }
    }

    /// Name database container in topology manifest.
    pub fn with_database_container(mut self, name: impl Into<String>) -> Self {
        self.database_container = name.into();
        self
    }

    pub fn env_path(&self) -> PathBuf {
        self.install_path.join(ENV_FILE_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.install_path.join(MANIFEST_FILE_NAME)
    }

    /// Materialize secrets file and topology manifest.
    ///
    /// Secrets file is only written if missing. Topology manifest is always
    /// overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError::WriteEnv`] if secrets file cannot be
    ///   created.
    /// - Return [`MaterializeError::RenderManifest`] if topology cannot be
    ///   serialized.
    /// - Return [`MaterializeError::WriteManifest`] if topology manifest
    ///   cannot be written.
    #[instrument(skip(self, config), level = "debug")]
    pub fn materialize(&self, config: &InstallationConfig) -> Result<Materialized> {
        let (secrets, permissions) = self.write_secrets(config)?;
        let manifest_path = self.write_manifest(&config.domain)?;

        Ok(Materialized {
            secrets,
            permissions,
            env_path: self.env_path(),
            manifest_path,
        })
    }

    fn write_secrets(
        &self,
        config: &InstallationConfig,
    ) -> Result<(SecretsOutcome, PermissionOutcome)> {
        let env_path = self.env_path();
        let map_err = |source: std::io::Error| MaterializeError::WriteEnv {
            source,
            path: env_path.clone(),
        };

        let Some(env) = config.to_env_file() else {
            if !env_path.try_exists().map_err(map_err)? {
                return Err(MaterializeError::SecretsVanished(env_path));
            }
            info!(
                "secrets file {:?} already exists, not overwriting it",
                env_path.display()
            );
            return Ok((SecretsOutcome::Preserved, PermissionOutcome::Untouched));
        };

        // INVARIANT: Secrets only ever appear at their final path fully
        // written, so a failed write never leaves a truncated secrets file.
        let mut staged = NamedTempFile::new_in(&self.install_path).map_err(map_err)?;
        let permissions = restrict_permissions(staged.as_file()).map_err(map_err)?;
        staged
            .write_all(env.to_string().as_bytes())
            .map_err(map_err)?;
        staged.as_file().sync_all().map_err(map_err)?;

        // INVARIANT: Never clobber existing secrets, even if another process
        // created them between our check and our write.
        match staged.persist_noclobber(&env_path) {
            Ok(_) => {}
            Err(error) if error.error.kind() == ErrorKind::AlreadyExists => {
                info!(
                    "secrets file {:?} already exists, not overwriting it",
                    env_path.display()
                );
                return Ok((SecretsOutcome::Preserved, PermissionOutcome::Untouched));
            }
            Err(error) => return Err(map_err(error.error)),
        }

        info!("created secrets file for {}", config.domain);
        Ok((SecretsOutcome::Created, permissions))
    }

    fn write_manifest(&self, domain: &HostSpec) -> Result<PathBuf> {
        let manifest_path = self.manifest_path();
        let yaml = ServiceTopology::new(domain, &self.database_container).to_yaml()?;
        write(&manifest_path, yaml).map_err(|error| MaterializeError::WriteManifest {
            source: error,
            path: manifest_path.clone(),
        })?;

        debug!("wrote topology manifest {:?}", manifest_path.display());
        Ok(manifest_path)
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<PermissionOutcome> {
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};

    // INVARIANT: Creation mode is subject to umask, so set bits explicitly.
    file.set_permissions(Permissions::from_mode(0o600))?;
    debug!("applied 0600 permissions to secrets file");
    Ok(PermissionOutcome::Restricted)
}

#[cfg(not(unix))]
fn restrict_permissions(_: &File) -> std::io::Result<PermissionOutcome> {
    info!("platform has no POSIX permission bits, skipping secrets file restriction");
    Ok(PermissionOutcome::Unsupported)
}

/// Materialization error types.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Existing secrets file cannot be checked.
    #[error("failed to read secrets file at {:?}", path.display())]
    ReadEnv {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Secrets file disappeared after its secrets were taken as persisted.
    #[error("secrets file at {:?} vanished during installation", .0.display())]
    SecretsVanished(PathBuf),

    /// Secrets file cannot be created.
    #[error("failed to write secrets file at {:?}", path.display())]
    WriteEnv {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Topology cannot be serialized.
    #[error(transparent)]
    RenderManifest(#[from] serde_yaml::Error),

    /// Topology manifest cannot be written.
    #[error("failed to write topology manifest at {:?}", path.display())]
    WriteManifest {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MaterializeError> = std::result::Result<T, E>;
