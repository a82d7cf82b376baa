// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installer for self-hosted Overleaf servers.
//!
//! Leafup provisions an Overleaf server through Docker Compose. It clones the
//! official Overleaf toolkit, writes a secrets file and a service topology
//! manifest, brings the container stack up, and initializes the database
//! replica set. The server can either be reachable only from the local
//! machine, or over a mesh VPN such as Tailscale.
//!
//! # Secrets Are Never Regenerated
//!
//! Session and token signing secrets are generated exactly once, on the first
//! successful run. Every later run reuses the persisted secrets file as-is,
//! because rotating them would invalidate every existing login session. The
//! topology manifest on the other hand is always rewritten, so re-running the
//! installer with a new port or host takes effect.
//!
//! # Layout
//!
//! - [`host`]: validate host input.
//! - [`probe`]: check if a port is free.
//! - [`materialize`]: write secrets file and topology manifest.
//! - [`driver`]: reach external tooling through the [`Orchestrator`] trait.
//! - [`installer`]: run the install sequence.
//! - [`worker`]: run installer jobs in the background.

pub mod config;
pub mod driver;
pub mod env_file;
pub mod host;
pub mod installer;
pub mod materialize;
pub mod path;
pub mod probe;
pub mod secret;
pub mod topology;
pub mod vpn;
pub mod worker;

pub use config::Settings;
pub use driver::{Orchestrator, SystemOrchestrator};
pub use host::{HostError, HostKind, HostSpec, DEFAULT_PORT};
pub use installer::{
    InstallError, InstallEvent, InstallOutcome, InstallRequest, Installer, Mode, Reporter,
};
pub use materialize::{InstallationConfig, Materializer};
pub use worker::{Job, JobHandle, JobResult, Worker, WorkerError};
