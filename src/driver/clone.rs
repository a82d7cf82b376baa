// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Toolkit cloning through libgit2.
//!
//! The Overleaf toolkit is cloned as a regular repository with a working
//! tree, since the toolkit's own scripts and config templates need to exist
//! on disk. Clone progress is shown through a progress bar, and any
//! credential prompts suspend that bar while the user types.

use super::Result;

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{path::Path, time};
use tracing::{info, instrument};

/// Clone remote repository at target URL into target path.
///
/// # Errors
///
/// - Return [`DriverError::Git2`] if libgit2 operations fail.
/// - Return [`DriverError::IndicatifStyleTemplate`] if progress bar style
///   cannot be built.
#[instrument(skip(url, path), level = "debug")]
pub(crate) fn clone_with_progress(url: &str, path: &Path) -> Result<()> {
    info!("clone {url} into {:?}", path.display());

    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_string());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let prompter = IndicatifPrompter::new(bar.clone());
    let authenticator = GitAuthenticator::default().set_prompter(prompter);
    let config = Config::open_default()?;

    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(|progress| {
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            bar.set_length(progress.total_objects() as u64);
            bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);
    let result = RepoBuilder::new().fetch_options(fo).clone(url, path);
    bar.finish_and_clear();
    result?;

    Ok(())
}

/// Determine commit ID that HEAD of repository at target path points at.
///
/// # Errors
///
/// - Return [`DriverError::Git2`] if repository cannot be opened, or HEAD
///   does not point at a commit.
pub(crate) fn head_commit(path: &Path) -> Result<String> {
    let repository = Repository::open(path)?;
    let commit = repository.head()?.peel_to_commit()?;

    Ok(commit.id().to_string())
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}
