// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use leafup::{
    driver::{self, Orchestrator, ReplicaStatus, SystemOrchestrator},
    Installer, Settings,
};
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Local stand-in for the Overleaf toolkit repository.
pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn url(&self) -> String {
        self.repo
            .workdir()
            .unwrap_or_else(|| self.repo.path())
            .to_string_lossy()
            .into_owned()
    }

    /// Commit file, returning new commit id.
    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<String> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().to_string_lossy().as_bytes().to_vec(),
        };

        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("chore: add {:?}", filename.as_ref()),
            &tree,
            &parents,
        )?;

        Ok(oid.to_string())
    }
}

/// Orchestrator with real git handling, but no container runtime.
#[derive(Debug, Default)]
pub(crate) struct ContainerlessOrchestrator {
    git: SystemOrchestrator,
    compose_calls: Mutex<Vec<&'static str>>,
}

impl ContainerlessOrchestrator {
    pub(crate) fn compose_calls(&self) -> Vec<&'static str> {
        self.compose_calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> driver::Result<()> {
        self.compose_calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Orchestrator for ContainerlessOrchestrator {
    fn command_exists(&self, _: &str) -> bool {
        true
    }

    fn compose_available(&self) -> bool {
        true
    }

    fn docker_is_running(&self) -> bool {
        true
    }

    fn clone_repository(&self, url: &str, dest: &Path) -> driver::Result<()> {
        self.git.clone_repository(url, dest)
    }

    fn head_commit(&self, path: &Path) -> driver::Result<String> {
        self.git.head_commit(path)
    }

    fn compose_up(&self, _: &Path) -> driver::Result<()> {
        self.record("up")
    }

    fn compose_down(&self, _: &Path) -> driver::Result<()> {
        self.record("down")
    }

    fn compose_stop(&self, _: &Path) -> driver::Result<()> {
        self.record("stop")
    }

    fn compose_start(&self, _: &Path) -> driver::Result<()> {
        self.record("start")
    }

    fn initialize_database_replica(&self, _: &str) -> driver::Result<ReplicaStatus> {
        Ok(ReplicaStatus::AlreadyInitialized)
    }
}

pub(crate) fn installer_for(
    toolkit: &RepoFixture,
    install_dir: PathBuf,
    expected_commit: Option<String>,
) -> Installer<ContainerlessOrchestrator> {
    let mut settings = Settings::default();
    settings.toolkit.repo_url = toolkit.url();
    settings.toolkit.install_dir = install_dir;
    settings.toolkit.expected_commit = expected_commit;
    Installer::new(settings, ContainerlessOrchestrator::default())
}

pub(crate) fn free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap()
}
