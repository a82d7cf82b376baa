// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Background job runner.
//!
//! Front ends that cannot block on the install sequence, such as a graphical
//! shell, submit jobs to a [`Worker`] instead. Each job runs on the blocking
//! thread pool of the tokio runtime, streams [`InstallEvent`]s back through
//! its [`JobHandle`], and can be cancelled between steps.
//!
//! Only one job runs at a time. Submitting while a job is still running is
//! rejected with [`WorkerError::Busy`] rather than queued.

use crate::{
    driver::{Orchestrator, SystemOrchestrator},
    installer::{InstallError, InstallEvent, InstallOutcome, InstallRequest, Installer, Reporter},
};

use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, instrument};

/// Unit of work for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Run full install sequence.
    Install {
        request: InstallRequest,

        /// Carry on if the requested port is already in use.
        continue_on_port_conflict: bool,
    },

    /// Start previously stopped server.
    Start,

    /// Stop running server.
    Stop,

    /// Stop server and remove its containers.
    Down,
}

/// Final result of a job.
#[derive(Debug)]
pub enum JobResult {
    /// Install sequence finished.
    Installed(InstallOutcome),

    /// Lifecycle job finished.
    Completed,

    /// Job was cancelled before finishing.
    Cancelled,

    /// Job failed.
    Failed(InstallError),
}

/// Single slot job runner.
#[derive(Debug)]
pub struct Worker<O = SystemOrchestrator>
where
    O: Orchestrator,
{
    installer: Arc<Installer<O>>,
    slot: Arc<Mutex<()>>,
}

impl<O> Worker<O>
where
    O: Orchestrator,
{
    /// Construct new worker around installer.
    pub fn new(installer: Installer<O>) -> Self {
        Self {
            installer: Arc::new(installer),
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn installer(&self) -> &Installer<O> {
        &self.installer
    }

    /// Check if a job is currently running.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Submit job to run in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - Return [`WorkerError::Busy`] if another job is still running.
    #[instrument(skip(self), level = "debug")]
    pub fn submit(&self, job: Job) -> Result<JobHandle> {
        let guard = Arc::clone(&self.slot)
            .try_lock_owned()
            .map_err(|_| WorkerError::Busy)?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (cancel, cancelled) = watch::channel(false);
        let installer = Arc::clone(&self.installer);

        let task = tokio::task::spawn_blocking(move || {
            // INVARIANT: Slot stays taken until the job finishes.
            let _guard = guard;
            let reporter = ChannelReporter {
                events: events_tx,
                cancelled,
                continue_on_port_conflict: matches!(
                    job,
                    Job::Install {
                        continue_on_port_conflict: true,
                        ..
                    }
                ),
            };
            run(&installer, job, &reporter)
        });

        Ok(JobHandle {
            events,
            cancel,
            task,
        })
    }
}

fn run<O>(installer: &Installer<O>, job: Job, reporter: &ChannelReporter) -> JobResult
where
    O: Orchestrator,
{
    let result = match job {
        Job::Install { request, .. } => installer
            .install(&request, reporter)
            .map(JobResult::Installed),
        Job::Start => installer.start(reporter).map(|_| JobResult::Completed),
        Job::Stop => installer.stop(reporter).map(|_| JobResult::Completed),
        Job::Down => installer.down(reporter).map(|_| JobResult::Completed),
    };

    match result {
        Ok(result) => result,
        Err(InstallError::Cancelled) => {
            debug!("job cancelled");
            JobResult::Cancelled
        }
        Err(error) => JobResult::Failed(error),
    }
}

struct ChannelReporter {
    events: mpsc::UnboundedSender<InstallEvent>,
    cancelled: watch::Receiver<bool>,
    continue_on_port_conflict: bool,
}

impl Reporter for ChannelReporter {
    fn report(&self, event: InstallEvent) {
        // Nobody listening is fine, the job keeps going.
        let _ = self.events.send(event);
    }

    fn confirm_port_conflict(&self, _: u16) -> bool {
        self.continue_on_port_conflict
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    events: mpsc::UnboundedReceiver<InstallEvent>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<JobResult>,
}

impl JobHandle {
    /// Wait for next progress event.
    ///
    /// Returns `None` once the job has finished and all events were received.
    pub async fn next_event(&mut self) -> Option<InstallEvent> {
        self.events.recv().await
    }

    /// Ask job to stop before its next step.
    ///
    /// The step currently running is never interrupted.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for job to finish.
    ///
    /// # Errors
    ///
    /// - Return [`WorkerError::Join`] if the job panicked.
    pub async fn join(self) -> Result<JobResult> {
        Ok(self.task.await?)
    }
}

/// Worker error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Another job is still running.
    #[error("another job is still running")]
    Busy,

    /// Job did not run to completion.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        installer::{
            tests::{free_port, installer_in, MockOrchestrator},
            Mode,
        },
        materialize::SecretsOutcome,
    };
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::channel;
    use tempfile::TempDir;

    fn install_job(port: u16) -> Job {
        Job::Install {
            request: InstallRequest {
                mode: Mode::Local,
                port,
            },
            continue_on_port_conflict: false,
        }
    }

    #[tokio::test]
    async fn install_job_streams_events() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let worker = Worker::new(installer_in(&dir, MockOrchestrator::default()));

        let mut handle = worker.submit(install_job(free_port()))?;
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }

        let result = handle.join().await?;
        assert!(matches!(
            result,
            JobResult::Installed(ref outcome) if outcome.secrets == SecretsOutcome::Created
        ));
        assert_eq!(
            events.first(),
            Some(&InstallEvent::Step("Checking dependencies".into()))
        );
        assert!(!worker.is_busy());

        Ok(())
    }

    #[tokio::test]
    async fn overlapping_submit_is_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (release, gate) = channel();
        let mock = MockOrchestrator {
            gate: std::sync::Mutex::new(Some(gate)),
            ..Default::default()
        };
        let worker = Worker::new(installer_in(&dir, mock));

        let handle = worker.submit(install_job(free_port()))?;
        assert!(worker.is_busy());
        assert!(matches!(worker.submit(Job::Stop), Err(WorkerError::Busy)));

        release.send(())?;
        handle.join().await?;

        let handle = worker.submit(Job::Stop)?;
        assert!(matches!(handle.join().await?, JobResult::Completed));

        Ok(())
    }

    #[tokio::test]
    async fn cancel_stops_between_steps() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (release, gate) = channel();
        let mock = MockOrchestrator {
            gate: std::sync::Mutex::new(Some(gate)),
            ..Default::default()
        };
        let worker = Worker::new(installer_in(&dir, mock));

        let handle = worker.submit(install_job(free_port()))?;
        handle.cancel();
        release.send(())?;

        assert!(matches!(handle.join().await?, JobResult::Cancelled));
        let calls = worker.installer().orchestrator().calls();
        assert!(!calls.contains(&"up".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn lifecycle_failure_is_reported() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let worker = Worker::new(installer_in(&dir, MockOrchestrator::default()));

        let handle = worker.submit(Job::Down)?;
        assert!(matches!(
            handle.join().await?,
            JobResult::Failed(InstallError::NotInstalled(_))
        ));

        Ok(())
    }
}
