//! Completion barrier for concurrently running configurers
//!
//! Each configurer runs in its own task. Waiting on the barrier joins all
//! of them and splits the outcomes into patches and failures; one failing
//! configurer never stops its peers. Provisioning job watchers outlive the
//! configurer that started them and are counted separately by a
//! [`JobTracker`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use super::patch::WorkloadPatch;
use crate::Error;

/// A configurer that did not finish
#[derive(Debug)]
pub struct ConfigurerFailure {
    /// Supporting service kind of the configurer
    pub kind: String,
    /// What went wrong
    pub error: Error,
}

impl fmt::Display for ConfigurerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Every configurer failure of one operation
#[derive(Debug, Default)]
pub struct ConfigureFailures(pub Vec<ConfigurerFailure>);

impl std::error::Error for ConfigureFailures {}

impl fmt::Display for ConfigureFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configurer(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

/// Joined outcome of every configurer
#[derive(Debug, Default)]
pub struct BarrierReport {
    /// Patches of configurers that succeeded, in start order
    pub patches: Vec<(String, WorkloadPatch)>,
    /// Configurers that failed, in start order
    pub failures: ConfigureFailures,
}

/// Counts configurers in and waits for all of them to finish
#[derive(Default)]
pub struct CompletionBarrier {
    tasks: Vec<(String, JoinHandle<crate::Result<WorkloadPatch>>)>,
    failures: Vec<ConfigurerFailure>,
}

impl CompletionBarrier {
    /// An empty barrier
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a configurer for `kind`
    pub fn spawn<F>(&mut self, kind: impl Into<String>, configurer: F)
    where
        F: Future<Output = crate::Result<WorkloadPatch>> + Send + 'static,
    {
        self.tasks.push((kind.into(), tokio::spawn(configurer)));
    }

    /// Record a configurer that failed before it could start
    pub fn fail(&mut self, kind: impl Into<String>, error: Error) {
        self.failures.push(ConfigurerFailure {
            kind: kind.into(),
            error,
        });
    }

    /// Number of configurers started or failed so far
    pub fn len(&self) -> usize {
        self.tasks.len() + self.failures.len()
    }

    /// Whether nothing was started
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every started configurer
    pub async fn wait(self) -> BarrierReport {
        let (kinds, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut report = BarrierReport {
            patches: Vec::new(),
            failures: ConfigureFailures(self.failures),
        };
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(Ok(patch)) => report.patches.push((kind, patch)),
                Ok(Err(error)) => report.failures.0.push(ConfigurerFailure { kind, error }),
                Err(join) => report.failures.0.push(ConfigurerFailure {
                    kind,
                    error: Error::internal(format!("configurer task did not finish: {join}")),
                }),
            }
        }
        report
    }
}

/// Job watchers started by the configurers of one operation
#[derive(Clone, Default)]
pub struct JobTracker {
    watches: Arc<Mutex<Vec<(String, JoinHandle<crate::Result<()>>)>>>,
}

impl JobTracker {
    /// An empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count in the watcher of a job started by the `kind` configurer
    pub fn track(&self, kind: impl Into<String>, watch: JoinHandle<crate::Result<()>>) {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind.into(), watch));
    }

    /// Number of watchers not yet waited for
    pub fn len(&self) -> usize {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no watcher is outstanding
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked watcher and collect the jobs that failed
    pub async fn wait(&self) -> ConfigureFailures {
        let watches = std::mem::take(&mut *self.watches.lock().unwrap_or_else(PoisonError::into_inner));
        let (kinds, handles): (Vec<_>, Vec<_>) = watches.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut failures = ConfigureFailures::default();
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => failures.0.push(ConfigurerFailure { kind, error }),
                Err(join) => failures.0.push(ConfigurerFailure {
                    kind,
                    error: Error::internal(format!("job watch did not finish: {join}")),
                }),
            }
        }
        failures
    }
}
