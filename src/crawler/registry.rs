//! Registry of in-flight crawl runs
//!
//! Maps job identifiers to the cancellation handle of their live run. All
//! map mutation and signaling happens under one `RwLock`; listing takes the
//! shared side. Signaling never blocks: cancelling an already cancelled token
//! is a no-op, and the caller's terminal write runs either way.

use crate::SitelensError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Cancellation handle for one run of one job
#[derive(Debug, Clone)]
pub struct RunHandle {
    job_id: String,
    run_id: u64,
    token: CancellationToken,
}

impl RunHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Non-blocking poll of the stop signal
    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<String, ActiveRun>,
    shutting_down: bool,
}

/// Tracks one cancellation handle per in-flight job
#[derive(Debug, Default)]
pub struct JobRegistry {
    state: RwLock<RegistryState>,
    next_run_id: AtomicU64,
    released: Notify,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new run for `job_id`
    ///
    /// # Returns
    ///
    /// * `Ok(RunHandle)` - The job is now active
    /// * `Err(SitelensError::AlreadyRunning)` - A live run already owns the job
    /// * `Err(SitelensError::ShuttingDown)` - `shutdown` was called
    pub fn begin_run(&self, job_id: &str) -> Result<RunHandle, SitelensError> {
        let mut state = self.write();

        if state.shutting_down {
            return Err(SitelensError::ShuttingDown);
        }

        if state.active.contains_key(job_id) {
            return Err(SitelensError::AlreadyRunning(job_id.to_string()));
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        state.active.insert(
            job_id.to_string(),
            ActiveRun {
                run_id,
                token: token.clone(),
            },
        );

        tracing::debug!("Registered run {} for job {}", run_id, job_id);

        Ok(RunHandle {
            job_id: job_id.to_string(),
            run_id,
            token,
        })
    }

    /// Removes the entry for `handle`'s run
    ///
    /// Only the run that created an entry can remove it, so calling this twice,
    /// or with a handle whose entry is already gone, is a no-op.
    ///
    /// Returns true if an entry was removed.
    pub fn end_run(&self, handle: &RunHandle) -> bool {
        let removed = Self::remove_entry(&mut self.write(), handle);
        if removed {
            self.released.notify_waiters();
        }
        removed
    }

    /// Resolves a run's terminal write and unregisters it atomically
    ///
    /// `persist` receives whether a stop was requested and runs under the
    /// write lock, so a concurrent [`request_stop`](Self::request_stop) lands
    /// either entirely before it (and is seen here) or entirely after it.
    pub fn finish<R>(&self, handle: &RunHandle, persist: impl FnOnce(bool) -> R) -> R {
        let (result, removed) = {
            let mut state = self.write();
            let result = persist(handle.is_stop_requested());
            (result, Self::remove_entry(&mut state, handle))
        };

        if removed {
            self.released.notify_waiters();
        }
        result
    }

    /// Runs `write` under the write lock without unregistering the run
    ///
    /// Like [`finish`](Self::finish), `write` receives whether a stop was
    /// requested and cannot interleave with [`request_stop`](Self::request_stop).
    pub fn with_run<R>(&self, handle: &RunHandle, write: impl FnOnce(bool) -> R) -> R {
        let _state = self.write();
        write(handle.is_stop_requested())
    }

    fn remove_entry(state: &mut RegistryState, handle: &RunHandle) -> bool {
        match state.active.get(&handle.job_id) {
            Some(run) if run.run_id == handle.run_id => {
                state.active.remove(&handle.job_id);
                true
            }
            _ => false,
        }
    }

    /// Signals the live run of `job_id`, if any, then runs `force_stopped`
    ///
    /// `force_stopped` always runs (under the write lock), whether or not a
    /// live run was found, so the stop is visible immediately even though the
    /// run only notices at its next check-point.
    pub fn request_stop<R>(&self, job_id: &str, force_stopped: impl FnOnce(bool) -> R) -> R {
        let state = self.write();

        let signaled = match state.active.get(job_id) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        };

        force_stopped(signaled)
    }

    /// Returns true if `job_id` has a live run
    pub fn is_active(&self, job_id: &str) -> bool {
        self.read().active.contains_key(job_id)
    }

    /// Lists the jobs with a live run
    pub fn active_jobs(&self) -> Vec<String> {
        let mut jobs: Vec<String> = self.read().active.keys().cloned().collect();
        jobs.sort();
        jobs
    }

    /// Waits until `job_id` has no live run
    pub async fn wait_until_inactive(&self, job_id: &str) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register interest before checking so a release in between is not lost
            released.as_mut().enable();

            if !self.is_active(job_id) {
                return;
            }

            released.await;
        }
    }

    /// Refuses new runs and signals every live run to stop
    ///
    /// Returns the jobs that were signaled.
    pub fn shutdown(&self) -> Vec<String> {
        let mut state = self.write();
        state.shutting_down = true;

        let mut signaled = Vec::with_capacity(state.active.len());
        for (job_id, run) in &state.active {
            run.token.cancel();
            signaled.push(job_id.clone());
        }
        signaled.sort();
        signaled
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_begin_run_marks_active() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        assert_eq!(handle.job_id(), "job-1");
        assert!(registry.is_active("job-1"));
        assert!(!handle.is_stop_requested());
        assert_eq!(registry.active_jobs(), vec!["job-1".to_string()]);
    }

    #[test]
    fn test_duplicate_begin_is_rejected() {
        let registry = JobRegistry::new();
        let _handle = registry.begin_run("job-1").unwrap();

        assert!(matches!(
            registry.begin_run("job-1"),
            Err(SitelensError::AlreadyRunning(id)) if id == "job-1"
        ));
    }

    #[test]
    fn test_end_run_is_idempotent() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        assert!(registry.end_run(&handle));
        assert!(!registry.end_run(&handle));
        assert!(!registry.is_active("job-1"));
    }

    #[test]
    fn test_stale_handle_cannot_remove_newer_run() {
        let registry = JobRegistry::new();
        let first = registry.begin_run("job-1").unwrap();
        assert!(registry.end_run(&first));

        let second = registry.begin_run("job-1").unwrap();
        assert_ne!(first.run_id(), second.run_id());

        assert!(!registry.end_run(&first));
        assert!(registry.is_active("job-1"));
    }

    #[test]
    fn test_request_stop_signals_live_run() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        let signaled = registry.request_stop("job-1", |signaled| signaled);

        assert!(signaled);
        assert!(handle.is_stop_requested());
        // The run still owns its entry until it unwinds
        assert!(registry.is_active("job-1"));
    }

    #[test]
    fn test_request_stop_without_run_still_forces() {
        let registry = JobRegistry::new();
        let mut forced = 0;

        let signaled = registry.request_stop("unknown", |signaled| {
            forced += 1;
            signaled
        });

        assert!(!signaled);
        assert_eq!(forced, 1);
    }

    #[test]
    fn test_double_stop_never_blocks() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();
        let mut forced = 0;

        registry.request_stop("job-1", |_| forced += 1);
        registry.request_stop("job-1", |_| forced += 1);

        assert_eq!(forced, 2);
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn test_finish_reports_stop_and_unregisters() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        assert!(!registry.finish(&handle, |stopped| stopped));
        assert!(!registry.is_active("job-1"));

        let handle = registry.begin_run("job-1").unwrap();
        registry.request_stop("job-1", |_| ());
        assert!(registry.finish(&handle, |stopped| stopped));
        assert!(!registry.is_active("job-1"));
    }

    #[test]
    fn test_with_run_sees_prior_stop_and_keeps_entry() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        assert!(!registry.with_run(&handle, |stopped| stopped));

        registry.request_stop("job-1", |_| ());
        assert!(registry.with_run(&handle, |stopped| stopped));
        assert!(registry.is_active("job-1"));
    }

    #[test]
    fn test_shutdown_refuses_new_runs() {
        let registry = JobRegistry::new();
        let handle = registry.begin_run("job-1").unwrap();

        assert_eq!(registry.shutdown(), vec!["job-1".to_string()]);
        assert!(handle.is_stop_requested());
        assert!(registry.is_shutting_down());
        assert!(matches!(
            registry.begin_run("job-2"),
            Err(SitelensError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_wait_until_inactive_returns_immediately_for_idle_job() {
        let registry = JobRegistry::new();
        tokio::time::timeout(Duration::from_secs(1), registry.wait_until_inactive("idle"))
            .await
            .expect("idle job should not block");
    }

    #[tokio::test]
    async fn test_wait_until_inactive_wakes_on_finish() {
        let registry = Arc::new(JobRegistry::new());
        let handle = registry.begin_run("job-1").unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_until_inactive("job-1").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.finish(&handle, |_| ());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_begin_admits_exactly_one() {
        let registry = Arc::new(JobRegistry::new());
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.begin_run("contended").is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
