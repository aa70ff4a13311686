use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use duejobs_core::SchedulerSettings;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{dispatch, encode_args},
    error::{Result, SchedulerError},
    registry::{JobHandler, JobRegistry},
    store::JobStore,
    types::{ClaimOutcome, JobId, JobRecord, SweepReport, TableName},
};

/// Receives sweep-time failures together with the job they belong to.
pub type ErrorObserver = Arc<dyn Fn(&SchedulerError, &JobRecord) + Send + Sync>;

/// Default observer: the failure is logged, never dropped.
fn log_job_error(err: &SchedulerError, job: &JobRecord) {
    error!(job_id = %job.job_id, job_type = %job.job_type, "job failed: {err}");
}

/// Wiring for a [`Scheduler`]. The store and the table are required.
#[derive(Default)]
pub struct SchedulerBuilder {
    store: Option<Arc<dyn JobStore>>,
    table: Option<String>,
    on_error: Option<ErrorObserver>,
}

impl SchedulerBuilder {
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&SchedulerError, &JobRecord) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let store = self.store.ok_or_else(|| {
            SchedulerError::Configuration("scheduler requires a job store".to_string())
        })?;
        let table = TableName::parse(self.table.as_deref().unwrap_or_default())?;
        let on_error = self
            .on_error
            .unwrap_or_else(|| Arc::new(log_job_error) as ErrorObserver);

        Ok(Scheduler {
            shared: Arc::new(Shared {
                store,
                table,
                registry: JobRegistry::new(),
                on_error,
            }),
            running: Mutex::new(None),
        })
    }
}

/// State the polling loop and per-job tasks share with the public handle.
struct Shared {
    store: Arc<dyn JobStore>,
    table: TableName,
    registry: JobRegistry,
    on_error: ErrorObserver,
}

enum JobOutcome {
    Dispatched,
    Failed,
    Skipped,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Poll-based job scheduler over a [`JobStore`] table.
///
/// Each instance owns its registry, so several schedulers can coexist in one
/// process. Jobs are claimed (marked run) before their handler is invoked: a
/// failing handler still leaves the job claimed and it is not retried.
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// Wire a scheduler from loaded settings, logging failures with the default observer.
    pub fn from_settings(settings: &SchedulerSettings, store: Arc<dyn JobStore>) -> Result<Self> {
        Self::builder().store(store).table(&settings.table).build()
    }

    pub fn table(&self) -> &TableName {
        &self.shared.table
    }

    /// Bind a handler to the job type `name`.
    pub fn register<H>(&self, name: impl Into<String>, handler: H) -> Result<()>
    where
        H: JobHandler + 'static,
    {
        self.shared.registry.register(name, Arc::new(handler))
    }

    /// Registered job type names, sorted.
    pub fn job_types(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// Forget every registered handler.
    pub fn clear(&self) {
        self.shared.registry.clear();
    }

    /// Persist a job of type `job_type` that becomes due at `due_at`.
    ///
    /// `args` is stored as an ordered sequence (see [`encode_args`]). Fails
    /// with `UnregisteredJob`, without touching the store, if no handler is
    /// registered under `job_type`.
    pub async fn schedule<A>(
        &self,
        due_at: DateTime<Utc>,
        job_type: &str,
        args: &A,
    ) -> Result<JobId>
    where
        A: Serialize + ?Sized,
    {
        if !self.shared.registry.contains(job_type) {
            warn!(job_type, "refusing to schedule unregistered job");
            return Err(SchedulerError::UnregisteredJob {
                job_type: job_type.to_string(),
            });
        }
        let encoded = encode_args(args)?;
        debug!(job_type, %due_at, args = %encoded, "scheduling job");

        let id = self
            .shared
            .store
            .insert(&self.shared.table, due_at, job_type, &encoded)
            .await?;
        info!(job_id = %id, job_type, %due_at, "job scheduled");
        Ok(id)
    }

    /// Delete a job whether or not it already ran. Unknown ids are a no-op.
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        self.shared.store.delete(&self.shared.table, job_id).await?;
        info!(%job_id, "job cancelled");
        Ok(())
    }

    /// All jobs that have not been claimed yet, in store order.
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        debug!(table = %self.shared.table, "listing active jobs");
        Ok(self.shared.store.select_active(&self.shared.table).await?)
    }

    pub async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.shared.store.select_by_id(&self.shared.table, job_id).await?)
    }

    /// Run one check-and-dispatch cycle and wait for every job in it.
    pub async fn sweep(&self) -> SweepReport {
        Arc::clone(&self.shared).sweep().await
    }

    /// Sweep once now, then every `interval_ms` until [`Scheduler::stop`].
    ///
    /// Restarts the loop if it is already running. Returns after the initial
    /// sweep has finished. A zero interval is treated as 1 ms.
    pub async fn start(&self, interval_ms: i64) -> Result<()> {
        if interval_ms < 0 {
            return Err(SchedulerError::InvalidInterval(interval_ms));
        }
        self.stop();

        let period = Duration::from_millis(interval_ms.max(1) as u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.shared), period, shutdown_rx));
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(RunningLoop {
            shutdown: shutdown_tx,
            task,
        });
        let handlers = self.shared.registry.len();
        info!(table = %self.shared.table, interval_ms, handlers, "scheduler started");
        if self.shared.registry.is_empty() {
            warn!(table = %self.shared.table, "no job handlers registered, due jobs will stay pending");
        }

        // The loop's first tick is one period out, so sweep immediately.
        self.sweep().await;
        Ok(())
    }

    /// Stop future ticks. In-flight jobs keep running. No-op when stopped.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            info!(table = %self.shared.table, "scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            // A stop that races a tick wins.
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                // Time-driven: a sweep that outlives the period overlaps the
                // next one, and the conditional claim keeps them apart.
                tokio::spawn(Arc::clone(&shared).sweep());
            }
        }
    }
    debug!(table = %shared.table, "scheduler loop exited");
}

impl Shared {
    async fn sweep(self: Arc<Self>) -> SweepReport {
        let now = Utc::now();
        let due = match self.store.select_due(&self.table, now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                // No job context to hand the observer.
                error!(table = %self.table, "due-job query failed: {e}");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            return report;
        }

        let mut tasks = JoinSet::new();
        for job in due {
            let shared = Arc::clone(&self);
            tasks.spawn(async move { shared.process(job).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(JobOutcome::Dispatched) => report.dispatched += 1,
                Ok(JobOutcome::Failed) => report.failed += 1,
                Ok(JobOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(table = %self.table, "job task did not complete: {e}");
                    report.failed += 1;
                }
            }
        }

        debug!(
            table = %self.table,
            due = report.due,
            dispatched = report.dispatched,
            failed = report.failed,
            skipped = report.skipped,
            "sweep finished"
        );
        report
    }

    /// Resolve, claim, dispatch. Unresolvable jobs are left unclaimed.
    async fn process(&self, mut job: JobRecord) -> JobOutcome {
        let Some(handler) = self.registry.resolve(&job.job_type) else {
            let err = SchedulerError::UnregisteredJobType {
                job_type: job.job_type.clone(),
            };
            (self.on_error)(&err, &job);
            return JobOutcome::Failed;
        };

        let run_at = Utc::now();
        match self.store.claim(&self.table, job.job_id, run_at).await {
            Ok(ClaimOutcome::Claimed) => job.run_at = Some(run_at),
            Ok(ClaimOutcome::AlreadyClaimed) => {
                debug!(job_id = %job.job_id, "job already claimed, skipping");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                (self.on_error)(&SchedulerError::Store(e), &job);
                return JobOutcome::Failed;
            }
        }

        match dispatch(handler, &job).await {
            Ok(()) => JobOutcome::Dispatched,
            Err(e) => {
                (self.on_error)(&e, &job);
                JobOutcome::Failed
            }
        }
    }
}
