use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use taskvisor::{
    BackoffPolicy, SupervisorConfig, JitterPolicy, RestartPolicy, Supervisor, TaskError,
    TaskFn, TaskRef, TaskSpec,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use runbox_model::{ComputeUnit, RunnerId, TimeoutMs, selector};

const TASK_NAME: &str = "runbox-reconciler";

use crate::{
    cluster::Cluster,
    destroy::{DestroyReason, Destroyer},
    metrics::{MetricsHandle, noop_metrics},
    registry::Registry,
};

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Delay between two sweeps.
    pub interval_ms: TimeoutMs,
    /// Units at least this old are removed.
    pub expiry_ms: TimeoutMs,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            expiry_ms: 15 * 60 * 1_000,
        }
    }
}

/// The two independent passes of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Stale,
    Orphan,
}

impl SweepKind {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            SweepKind::Stale => "stale",
            SweepKind::Orphan => "orphan",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Runners destroyed for being too old or terminal.
    pub stale: Vec<RunnerId>,
    /// Runners destroyed for missing one of their objects.
    pub orphans: Vec<RunnerId>,
    /// Per-runner failures (lookup or destroy) that were skipped.
    pub failed: usize,
    /// Sweeps that could not list their candidates at all.
    pub aborted: Vec<SweepKind>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.stale.len() + self.orphans.len()
    }
}

/// `true` when `unit` is at least `expiry` old or has reached a terminal phase.
pub fn should_remove(unit: &ComputeUnit, now: OffsetDateTime, expiry: Duration) -> bool {
    if unit.phase.is_terminal() {
        return true;
    }
    match unit.age(now) {
        Some(age) => age.whole_milliseconds() >= expiry.as_millis() as i128,
        None => false,
    }
}

/// Periodic cleanup of stale and half-existing runners.
#[derive(Clone)]
pub struct Reconciler {
    cluster: Arc<dyn Cluster>,
    registry: Registry,
    destroyer: Destroyer,
    config: ReconcilerConfig,
    metrics: MetricsHandle,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        registry: Registry,
        destroyer: Destroyer,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            cluster,
            registry,
            destroyer,
            config,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run the sweeps under a supervisor on the current runtime until the handle is stopped.
    ///
    /// The first sweep runs right away, the next ones `interval_ms` after the previous one ended.
    pub fn spawn(self) -> ReconcilerHandle {
        let cancel = CancellationToken::new();
        let sweeping = Arc::new(Mutex::new(()));
        info!(
            interval_ms = self.config.interval_ms,
            expiry_ms = self.config.expiry_ms,
            "reconciler started"
        );
        let spec = self.task_spec(cancel.clone(), sweeping.clone());

        let sup = Supervisor::builder(SupervisorConfig::default())
            .with_subscribers(Vec::new())
            .build();
        let join = tokio::spawn(async move {
            if let Err(e) = sup.run(vec![spec]).await {
                error!(error = %e, "reconciler supervisor exited");
            }
        });

        ReconcilerHandle {
            cancel,
            sweeping,
            join,
        }
    }

    /// Periodic sweep task: restarted after every success with `interval_ms` delay.
    fn task_spec(self, stop: CancellationToken, sweeping: Arc<Mutex<()>>) -> TaskSpec {
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let reconciler = Arc::new(self);

        let task: TaskRef = TaskFn::arc(TASK_NAME, move |ctx: CancellationToken| {
            let reconciler = Arc::clone(&reconciler);
            let stop = stop.clone();
            let sweeping = Arc::clone(&sweeping);
            async move {
                let _guard = sweeping.lock().await;
                if ctx.is_cancelled() || stop.is_cancelled() {
                    return Err(TaskError::Canceled);
                }
                log_report(&reconciler.sweep().await);
                Ok(())
            }
        });

        let backoff = BackoffPolicy {
            jitter: JitterPolicy::None,
            factor: 1.0,

            first: period,
            max: period,
        };
        TaskSpec::new(
            task,
            RestartPolicy::Always {
                interval: Some(period),
            },
            backoff,
            None,
        )
    }

    /// One tick against the wall clock.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// One tick with `now` as the reference time for unit age.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> SweepReport {
        let mut report = SweepReport::default();

        self.sweep_stale(now, &mut report).await;
        self.metrics
            .record_sweep(SweepKind::Stale.as_label(), report.stale.len() as u64);

        self.sweep_orphans(&mut report).await;
        self.metrics
            .record_sweep(SweepKind::Orphan.as_label(), report.orphans.len() as u64);

        report
    }

    async fn sweep_stale(&self, now: OffsetDateTime, report: &mut SweepReport) {
        let expiry = Duration::from_millis(self.config.expiry_ms);

        let units = match self.cluster.list_units(&selector::all_units()).await {
            Ok(units) => units,
            Err(e) => {
                error!(sweep = %SweepKind::Stale, error = %e, "listing units failed");
                self.metrics.record_error("reconciler", "lookup");
                report.aborted.push(SweepKind::Stale);
                return;
            }
        };

        for unit in units.iter().filter(|u| should_remove(u, now, expiry)) {
            let Some(id) = unit.runner_id() else {
                warn!(unit = %unit.name, "stale unit has no runner id, skipping");
                continue;
            };
            debug!(runner = %id, phase = %unit.phase, "stale runner");

            let runner = match self.registry.resolve(&id).await {
                Ok(runner) => runner,
                Err(e) => {
                    warn!(runner = %id, error = %e, "resolve failed");
                    report.failed += 1;
                    continue;
                }
            };
            match self.destroyer.destroy(&runner, DestroyReason::Stale).await {
                Ok(()) => report.stale.push(id),
                Err(_) => report.failed += 1,
            }
        }
    }

    async fn sweep_orphans(&self, report: &mut SweepReport) {
        let runners = match self.registry.aggregate_all().await {
            Ok(runners) => runners,
            Err(e) => {
                error!(sweep = %SweepKind::Orphan, error = %e, "aggregation failed");
                self.metrics.record_error("reconciler", "lookup");
                report.aborted.push(SweepKind::Orphan);
                return;
            }
        };

        for runner in runners.into_iter().filter(|r| r.is_orphan()) {
            debug!(%runner, "orphan runner");
            match self.destroyer.destroy(&runner, DestroyReason::Orphan).await {
                Ok(()) => report.orphans.push(runner.id),
                Err(_) => report.failed += 1,
            }
        }
    }
}

fn log_report(report: &SweepReport) {
    if report.removed() > 0 || report.failed > 0 || !report.aborted.is_empty() {
        info!(
            stale = report.stale.len(),
            orphans = report.orphans.len(),
            failed = report.failed,
            aborted = report.aborted.len(),
            "sweep finished",
        );
    }
}

/// Owner of a spawned reconciler.
pub struct ReconcilerHandle {
    cancel: CancellationToken,
    sweeping: Arc<Mutex<()>>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Stop scheduling sweeps and shut the supervisor down.
    ///
    /// A sweep that is already running completes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _idle = self.sweeping.lock().await;
        self.join.abort();
        match self.join.await {
            Err(e) if !e.is_cancelled() => error!(error = %e, "reconciler task failed"),
            _ => info!("reconciler stopped"),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
