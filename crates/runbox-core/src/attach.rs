use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::{self, Instant},
};
use tracing::{debug, info, instrument, warn};

use runbox_model::RunnerInstance;

use crate::{
    cluster::{Cluster, ClusterError, RemoteSession, ResourceKind},
    error::OrchestratorError,
    metrics::{MetricsHandle, noop_metrics},
};

/// How long to wait for the protocol to wind down once remote output has ended.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long remote output may keep flowing after the client stopped sending.
const INPUT_DRAIN: Duration = Duration::from_secs(2);

/// Connects an interactive session to a runner's primary process.
///
/// Never destroys anything: cleanup belongs to the caller.
#[derive(Clone)]
pub struct Attacher {
    cluster: Arc<dyn Cluster>,
    metrics: MetricsHandle,
}

impl Attacher {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self {
            cluster,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach `io` to the runner's unit and block until the remote side closes.
    #[instrument(name = "attach", skip_all, fields(runner = %runner.id))]
    pub async fn attach<S>(&self, runner: &RunnerInstance, io: S) -> Result<(), OrchestratorError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let res = self.attach_inner(runner, io).await;
        if let Err(e) = &res {
            self.metrics.record_error("attacher", e.kind());
        }
        res
    }

    async fn attach_inner<S>(&self, runner: &RunnerInstance, io: S) -> Result<(), OrchestratorError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let fail = |source: ClusterError| OrchestratorError::Attach {
            id: runner.id.clone(),
            source,
        };

        let unit = runner.unit.as_ref().ok_or_else(|| {
            fail(ClusterError::NotFound {
                kind: ResourceKind::Unit,
                name: runner.id.unit_name(),
            })
        })?;

        let remote = self.cluster.attach(unit).await.map_err(fail)?;
        info!(unit = %unit.name, "attached");

        bridge(io, remote).await.map_err(fail)?;
        info!(unit = %unit.name, "detached");
        Ok(())
    }
}

/// Pump bytes between `local` and `remote` until either side is done.
///
/// Remote output EOF ends the bridge. Local input EOF shuts down the remote stdin and
/// ends the bridge once output has drained, or after [`INPUT_DRAIN`] if the remote
/// process keeps its output open (an interactive shell outlives its stdin).
pub async fn bridge<S>(local: S, remote: RemoteSession) -> Result<(), ClusterError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let RemoteSession {
        mut stdin,
        mut stdout,
        done,
    } = remote;
    let (mut local_rd, mut local_wr) = tokio::io::split(local);

    let remote_closed = {
        let input = async {
            tokio::io::copy(&mut local_rd, &mut stdin).await?;
            stdin.shutdown().await
        };
        let output = tokio::io::copy(&mut stdout, &mut local_wr);
        let drain = time::sleep(Duration::MAX);
        tokio::pin!(input, output, drain);

        let mut input_open = true;
        loop {
            tokio::select! {
                res = &mut input, if input_open => {
                    input_open = false;
                    drain.as_mut().reset(Instant::now() + INPUT_DRAIN);
                    match res {
                        Ok(()) => debug!("local input closed"),
                        Err(e) => debug!(error = %e, "local input failed"),
                    }
                }
                res = &mut output => {
                    let n = res.map_err(|e| ClusterError::Stream(e.to_string()))?;
                    debug!(bytes = n, "remote output closed");
                    break true;
                }
                _ = &mut drain, if !input_open => {
                    debug!(drain_ms = INPUT_DRAIN.as_millis() as u64, "client gone, remote output still open");
                    break false;
                }
            }
        }
    };

    if let Err(e) = local_wr.flush().await {
        debug!(error = %e, "flush of local output failed");
    }
    if !remote_closed {
        // Dropping `done` tears the remote connection down.
        return Ok(());
    }

    match time::timeout(CLOSE_GRACE, done).await {
        Ok(res) => res,
        Err(_) => {
            warn!(grace_ms = CLOSE_GRACE.as_millis() as u64, "remote did not close in time");
            Ok(())
        }
    }
}
