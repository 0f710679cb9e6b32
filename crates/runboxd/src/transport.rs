use std::{sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use runbox_core::session::{LineSession, SessionHandler};

use crate::ssh::SshConnection;

/// Wire protocol spoken on the session listener.
#[derive(Clone)]
pub enum Transport {
    /// SSH with the given server config; the shell channel carries the session.
    Ssh(Arc<russh::server::Config>),
    /// Bare TCP with line prompts. Tokens cross the wire unencrypted.
    Plain,
}

/// Accept sessions until `shutdown` fires, one task per client.
///
/// After shutdown, open sessions get `grace` to finish; those still running are
/// abandoned and their runners are left to the reconciler.
pub async fn serve(
    listener: TcpListener,
    transport: Transport,
    handler: SessionHandler,
    shutdown: CancellationToken,
    grace: Duration,
) {
    let sessions = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "cannot disable nagle");
        }

        let handler = handler.clone();
        match &transport {
            Transport::Ssh(config) => {
                let config = config.clone();
                let conn = SshConnection::new(addr.ip(), handler, sessions.clone());
                sessions.spawn(async move {
                    match russh::server::run_stream(config, stream, conn).await {
                        Ok(running) => {
                            if let Err(e) = running.await {
                                debug!(%addr, error = %e, "ssh connection ended with error");
                            }
                        }
                        Err(e) => warn!(%addr, error = %e, "ssh handshake failed"),
                    }
                });
            }
            Transport::Plain => {
                sessions.spawn(async move {
                    let session = LineSession::new(stream, addr.ip().to_string());
                    match handler.handle(session).await {
                        Ok(outcome) => info!(%addr, ?outcome, "session ended"),
                        Err(e) => warn!(%addr, error = %e, "session aborted"),
                    }
                });
            }
        }
    }

    sessions.close();
    if !sessions.is_empty() {
        info!(open = sessions.len(), "waiting for open sessions");
    }
    if tokio::time::timeout(grace, sessions.wait()).await.is_err() {
        error!(open = sessions.len(), "sessions still open after grace period");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use runbox_core::{
        Orchestrator, OrchestratorConfig,
        cluster::FakeCluster,
        session::{ReviewError, ReviewRef, ReviewSource},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use super::*;

    struct NoReviews;

    #[async_trait]
    impl ReviewSource for NoReviews {
        async fn lookup(&self, number: u64) -> Result<ReviewRef, ReviewError> {
            Err(ReviewError::NotFound(number))
        }
    }

    fn handler(fake: &FakeCluster) -> SessionHandler {
        SessionHandler::new(
            Orchestrator::new(Arc::new(fake.clone()), OrchestratorConfig::default()),
            Arc::new(NoReviews),
        )
    }

    #[tokio::test]
    async fn serves_plain_sessions_until_shutdown() {
        let fake = FakeCluster::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            Transport::Plain,
            handler(&fake),
            shutdown.clone(),
            Duration::from_secs(1),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"not-a-number\n").await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();

        assert_eq!(out, "Review request #: Invalid review request number.\r\n");
        assert_eq!(fake.total_calls(), 0);

        shutdown.cancel();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn ssh_listener_greets_with_protocol_banner() {
        let fake = FakeCluster::new();
        let key = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/host_ed25519");
        let config = Arc::new(crate::ssh::server_config(&key).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            Transport::Ssh(config),
            handler(&fake),
            shutdown.clone(),
            Duration::from_secs(1),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut banner = [0u8; 8];
        client.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"SSH-2.0-");
        drop(client);
        assert_eq!(fake.total_calls(), 0);

        shutdown.cancel();
        server.await.unwrap();
    }
}
