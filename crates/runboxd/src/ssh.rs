//! SSH front end: one interactive shell channel per connection, fed to the session handler.
use std::{net::IpAddr, path::Path, time::Duration};

use anyhow::Context;
use russh::{
    Channel, ChannelId, Pty,
    keys::PublicKey,
    server::{Auth, Config, Handler, Msg, Session},
};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use runbox_core::session::{LineSession, SessionHandler};

/// Server config presenting the OpenSSH private key stored at `host_key`.
pub fn server_config(host_key: &Path) -> anyhow::Result<Config> {
    let key = russh::keys::load_secret_key(host_key, None)
        .with_context(|| format!("cannot load host key {}", host_key.display()))?;
    Ok(Config {
        keys: vec![key],
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Config::default()
    })
}

/// Per-connection handler. Clients are not authenticated: the prompts gate provisioning.
pub struct SshConnection {
    peer: String,
    handler: SessionHandler,
    sessions: TaskTracker,
    channel: Option<Channel<Msg>>,
    started: bool,
}

impl SshConnection {
    pub fn new(peer: IpAddr, handler: SessionHandler, sessions: TaskTracker) -> Self {
        Self {
            // Admission is per client host, not per connection.
            peer: peer.to_string(),
            handler,
            sessions,
            channel: None,
            started: false,
        }
    }
}

impl Handler for SshConnection {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(peer = %self.peer, user, "client accepted");
        Ok(Auth::Accept)
    }

    async fn auth_publickey(&mut self, user: &str, _key: &PublicKey) -> Result<Auth, Self::Error> {
        debug!(peer = %self.peer, user, "client accepted with key");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.started || self.channel.is_some() {
            debug!(peer = %self.peer, "extra session channel refused");
            return Ok(false);
        }
        self.channel = Some(channel);
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(peer = %self.peer, term, col_width, row_height, "pty granted");
        session.channel_success(channel)?;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(peer = %self.peer, "exec refused");
        session.channel_failure(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(open) = self.channel.take().filter(|c| c.id() == channel) else {
            session.channel_failure(channel)?;
            return Ok(());
        };
        session.channel_success(channel)?;
        self.started = true;

        let handle = session.handle();
        let handler = self.handler.clone();
        let peer = self.peer.clone();
        self.sessions.spawn(async move {
            let io = LineSession::new(open.into_stream(), peer.clone()).with_echo();
            match handler.handle(io).await {
                Ok(outcome) => info!(%peer, ?outcome, "session ended"),
                Err(e) => warn!(%peer, error = %e, "session aborted"),
            }
            // The client may already be gone.
            let _ = handle.exit_status_request(channel, 0).await;
            let _ = handle.close(channel).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[test]
    fn host_key_file_builds_config() {
        let config = server_config(&fixture("host_ed25519")).unwrap();
        assert_eq!(config.keys.len(), 1);
        assert_eq!(config.auth_rejection_time_initial, Some(Duration::ZERO));
    }

    #[test]
    fn missing_host_key_names_the_path() {
        let Err(err) = server_config(&fixture("absent_key")) else {
            panic!("a missing host key must not build a config");
        };
        assert!(err.to_string().contains("absent_key"));
    }
}
