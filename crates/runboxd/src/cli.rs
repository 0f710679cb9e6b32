use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use runbox_core::{
    AdmissionConfig, DestroyPolicy, OrchestratorConfig, ProvisionerConfig, ReconcilerConfig,
};
use runbox_kube::ConnectMode;
use runbox_model::UnitTemplate;
use runbox_observe::{LoggerConfig, LoggerError, LoggerFormat, LoggerLevel, LoggerTimeZone};

use crate::github::GithubConfig;

#[derive(Parser, Debug)]
#[command(name = "runboxd", about = "Disposable runner sandboxes, one per interactive session")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept sessions and manage runners until interrupted.
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Delete the credential only after the unit is gone.
    Sequential,
    /// Attempt both deletes and report every failure.
    Independent,
}

impl From<PolicyArg> for DestroyPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Sequential => DestroyPolicy::Sequential,
            PolicyArg::Independent => DestroyPolicy::Independent,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address interactive clients connect to.
    #[arg(long, env = "RUNBOX_LISTEN", default_value = "0.0.0.0:2222")]
    pub listen: SocketAddr,

    /// OpenSSH private key presented by the SSH listener.
    #[arg(long, env = "RUNBOX_HOST_KEY")]
    pub host_key: Option<PathBuf>,

    /// Serve bare TCP instead of SSH. Tokens are sent unencrypted.
    #[arg(long, env = "RUNBOX_INSECURE_PLAINTEXT", conflicts_with = "host_key")]
    pub insecure_plaintext: bool,

    /// Serve `/metrics` on this address.
    #[arg(long, env = "RUNBOX_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Namespace holding every runner.
    #[arg(long, env = "RUNBOX_NAMESPACE", default_value = "runbox-runners")]
    pub namespace: String,

    /// Use the service account of the pod the daemon runs in.
    #[arg(long, env = "RUNBOX_IN_CLUSTER", conflicts_with = "kubeconfig")]
    pub in_cluster: bool,

    /// Kubeconfig file; without it and without `--in-cluster` the client is inferred.
    #[arg(long, env = "RUNBOX_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "RUNBOX_IMAGE", default_value = "runbox-runner:latest")]
    pub image: String,

    /// CPU limit per runner; empty leaves it unset.
    #[arg(long, env = "RUNBOX_CPU_LIMIT", default_value = "500m")]
    pub cpu_limit: String,

    /// Memory limit per runner; empty leaves it unset.
    #[arg(long, env = "RUNBOX_MEMORY_LIMIT", default_value = "512Mi")]
    pub memory_limit: String,

    /// Runners older than this are removed by the reconciler.
    #[arg(long, env = "RUNBOX_EXPIRY_MINUTES", default_value_t = 15)]
    pub expiry_minutes: u64,

    /// Live runners allowed per client address.
    #[arg(long, env = "RUNBOX_MAX_CONCURRENT", default_value_t = 3)]
    pub max_concurrent: usize,

    #[arg(long, env = "RUNBOX_RECONCILE_INTERVAL_MS", default_value_t = 5_000)]
    pub reconcile_interval_ms: u64,

    #[arg(long, env = "RUNBOX_READY_TIMEOUT_MS", default_value_t = 120_000)]
    pub ready_timeout_ms: u64,

    #[arg(long, env = "RUNBOX_DESTROY_POLICY", value_enum, default_value_t = PolicyArg::Sequential)]
    pub destroy_policy: PolicyArg,

    /// How long open sessions may keep running after shutdown starts.
    #[arg(long, env = "RUNBOX_SHUTDOWN_GRACE_MS", default_value_t = 30_000)]
    pub shutdown_grace_ms: u64,

    /// Owner of the repository whose pull requests are served.
    #[arg(long, env = "RUNBOX_REVIEW_OWNER")]
    pub review_owner: String,

    #[arg(long, env = "RUNBOX_REVIEW_REPO")]
    pub review_repo: String,

    #[arg(long, env = "RUNBOX_GITHUB_API", default_value = "https://api.github.com")]
    pub github_api: String,

    /// Token for the review API; anonymous requests are heavily rate limited.
    #[arg(long, env = "RUNBOX_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "RUNBOX_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// `EnvFilter` expression, e.g. `info,runbox_core=debug`.
    #[arg(long, env = "RUNBOX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "RUNBOX_LOG_TZ", default_value = "utc")]
    pub log_tz: LoggerTimeZone,
}

/// Listener protocol chosen by the flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Ssh { host_key: PathBuf },
    Plain,
}

fn limit(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

impl ServeArgs {
    pub fn logger_config(&self) -> Result<LoggerConfig, LoggerError> {
        Ok(LoggerConfig {
            format: self.log_format,
            level: LoggerLevel::new(self.log_level.clone())?,
            tz: self.log_tz,
            ..Default::default()
        })
    }

    /// `None` when neither a host key nor the plaintext opt-in was given.
    pub fn transport_mode(&self) -> Option<TransportMode> {
        match (&self.host_key, self.insecure_plaintext) {
            (Some(path), _) => Some(TransportMode::Ssh {
                host_key: path.clone(),
            }),
            (None, true) => Some(TransportMode::Plain),
            (None, false) => None,
        }
    }

    pub fn connect_mode(&self) -> ConnectMode {
        match (&self.kubeconfig, self.in_cluster) {
            (_, true) => ConnectMode::InCluster,
            (Some(path), false) => ConnectMode::Kubeconfig(path.clone()),
            (None, false) => ConnectMode::Infer,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            provisioner: ProvisionerConfig {
                template: UnitTemplate {
                    image: self.image.clone(),
                    cpu_limit: limit(&self.cpu_limit),
                    memory_limit: limit(&self.memory_limit),
                },
                ready_timeout_ms: self.ready_timeout_ms,
                ..Default::default()
            },
            reconciler: ReconcilerConfig {
                interval_ms: self.reconcile_interval_ms,
                expiry_ms: self.expiry_minutes.saturating_mul(60_000),
            },
            admission: AdmissionConfig {
                max_concurrent: self.max_concurrent,
            },
            destroy_policy: self.destroy_policy.into(),
        }
    }

    pub fn github_config(&self) -> GithubConfig {
        GithubConfig {
            api_base: self.github_api.clone(),
            owner: self.review_owner.clone(),
            repo: self.review_repo.clone(),
            token: self.github_token.clone(),
            ..Default::default()
        }
    }
}
