//! In-memory [`Cluster`] used by tests.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use runbox_model::{
    AccessToken, ComputeUnit, Credential, CredentialSpec, Labels, UnitPhase, UnitSpec,
};

use crate::cluster::{Cluster, ClusterError, RemoteSession, ResourceKind};

/// Cluster call kinds, for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    EnsureScope,
    ListUnits,
    ListCredentials,
    GetUnit,
    CreateCredential,
    CreateUnit,
    DeleteUnit,
    DeleteCredential,
    Attach,
}

/// How freshly created units progress on repeated `get_unit` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollout {
    /// `Pending` for the first `reads` reads, then `phase`.
    After { reads: u32, phase: UnitPhase },
    /// `Pending` forever.
    Never,
}

impl Default for Rollout {
    fn default() -> Self {
        Rollout::After {
            reads: 0,
            phase: UnitPhase::Running,
        }
    }
}

struct FakeUnit {
    unit: ComputeUnit,
    spec: Option<UnitSpec>,
    rollout: Rollout,
    reads: u32,
}

#[derive(Default)]
struct State {
    units: BTreeMap<String, FakeUnit>,
    credentials: BTreeMap<String, (Credential, Option<AccessToken>)>,
    calls: HashMap<FakeOp, usize>,
    failing: HashSet<FakeOp>,
    rollout: Rollout,
    attach_banner: Vec<u8>,
    scope_ready: bool,
}

/// Shared in-memory cluster. Clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and return the injected failure, if any.
    fn enter(&self, op: FakeOp) -> Result<MutexGuard<'_, State>, ClusterError> {
        let mut st = self.lock();
        *st.calls.entry(op).or_default() += 1;
        if st.failing.contains(&op) {
            return Err(ClusterError::Api(format!("injected failure for {op:?}")));
        }
        Ok(st)
    }

    /// Make every following call of `op` fail with [`ClusterError::Api`].
    pub fn fail(&self, op: FakeOp) {
        self.lock().failing.insert(op);
    }

    /// Undo [`FakeCluster::fail`].
    pub fn recover(&self, op: FakeOp) {
        self.lock().failing.remove(&op);
    }

    /// Rollout applied to units created from now on.
    pub fn set_rollout(&self, rollout: Rollout) {
        self.lock().rollout = rollout;
    }

    /// Bytes the fake process prints right after attach.
    pub fn set_attach_banner(&self, banner: impl Into<Vec<u8>>) {
        self.lock().attach_banner = banner.into();
    }

    /// Number of calls of `op` so far.
    pub fn calls(&self, op: FakeOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls of every kind so far.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Place an existing unit into the cluster, bypassing `create_unit`.
    pub fn insert_unit(&self, unit: ComputeUnit) {
        let name = unit.name.clone();
        let rollout = Rollout::After {
            reads: 0,
            phase: unit.phase,
        };
        self.lock().units.insert(
            name,
            FakeUnit {
                unit,
                spec: None,
                rollout,
                reads: 0,
            },
        );
    }

    /// Place an existing credential into the cluster, bypassing `create_credential`.
    pub fn insert_credential(&self, credential: Credential) {
        let name = credential.name.clone();
        self.lock().credentials.insert(name, (credential, None));
    }

    /// Force the phase of an existing unit.
    pub fn set_phase(&self, name: &str, phase: UnitPhase) {
        if let Some(u) = self.lock().units.get_mut(name) {
            u.unit.phase = phase;
            u.rollout = Rollout::After { reads: 0, phase };
        }
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.lock().units.keys().cloned().collect()
    }

    pub fn credential_names(&self) -> Vec<String> {
        self.lock().credentials.keys().cloned().collect()
    }

    /// Spec a unit was created from; `None` for inserted units.
    pub fn unit_spec(&self, name: &str) -> Option<UnitSpec> {
        self.lock().units.get(name).and_then(|u| u.spec.clone())
    }

    /// Token stored in a created credential.
    pub fn credential_token(&self, name: &str) -> Option<AccessToken> {
        self.lock()
            .credentials
            .get(name)
            .and_then(|(_, token)| token.clone())
    }

    /// `true` once `ensure_scope` succeeded.
    pub fn scope_ready(&self) -> bool {
        self.lock().scope_ready
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn ensure_scope(&self) -> Result<(), ClusterError> {
        self.enter(FakeOp::EnsureScope)?.scope_ready = true;
        Ok(())
    }

    async fn list_units(&self, selector: &Labels) -> Result<Vec<ComputeUnit>, ClusterError> {
        let st = self.enter(FakeOp::ListUnits)?;
        Ok(st
            .units
            .values()
            .filter(|u| u.unit.labels.matches(selector))
            .map(|u| u.unit.clone())
            .collect())
    }

    async fn list_credentials(&self, selector: &Labels) -> Result<Vec<Credential>, ClusterError> {
        let st = self.enter(FakeOp::ListCredentials)?;
        Ok(st
            .credentials
            .values()
            .filter(|(c, _)| c.labels.matches(selector))
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn get_unit(&self, name: &str) -> Result<ComputeUnit, ClusterError> {
        let mut st = self.enter(FakeOp::GetUnit)?;
        let u = st.units.get_mut(name).ok_or_else(|| ClusterError::NotFound {
            kind: ResourceKind::Unit,
            name: name.to_string(),
        })?;

        if let Rollout::After { reads, phase } = u.rollout {
            if u.reads >= reads {
                u.unit.phase = phase;
            }
        }
        u.reads += 1;
        Ok(u.unit.clone())
    }

    async fn create_credential(&self, spec: &CredentialSpec) -> Result<Credential, ClusterError> {
        let mut st = self.enter(FakeOp::CreateCredential)?;
        if st.credentials.contains_key(&spec.name) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Credential,
                name: spec.name.clone(),
            });
        }
        let credential = Credential {
            name: spec.name.clone(),
            labels: spec.labels.clone(),
        };
        st.credentials.insert(
            spec.name.clone(),
            (credential.clone(), Some(spec.token.clone())),
        );
        Ok(credential)
    }

    async fn create_unit(&self, spec: &UnitSpec) -> Result<ComputeUnit, ClusterError> {
        let mut st = self.enter(FakeOp::CreateUnit)?;
        if st.units.contains_key(&spec.name) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Unit,
                name: spec.name.clone(),
            });
        }
        let unit = ComputeUnit {
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            phase: UnitPhase::Pending,
            created_at: Some(OffsetDateTime::now_utc()),
            container: spec.container.clone(),
        };
        let rollout = st.rollout;
        st.units.insert(
            spec.name.clone(),
            FakeUnit {
                unit: unit.clone(),
                spec: Some(spec.clone()),
                rollout,
                reads: 0,
            },
        );
        Ok(unit)
    }

    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.enter(FakeOp::DeleteUnit)?;
        st.units
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Unit,
                name: name.to_string(),
            })
    }

    async fn delete_credential(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.enter(FakeOp::DeleteCredential)?;
        st.credentials
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Credential,
                name: name.to_string(),
            })
    }

    /// Echo process: prints the banner, then echoes stdin until it is closed.
    async fn attach(&self, unit: &ComputeUnit) -> Result<RemoteSession, ClusterError> {
        let banner = {
            let st = self.enter(FakeOp::Attach)?;
            if !st.units.contains_key(&unit.name) {
                return Err(ClusterError::NotFound {
                    kind: ResourceKind::Unit,
                    name: unit.name.clone(),
                });
            }
            st.attach_banner.clone()
        };

        let (local, remote) = tokio::io::duplex(4096);
        let process = tokio::spawn(async move {
            let (mut rd, mut wr) = tokio::io::split(remote);
            wr.write_all(&banner).await?;
            let mut buf = [0u8; 1024];
            loop {
                let n = rd.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                wr.write_all(&buf[..n]).await?;
            }
            wr.shutdown().await
        });

        let (stdout, stdin) = tokio::io::split(local);
        Ok(RemoteSession {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            done: Box::pin(async move {
                match process.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(ClusterError::Stream(e.to_string())),
                    Err(e) => Err(ClusterError::Stream(e.to_string())),
                }
            }),
        })
    }
}
