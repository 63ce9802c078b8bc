//! PFCP startup: listener first, then one association task per UPF

use super::association::{associate_with_upf, AssociationOutcome, RetryPolicy, UpfAssociation};
use super::server::{PfcpDispatch, PfcpServer};
use crate::{CoreError, Result, SmfContext};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grace period for association tasks to observe cancellation before they are aborted
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A protocol subsystem the SBI server starts after NF registration
#[async_trait]
pub trait ProtocolSubsystem: Send + Sync {
    /// Start under a child of `parent`; cancelling `parent` stops everything started here
    async fn start(&self, parent: &CancellationToken) -> Result<()>;

    /// Cancel outstanding work and close the listener. Errors are logged, not returned.
    async fn stop(&self);
}

/// Result of tearing down the association tasks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub associated: usize,
    pub cancelled: usize,
    pub aborted: usize,
}

#[derive(Default)]
struct BootstrapState {
    cancel: Option<CancellationToken>,
    server: Option<PfcpServer>,
    tasks: JoinSet<AssociationOutcome>,
}

/// ProtocolBootstrap brings the PFCP listener online and associates with every
/// configured UPF.
///
/// The child cancellation token created by `start` is the only way to stop
/// the receive loop and the association tasks.
pub struct ProtocolBootstrap {
    context: Arc<SmfContext>,
    dispatch: Arc<dyn PfcpDispatch>,
    association: Arc<dyn UpfAssociation>,
    listen_addr: SocketAddr,
    settle_interval: Duration,
    retry: RetryPolicy,
    state: Mutex<BootstrapState>,
    launched: AtomicUsize,
    local_addr: OnceLock<SocketAddr>,
}

impl ProtocolBootstrap {
    pub fn new(
        context: Arc<SmfContext>,
        dispatch: Arc<dyn PfcpDispatch>,
        association: Arc<dyn UpfAssociation>,
    ) -> Result<Self> {
        let listen_addr = context.pfcp().listen_socket_addr()?;
        let settle_interval = context.pfcp().settle_interval();
        Ok(Self {
            context,
            dispatch,
            association,
            listen_addr,
            settle_interval,
            retry: RetryPolicy::default(),
            state: Mutex::new(BootstrapState::default()),
            launched: AtomicUsize::new(0),
            local_addr: OnceLock::new(),
        })
    }

    pub fn with_settle_interval(mut self, settle_interval: Duration) -> Self {
        self.settle_interval = settle_interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Number of association tasks launched since construction
    pub fn launched_tasks(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// Association tasks not yet reaped by `shutdown`
    pub async fn outstanding_tasks(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// Address the PFCP listener bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.context.install_pfcp_context(cancel.clone()).await;

        let server = PfcpServer::bind(self.listen_addr, self.dispatch.clone(), cancel.clone())
            .await
            .map_err(|e| CoreError::Pfcp(format!("PFCP listener failed: {}", e)))?;
        let _ = self.local_addr.set(server.local_addr());

        {
            let mut state = self.state.lock().await;
            if cancel.is_cancelled() {
                drop(state);
                let mut server = server;
                if let Err(e) = server.close().await {
                    warn!("PFCP server close failed: {}", e);
                }
                return Ok(());
            }
            state.server = Some(server);
        }

        // Let the listener settle before the first association request goes out
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("PFCP bootstrap cancelled before association");
                return Ok(());
            }
            _ = tokio::time::sleep(self.settle_interval) => {}
        }

        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            return Ok(());
        }
        for upf in self.context.upfs() {
            state.tasks.spawn(associate_with_upf(
                cancel.clone(),
                upf.clone(),
                self.association.clone(),
                self.retry.clone(),
            ));
            self.launched.fetch_add(1, Ordering::SeqCst);
        }
        info!(
            "Launched PFCP association for {} UPF(s)",
            self.context.upfs().len()
        );
        Ok(())
    }

    /// Cancel the subsystem, close the listener and reap every association task
    pub async fn shutdown(&self) -> ShutdownSummary {
        let (server, mut tasks) = {
            let mut state = self.state.lock().await;
            let Some(cancel) = state.cancel.take() else {
                debug!("PFCP subsystem not running");
                return ShutdownSummary::default();
            };
            // Cancel under the lock so a concurrent start cannot launch new tasks
            cancel.cancel();
            (state.server.take(), std::mem::take(&mut state.tasks))
        };
        self.context.clear_pfcp_context().await;

        if let Some(mut server) = server {
            if let Err(e) = server.close().await {
                error!("PFCP server close failed: {}", e);
            }
        }

        let mut summary = ShutdownSummary::default();
        let drained =
            tokio::time::timeout(TASK_DRAIN_TIMEOUT, reap(&mut tasks, &mut summary)).await;
        if drained.is_err() {
            warn!(
                "{} association task(s) ignored cancellation; aborting",
                tasks.len()
            );
            tasks.abort_all();
            reap(&mut tasks, &mut summary).await;
        }

        info!(
            "PFCP subsystem stopped ({} associated, {} cancelled, {} aborted)",
            summary.associated, summary.cancelled, summary.aborted
        );
        summary
    }
}

async fn reap(tasks: &mut JoinSet<AssociationOutcome>, summary: &mut ShutdownSummary) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(AssociationOutcome::Associated) => summary.associated += 1,
            Ok(AssociationOutcome::Cancelled) => summary.cancelled += 1,
            Err(e) => {
                if e.is_panic() {
                    error!("Association task panicked: {}", e);
                }
                summary.aborted += 1;
            }
        }
    }
}

#[async_trait]
impl ProtocolSubsystem for ProtocolBootstrap {
    async fn start(&self, parent: &CancellationToken) -> Result<()> {
        let cancel = parent.child_token();
        {
            let mut state = self.state.lock().await;
            if state.cancel.is_some() {
                return Err(CoreError::Pfcp("PFCP subsystem already started".to_string()));
            }
            state.cancel = Some(cancel.clone());
        }

        let result = self.run(cancel).await;
        if result.is_err() {
            let mut state = self.state.lock().await;
            state.cancel = None;
            drop(state);
            self.context.clear_pfcp_context().await;
        }
        result
    }

    async fn stop(&self) {
        self.shutdown().await;
    }
}
