//! Process wiring: configuration in, running SBI server out

use crate::procedures::LocalProcedures;
use anyhow::{Context, Result};
use smf_api::SmfConfig;
use smf_core::pfcp::InboundAssociation;
use smf_core::{
    NfRegistrar, NrfManagementClient, PeerClientRegistry, ProtocolBootstrap, SmfContext,
};
use smf_sbi::{AccessTokenVerifier, SbiCollaborators, SbiServer, ServeFatal};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct SmfApp {
    context: Arc<SmfContext>,
    registrar: Arc<dyn NfRegistrar>,
    server: SbiServer,
    cancel: CancellationToken,
}

impl SmfApp {
    pub fn new(config: &SmfConfig) -> Result<Self> {
        let context = Arc::new(
            SmfContext::from_config(config).context("failed to initialize SMF context")?,
        );

        let clients = Arc::new(PeerClientRegistry::new());
        let registrar: Arc<dyn NfRegistrar> =
            Arc::new(NrfManagementClient::new(context.clone(), clients));

        let authorizer = AccessTokenVerifier::from_config(
            config.configuration.nrf_cert_pem.as_deref(),
        )
        .context("failed to load NRF access token key")?;
        if !authorizer.is_enabled() {
            info!("nrfCertPem not configured; access tokens are not verified");
        }

        let inbound = Arc::new(InboundAssociation::new());
        let protocol = ProtocolBootstrap::new(context.clone(), inbound.clone(), inbound)
            .context("failed to prepare PFCP subsystem")?;

        let cancel = CancellationToken::new();
        let collaborators = SbiCollaborators {
            authorizer: Arc::new(authorizer),
            procedures: Arc::new(LocalProcedures::new(context.clone())),
            registrar: registrar.clone(),
            protocol: Arc::new(protocol),
        };
        let server = SbiServer::new(context.clone(), collaborators, cancel.clone());

        Ok(Self {
            context,
            registrar,
            server,
            cancel,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting SMF {} (instance {})",
            self.context.name(),
            self.context.nf_instance_id()
        );
        self.server.start().await.context("failed to start SBI server")
    }

    /// Deregister, then stop serving and the PFCP subsystem
    pub async fn terminate(&mut self) {
        info!("Terminating SMF...");
        if let Err(e) = self.registrar.deregister_nf_instance().await {
            error!("Deregister NF instance error: {}", e);
        }
        self.server.stop().await;
        self.cancel.cancel();
        info!("SMF terminated");
    }

    /// Start, then run until a shutdown signal or a fatal serving error
    pub async fn run(mut self) -> Result<ExitCode> {
        self.start().await?;
        let fatal = self.server.take_fatal_receiver();

        tokio::select! {
            signal = shutdown_signal() => {
                match signal {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!("Signal handling failed: {}", e),
                }
                self.terminate().await;
                Ok(ExitCode::SUCCESS)
            }
            fatal = wait_fatal(fatal) => {
                error!(
                    "SBI server (listen on {}) failed: {}; exiting",
                    fatal.local_addr, fatal.message
                );
                self.cancel.cancel();
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn wait_fatal(fatal: Option<oneshot::Receiver<ServeFatal>>) -> ServeFatal {
    if let Some(fatal) = fatal {
        if let Ok(fatal) = fatal.await {
            return fatal;
        }
    }
    std::future::pending().await
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {}
            result = tokio::signal::ctrl_c() => result?,
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
