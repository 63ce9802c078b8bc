//! NF registration with the NRF (Nnrf_NFManagement)

use super::{PeerClientRegistry, PeerRole};
use crate::{CoreError, Result, SmfContext};
use async_trait::async_trait;
use smf_api::{NfProfile, NfService, NfServiceVersion, NfStatus, NfType, ServiceName};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NF_INSTANCES_PATH: &str = "/nnrf-nfm/v1/nf-instances";
const SERVICE_FULL_VERSION: &str = "1.0.2";

/// Registration of this NF instance with the management plane
#[async_trait]
pub trait NfRegistrar: Send + Sync {
    /// Register this NF instance; the SBI server must not serve until this succeeds
    async fn register_nf_instance(&self, cancel: &CancellationToken) -> Result<()>;

    /// Remove the registration on shutdown
    async fn deregister_nf_instance(&self) -> Result<()>;
}

/// NRF client that registers the SMF profile built from SmfContext
pub struct NrfManagementClient {
    context: Arc<SmfContext>,
    clients: Arc<PeerClientRegistry>,
}

impl NrfManagementClient {
    pub fn new(context: Arc<SmfContext>, clients: Arc<PeerClientRegistry>) -> Self {
        Self { context, clients }
    }

    /// Build the NF profile advertised to the NRF
    pub fn nf_profile(&self) -> NfProfile {
        let sbi = self.context.sbi();
        let instance_id = self.context.nf_instance_id();

        // Unknown names are not advertised, mirroring the route registry
        let mut services: Vec<ServiceName> = Vec::new();
        for name in self.context.service_names() {
            if let Ok(service) = name.parse::<ServiceName>() {
                if !services.contains(&service) {
                    services.push(service);
                }
            }
        }

        let nf_services = services
            .into_iter()
            .enumerate()
            .map(|(index, service)| NfService {
                service_instance_id: format!("{}-{}", instance_id, index),
                service_name: service,
                versions: vec![NfServiceVersion {
                    api_version_in_uri: service.api_version().to_string(),
                    api_full_version: SERVICE_FULL_VERSION.to_string(),
                }],
                scheme: sbi.scheme.clone(),
                nf_service_status: NfStatus::Registered,
                api_prefix: sbi.api_root(),
            })
            .collect();

        NfProfile {
            nf_instance_id: instance_id.to_string(),
            nf_type: NfType::Smf,
            nf_status: NfStatus::Registered,
            plmn_list: self.context.plmn_list().to_vec(),
            ipv4_addresses: vec![sbi.register_ipv4.clone()],
            nf_services,
        }
    }

    fn instance_path(&self) -> String {
        format!("{}/{}", NF_INSTANCES_PATH, self.context.nf_instance_id())
    }

    async fn put_profile(&self) -> Result<()> {
        let client = self
            .clients
            .client(PeerRole::NfManagement, self.context.nrf_uri())
            .await?;
        let url = client.url(&self.instance_path());
        let profile = self.nf_profile();

        debug!("Registering NF profile at {}", url);
        let response = client.http().put(&url).json(&profile).send().await?;
        let status = response.status();
        if status.is_success() {
            info!(
                "NF instance {} registered with NRF ({})",
                profile.nf_instance_id, status
            );
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CoreError::Registration(format!(
                "NRF rejected registration with status {}: {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl NfRegistrar for NrfManagementClient {
    async fn register_nf_instance(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.put_profile() => result,
        }
    }

    async fn deregister_nf_instance(&self) -> Result<()> {
        let client = self
            .clients
            .client(PeerRole::NfManagement, self.context.nrf_uri())
            .await?;
        let url = client.url(&self.instance_path());
        let response = client.http().delete(&url).send().await?;
        if response.status().is_success() {
            info!("NF instance {} deregistered", self.context.nf_instance_id());
            Ok(())
        } else {
            warn!("NRF deregistration returned {}", response.status());
            Err(CoreError::Registration(format!(
                "NRF rejected deregistration with status {}",
                response.status()
            )))
        }
    }
}
