//! Process state shared by the SBI server and the PFCP subsystem

use crate::{Result, UpfNode};
use smf_api::{PfcpConfig, PlmnId, SbiConfig, SmfConfig};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Network identities captured by each authorization gate at construction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub serving_plmn: PlmnId,
    pub roaming_plmn: Option<PlmnId>,
}

impl AuthorizationContext {
    /// Serving identity falls back to the first home PLMN when roaming is not configured
    pub fn from_config(config: &SmfConfig) -> Self {
        let cfg = &config.configuration;
        let roaming = cfg.roaming.as_ref();
        let serving_plmn = roaming
            .and_then(|r| r.serving_plmn_id.clone())
            .or_else(|| cfg.plmn_list.first().cloned())
            .unwrap_or_default();
        let roaming_plmn = roaming.and_then(|r| r.roaming_plmn_id.clone());
        Self {
            serving_plmn,
            roaming_plmn,
        }
    }
}

/// SmfContext is the explicit, once-constructed state of this NF instance.
///
/// Everything except the PFCP cancellation token is fixed at construction.
/// The token is present only between protocol start and stop.
pub struct SmfContext {
    nf_instance_id: String,
    name: String,
    sbi: SbiConfig,
    nrf_uri: String,
    service_names: Vec<String>,
    plmn_list: Vec<PlmnId>,
    authorization: AuthorizationContext,
    pfcp: PfcpConfig,
    upfs: Vec<Arc<UpfNode>>,
    pfcp_context: RwLock<Option<CancellationToken>>,
}

impl SmfContext {
    pub fn from_config(config: &SmfConfig) -> Result<Self> {
        let cfg = &config.configuration;
        let nf_instance_id = cfg
            .nf_instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let upfs = UpfNode::from_user_plane(&cfg.userplane_information, cfg.pfcp.port)?
            .into_iter()
            .map(Arc::new)
            .collect::<Vec<_>>();

        info!(
            "SMF context initialized: instance {}, {} UPF(s)",
            nf_instance_id,
            upfs.len()
        );

        Ok(Self {
            nf_instance_id,
            name: cfg.smf_name.clone(),
            sbi: cfg.sbi.clone(),
            nrf_uri: cfg.nrf_uri.clone(),
            service_names: cfg.service_name_list.clone(),
            plmn_list: cfg.plmn_list.clone(),
            authorization: AuthorizationContext::from_config(config),
            pfcp: cfg.pfcp.clone(),
            upfs,
            pfcp_context: RwLock::new(None),
        })
    }

    pub fn nf_instance_id(&self) -> &str {
        &self.nf_instance_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sbi(&self) -> &SbiConfig {
        &self.sbi
    }

    pub fn nrf_uri(&self) -> &str {
        &self.nrf_uri
    }

    /// Configured service names, in configuration order, unfiltered
    pub fn service_names(&self) -> &[String] {
        &self.service_names
    }

    pub fn plmn_list(&self) -> &[PlmnId] {
        &self.plmn_list
    }

    pub fn authorization(&self) -> &AuthorizationContext {
        &self.authorization
    }

    pub fn pfcp(&self) -> &PfcpConfig {
        &self.pfcp
    }

    pub fn upfs(&self) -> &[Arc<UpfNode>] {
        &self.upfs
    }

    /// Install the cancellation token of a running PFCP subsystem
    pub async fn install_pfcp_context(&self, token: CancellationToken) {
        let mut guard = self.pfcp_context.write().await;
        *guard = Some(token);
        debug!("PFCP context installed");
    }

    /// The running PFCP subsystem's token, if any
    pub async fn pfcp_context(&self) -> Option<CancellationToken> {
        self.pfcp_context.read().await.clone()
    }

    /// Remove the PFCP token, returning it to the caller for cancellation
    pub async fn clear_pfcp_context(&self) -> Option<CancellationToken> {
        let token = self.pfcp_context.write().await.take();
        if token.is_some() {
            debug!("PFCP context cleared");
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smf_api::RoamingConfig;

    fn config() -> SmfConfig {
        SmfConfig::from_yaml(
            r#"
configuration:
  nrfUri: http://127.0.0.10:8000
  plmnList:
    - mcc: "208"
      mnc: "93"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_home_network_identity() {
        let auth = AuthorizationContext::from_config(&config());
        assert_eq!(auth.serving_plmn, PlmnId::new("208", "93"));
        assert_eq!(auth.roaming_plmn, None);
    }

    #[test]
    fn test_roaming_identity() {
        let mut config = config();
        config.configuration.roaming = Some(RoamingConfig {
            serving_plmn_id: Some(PlmnId::new("001", "01")),
            roaming_plmn_id: Some(PlmnId::new("466", "92")),
        });
        let auth = AuthorizationContext::from_config(&config);
        assert_eq!(auth.serving_plmn, PlmnId::new("001", "01"));
        assert_eq!(auth.roaming_plmn, Some(PlmnId::new("466", "92")));
    }

    #[test]
    fn test_generated_instance_id() {
        let context = SmfContext::from_config(&config()).unwrap();
        assert!(uuid::Uuid::parse_str(context.nf_instance_id()).is_ok());
        assert!(context.upfs().is_empty());
    }

    #[tokio::test]
    async fn test_pfcp_context_lifecycle() {
        let context = SmfContext::from_config(&config()).unwrap();
        assert!(context.pfcp_context().await.is_none());

        let token = CancellationToken::new();
        context.install_pfcp_context(token.clone()).await;
        assert!(context.pfcp_context().await.is_some());

        let taken = context.clear_pfcp_context().await.unwrap();
        taken.cancel();
        assert!(token.is_cancelled());
        assert!(context.pfcp_context().await.is_none());
    }
}
