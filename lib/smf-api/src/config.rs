//! SMF configuration loaded from YAML

use crate::{ConfigError, PlmnId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// URI prefix of the callback group (notifications from PCF, CHF and AMF)
pub const SMF_CALLBACK_URI_PREFIX: &str = "/nsmf-callback";
/// URI prefix of the UPF management interface
pub const UPI_URI_PREFIX: &str = "/upi/v1";

pub const DEFAULT_SBI_PORT: u16 = 8000;
pub const DEFAULT_PFCP_PORT: u16 = 8805;
pub const DEFAULT_PFCP_SETTLE_INTERVAL_MS: u64 = 1000;

/// Top-level configuration document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmfConfig {
    #[serde(default)]
    pub info: Info,
    pub configuration: Configuration,
    #[serde(default)]
    pub logger: LoggerConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default = "default_smf_name")]
    pub smf_name: String,
    /// Generated at startup when absent
    #[serde(default)]
    pub nf_instance_id: Option<String>,
    #[serde(default)]
    pub sbi: SbiConfig,
    /// Ordered list of services to expose; unknown names are ignored
    #[serde(default)]
    pub service_name_list: Vec<String>,
    pub nrf_uri: String,
    /// Public key or certificate used to verify NRF-issued access tokens
    #[serde(default)]
    pub nrf_cert_pem: Option<PathBuf>,
    #[serde(default)]
    pub plmn_list: Vec<PlmnId>,
    #[serde(default)]
    pub roaming: Option<RoamingConfig>,
    #[serde(default)]
    pub pfcp: PfcpConfig,
    #[serde(default)]
    pub userplane_information: UserPlaneInformation,
}

fn default_smf_name() -> String {
    "SMF".to_string()
}

/// SBI server settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbiConfig {
    /// `http` or `https`; validated when the server binds
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_ipv4", rename = "registerIPv4")]
    pub register_ipv4: String,
    #[serde(default = "default_ipv4", rename = "bindingIPv4")]
    pub binding_ipv4: String,
    #[serde(default = "default_sbi_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_scheme() -> String {
    UriScheme::Https.to_string()
}

fn default_ipv4() -> String {
    "127.0.0.1".to_string()
}

fn default_sbi_port() -> u16 {
    DEFAULT_SBI_PORT
}

impl Default for SbiConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            register_ipv4: default_ipv4(),
            binding_ipv4: default_ipv4(),
            port: DEFAULT_SBI_PORT,
            tls: None,
        }
    }
}

impl SbiConfig {
    /// Socket address the SBI server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.binding_ipv4.parse().map_err(|_| {
            ConfigError::Invalid(format!("invalid bindingIPv4: {}", self.binding_ipv4))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn uri_scheme(&self) -> Result<UriScheme> {
        self.scheme.parse()
    }

    /// Base URI advertised to peers, e.g. `https://127.0.0.2:8000`
    pub fn api_root(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.register_ipv4, self.port)
    }
}

/// Transport scheme of the SBI server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UriScheme {
    Http,
    Https,
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriScheme::Http => f.write_str("http"),
            UriScheme::Https => f.write_str("https"),
        }
    }
}

impl FromStr for UriScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(UriScheme::Http),
            "https" => Ok(UriScheme::Https),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Certificate and key paths for the https scheme
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub pem: PathBuf,
    pub key: PathBuf,
}

/// Serving and roaming network identities used by token checks
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoamingConfig {
    #[serde(default)]
    pub serving_plmn_id: Option<PlmnId>,
    #[serde(default)]
    pub roaming_plmn_id: Option<PlmnId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfcpConfig {
    #[serde(default = "default_ipv4", rename = "nodeID")]
    pub node_id: String,
    #[serde(default = "default_ipv4")]
    pub listen_addr: String,
    #[serde(default = "default_ipv4")]
    pub external_addr: String,
    #[serde(default = "default_pfcp_port")]
    pub port: u16,
    /// Delay between listener start and the first association attempt
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
}

fn default_pfcp_port() -> u16 {
    DEFAULT_PFCP_PORT
}

fn default_settle_interval_ms() -> u64 {
    DEFAULT_PFCP_SETTLE_INTERVAL_MS
}

impl Default for PfcpConfig {
    fn default() -> Self {
        Self {
            node_id: default_ipv4(),
            listen_addr: default_ipv4(),
            external_addr: default_ipv4(),
            port: DEFAULT_PFCP_PORT,
            settle_interval_ms: DEFAULT_PFCP_SETTLE_INTERVAL_MS,
        }
    }
}

impl PfcpConfig {
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!("invalid pfcp listenAddr: {}", self.listen_addr))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlaneInformation {
    /// Keyed by node name; a BTreeMap keeps iteration order stable
    #[serde(default)]
    pub up_nodes: BTreeMap<String, UpNodeConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpNodeType {
    #[serde(rename = "UPF")]
    Upf,
    #[serde(rename = "AN")]
    AccessNetwork,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpNodeConfig {
    #[serde(rename = "type")]
    pub node_type: UpNodeType,
    #[serde(default, rename = "nodeID")]
    pub node_id: Option<String>,
    /// PFCP address of the UPF; defaults to the node ID
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl SmfConfig {
    /// Load and validate configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SmfConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check addresses and UPF entries; scheme and TLS material are checked at bind time
    pub fn validate(&self) -> Result<()> {
        let cfg = &self.configuration;
        cfg.sbi.bind_addr()?;
        cfg.pfcp.listen_socket_addr()?;

        let mut seen = HashSet::new();
        for (name, node) in &cfg.userplane_information.up_nodes {
            if node.node_type != UpNodeType::Upf {
                continue;
            }
            let node_id = node.node_id.as_deref().ok_or_else(|| {
                ConfigError::Invalid(format!("UPF {} has no nodeID", name))
            })?;
            if !seen.insert(node_id.to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate UPF nodeID: {}",
                    node_id
                )));
            }
        }
        Ok(())
    }
}
