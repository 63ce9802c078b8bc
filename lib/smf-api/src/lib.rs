//! SMF API types and configuration
//!
//! This library defines the data model shared by the SMF crates:
//! - ServiceName: the SBI services this NF can expose
//! - PlmnId: operator network identities used in authorization decisions
//! - NfProfile: the profile registered with the NRF
//! - SmfConfig: the YAML configuration consumed at startup

pub mod config;
pub mod error;
pub mod models;

pub use config::{
    Configuration, LogFormat, LoggerConfig, PfcpConfig, RoamingConfig, SbiConfig, SmfConfig,
    TlsConfig, UpNodeConfig, UpNodeType, UriScheme, UserPlaneInformation,
    SMF_CALLBACK_URI_PREFIX, UPI_URI_PREFIX,
};
pub use error::{ConfigError, Result};
pub use models::{
    NfProfile, NfService, NfServiceVersion, NfStatus, NfType, PlmnId, ProblemDetails,
    ServiceName, UnknownServiceName,
};
