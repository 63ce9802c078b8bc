//! SBI data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SBI services exposed by the SMF
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceName {
    #[serde(rename = "nsmf-pdusession")]
    NsmfPdusession,
    #[serde(rename = "nsmf-event-exposure")]
    NsmfEventExposure,
    #[serde(rename = "nsmf-oam")]
    NsmfOam,
}

impl ServiceName {
    pub const ALL: [ServiceName; 3] = [
        ServiceName::NsmfPdusession,
        ServiceName::NsmfEventExposure,
        ServiceName::NsmfOam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::NsmfPdusession => "nsmf-pdusession",
            ServiceName::NsmfEventExposure => "nsmf-event-exposure",
            ServiceName::NsmfOam => "nsmf-oam",
        }
    }

    /// API version segment used in the service URI prefix
    pub fn api_version(&self) -> &'static str {
        "v1"
    }

    /// Resource URI prefix, e.g. `/nsmf-pdusession/v1`
    pub fn uri_prefix(&self) -> String {
        format!("/{}/{}", self.as_str(), self.api_version())
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a configured service name is not one the SMF serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownServiceName(pub String);

impl fmt::Display for UnknownServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown service name: {}", self.0)
    }
}

impl std::error::Error for UnknownServiceName {}

impl FromStr for ServiceName {
    type Err = UnknownServiceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownServiceName(s.to_string()))
    }
}

/// PLMN identity (mobile country code + mobile network code)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnId {
    pub fn new(mcc: impl Into<String>, mnc: impl Into<String>) -> Self {
        Self {
            mcc: mcc.into(),
            mnc: mnc.into(),
        }
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mcc, self.mnc)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfType {
    Smf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfStatus {
    Registered,
}

/// A service entry inside an NF profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfService {
    pub service_instance_id: String,
    pub service_name: ServiceName,
    pub versions: Vec<NfServiceVersion>,
    pub scheme: String,
    pub nf_service_status: NfStatus,
    pub api_prefix: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfServiceVersion {
    pub api_version_in_uri: String,
    pub api_full_version: String,
}

/// NF profile registered with the NRF
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfProfile {
    pub nf_instance_id: String,
    pub nf_type: NfType,
    pub nf_status: NfStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plmn_list: Vec<PlmnId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv4_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nf_services: Vec<NfService>,
}

/// RFC 7807 problem details body used for SBI error responses
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: u16, cause: &str, detail: impl Into<String>) -> Self {
        Self {
            title: None,
            status,
            detail: Some(detail.into()),
            cause: Some(cause.to_string()),
        }
    }
}
