//! Clients for peer network functions
pub mod nrf;
pub mod registry;

pub use nrf::{NfRegistrar, NrfManagementClient};
pub use registry::{PeerClient, PeerClientRegistry};

use std::fmt;

/// Peer NF API a client handle talks to. Each role has its own pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeerRole {
    /// Nsmf_PDUSession (home/visited SMF)
    SessionManagement,
    /// Namf_Communication
    Communication,
    /// Nchf_ConvergedCharging
    Charging,
    /// Npcf_SMPolicyControl
    Policy,
    /// Nudm_SubscriberDataManagement
    SubscriberData,
    /// Nudm_UEContextManagement
    UeContextManagement,
    /// Nnrf_NFManagement
    NfManagement,
    /// Nnrf_NFDiscovery
    NfDiscovery,
}

impl PeerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRole::SessionManagement => "nsmf-pdusession",
            PeerRole::Communication => "namf-comm",
            PeerRole::Charging => "nchf-convergedcharging",
            PeerRole::Policy => "npcf-smpolicycontrol",
            PeerRole::SubscriberData => "nudm-sdm",
            PeerRole::UeContextManagement => "nudm-uecm",
            PeerRole::NfManagement => "nnrf-nfm",
            PeerRole::NfDiscovery => "nnrf-disc",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
