//! Core SMF runtime state and peer plumbing
//!
//! This library provides:
//! - SmfContext, the process state shared by the SBI server and the PFCP subsystem
//! - PeerClientRegistry, a lazily populated cache of clients for peer NFs
//! - NRF registration of this NF instance
//! - ProtocolBootstrap, which brings the PFCP listener up and associates with every UPF

pub mod consumer;
pub mod context;
pub mod error;
pub mod pfcp;
pub mod upf;

pub use consumer::{NfRegistrar, NrfManagementClient, PeerClient, PeerClientRegistry, PeerRole};
pub use context::{AuthorizationContext, SmfContext};
pub use error::{CoreError, Result};
pub use pfcp::{ProtocolBootstrap, ProtocolSubsystem};
pub use upf::UpfNode;
