//! PFCP subsystem bootstrap
//!
//! Message encoding and the association handshake itself are supplied by the
//! caller through [`PfcpDispatch`] and [`UpfAssociation`]; this module owns the
//! listener, the per-UPF association tasks and their cancellation.

pub mod association;
pub mod bootstrap;
pub mod inbound;
pub mod server;

pub use association::{associate_with_upf, AssociationOutcome, RetryPolicy, UpfAssociation};
pub use bootstrap::{ProtocolBootstrap, ProtocolSubsystem, ShutdownSummary};
pub use inbound::InboundAssociation;
pub use server::{PfcpDatagram, PfcpDispatch, PfcpServer};
