//! SMF service-based interface
//!
//! This library provides:
//! - AuthorizationGate: per-service access-token check in front of each route group
//! - RouteRegistry: table-driven composition of the SBI route groups
//! - SbiServer: bind, serve and graceful shutdown of the HTTP server

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod tls;

pub use auth::{AccessTokenVerifier, AuthError, AuthorizationCheck, AuthorizationGate};
pub use error::{Result, SbiError};
pub use routes::{Procedure, ProcedureHandler, RouteGroup, RouteRegistry, SbiRequest};
pub use server::{LifecycleState, SbiCollaborators, SbiServer, ServeFatal, SHUTDOWN_DEADLINE};
pub use tls::TlsServerConfig;
