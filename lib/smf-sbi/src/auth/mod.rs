//! Authorization gate in front of each protected SBI route group
//!
//! Every request to a protected group passes through [`authorize`], which
//! hands the raw `Authorization` header to the configured
//! [`AuthorizationCheck`] along with the service name and the PLMN identities
//! captured when the gate was built. Failures never reach the handler.

mod token;

pub use token::{AccessTokenClaims, AccessTokenVerifier};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use smf_api::{PlmnId, ServiceName};
use smf_core::AuthorizationContext;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("access token expired")]
    Expired,

    #[error("access token scope does not include {0}")]
    ScopeMismatch(ServiceName),

    #[error("access token was issued for another PLMN")]
    PlmnMismatch,
}

/// Decides whether a token grants access to a service.
///
/// `token` is the raw `Authorization` header value, empty when absent.
pub trait AuthorizationCheck: Send + Sync {
    fn authorization_check(
        &self,
        token: &str,
        service: ServiceName,
        serving_plmn: &PlmnId,
        roaming_plmn: Option<&PlmnId>,
    ) -> Result<(), AuthError>;
}

/// Per-service gate; identities are fixed when the gate is built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationGate {
    service_name: ServiceName,
    serving_plmn: PlmnId,
    roaming_plmn: Option<PlmnId>,
}

impl AuthorizationGate {
    pub fn new(service_name: ServiceName, identity: &AuthorizationContext) -> Self {
        Self {
            service_name,
            serving_plmn: identity.serving_plmn.clone(),
            roaming_plmn: identity.roaming_plmn.clone(),
        }
    }

    pub fn service_name(&self) -> ServiceName {
        self.service_name
    }

    pub fn check(
        &self,
        headers: &HeaderMap,
        checker: &dyn AuthorizationCheck,
    ) -> Result<(), AuthError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        checker.authorization_check(
            token,
            self.service_name,
            &self.serving_plmn,
            self.roaming_plmn.as_ref(),
        )
    }
}

/// Middleware state: one gate plus the shared checker
#[derive(Clone)]
pub struct GateState {
    gate: Arc<AuthorizationGate>,
    checker: Arc<dyn AuthorizationCheck>,
}

impl GateState {
    pub fn new(gate: AuthorizationGate, checker: Arc<dyn AuthorizationCheck>) -> Self {
        Self {
            gate: Arc::new(gate),
            checker,
        }
    }
}

/// Reject with 401 or pass the request through unchanged
pub async fn authorize(State(state): State<GateState>, request: Request, next: Next) -> Response {
    match state.gate.check(request.headers(), state.checker.as_ref()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            debug!(
                service = %state.gate.service_name(),
                path = %request.uri().path(),
                "Authorization rejected: {}", e
            );
            unauthorized_response(&e)
        }
    }
}

fn unauthorized_response(err: &AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}
