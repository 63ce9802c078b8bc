//! Table-driven composition of the SBI route groups
//!
//! Each configured service name selects one entry of the service table and
//! becomes a route group behind its own [`AuthorizationGate`]. The callback
//! and user-plane-information groups are always installed and never gated.

mod tables;

use crate::auth::{authorize, AuthorizationCheck, AuthorizationGate, GateState};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{RawPathParams, Request},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
    Json, Router,
};
use smf_api::{ProblemDetails, ServiceName, SMF_CALLBACK_URI_PREFIX, UPI_URI_PREFIX};
use smf_core::AuthorizationContext;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Named SBI procedures a route dispatches to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Procedure {
    Index,
    // nsmf-pdusession
    PostSmContexts,
    UpdateSmContext,
    ReleaseSmContext,
    RetrieveSmContext,
    SendMoData,
    PostPduSessions,
    UpdatePduSession,
    ReleasePduSession,
    RetrievePduSession,
    TransferMoData,
    // nsmf-event-exposure
    CreateEventSubscription,
    GetEventSubscription,
    ReplaceEventSubscription,
    DeleteEventSubscription,
    // nsmf-oam
    GetUePduSessionInfo,
    GetSmfUserPlaneInfo,
    // callbacks
    SmPolicyUpdateNotification,
    SmPolicyTermination,
    ChargingNotification,
    N1N2TransferFailure,
    // user plane information
    GetUpNodesLinks,
    PostUpNodesLinks,
    DeleteUpNodeLink,
}

/// Request as handed to a procedure handler
#[derive(Debug)]
pub struct SbiRequest {
    pub method: Method,
    pub path_params: BTreeMap<String, String>,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SbiRequest {
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }
}

/// Business logic behind the routes
#[async_trait]
pub trait ProcedureHandler: Send + Sync {
    async fn handle(&self, procedure: Procedure, request: SbiRequest) -> Response;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub name: &'static str,
    pub method: Method,
    /// Path relative to the group prefix
    pub path: &'static str,
    pub procedure: Procedure,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteGroup {
    pub name: &'static str,
    pub prefix: String,
    /// None for groups that are never gated
    pub gate: Option<AuthorizationGate>,
    pub routes: Vec<Route>,
}

/// One installed route, for startup logging and inspection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub name: &'static str,
    pub method: Method,
    pub path: String,
    pub service: Option<ServiceName>,
}

type RouteTable = fn() -> Vec<Route>;

const SERVICE_TABLE: &[(ServiceName, RouteTable)] = &[
    (ServiceName::NsmfPdusession, tables::pdu_session_routes),
    (ServiceName::NsmfEventExposure, tables::event_exposure_routes),
    (ServiceName::NsmfOam, tables::oam_routes),
];

/// Route groups selected by the configured service names
#[derive(Clone, Debug, PartialEq)]
pub struct RouteRegistry {
    groups: Vec<RouteGroup>,
}

impl RouteRegistry {
    /// Unknown names are skipped; a repeated name installs its group once
    pub fn build(service_names: &[String], identity: &AuthorizationContext) -> Self {
        let mut groups = vec![
            RouteGroup {
                name: "nsmf-callback",
                prefix: SMF_CALLBACK_URI_PREFIX.to_string(),
                gate: None,
                routes: tables::callback_routes(),
            },
            RouteGroup {
                name: "upi",
                prefix: UPI_URI_PREFIX.to_string(),
                gate: None,
                routes: tables::upi_routes(),
            },
        ];

        let mut installed = HashSet::new();
        for name in service_names {
            let Ok(service) = name.parse::<ServiceName>() else {
                debug!("Ignoring unknown service name: {}", name);
                continue;
            };
            if !installed.insert(service) {
                warn!("Service {} listed more than once; installing it once", service);
                continue;
            }
            let Some((_, table)) = SERVICE_TABLE.iter().find(|(s, _)| *s == service) else {
                continue;
            };
            groups.push(RouteGroup {
                name: service.as_str(),
                prefix: service.uri_prefix(),
                gate: Some(AuthorizationGate::new(service, identity)),
                routes: table(),
            });
        }

        Self { groups }
    }

    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&RouteGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every installed route with its full path, sorted by path then method
    pub fn describe(&self) -> Vec<RouteDescriptor> {
        let mut routes: Vec<_> = self
            .groups
            .iter()
            .flat_map(|group| {
                group.routes.iter().map(move |route| RouteDescriptor {
                    name: route.name,
                    method: route.method.clone(),
                    path: format!("{}{}", group.prefix, route.path),
                    service: group.gate.as_ref().map(AuthorizationGate::service_name),
                })
            })
            .collect();
        routes.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.method.as_str().cmp(b.method.as_str()))
        });
        routes
    }

    /// Compose the axum router; unmatched requests get a 404 problem response
    pub fn into_router(
        &self,
        checker: Arc<dyn AuthorizationCheck>,
        handler: Arc<dyn ProcedureHandler>,
    ) -> Router {
        let mut router = Router::new();
        for group in &self.groups {
            let mut group_router = group_router(group, &handler);
            if let Some(gate) = &group.gate {
                let state = GateState::new(gate.clone(), checker.clone());
                group_router =
                    group_router.route_layer(middleware::from_fn_with_state(state, authorize));
            }
            router = router.merge(group_router);
        }
        router.fallback(not_found).layer(TraceLayer::new_for_http())
    }
}

fn group_router(group: &RouteGroup, handler: &Arc<dyn ProcedureHandler>) -> Router {
    let mut router = Router::new();
    for route in &group.routes {
        let Ok(filter) = MethodFilter::try_from(route.method.clone()) else {
            error!("Route {} uses unsupported method {}", route.name, route.method);
            continue;
        };
        let path = format!("{}{}", group.prefix, route.path);
        let procedure = route.procedure;
        let handler = handler.clone();
        router = router.route(
            &path,
            on(filter, move |params: RawPathParams, request: Request| {
                dispatch(handler, procedure, params, request)
            }),
        );
    }
    router
}

async fn dispatch(
    handler: Arc<dyn ProcedureHandler>,
    procedure: Procedure,
    params: RawPathParams,
    request: Request,
) -> Response {
    let path_params = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            return problem_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "INVALID_MSG_FORMAT",
                format!("failed to read request body: {}", e),
            )
        }
    };
    let request = SbiRequest {
        method: parts.method,
        path_params,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };
    handler.handle(procedure, request).await
}

async fn not_found(uri: Uri) -> Response {
    problem_response(
        StatusCode::NOT_FOUND,
        "RESOURCE_URI_STRUCTURE_NOT_FOUND",
        format!("no route for {}", uri.path()),
    )
}

/// ProblemDetails body with the `application/problem+json` content type
pub fn problem_response(status: StatusCode, cause: &str, detail: impl Into<String>) -> Response {
    let problem = ProblemDetails::new(status.as_u16(), cause, detail);
    (
        status,
        [(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        )],
        Json(problem),
    )
        .into_response()
}
