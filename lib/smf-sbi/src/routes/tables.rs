//! Route tables for each SBI route group

use super::{Procedure, Route};
use axum::http::Method;

fn route(name: &'static str, method: Method, path: &'static str, procedure: Procedure) -> Route {
    Route {
        name,
        method,
        path,
        procedure,
    }
}

fn index() -> Route {
    route("Index", Method::GET, "/", Procedure::Index)
}

pub(crate) fn pdu_session_routes() -> Vec<Route> {
    use Procedure::*;
    vec![
        index(),
        route("PostSmContexts", Method::POST, "/sm-contexts", PostSmContexts),
        route(
            "UpdateSmContext",
            Method::POST,
            "/sm-contexts/{smContextRef}/modify",
            UpdateSmContext,
        ),
        route(
            "ReleaseSmContext",
            Method::POST,
            "/sm-contexts/{smContextRef}/release",
            ReleaseSmContext,
        ),
        route(
            "RetrieveSmContext",
            Method::POST,
            "/sm-contexts/{smContextRef}/retrieve",
            RetrieveSmContext,
        ),
        route(
            "SendMoData",
            Method::POST,
            "/sm-contexts/{smContextRef}/send-mo-data",
            SendMoData,
        ),
        route("PostPduSessions", Method::POST, "/pdu-sessions", PostPduSessions),
        route(
            "UpdatePduSession",
            Method::POST,
            "/pdu-sessions/{pduSessionRef}/modify",
            UpdatePduSession,
        ),
        route(
            "ReleasePduSession",
            Method::POST,
            "/pdu-sessions/{pduSessionRef}/release",
            ReleasePduSession,
        ),
        route(
            "RetrievePduSession",
            Method::POST,
            "/pdu-sessions/{pduSessionRef}/retrieve",
            RetrievePduSession,
        ),
        route(
            "TransferMoData",
            Method::POST,
            "/pdu-sessions/{pduSessionRef}/transfer-mo-data",
            TransferMoData,
        ),
    ]
}

pub(crate) fn event_exposure_routes() -> Vec<Route> {
    use Procedure::*;
    vec![
        index(),
        route(
            "CreateIndividualSubscription",
            Method::POST,
            "/subscriptions",
            CreateEventSubscription,
        ),
        route(
            "GetIndividualSubscription",
            Method::GET,
            "/subscriptions/{subId}",
            GetEventSubscription,
        ),
        route(
            "ReplaceIndividualSubscription",
            Method::PUT,
            "/subscriptions/{subId}",
            ReplaceEventSubscription,
        ),
        route(
            "DeleteIndividualSubscription",
            Method::DELETE,
            "/subscriptions/{subId}",
            DeleteEventSubscription,
        ),
    ]
}

pub(crate) fn oam_routes() -> Vec<Route> {
    vec![
        index(),
        route(
            "GetUePduSessionInfo",
            Method::GET,
            "/ue-pdu-session-info/{smContextRef}",
            Procedure::GetUePduSessionInfo,
        ),
        route(
            "GetSmfUserPlaneInfo",
            Method::GET,
            "/user-plane-info/",
            Procedure::GetSmfUserPlaneInfo,
        ),
    ]
}

pub(crate) fn callback_routes() -> Vec<Route> {
    use Procedure::*;
    vec![
        route(
            "SmPolicyUpdateNotification",
            Method::POST,
            "/sm-policies/{smContextRef}/update",
            SmPolicyUpdateNotification,
        ),
        route(
            "SmPolicyControlTerminationRequestNotification",
            Method::POST,
            "/sm-policies/{smContextRef}/terminate",
            SmPolicyTermination,
        ),
        route(
            "ChargingNotification",
            Method::POST,
            "/chf-notifications/{notifyUri}",
            ChargingNotification,
        ),
        route(
            "N1N2FailureNotification",
            Method::POST,
            "/sm-n1n2-failure/{smContextRef}",
            N1N2TransferFailure,
        ),
    ]
}

pub(crate) fn upi_routes() -> Vec<Route> {
    vec![
        index(),
        route(
            "GetUpNodesLinks",
            Method::GET,
            "/upNodesLinks",
            Procedure::GetUpNodesLinks,
        ),
        route(
            "PostUpNodesLinks",
            Method::POST,
            "/upNodesLinks",
            Procedure::PostUpNodesLinks,
        ),
        route(
            "DeleteUpNodeLink",
            Method::DELETE,
            "/upNodesLinks/{upNodeRef}",
            Procedure::DeleteUpNodeLink,
        ),
    ]
}
