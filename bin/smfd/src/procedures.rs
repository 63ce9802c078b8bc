//! Procedures answered locally from SMF state.
//!
//! Session-management procedures are not handled by this process; they get
//! 501 with a ProblemDetails body.

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use smf_core::SmfContext;
use smf_sbi::routes::problem_response;
use smf_sbi::{Procedure, ProcedureHandler, SbiRequest};
use std::sync::Arc;
use tracing::debug;

pub struct LocalProcedures {
    context: Arc<SmfContext>,
}

impl LocalProcedures {
    pub fn new(context: Arc<SmfContext>) -> Self {
        Self { context }
    }

    fn up_nodes(&self) -> Vec<Value> {
        self.context
            .upfs()
            .iter()
            .map(|upf| {
                json!({
                    "upNodeRef": upf.name,
                    "type": "UPF",
                    "nodeID": upf.node_id,
                    "addr": upf.addr.to_string(),
                    "associated": upf.is_associated(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProcedureHandler for LocalProcedures {
    async fn handle(&self, procedure: Procedure, request: SbiRequest) -> Response {
        match procedure {
            Procedure::Index => (StatusCode::OK, "Hello World!").into_response(),
            Procedure::GetSmfUserPlaneInfo => Json(json!({
                "smfName": self.context.name(),
                "upNodes": self.up_nodes(),
            }))
            .into_response(),
            Procedure::GetUpNodesLinks => Json(json!({
                "nodes": self.up_nodes(),
                "links": [],
            }))
            .into_response(),
            other => {
                debug!(
                    procedure = ?other,
                    params = ?request.path_params,
                    "No handler for procedure"
                );
                problem_response(
                    StatusCode::NOT_IMPLEMENTED,
                    "NOT_IMPLEMENTED",
                    format!("{:?} is not handled by this SMF", other),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};
    use smf_api::SmfConfig;
    use std::collections::BTreeMap;

    fn procedures() -> LocalProcedures {
        let config = SmfConfig::from_yaml(
            r#"
configuration:
  smfName: SMF-TEST
  nrfUri: http://127.0.0.10:8000
  userplaneInformation:
    upNodes:
      UPF1:
        type: UPF
        nodeID: 10.0.0.8
"#,
        )
        .unwrap();
        LocalProcedures::new(Arc::new(SmfContext::from_config(&config).unwrap()))
    }

    fn request() -> SbiRequest {
        SbiRequest {
            method: Method::GET,
            path_params: BTreeMap::new(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_user_plane_info_reports_association() {
        let procedures = procedures();
        let response = procedures
            .handle(Procedure::GetSmfUserPlaneInfo, request())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["smfName"], "SMF-TEST");
        assert_eq!(body["upNodes"][0]["nodeID"], "10.0.0.8");
        assert_eq!(body["upNodes"][0]["associated"], false);

        procedures.context.upfs()[0].mark_associated();
        let body = json_body(procedures.handle(Procedure::GetUpNodesLinks, request()).await).await;
        assert_eq!(body["nodes"][0]["associated"], true);
    }

    #[tokio::test]
    async fn test_session_procedures_not_implemented() {
        let response = procedures()
            .handle(Procedure::PostSmContexts, request())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(json_body(response).await["status"], 501);
    }
}
