//! SBI server lifecycle: bind, register, serve, shut down
//!
//! `start` registers the NF instance first and only then listens, so a failed
//! registration leaves no socket open. Serving runs on a spawned task watched
//! by a supervisor; a panic there is reported once on the fatal channel.

use crate::auth::AuthorizationCheck;
use crate::routes::{ProcedureHandler, RouteRegistry};
use crate::tls::TlsServerConfig;
use crate::{Result, SbiError};
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use smf_api::UriScheme;
use smf_core::{NfRegistrar, ProtocolSubsystem, SmfContext};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Upper bound on graceful HTTP shutdown before remaining connections are closed
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(2);

/// Time allowed for aborted connections to be reaped after the deadline
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Bound,
    Running,
    ShuttingDown,
    Stopped,
}

/// The serving task ended by panicking
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeFatal {
    pub local_addr: SocketAddr,
    pub message: String,
}

/// Everything the server calls out to
#[derive(Clone)]
pub struct SbiCollaborators {
    pub authorizer: Arc<dyn AuthorizationCheck>,
    pub procedures: Arc<dyn ProcedureHandler>,
    pub registrar: Arc<dyn NfRegistrar>,
    pub protocol: Arc<dyn ProtocolSubsystem>,
}

#[derive(Clone)]
enum Transport {
    Plain,
    Tls(TlsAcceptor),
}

struct Bound {
    addr: SocketAddr,
    transport: Transport,
    router: Router,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    force_close: CancellationToken,
    supervisor: JoinHandle<()>,
    protocol_cancel: CancellationToken,
    protocol_start: JoinHandle<()>,
}

pub struct SbiServer {
    context: Arc<SmfContext>,
    collaborators: SbiCollaborators,
    process_cancel: CancellationToken,
    state: LifecycleState,
    bound: Option<Bound>,
    running: Option<Running>,
    fatal_tx: Option<oneshot::Sender<ServeFatal>>,
    fatal_rx: Option<oneshot::Receiver<ServeFatal>>,
}

impl SbiServer {
    /// `process_cancel` is the process-wide token; registration and protocol
    /// startup are cancelled through it.
    pub fn new(
        context: Arc<SmfContext>,
        collaborators: SbiCollaborators,
        process_cancel: CancellationToken,
    ) -> Self {
        let (fatal_tx, fatal_rx) = oneshot::channel();
        Self {
            context,
            collaborators,
            process_cancel,
            state: LifecycleState::Created,
            bound: None,
            running: None,
            fatal_tx: Some(fatal_tx),
            fatal_rx: Some(fatal_rx),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address actually listened on; None unless running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Receiver for the serving task's fatal error; can be taken once
    pub fn take_fatal_receiver(&mut self) -> Option<oneshot::Receiver<ServeFatal>> {
        self.fatal_rx.take()
    }

    /// Validate the scheme, load TLS material and compose the router
    pub fn bind(&mut self) -> Result<()> {
        if self.state != LifecycleState::Created {
            return Err(SbiError::InvalidState(self.state));
        }

        let sbi = self.context.sbi();
        let transport = match sbi.uri_scheme()? {
            UriScheme::Http => Transport::Plain,
            UriScheme::Https => {
                let tls = sbi.tls.as_ref().ok_or(SbiError::MissingTlsMaterial)?;
                Transport::Tls(TlsServerConfig::from_files(&tls.pem, &tls.key)?.acceptor())
            }
        };
        let addr = sbi.bind_addr()?;

        let registry = RouteRegistry::build(
            self.context.service_names(),
            self.context.authorization(),
        );
        for route in registry.describe() {
            debug!(
                method = %route.method,
                path = %route.path,
                service = ?route.service,
                "Installed route {}", route.name
            );
        }
        let router = registry.into_router(
            self.collaborators.authorizer.clone(),
            self.collaborators.procedures.clone(),
        );

        self.bound = Some(Bound {
            addr,
            transport,
            router,
        });
        self.state = LifecycleState::Bound;
        info!("SBI server bound to {} ({})", addr, sbi.scheme);
        Ok(())
    }

    /// Claim the listen address, register with the NRF, then start the
    /// protocol subsystem and serve.
    ///
    /// A failed registration releases the address and leaves the server bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == LifecycleState::Created {
            self.bind()?;
        }
        if self.state != LifecycleState::Bound {
            return Err(SbiError::InvalidState(self.state));
        }
        let addr = match &self.bound {
            Some(bound) => bound.addr,
            None => return Err(SbiError::InvalidState(self.state)),
        };

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        self.collaborators
            .registrar
            .register_nf_instance(&self.process_cancel)
            .await
            .map_err(SbiError::Registration)?;
        let Some(bound) = self.bound.take() else {
            return Err(SbiError::InvalidState(self.state));
        };

        let protocol = self.collaborators.protocol.clone();
        let protocol_cancel = self.process_cancel.child_token();
        let parent = protocol_cancel.clone();
        let protocol_start = tokio::spawn(async move {
            if let Err(e) = protocol.start(&parent).await {
                error!("PFCP subsystem failed to start: {}", e);
            }
        });

        let shutdown = CancellationToken::new();
        let force_close = CancellationToken::new();
        let serve_task = tokio::spawn(serve(
            listener,
            bound.transport,
            bound.router,
            shutdown.clone(),
            force_close.clone(),
        ));
        let supervisor = tokio::spawn(supervise(serve_task, local_addr, self.fatal_tx.take()));

        self.running = Some(Running {
            local_addr,
            shutdown,
            force_close,
            supervisor,
            protocol_cancel,
            protocol_start,
        });
        self.state = LifecycleState::Running;
        info!("SBI server started (listen on {})", local_addr);
        Ok(())
    }

    /// Stop the protocol subsystem and the HTTP server together.
    ///
    /// The HTTP side waits at most [`SHUTDOWN_DEADLINE`] for in-flight
    /// requests, then closes whatever is left.
    pub async fn stop(&mut self) {
        match self.state {
            LifecycleState::Running => {}
            LifecycleState::Stopped | LifecycleState::ShuttingDown => return,
            LifecycleState::Created | LifecycleState::Bound => {
                self.bound = None;
                self.state = LifecycleState::Stopped;
                return;
            }
        }
        let Some(running) = self.running.take() else {
            self.state = LifecycleState::Stopped;
            return;
        };
        self.state = LifecycleState::ShuttingDown;
        info!("Stopping SBI server (listen on {})", running.local_addr);

        let protocol = self.collaborators.protocol.clone();
        let protocol_cancel = running.protocol_cancel;
        let mut protocol_start = running.protocol_start;
        let protocol_shutdown = async move {
            protocol_cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_DEADLINE, &mut protocol_start)
                .await
                .is_err()
            {
                warn!("PFCP startup did not observe cancellation; aborting");
                protocol_start.abort();
            }
            protocol.stop().await;
        };
        let http_shutdown = shutdown_http(
            running.local_addr,
            running.shutdown,
            running.force_close,
            running.supervisor,
        );
        tokio::join!(protocol_shutdown, http_shutdown);

        self.state = LifecycleState::Stopped;
    }
}

async fn shutdown_http(
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    force_close: CancellationToken,
    mut supervisor: JoinHandle<()>,
) {
    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_DEADLINE, &mut supervisor)
        .await
        .is_ok()
    {
        return;
    }

    error!(
        "Could not close SBI server (listen on {}) within {:?}; closing remaining connections",
        local_addr, SHUTDOWN_DEADLINE
    );
    force_close.cancel();
    if tokio::time::timeout(FORCE_CLOSE_GRACE, &mut supervisor)
        .await
        .is_err()
    {
        supervisor.abort();
    }
}

async fn serve(
    listener: TcpListener,
    transport: Transport,
    router: Router,
    shutdown: CancellationToken,
    force_close: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("Accepted SBI connection from {}", peer_addr);
                    let router = router.clone();
                    let shutdown = shutdown.clone();
                    match &transport {
                        Transport::Plain => {
                            connections.spawn(serve_connection(stream, router, shutdown, peer_addr));
                        }
                        Transport::Tls(acceptor) => {
                            let acceptor = acceptor.clone();
                            connections.spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        serve_connection(tls_stream, router, shutdown, peer_addr).await
                                    }
                                    Err(e) => debug!("TLS handshake with {} failed: {}", peer_addr, e),
                                }
                            });
                        }
                    }
                }
                Err(e) => warn!("Error accepting SBI connection: {}", e),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_end(joined);
            }
        }
    }

    drop(listener);
    debug!("SBI listener closed; draining {} connection(s)", connections.len());

    let mut forced = false;
    loop {
        tokio::select! {
            biased;
            _ = force_close.cancelled(), if !forced => {
                forced = true;
                warn!("Closing {} SBI connection(s)", connections.len());
                connections.abort_all();
            }
            joined = connections.join_next() => match joined {
                Some(joined) => log_connection_end(joined),
                None => break,
            },
        }
    }
}

fn log_connection_end(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("SBI connection task panicked: {}", e);
        }
    }
}

async fn serve_connection<S>(
    stream: S,
    router: Router,
    shutdown: CancellationToken,
    peer_addr: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        router.clone().oneshot(request)
    });
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!("SBI connection from {} ended: {}", peer_addr, e);
            }
        }
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.as_mut().await {
                debug!("SBI connection from {} ended during shutdown: {}", peer_addr, e);
            }
        }
    }
}

/// Watch the serving task; a panic is logged and sent on `fatal` exactly once.
///
/// The stack trace itself is emitted by the process panic hook at the panic site.
pub async fn supervise(
    serve_task: JoinHandle<()>,
    local_addr: SocketAddr,
    fatal: Option<oneshot::Sender<ServeFatal>>,
) {
    match serve_task.await {
        Ok(()) => info!("SBI server (listen on {}) stopped", local_addr),
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!("SBI server (listen on {}) panicked: {}", local_addr, message);
            if let Some(fatal) = fatal {
                let _ = fatal.send(ServeFatal {
                    local_addr,
                    message,
                });
            }
        }
        Err(e) => warn!("SBI server task (listen on {}) cancelled: {}", local_addr, e),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::routes::{Procedure, SbiRequest};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use smf_api::{PlmnId, ServiceName, SmfConfig};
    use smf_core::CoreError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::Notify;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct AllowValid;

    impl AuthorizationCheck for AllowValid {
        fn authorization_check(
            &self,
            token: &str,
            _service: ServiceName,
            _serving_plmn: &PlmnId,
            _roaming_plmn: Option<&PlmnId>,
        ) -> std::result::Result<(), AuthError> {
            if token == "valid" {
                Ok(())
            } else {
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Index answers immediately; PostSmContexts blocks until the test ends
    #[derive(Default)]
    struct Procedures {
        entered: Notify,
        blocked: AtomicBool,
    }

    #[async_trait]
    impl ProcedureHandler for Procedures {
        async fn handle(&self, procedure: Procedure, _request: SbiRequest) -> Response {
            if procedure == Procedure::PostSmContexts {
                self.blocked.store(true, Ordering::SeqCst);
                self.entered.notify_one();
                std::future::pending::<()>().await;
            }
            (StatusCode::OK, "index").into_response()
        }
    }

    struct Registrar {
        log: CallLog,
        fail: bool,
    }

    #[async_trait]
    impl NfRegistrar for Registrar {
        async fn register_nf_instance(&self, _cancel: &CancellationToken) -> smf_core::Result<()> {
            self.log.lock().unwrap().push("register");
            if self.fail {
                Err(CoreError::Registration("NRF returned 403".to_string()))
            } else {
                Ok(())
            }
        }

        async fn deregister_nf_instance(&self) -> smf_core::Result<()> {
            self.log.lock().unwrap().push("deregister");
            Ok(())
        }
    }

    struct Protocol {
        log: CallLog,
    }

    #[async_trait]
    impl ProtocolSubsystem for Protocol {
        async fn start(&self, _parent: &CancellationToken) -> smf_core::Result<()> {
            self.log.lock().unwrap().push("protocol-start");
            Ok(())
        }

        async fn stop(&self) {
            self.log.lock().unwrap().push("protocol-stop");
        }
    }

    /// `sbi_extra` is appended to the sbi section as-is
    fn context_with(scheme: &str, port: u16, sbi_extra: &str) -> Arc<SmfContext> {
        let yaml = format!(
            r#"
configuration:
  smfName: SMF
  sbi:
    scheme: {}
    registerIPv4: 127.0.0.1
    bindingIPv4: 127.0.0.1
    port: {}
{}
  serviceNameList:
    - nsmf-pdusession
  nrfUri: http://127.0.0.1:1
"#,
            scheme, port, sbi_extra
        );
        let config = SmfConfig::from_yaml(&yaml).unwrap();
        Arc::new(SmfContext::from_config(&config).unwrap())
    }

    fn server(scheme: &str, registration_fails: bool) -> (SbiServer, CallLog, Arc<Procedures>) {
        server_with(context_with(scheme, 0, ""), registration_fails)
    }

    fn server_with(
        context: Arc<SmfContext>,
        registration_fails: bool,
    ) -> (SbiServer, CallLog, Arc<Procedures>) {
        let log = CallLog::default();
        let procedures = Arc::new(Procedures::default());
        let collaborators = SbiCollaborators {
            authorizer: Arc::new(AllowValid),
            procedures: procedures.clone(),
            registrar: Arc::new(Registrar {
                log: log.clone(),
                fail: registration_fails,
            }),
            protocol: Arc::new(Protocol { log: log.clone() }),
        };
        let server = SbiServer::new(context, collaborators, CancellationToken::new());
        (server, log, procedures)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn wait_for_entry(log: &CallLog, entry: &str) {
        for _ in 0..100 {
            if log.lock().unwrap().iter().any(|e| *e == entry) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never happened", entry);
    }

    #[tokio::test]
    async fn test_http_start_serves_and_stops() {
        let (mut server, log, _) = server("http", false);
        server.start().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Running);

        let addr = server.local_addr().unwrap();
        let base = format!("http://{}/nsmf-pdusession/v1/", addr);

        let response = client()
            .get(&base)
            .header("Authorization", "valid")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "index");

        let response = client().get(&base).send().await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(response.text().await.unwrap(), r#"{"error":"invalid token"}"#);

        wait_for_entry(&log, "protocol-start").await;
        assert_eq!(log.lock().unwrap()[0], "register");

        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(server.local_addr().is_none());
        assert!(log.lock().unwrap().contains(&"protocol-stop"));
        assert!(client().get(&base).send().await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_never_listens() {
        let (mut server, log, _) = server("ftp", false);

        let result = server.start().await;
        assert!(matches!(result, Err(SbiError::UnsupportedScheme(ref s)) if s == "ftp"));
        assert_eq!(server.state(), LifecycleState::Created);
        assert!(server.local_addr().is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_https_requires_tls_material() {
        let (mut server, log, _) = server("https", false);

        let result = server.start().await;
        assert!(matches!(result, Err(SbiError::MissingTlsMaterial)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_https_start_serves_gated_route() {
        let testdata = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata");
        let tls = format!(
            "    tls:\n      pem: {}/server.pem\n      key: {}/server.key",
            testdata, testdata
        );
        let (mut server, log, _) = server_with(context_with("https", 0, &tls), false);
        server.start().await.unwrap();
        assert_eq!(server.state(), LifecycleState::Running);

        let base = format!(
            "https://{}/nsmf-pdusession/v1/",
            server.local_addr().unwrap()
        );
        let client = reqwest::Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap();

        let response = client
            .get(&base)
            .header("Authorization", "valid")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "index");

        let response = client.get(&base).send().await.unwrap();
        assert_eq!(response.status(), 401);

        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(log.lock().unwrap().contains(&"protocol-stop"));
    }

    #[tokio::test]
    async fn test_listen_failure_skips_registration() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let (mut server, log, _) = server_with(context_with("http", port, ""), false);

        let result = server.start().await;
        assert!(matches!(result, Err(SbiError::Io(_))));
        assert_eq!(server.state(), LifecycleState::Bound);
        assert!(server.local_addr().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_never_listens() {
        let (mut server, log, _) = server("http", true);

        let result = server.start().await;
        assert!(matches!(result, Err(SbiError::Registration(_))));
        assert_eq!(server.state(), LifecycleState::Bound);
        assert!(server.local_addr().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.lock().unwrap().as_slice(), &["register"]);
    }

    #[tokio::test]
    async fn test_stop_is_bounded_with_blocked_request() {
        let (mut server, _, procedures) = server("http", false);
        server.start().await.unwrap();
        let url = format!(
            "http://{}/nsmf-pdusession/v1/sm-contexts",
            server.local_addr().unwrap()
        );

        let request = tokio::spawn(async move {
            client()
                .post(&url)
                .header("Authorization", "valid")
                .body("{}")
                .send()
                .await
        });
        tokio::time::timeout(Duration::from_secs(5), procedures.entered.notified())
            .await
            .unwrap();
        assert!(procedures.blocked.load(Ordering::SeqCst));

        let started = Instant::now();
        server.stop().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= SHUTDOWN_DEADLINE);
        assert!(elapsed < SHUTDOWN_DEADLINE + Duration::from_secs(1));
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(request.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let (mut server, log, _) = server("http", false);
        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(matches!(
            server.start().await,
            Err(SbiError::InvalidState(LifecycleState::Stopped))
        ));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_supervise_reports_panic() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let (tx, rx) = oneshot::channel();
        let serve_task = tokio::spawn(async {
            panic!("listener exploded");
        });

        supervise(serve_task, addr, Some(tx)).await;

        let fatal = rx.await.unwrap();
        assert_eq!(fatal.local_addr, addr);
        assert_eq!(fatal.message, "listener exploded");
    }

    #[tokio::test]
    async fn test_supervise_clean_exit_is_not_fatal() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let (tx, rx) = oneshot::channel();

        supervise(tokio::spawn(async {}), addr, Some(tx)).await;

        assert!(rx.await.is_err());
    }
}
