//! Association driven by the UPF contacting this SMF

use super::{PfcpDatagram, PfcpDispatch, UpfAssociation};
use crate::{CoreError, Result, UpfNode};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// InboundAssociation treats a UPF as associated once PFCP traffic from its
/// address reaches the listener (UPF-initiated association setup).
///
/// It is both the dispatcher (recording senders) and the association
/// handshake (waiting for a sender to appear).
pub struct InboundAssociation {
    seen: watch::Sender<HashSet<IpAddr>>,
    attempt_timeout: Duration,
}

impl InboundAssociation {
    pub fn new() -> Self {
        Self::with_attempt_timeout(DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn with_attempt_timeout(attempt_timeout: Duration) -> Self {
        let (seen, _) = watch::channel(HashSet::new());
        Self {
            seen,
            attempt_timeout,
        }
    }

    pub fn has_seen(&self, ip: IpAddr) -> bool {
        self.seen.borrow().contains(&ip)
    }
}

impl Default for InboundAssociation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PfcpDispatch for InboundAssociation {
    async fn dispatch(&self, _socket: &UdpSocket, datagram: PfcpDatagram) {
        let ip = datagram.from.ip();
        if self.seen.send_if_modified(|seen| seen.insert(ip)) {
            debug!("First PFCP traffic from {}", ip);
        }
    }
}

#[async_trait]
impl UpfAssociation for InboundAssociation {
    async fn associate(&self, upf: &UpfNode) -> Result<()> {
        let ip = upf.addr.ip();
        let mut seen = self.seen.subscribe();
        let outcome =
            tokio::time::timeout(self.attempt_timeout, seen.wait_for(|s| s.contains(&ip)))
                .await
                .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CoreError::Pfcp("PFCP listener dropped".to_string())),
            Err(_) => Err(CoreError::Pfcp(format!(
                "no PFCP traffic from {} within {:?}",
                ip, self.attempt_timeout
            ))),
        }
    }
}
