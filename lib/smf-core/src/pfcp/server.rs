//! UDP listener for PFCP traffic

use crate::{CoreError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM_SIZE: usize = 65535;

/// A datagram received on the PFCP port
#[derive(Clone, Debug)]
pub struct PfcpDatagram {
    pub from: SocketAddr,
    pub payload: Vec<u8>,
}

/// Handler for inbound PFCP datagrams (message decoding lives behind this trait)
#[async_trait]
pub trait PfcpDispatch: Send + Sync {
    async fn dispatch(&self, socket: &UdpSocket, datagram: PfcpDatagram);
}

/// PFCP listener: a bound UDP socket and the receive loop feeding the dispatcher
pub struct PfcpServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PfcpServer {
    /// Bind the socket and start the receive loop. The loop runs until `cancel` fires.
    pub async fn bind(
        addr: SocketAddr,
        dispatch: Arc<dyn PfcpDispatch>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        info!("PFCP server listening on {}", local_addr);

        let task = tokio::spawn(receive_loop(socket, dispatch, cancel.clone()));

        Ok(Self {
            local_addr,
            cancel,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the receive loop and wait for it to exit
    pub async fn close(&mut self) -> Result<()> {
        let task = self
            .task
            .take()
            .ok_or_else(|| CoreError::Pfcp("PFCP server already closed".to_string()))?;
        self.cancel.cancel();
        task.await
            .map_err(|e| CoreError::Pfcp(format!("PFCP receive loop failed: {}", e)))?;
        info!("PFCP server on {} closed", self.local_addr);
        Ok(())
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    dispatch: Arc<dyn PfcpDispatch>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => {
                debug!("PFCP datagram of {} bytes from {}", len, from);
                let datagram = PfcpDatagram {
                    from,
                    payload: buf[..len].to_vec(),
                };
                dispatch.dispatch(&socket, datagram).await;
            }
            // ICMP port-unreachable surfaces here on some platforms
            Err(e) => warn!("PFCP receive error: {}", e),
        }
    }
    debug!("PFCP receive loop stopped");
}
