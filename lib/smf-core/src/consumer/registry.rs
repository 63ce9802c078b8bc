//! Lazily populated cache of peer NF clients

use super::PeerRole;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client handle for one peer NF URI
#[derive(Debug)]
pub struct PeerClient {
    role: PeerRole,
    base_uri: String,
    http: reqwest::Client,
}

impl PeerClient {
    fn new(role: PeerRole, base_uri: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            role,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build a request URL under this peer's base URI
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }
}

/// PeerClientRegistry keeps one client per (role, peer URI).
///
/// Handles are created on first use and reused for the process lifetime.
/// Concurrent first use of the same key yields a single shared handle.
pub struct PeerClientRegistry {
    clients: Arc<RwLock<HashMap<(PeerRole, String), Arc<PeerClient>>>>,
    request_timeout: Duration,
}

impl PeerClientRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            request_timeout,
        }
    }

    /// Get the client for a peer, creating it on first use
    pub async fn client(&self, role: PeerRole, uri: &str) -> Result<Arc<PeerClient>> {
        let key = (role, uri.to_string());

        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        // Another task may have created it while we waited for the write lock
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = Arc::new(PeerClient::new(role, uri, self.request_timeout)?);
        clients.insert(key, client.clone());
        debug!("Created {} client for {}", role, uri);
        Ok(client)
    }

    /// Number of cached clients for a role
    pub async fn pool_size(&self, role: PeerRole) -> usize {
        let clients = self.clients.read().await;
        clients.keys().filter(|(r, _)| *r == role).count()
    }

    /// Total number of cached clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for PeerClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
