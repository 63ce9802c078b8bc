//! Downstream user-plane node records

use crate::{CoreError, Result};
use smf_api::{UpNodeConfig, UpNodeType, UserPlaneInformation};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// A UPF this SMF associates with over PFCP.
///
/// Nodes come from static configuration and live for the whole process.
/// The association flag only ever moves from unassociated to associated.
#[derive(Debug)]
pub struct UpfNode {
    pub name: String,
    pub node_id: String,
    pub addr: SocketAddr,
    associated: AtomicBool,
}

impl UpfNode {
    pub fn new(name: impl Into<String>, node_id: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            node_id: node_id.into(),
            addr,
            associated: AtomicBool::new(false),
        }
    }

    fn from_config(name: &str, node: &UpNodeConfig, default_port: u16) -> Result<Self> {
        let node_id = node
            .node_id
            .clone()
            .ok_or_else(|| CoreError::InvalidConfiguration(format!("UPF {} has no nodeID", name)))?;
        let host = node.addr.as_deref().unwrap_or(&node_id);
        let ip: IpAddr = host.parse().map_err(|_| {
            CoreError::InvalidConfiguration(format!("UPF {} has invalid address {}", name, host))
        })?;
        let port = node.port.unwrap_or(default_port);
        Ok(Self::new(name, node_id, SocketAddr::new(ip, port)))
    }

    /// Build records for every UPF entry; access-network nodes are skipped
    pub fn from_user_plane(info: &UserPlaneInformation, default_port: u16) -> Result<Vec<Self>> {
        info.up_nodes
            .iter()
            .filter(|(_, node)| node.node_type == UpNodeType::Upf)
            .map(|(name, node)| Self::from_config(name, node, default_port))
            .collect()
    }

    pub fn is_associated(&self) -> bool {
        self.associated.load(Ordering::Acquire)
    }

    /// Record a completed association handshake. Returns false if it was already recorded.
    pub fn mark_associated(&self) -> bool {
        let first = !self.associated.swap(true, Ordering::AcqRel);
        if first {
            info!(upf = %self.node_id, "UPF associated");
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn user_plane() -> UserPlaneInformation {
        let mut up_nodes = BTreeMap::new();
        up_nodes.insert(
            "gNB1".to_string(),
            UpNodeConfig {
                node_type: UpNodeType::AccessNetwork,
                node_id: None,
                addr: None,
                port: None,
            },
        );
        up_nodes.insert(
            "UPF1".to_string(),
            UpNodeConfig {
                node_type: UpNodeType::Upf,
                node_id: Some("10.0.0.8".to_string()),
                addr: None,
                port: None,
            },
        );
        up_nodes.insert(
            "UPF2".to_string(),
            UpNodeConfig {
                node_type: UpNodeType::Upf,
                node_id: Some("upf2.example".to_string()),
                addr: Some("10.0.0.9".to_string()),
                port: Some(9805),
            },
        );
        UserPlaneInformation { up_nodes }
    }

    #[test]
    fn test_from_user_plane_skips_access_nodes() {
        let nodes = UpfNode::from_user_plane(&user_plane(), 8805).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "UPF1");
        assert_eq!(nodes[0].addr, "10.0.0.8:8805".parse().unwrap());
        assert_eq!(nodes[1].node_id, "upf2.example");
        assert_eq!(nodes[1].addr, "10.0.0.9:9805".parse().unwrap());
    }

    #[test]
    fn test_association_is_monotonic() {
        let node = UpfNode::new("UPF", "10.0.0.8", "10.0.0.8:8805".parse().unwrap());
        assert!(!node.is_associated());
        assert!(node.mark_associated());
        assert!(!node.mark_associated());
        assert!(node.is_associated());
    }

    #[test]
    fn test_unresolvable_address_rejected() {
        let mut info = user_plane();
        info.up_nodes.get_mut("UPF1").unwrap().node_id = Some("upf1.example".to_string());
        assert!(UpfNode::from_user_plane(&info, 8805).is_err());
    }
}
