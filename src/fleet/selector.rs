//! Network path selection for mount traffic
//!
//! Preference: first IPv4 internal interface, then first IPv4 tunnel
//! interface, in insertion order. Public and docker interfaces never carry
//! mount traffic.

use crate::models::{AddressFamily, NetworkQuery};
use crate::store::EntityStore;
use crate::types::{FleetError, Result};

fn preferences(node: &str) -> [NetworkQuery; 2] {
    let base = NetworkQuery::by_node(node)
        .family(AddressFamily::Ipv4)
        .public(false)
        .docker(false);
    [base.clone().internal(true), base.tunnel(true)]
}

/// Address used to reach a node's exports, or `NoReachableNetwork`
pub async fn select_mount_address(store: &EntityStore, node: &str) -> Result<String> {
    for query in preferences(node) {
        if let Some(iface) = store.networks.find_one(&query).await? {
            return Ok(iface.address);
        }
    }
    Err(FleetError::NoReachableNetwork(node.to_string()))
}
