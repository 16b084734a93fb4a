//! Network interface record
//!
//! Interfaces are never created by operators. They mirror what the agent
//! reports and are upserted by `(node, address)` whenever a node comes online.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{field_matches, new_record_id, Entity, Matches, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[serde(alias = "IPv4")]
    Ipv4,
    #[serde(alias = "IPv6")]
    Ipv6,
    /// Any family the agent reports that we do not route over
    #[serde(other)]
    Other,
}

/// Interface as reported by `listNetworks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceReport {
    pub address: String,
    pub family: AddressFamily,
    #[serde(default)]
    pub netmask: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub dev: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub broadcast: Option<String>,
    #[serde(default)]
    pub subip: Option<String>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub tunnel: bool,
    #[serde(default)]
    pub gateway: bool,
    #[serde(default)]
    pub docker: bool,
}

impl InterfaceReport {
    pub fn ipv4(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            family: AddressFamily::Ipv4,
            netmask: None,
            mac: None,
            cidr: None,
            dev: None,
            network: None,
            broadcast: None,
            subip: None,
            internal: false,
            public: false,
            tunnel: false,
            gateway: false,
            docker: false,
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn tunnel(mut self) -> Self {
        self.tunnel = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn docker(mut self) -> Self {
        self.docker = true;
        self
    }
}

/// Stored network interface belonging to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub node: RecordId,
    pub address: String,
    pub family: AddressFamily,
    #[serde(default)]
    pub netmask: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub dev: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub broadcast: Option<String>,
    #[serde(default)]
    pub subip: Option<String>,
    pub internal: bool,
    pub public: bool,
    pub tunnel: bool,
    pub gateway: bool,
    pub docker: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl NetworkInterface {
    pub fn from_report(node: impl Into<RecordId>, report: InterfaceReport) -> Self {
        let now = Utc::now();
        let mut iface = Self {
            id: new_record_id(),
            node: node.into(),
            address: String::new(),
            family: report.family,
            netmask: None,
            mac: None,
            cidr: None,
            dev: None,
            network: None,
            broadcast: None,
            subip: None,
            internal: false,
            public: false,
            tunnel: false,
            gateway: false,
            docker: false,
            created_at: now,
            updated_at: now,
        };
        iface.apply_report(report);
        iface.updated_at = now;
        iface
    }

    /// Overwrite reported fields in place, keeping identity and ownership
    pub fn apply_report(&mut self, report: InterfaceReport) {
        self.address = report.address;
        self.family = report.family;
        self.netmask = report.netmask;
        self.mac = report.mac;
        self.cidr = report.cidr;
        self.dev = report.dev;
        self.network = report.network;
        self.broadcast = report.broadcast;
        self.subip = report.subip;
        self.internal = report.internal;
        self.public = report.public;
        self.tunnel = report.tunnel;
        self.gateway = report.gateway;
        self.docker = report.docker;
        self.updated_at = Utc::now();
    }
}

impl Entity for NetworkInterface {
    const KIND: &'static str = "networks";
    type Query = NetworkQuery;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Typed filter over network interfaces
#[derive(Debug, Clone, Default)]
pub struct NetworkQuery {
    pub id: Option<RecordId>,
    pub node: Option<RecordId>,
    pub address: Option<String>,
    pub family: Option<AddressFamily>,
    pub internal: Option<bool>,
    pub public: Option<bool>,
    pub tunnel: Option<bool>,
    pub docker: Option<bool>,
}

impl NetworkQuery {
    pub fn by_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_node(node: impl Into<RecordId>) -> Self {
        Self {
            node: Some(node.into()),
            ..Self::default()
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn family(mut self, family: AddressFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = Some(internal);
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = Some(public);
        self
    }

    pub fn tunnel(mut self, tunnel: bool) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn docker(mut self, docker: bool) -> Self {
        self.docker = Some(docker);
        self
    }
}

impl Matches<NetworkInterface> for NetworkQuery {
    fn matches(&self, iface: &NetworkInterface) -> bool {
        field_matches(self.id.as_deref(), iface.id.as_str())
            && field_matches(self.node.as_deref(), iface.node.as_str())
            && field_matches(self.address.as_deref(), iface.address.as_str())
            && field_matches(self.family.as_ref(), &iface.family)
            && field_matches(self.internal.as_ref(), &iface.internal)
            && field_matches(self.public.as_ref(), &iface.public)
            && field_matches(self.tunnel.as_ref(), &iface.tunnel)
            && field_matches(self.docker.as_ref(), &iface.docker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_family_aliases() {
        let report: InterfaceReport = serde_json::from_value(serde_json::json!({
            "address": "10.0.0.5",
            "family": "IPv4",
            "internal": true,
            "dev": "eth1"
        }))
        .unwrap();

        assert_eq!(report.family, AddressFamily::Ipv4);
        assert!(report.internal);
        assert!(!report.docker);
        assert_eq!(report.dev.as_deref(), Some("eth1"));
    }

    #[test]
    fn test_unknown_family_does_not_spoil_the_list() {
        let reports: Vec<InterfaceReport> = serde_json::from_value(serde_json::json!([
            { "address": "10.0.0.5", "family": "IPv4", "internal": true },
            { "address": "aa:bb", "family": "packet" },
        ]))
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].family, AddressFamily::Other);

        let iface = NetworkInterface::from_report("node-1", reports[1].clone());
        assert!(!NetworkQuery::by_node("node-1")
            .family(AddressFamily::Ipv4)
            .matches(&iface));
    }

    #[test]
    fn test_apply_report_keeps_identity() {
        let mut iface = NetworkInterface::from_report("node-1", InterfaceReport::ipv4("10.0.0.5"));
        let id = iface.id.clone();

        iface.apply_report(InterfaceReport::ipv4("10.0.0.5").internal());

        assert_eq!(iface.id, id);
        assert_eq!(iface.node, "node-1");
        assert!(iface.internal);
    }

    #[test]
    fn test_flags_are_independent() {
        let iface = NetworkInterface::from_report(
            "node-1",
            InterfaceReport::ipv4("10.8.0.1").internal().tunnel(),
        );

        assert!(NetworkQuery::by_node("node-1").internal(true).matches(&iface));
        assert!(NetworkQuery::by_node("node-1").tunnel(true).matches(&iface));
        assert!(NetworkQuery::by_node("node-1").docker(false).matches(&iface));
        assert!(!NetworkQuery::by_node("node-1").public(true).matches(&iface));
        assert!(!NetworkQuery::by_node("node-2").matches(&iface));
    }
}
