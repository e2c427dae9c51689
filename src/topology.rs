//! Per-instance network topology resolved from the provisioning outputs
//!
//! Terraform exposes a flat `flat_outputs` map whose keys are prefixed by the
//! instance ordinal (`ha_<n>_server1_ip`, `ha_<n>_aws_lb`, ...). Resolution is
//! a pure lookup of the eight keys belonging to one ordinal; validation of the
//! six node addresses happens separately so the caller decides when to fail.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Number of server nodes in every HA instance
pub const NODES_PER_INSTANCE: usize = 3;

/// Raw values for one instance, exactly as found in the output map
///
/// Missing keys resolve to an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HaOutputs {
    pub server_ips: [String; NODES_PER_INSTANCE],
    pub server_private_ips: [String; NODES_PER_INSTANCE],
    pub load_balancer_dns: String,
    pub rancher_url: String,
}

/// Public and private address of one server node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeAddress {
    pub public: IpAddr,
    pub private: IpAddr,
}

/// Validated topology of one HA instance; immutable once built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceTopology {
    pub instance: usize,
    pub nodes: [NodeAddress; NODES_PER_INSTANCE],
    pub load_balancer_dns: String,
    pub rancher_url: String,
}

/// Key prefix for an instance ordinal (1-based)
pub fn output_prefix(instance: usize) -> String {
    format!("ha_{instance}")
}

/// Extract the outputs of a single instance from the flat output map
pub fn resolve_outputs(outputs: &HashMap<String, String>, instance: usize) -> HaOutputs {
    let prefix = output_prefix(instance);
    let get = |suffix: &str| {
        outputs
            .get(&format!("{prefix}_{suffix}"))
            .cloned()
            .unwrap_or_default()
    };

    HaOutputs {
        server_ips: [get("server1_ip"), get("server2_ip"), get("server3_ip")],
        server_private_ips: [
            get("server1_private_ip"),
            get("server2_private_ip"),
            get("server3_private_ip"),
        ],
        load_balancer_dns: get("aws_lb"),
        rancher_url: get("rancher_url"),
    }
}

/// Parse an IPv4 or IPv6 address; `None` when malformed
pub fn parse_ip_address(ip: &str) -> Option<IpAddr> {
    ip.parse().ok()
}

fn parse_address(value: &str, field: &str) -> Result<IpAddr> {
    parse_ip_address(value)
        .ok_or_else(|| Error::ValidationError(format!("invalid IP address for {field}: {value:?}")))
}

impl HaOutputs {
    /// Validate all six node addresses and build the typed topology
    ///
    /// Fails on the first address that does not parse. The load balancer and
    /// hostname are carried through as-is.
    pub fn validate(&self, instance: usize) -> Result<InstanceTopology> {
        let mut nodes = Vec::with_capacity(NODES_PER_INSTANCE);
        for (i, (public, private)) in self
            .server_ips
            .iter()
            .zip(self.server_private_ips.iter())
            .enumerate()
        {
            nodes.push(NodeAddress {
                public: parse_address(public, &format!("server{}_ip", i + 1))?,
                private: parse_address(private, &format!("server{}_private_ip", i + 1))?,
            });
        }

        Ok(InstanceTopology {
            instance,
            nodes: [nodes[0], nodes[1], nodes[2]],
            load_balancer_dns: self.load_balancer_dns.clone(),
            rancher_url: self.rancher_url.clone(),
        })
    }
}

impl InstanceTopology {
    /// The node that initializes the cluster and mints the join token
    pub fn first_node(&self) -> &NodeAddress {
        &self.nodes[0]
    }

    /// Nodes 2 and 3, paired with their 1-based node number
    pub fn joining_nodes(&self) -> impl Iterator<Item = (usize, &NodeAddress)> {
        self.nodes.iter().enumerate().skip(1).map(|(i, n)| (i + 1, n))
    }

    /// Certificate subject alternative names shared by every node config
    ///
    /// Order: Rancher hostname, then public/private address of node 1, 2, 3.
    pub fn tls_sans(&self) -> Vec<String> {
        let mut sans = Vec::with_capacity(1 + 2 * NODES_PER_INSTANCE);
        sans.push(self.rancher_url.clone());
        for node in &self.nodes {
            sans.push(node.public.to_string());
            sans.push(node.private.to_string());
        }
        sans
    }
}
