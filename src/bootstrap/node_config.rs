//! RKE2 server configuration rendered onto each node before install

use std::net::{IpAddr, SocketAddr};

use super::token::{JoinToken, NODE_TOKEN_PATH};
use crate::remote::ReadinessCheck;
use crate::topology::InstanceTopology;

pub const RKE2_CONFIG_DIR: &str = "/etc/rancher/rke2";
pub const RKE2_CONFIG_FILE: &str = "/etc/rancher/rke2/config.yaml";

/// Port the first server listens on for node registration
pub const SUPERVISOR_PORT: u16 = 9345;

/// `config.yaml` contents for one node
///
/// Both variants carry the same SAN list for a given topology so every
/// server certificate covers the load-balanced hostname and all addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeConfiguration {
    FirstNode {
        tls_sans: Vec<String>,
    },
    JoiningNode {
        server: IpAddr,
        token: JoinToken,
        tls_sans: Vec<String>,
    },
}

impl NodeConfiguration {
    pub fn first_node(topology: &InstanceTopology) -> Self {
        NodeConfiguration::FirstNode {
            tls_sans: topology.tls_sans(),
        }
    }

    /// Joining config pointing at the first node's private address
    pub fn joining_node(topology: &InstanceTopology, token: &JoinToken) -> Self {
        NodeConfiguration::JoiningNode {
            server: topology.first_node().private,
            token: token.clone(),
            tls_sans: topology.tls_sans(),
        }
    }

    pub fn tls_sans(&self) -> &[String] {
        match self {
            NodeConfiguration::FirstNode { tls_sans } => tls_sans,
            NodeConfiguration::JoiningNode { tls_sans, .. } => tls_sans,
        }
    }

    pub fn is_first_node(&self) -> bool {
        matches!(self, NodeConfiguration::FirstNode { .. })
    }

    /// Render as RKE2 `config.yaml`
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let NodeConfiguration::JoiningNode { server, token, .. } = self {
            out.push_str(&format!(
                "server: https://{}\n",
                SocketAddr::new(*server, SUPERVISOR_PORT)
            ));
            out.push_str(&format!("token: {}\n", token.as_str()));
        }
        out.push_str("tls-san:");
        for san in self.tls_sans() {
            out.push_str("\n  - ");
            out.push_str(san);
        }
        out
    }

    /// Remote command writing the rendered config to `config.yaml`
    pub fn write_command(&self) -> String {
        format!(
            "sudo bash -c 'cat > {RKE2_CONFIG_FILE} << EOL\n{}\nEOL'",
            self.render()
        )
    }

    /// How to tell this node has finished coming up
    ///
    /// The first node is done once its join token exists on disk; joining
    /// nodes once the server unit reports active.
    pub fn readiness_check(&self) -> ReadinessCheck {
        match self {
            NodeConfiguration::FirstNode { .. } => ReadinessCheck {
                description: "RKE2 node-token",
                command: format!(
                    "sudo test -f {NODE_TOKEN_PATH} && echo 'ready' || echo 'not-ready'"
                ),
                expected: "ready",
            },
            NodeConfiguration::JoiningNode { .. } => ReadinessCheck {
                description: "RKE2 server to become active",
                command: "sudo systemctl is-active --quiet rke2-server && echo 'active' || echo 'inactive'"
                    .to_string(),
                expected: "active",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeAddress;

    fn topology() -> InstanceTopology {
        let node = |n: u8| NodeAddress {
            public: IpAddr::from([52, 0, 0, n]),
            private: IpAddr::from([172, 31, 0, n]),
        };
        InstanceTopology {
            instance: 1,
            nodes: [node(1), node(2), node(3)],
            load_balancer_dns: "lb.elb.amazonaws.com".to_string(),
            rancher_url: "ha1.example.com".to_string(),
        }
    }

    #[test]
    fn test_first_node_render() {
        let config = NodeConfiguration::first_node(&topology());
        assert_eq!(
            config.render(),
            "tls-san:\n  - ha1.example.com\n  - 52.0.0.1\n  - 172.31.0.1\n  - 52.0.0.2\n  - 172.31.0.2\n  - 52.0.0.3\n  - 172.31.0.3"
        );
        assert!(config.is_first_node());
    }

    #[test]
    fn test_joining_node_render() {
        let token = JoinToken::new("K10abc::server:def");
        let rendered = NodeConfiguration::joining_node(&topology(), &token).render();
        assert!(rendered.starts_with("server: https://172.31.0.1:9345\ntoken: K10abc::server:def\ntls-san:\n"));
    }

    #[test]
    fn test_san_lists_match_regardless_of_order() {
        let topo = topology();
        let token = JoinToken::new("t");

        let joining_first = NodeConfiguration::joining_node(&topo, &token);
        let first_after = NodeConfiguration::first_node(&topo);
        let first_before = NodeConfiguration::first_node(&topo);
        let joining_after = NodeConfiguration::joining_node(&topo, &token);

        assert_eq!(joining_first.tls_sans(), first_after.tls_sans());
        assert_eq!(first_before.tls_sans(), joining_after.tls_sans());
    }

    #[test]
    fn test_ipv6_server_is_bracketed() {
        let mut topo = topology();
        topo.nodes[0].private = "fd00::1".parse().unwrap();
        let rendered = NodeConfiguration::joining_node(&topo, &JoinToken::new("t")).render();
        assert!(rendered.starts_with("server: https://[fd00::1]:9345\n"));
    }

    #[test]
    fn test_write_command_uses_heredoc() {
        let cmd = NodeConfiguration::first_node(&topology()).write_command();
        assert!(cmd.starts_with("sudo bash -c 'cat > /etc/rancher/rke2/config.yaml << EOL\ntls-san:"));
        assert!(cmd.ends_with("\nEOL'"));
    }

    #[test]
    fn test_readiness_checks_differ_by_variant() {
        let first = NodeConfiguration::first_node(&topology()).readiness_check();
        assert_eq!(first.expected, "ready");
        assert!(first.command.contains(NODE_TOKEN_PATH));

        let joining =
            NodeConfiguration::joining_node(&topology(), &JoinToken::new("t")).readiness_check();
        assert_eq!(joining.expected, "active");
        assert!(joining.command.contains("is-active"));
    }
}
