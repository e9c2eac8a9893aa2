//! Reachable-address discovery for sharing access.
//!
//! The preferred outbound address is found by "connecting" a UDP socket to
//! a public address and reading the socket's local address. No packet is
//! sent. Both lookups are best-effort; configured overrides win.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use lanshare_core::AccessInfo;
use tokio::net::UdpSocket;

const IPV4_PROBE: &str = "8.8.8.8:80";
const IPV6_PROBE: &str = "[2001:4860:4860::8888]:80";

/// How the server advertises itself to other devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertise {
    /// Listening port
    pub port: u16,
    /// Fixed IPv4 address instead of discovery
    pub ipv4: Option<Ipv4Addr>,
    /// Fixed IPv6 address instead of discovery
    pub ipv6: Option<Ipv6Addr>,
}

impl Advertise {
    /// Advertise `port`, discovering both addresses.
    pub fn discover(port: u16) -> Self {
        Self { port, ipv4: None, ipv6: None }
    }

    /// Local URL that logs the user in with the manage token.
    pub fn manage_url(&self, manage_token: &str) -> String {
        format!("http://127.0.0.1:{}/?ak={}", self.port, manage_token)
    }

    /// URLs plus the remote-access token, for `getAccessInfo`.
    ///
    /// Falls back to `127.0.0.1` when no IPv4 route exists, and to an empty
    /// IPv6 URL when no IPv6 route exists.
    pub async fn access_info(&self, remote_access_token: &str) -> AccessInfo {
        let ipv4 = match self.ipv4 {
            Some(ip) => Some(ip),
            None => outbound_ipv4().await,
        };
        let ipv6 = match self.ipv6 {
            Some(ip) => Some(ip),
            None => outbound_ipv6().await,
        };

        AccessInfo {
            url: format!("http://{}:{}/", ipv4.unwrap_or(Ipv4Addr::LOCALHOST), self.port),
            url_v6: ipv6.map(|ip| format!("http://[{}]:{}/", ip, self.port)).unwrap_or_default(),
            access_token: remote_access_token.to_string(),
        }
    }
}

/// Preferred outbound IPv4 address of this machine.
pub async fn outbound_ipv4() -> Option<Ipv4Addr> {
    match outbound_ip("0.0.0.0:0", IPV4_PROBE).await? {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Preferred outbound IPv6 address of this machine.
pub async fn outbound_ipv6() -> Option<Ipv6Addr> {
    match outbound_ip("[::]:0", IPV6_PROBE).await? {
        IpAddr::V6(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

async fn outbound_ip(bind: &str, probe: &str) -> Option<IpAddr> {
    let socket = match UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::debug!("address probe bind {} failed: {}", bind, e);
            return None;
        },
    };
    if let Err(e) = socket.connect(probe).await {
        tracing::debug!("no route towards {}: {}", probe, e);
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}
