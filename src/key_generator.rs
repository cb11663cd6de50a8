//! Identity derivation for rate limiting.

use std::net::SocketAddr;

/// Identity used when a request carries no connection information at all.
/// Such requests share one bucket instead of being rejected.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Identity for an accepted connection: the remote IP without its port.
pub fn socket_identity(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_port_is_stripped() {
        let addr: SocketAddr = "203.0.113.7:443".parse().unwrap();
        assert_eq!(socket_identity(&addr), "203.0.113.7");
    }

    #[test]
    fn test_ipv6_port_is_stripped() {
        let addr: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        assert_eq!(socket_identity(&addr), "2001:db8::1");
    }

    #[test]
    fn test_ports_share_an_identity() {
        let first: SocketAddr = "10.0.0.1:5123".parse().unwrap();
        let second: SocketAddr = "10.0.0.1:6000".parse().unwrap();
        assert_eq!(socket_identity(&first), socket_identity(&second));
    }
}
