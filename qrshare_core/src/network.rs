//! Local address and port discovery.

use crate::error::SetupError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

/// Address the share server binds to: all interfaces
pub const BIND_ALL: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Determine the IP other devices should use to reach us.
///
/// With an interface hint the first IPv4 address of that interface is
/// returned. Otherwise a LAN address is chosen, falling back to the address
/// of the default route.
pub fn resolve_ip(interface: Option<&str>) -> Result<IpAddr, SetupError> {
    let interfaces = local_ip_address::list_afinet_netifas().unwrap_or_else(|e| {
        tracing::warn!("Cannot list network interfaces: {}", e);
        Vec::new()
    });

    if let Some(name) = interface {
        return ip_for_interface(name, &interfaces)
            .ok_or_else(|| SetupError::InterfaceNotFound(name.to_string()));
    }

    if let Some(ip) = pick_lan_ip(&interfaces) {
        return Ok(ip);
    }

    match local_ip_address::local_ip() {
        Ok(ip) if !ip.is_loopback() => Ok(ip),
        _ => Err(SetupError::NoNetworkInterface),
    }
}

/// First IPv4 address of the named interface
pub fn ip_for_interface(name: &str, interfaces: &[(String, IpAddr)]) -> Option<IpAddr> {
    interfaces
        .iter()
        .find(|(iface, ip)| iface == name && ip.is_ipv4())
        .map(|(_, ip)| *ip)
}

/// Best LAN IPv4 address, prioritizing 192.168.x.x, then 10.x.x.x, then 172.x.x.x
pub fn pick_lan_ip(interfaces: &[(String, IpAddr)]) -> Option<IpAddr> {
    let mut best: Option<(u8, IpAddr)> = None;
    for (_name, ip) in interfaces {
        let IpAddr::V4(v4) = ip else { continue };
        if v4.is_loopback() || v4.is_unspecified() || v4.is_link_local() {
            continue;
        }
        let rank = match v4.octets() {
            [192, 168, ..] => 0,
            [10, ..] => 1,
            [172, ..] => 2,
            _ => 3,
        };
        if best.is_none_or(|(current, _)| rank < current) {
            best = Some((rank, *ip));
        }
    }
    best.map(|(_, ip)| ip)
}

/// Ask the OS for an ephemeral port that is currently free on all interfaces
pub fn find_free_port() -> Result<u16, SetupError> {
    let listener =
        TcpListener::bind(SocketAddr::new(BIND_ALL, 0)).map_err(SetupError::NoFreePort)?;
    let port = listener
        .local_addr()
        .map_err(SetupError::NoFreePort)?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ifaces(list: &[(&str, &str)]) -> Vec<(String, IpAddr)> {
        list.iter()
            .map(|(name, ip)| (name.to_string(), ip.parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_lan_priority() {
        let list = ifaces(&[
            ("lo", "127.0.0.1"),
            ("docker0", "172.17.0.1"),
            ("eth0", "10.0.0.5"),
            ("wlan0", "192.168.1.42"),
        ]);
        assert_eq!(pick_lan_ip(&list), Some("192.168.1.42".parse().unwrap()));

        let list = ifaces(&[("docker0", "172.17.0.1"), ("eth0", "10.0.0.5")]);
        assert_eq!(pick_lan_ip(&list), Some("10.0.0.5".parse().unwrap()));

        let list = ifaces(&[("vpn", "100.64.0.2"), ("docker0", "172.17.0.1")]);
        assert_eq!(pick_lan_ip(&list), Some("172.17.0.1".parse().unwrap()));
    }

    #[test]
    fn test_no_usable_address() {
        let list = ifaces(&[("lo", "127.0.0.1"), ("eth0", "fe80::1"), ("x", "169.254.3.3")]);
        assert_eq!(pick_lan_ip(&list), None);
    }

    #[test]
    fn test_interface_lookup() {
        let list = ifaces(&[("eth0", "fe80::1"), ("eth0", "10.1.2.3"), ("wlan0", "192.168.0.9")]);
        assert_eq!(ip_for_interface("eth0", &list), Some("10.1.2.3".parse().unwrap()));
        assert_eq!(ip_for_interface("missing", &list), None);
    }

    #[test]
    fn test_unknown_interface_hint_fails() {
        let err = resolve_ip(Some("definitely-not-an-interface0")).unwrap_err();
        assert!(matches!(err, SetupError::InterfaceNotFound(name) if name == "definitely-not-an-interface0"));
    }

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert_ne!(port, 0);
    }
}
