use crate::nat::addresses::outbound_ip_towards;
use std::net::Ipv4Addr;

#[test]
fn test_outbound_ip_towards_loopback() {
    let ip = outbound_ip_towards("127.0.0.1:9".parse().unwrap()).unwrap();
    assert_eq!(ip, Ipv4Addr::LOCALHOST);
}

#[test]
fn test_outbound_ip_towards_ipv6_target_fails() {
    // An IPv4 socket cannot reach an IPv6 target
    assert!(outbound_ip_towards("[::1]:9".parse().unwrap()).is_err());
}
