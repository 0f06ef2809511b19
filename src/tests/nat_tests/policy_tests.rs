use super::helpers::{wait_until, MockGateway, MockMetrics};
use crate::nat::*;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn config() -> MapperConfig {
    MapperConfig {
        refresh_interval: Duration::from_secs(3600),
        lease: Duration::from_secs(7200),
    }
}

fn request() -> PortMappingRequest {
    PortMappingRequest::same_port(IpProtocol::TCP, 9000, "node")
}

#[tokio::test]
async fn test_directly_reachable_node_maps_nothing() {
    let ip: IpAddr = "203.0.113.7".parse().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let metrics = Arc::new(MockMetrics::new());

    let handle = resolve_port_mapping(ip, ip, gateway.clone(), request(), config(), metrics.clone());
    assert!(handle.is_noop());

    handle.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.stop().await;

    assert!(gateway.calls().is_empty());
    assert_eq!(metrics.success_count(), 0);
    assert_eq!(metrics.failure_count(), 0);
}

#[tokio::test]
async fn test_node_behind_nat_starts_mapping() {
    let public: IpAddr = "203.0.113.7".parse().unwrap();
    let outbound: IpAddr = "192.168.1.10".parse().unwrap();
    let gateway = Arc::new(MockGateway::new());
    let metrics = Arc::new(MockMetrics::new());

    let handle = resolve_port_mapping(public, outbound, gateway.clone(), request(), config(), metrics.clone());
    assert!(!handle.is_noop());

    wait_until(|| metrics.success_count() == 1).await;
    handle.stop().await;

    assert_eq!(gateway.adds(), 1);
    assert_eq!(gateway.deletes(), 1);
}
