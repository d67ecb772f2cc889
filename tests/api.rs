use lan_dhcpd::acl::{AclEntry, Reservation};
use lan_dhcpd::address::HardwareAddress;
use lan_dhcpd::config::Config;
use lan_dhcpd::engine::ProtocolEngine;
use lan_dhcpd::leases::LeaseState;
use lan_dhcpd::web;
use lan_dhcpd::web::schemas::{AclView, LeaseView};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const MAC: &str = "aa:bb:cc:00:00:01";

fn mac() -> HardwareAddress {
    MAC.parse().unwrap()
}

fn engine() -> Arc<ProtocolEngine> {
    let config = Config {
        server_address: Ipv4Addr::new(10, 0, 0, 1),
        pool_start: Ipv4Addr::new(10, 0, 0, 2),
        pool_end: Ipv4Addr::new(10, 0, 0, 3),
        reservations: vec![Reservation {
            mac: "aa:bb:cc:00:00:09".parse().unwrap(),
            address: Ipv4Addr::new(10, 0, 0, 50),
        }],
        ..Default::default()
    };
    Arc::new(ProtocolEngine::create(
        &config,
        slog::Logger::root(slog::Discard, slog::o!()),
    ))
}

#[tokio::test]
async fn leases() {
    let dhcpd = engine();
    let owner = mac();
    let expiration = SystemTime::now() + Duration::from_secs(60);
    dhcpd
        .pool()
        .allocate(Ipv4Addr::UNSPECIFIED, owner, 7, expiration)
        .await
        .unwrap();
    let filter = web::filters(dhcpd);

    let res = warp::test::request()
        .method("GET")
        .path("/leases")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);

    let leases: Vec<LeaseView> = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].address, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(leases[0].mac, Some(owner));
    assert_eq!(leases[0].state, LeaseState::Offered);
    assert_eq!(leases[0].session_id, 7);
}

#[tokio::test]
async fn acl_entries_are_editable() {
    let dhcpd = engine();
    let filter = web::filters(dhcpd.clone());

    let res = warp::test::request()
        .method("PUT")
        .path(&format!("/acl/{}", MAC))
        .header("content-type", "application/json")
        .body(r#"{"deny": true}"#)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    let view: AclView = serde_json::from_slice(res.body()).unwrap();
    assert!(view.allow_any);
    assert_eq!(
        view.entries,
        vec![AclEntry {
            mac: mac(),
            deny: true,
        }]
    );
    assert!(!dhcpd.acl().is_allowed(&mac()).await);

    let res = warp::test::request()
        .method("GET")
        .path("/acl")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    let view: AclView = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(view.entries.len(), 1);

    let res = warp::test::request()
        .method("DELETE")
        .path(&format!("/acl/{}", MAC))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    assert!(dhcpd.acl().entries().await.is_empty());

    let res = warp::test::request()
        .method("DELETE")
        .path(&format!("/acl/{}", MAC))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn malformed_mac_is_rejected() {
    let filter = web::filters(engine());
    let res = warp::test::request()
        .method("PUT")
        .path("/acl/not-a-mac")
        .header("content-type", "application/json")
        .body(r#"{"deny": false}"#)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn default_policy_and_clear() {
    let dhcpd = engine();
    dhcpd.acl().add(mac(), false).await;
    let filter = web::filters(dhcpd.clone());

    let res = warp::test::request()
        .method("PUT")
        .path("/acl")
        .header("content-type", "application/json")
        .body(r#"{"allow_any": false}"#)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    assert!(!dhcpd.acl().allow_any().await);

    let res = warp::test::request()
        .method("DELETE")
        .path("/acl")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    let view: AclView = serde_json::from_slice(res.body()).unwrap();
    assert!(!view.allow_any);
    assert!(view.entries.is_empty());
}

#[tokio::test]
async fn reservations() {
    let filter = web::filters(engine());
    let res = warp::test::request()
        .method("GET")
        .path("/reservations")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), 200);
    let reservations: Vec<Reservation> = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].address, Ipv4Addr::new(10, 0, 0, 50));
}
