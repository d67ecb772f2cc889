use lan_dhcpd::address::HardwareAddress;
use lan_dhcpd::config::Config;
use lan_dhcpd::engine::ProtocolEngine;
use lan_dhcpd::leases::LeaseState;
use lan_dhcpd::message::{DhcpMessage, MessageType, Operation, OptionCode};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const FIRST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const SECOND: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

fn mac(last: u8) -> HardwareAddress {
    HardwareAddress::new([0xaa, 0xbb, 0xcc, 0x00, 0x00, last])
}

fn message(kind: MessageType, client: HardwareAddress, xid: u32) -> DhcpMessage {
    let mut message = DhcpMessage::new(Operation::BootRequest);
    message.session_id = xid;
    message.set_client_hardware(&client.octets());
    message
        .add_option(OptionCode::MessageType, vec![kind as u8])
        .unwrap();
    message
}

/// Sends through the wire codec so the scenario covers encode and decode too.
async fn exchange(engine: &ProtocolEngine, request: &DhcpMessage, now: SystemTime) -> Option<DhcpMessage> {
    let request = DhcpMessage::decode(&request.encode()).unwrap();
    let reply = engine.handle(&request, now).await?;
    Some(DhcpMessage::decode(&reply.encode()).unwrap())
}

fn engine() -> ProtocolEngine {
    let config = Config {
        server_address: SERVER,
        pool_start: FIRST,
        pool_end: SECOND,
        gateway: SERVER,
        allow_any: true,
        ..Default::default()
    };
    config.validate().unwrap();
    ProtocolEngine::create(&config, slog::Logger::root(slog::Discard, slog::o!()))
}

#[tokio::test]
async fn two_address_pool_lifecycle() {
    let engine = engine();
    let now = SystemTime::now();

    let offer = exchange(&engine, &message(MessageType::Discover, mac(1), 1), now)
        .await
        .unwrap();
    assert_eq!(offer.message_type(), Some(MessageType::Offer));
    assert_eq!(offer.assigned_address, FIRST);

    let offer = exchange(&engine, &message(MessageType::Discover, mac(2), 2), now)
        .await
        .unwrap();
    assert_eq!(offer.message_type(), Some(MessageType::Offer));
    assert_eq!(offer.assigned_address, SECOND);

    // Exhausted: anything but an OFFER.
    let reply = exchange(&engine, &message(MessageType::Discover, mac(3), 3), now).await;
    assert!(reply
        .map(|reply| reply.message_type() != Some(MessageType::Offer))
        .unwrap_or(true));

    let mut request = message(MessageType::Request, mac(1), 1);
    request
        .add_option(OptionCode::AddressRequest, FIRST.octets().to_vec())
        .unwrap();
    request
        .add_option(OptionCode::ServerIdentifier, SERVER.octets().to_vec())
        .unwrap();
    let ack = exchange(&engine, &request, now).await.unwrap();
    assert_eq!(ack.message_type(), Some(MessageType::Ack));
    assert_eq!(ack.assigned_address, FIRST);
    assert_eq!(ack.requested_lease_time(), Some(86400));
    assert_eq!(engine.pool().state(FIRST).await, Some(LeaseState::Bound));

    let bound = engine.pool().active_leases().await;
    let lease = bound.iter().find(|lease| lease.address == FIRST).unwrap();
    assert_eq!(lease.expiration, now + Duration::from_secs(86400));

    // Reclaiming right away only drops the unanswered offer for the second client.
    let reclaimed = engine.reclaim(now + Duration::from_secs(1)).await;
    assert_eq!(reclaimed, vec![SECOND]);
    assert_eq!(engine.pool().state(FIRST).await, Some(LeaseState::Bound));

    let later = now + Duration::from_secs(86400 + 1);
    assert_eq!(engine.reclaim(later).await, vec![FIRST]);
    assert_eq!(engine.pool().state(FIRST).await, Some(LeaseState::Free));
    assert_eq!(engine.pool().free_count().await, 2);
}

#[tokio::test]
async fn denied_client_is_ignored_until_entry_removed() {
    let engine = engine();
    let now = SystemTime::now();
    engine.acl().add(mac(1), true).await;

    assert!(exchange(&engine, &message(MessageType::Discover, mac(1), 1), now)
        .await
        .is_none());

    engine.acl().remove(&mac(1)).await;
    let offer = exchange(&engine, &message(MessageType::Discover, mac(1), 1), now)
        .await
        .unwrap();
    assert_eq!(offer.assigned_address, FIRST);
}
