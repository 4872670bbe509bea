//! End-to-end tests over real UDP sockets on 127.0.0.1.
//!
//! A small fake gateway answers the handshake, heartbeats, tunneling
//! requests and the disconnect, so no KNX hardware or simulator is needed.
//!
//! ```bash
//! cargo test --test loopback_test
//! ```

use knx_tunnel::protocol::cemi::Cemi;
use knx_tunnel::protocol::frame::Hpai;
use knx_tunnel::protocol::services::TunnelingPayload;
use knx_tunnel::{
    CemiMessageCode, DriverConfig, DriverEvent, GroupAddress, KnxIpDriver, Packet,
    PhysicalAddress, Telegram,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

const CHANNEL: u8 = 21;
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Packets the fake gateway received
type Received = Arc<Mutex<Vec<Packet>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn reply(socket: &UdpSocket, packet: &Packet, to: SocketAddr) {
    let bytes = packet.to_bytes().expect("encode reply");
    socket.send_to(&bytes, to).await.expect("send reply");
}

/// Bind the fake gateway and serve until the test ends
async fn spawn_gateway() -> (SocketAddrV4, Received, tokio::sync::mpsc::UnboundedSender<Cemi>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind gateway");
    let SocketAddr::V4(address) = socket.local_addr().expect("gateway address") else {
        panic!("gateway bound to IPv6");
    };
    let received = Received::default();
    let (inject, mut injected) = tokio::sync::mpsc::unbounded_channel::<Cemi>();

    let log = Arc::clone(&received);
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let mut data_peer = None;
        let mut sequence = 0u8;
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let Ok((len, from)) = received else { return };
                    let Ok(packet) = Packet::decode(&buf[..len]) else { continue };
                    log.lock().unwrap().push(packet.clone());
                    match packet {
                        Packet::ConnectRequest { .. } => {
                            let response = Packet::ConnectResponse {
                                channel_id: CHANNEL,
                                status: 0,
                                data_endpoint: Some(Hpai::from(address)),
                                assigned_address: Some(PhysicalAddress::new(1, 1, 250).unwrap()),
                            };
                            reply(&socket, &response, from).await;
                        }
                        Packet::ConnectionStateRequest { channel_id, .. } => {
                            let response = Packet::ConnectionStateResponse { channel_id, status: 0 };
                            reply(&socket, &response, from).await;
                        }
                        Packet::DisconnectRequest { channel_id, .. } => {
                            let response = Packet::DisconnectResponse { channel_id, status: 0 };
                            reply(&socket, &response, from).await;
                        }
                        Packet::TunnelingRequest {
                            channel_id,
                            sequence: seq,
                            payload: TunnelingPayload::Cemi(cemi),
                        } => {
                            data_peer = Some(from);
                            let ack = Packet::TunnelingAck { channel_id, sequence: seq, status: 0 };
                            reply(&socket, &ack, from).await;
                            if cemi.message_code() == CemiMessageCode::LDataReq {
                                // bus confirmation of the request
                                let con = Cemi::new(CemiMessageCode::LDataCon, cemi.telegram().clone());
                                reply(&socket, &Packet::tunneling_request(channel_id, seq, con), from).await;
                            }
                        }
                        _ => {}
                    }
                }
                Some(cemi) = injected.recv() => {
                    // goes to the data endpoint the driver last used
                    if let Some(to) = data_peer {
                        reply(&socket, &Packet::tunneling_request(CHANNEL, sequence, cemi), to).await;
                        sequence = sequence.wrapping_add(1);
                    }
                }
            }
        }
    });

    (address, received, inject)
}

fn config(gateway: SocketAddrV4) -> DriverConfig {
    DriverConfig::new(*gateway.ip())
        .with_remote_port(gateway.port())
        .with_local_address(Ipv4Addr::LOCALHOST)
        .with_retry_interval(Duration::from_millis(200))
}

#[tokio::test]
async fn test_loopback_session() {
    init_logging();
    println!("\n=== Test: Loopback Session ===");

    let (gateway, received, inject) = spawn_gateway().await;
    let driver = KnxIpDriver::new(config(gateway));
    let mut events = driver.subscribe();

    tokio::time::timeout(TEST_TIMEOUT, async {
        driver.connect().await.expect("connect");
        assert!(driver.is_connected());
        println!("✓ Connected to {}", gateway);

        let telegram = Telegram::group_write(GroupAddress::new(1, 2, 3).unwrap(), &[1]).unwrap();
        driver.send(telegram).await.expect("send");
        println!("✓ Group write acknowledged and confirmed");

        // inbound telegram from the bus
        let bus = Telegram::group_write(GroupAddress::new(4, 5, 6).unwrap(), &[0x0C, 0x1A])
            .unwrap()
            .with_origin(PhysicalAddress::new(1, 1, 7).unwrap());
        inject.send(Cemi::new(CemiMessageCode::LDataInd, bus)).unwrap();

        loop {
            match events.recv().await.expect("event stream") {
                DriverEvent::Message(message) => {
                    assert_eq!(message.destination(), Some(GroupAddress::new(4, 5, 6).unwrap()));
                    assert_eq!(message.data(), &[0x0C, 0x1A]);
                    break;
                }
                _ => continue,
            }
        }
        println!("✓ Bus telegram delivered");

        driver.disconnect().await.expect("disconnect");
        assert!(!driver.is_connected());
        println!("✓ Disconnected");
    })
    .await
    .expect("loopback session timed out");

    let received = received.lock().unwrap();
    let services: Vec<String> = received.iter().map(|p| p.service_name().to_string()).collect();
    println!("Gateway received: {services:?}");

    assert!(matches!(received.first(), Some(Packet::ConnectRequest { .. })));
    assert!(received.iter().any(|packet| matches!(
        packet,
        Packet::TunnelingRequest { channel_id: CHANNEL, payload: TunnelingPayload::Cemi(cemi), .. }
            if cemi.message_code() == CemiMessageCode::LDataReq
                && cemi.telegram().destination() == Some(GroupAddress::new(1, 2, 3).unwrap())
    )));
    assert!(matches!(received.last(), Some(Packet::DisconnectRequest { channel_id: CHANNEL, .. })));
}

#[tokio::test]
async fn test_loopback_no_gateway() {
    init_logging();
    println!("\n=== Test: Connect Without Gateway ===");

    // bound but silent
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let SocketAddr::V4(address) = silent.local_addr().unwrap() else {
        panic!("bound to IPv6");
    };
    let driver = KnxIpDriver::new(
        config(address)
            .with_retry_interval(Duration::from_millis(50))
            .with_max_repeats(2)
            .unwrap(),
    );

    let result = tokio::time::timeout(TEST_TIMEOUT, driver.connect())
        .await
        .expect("connect did not give up");
    let Err(knx_tunnel::KnxError::Connection(e)) = result else {
        panic!("expected connection error, got {result:?}");
    };
    assert!(e.is_timeout());
    assert!(!driver.is_connected());
    println!("✓ Gave up after 2 attempts");
}
