mod common;

use common::*;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use zoneagent::{
    dns::{
        DNSPacket,
        enums::{DNSResourceClass, DNSResourceType, ResponseCode},
        rdata::RData,
        resource::DNSResource,
    },
    error::DnsError,
    forwarder::Forwarder,
};

const UPSTREAM_ANSWER: Ipv4Addr = Ipv4Addr::new(7, 7, 7, 7);

/// What an upstream recursive server would send back
fn upstream_reply(query: &DNSPacket, truncated: bool) -> Vec<u8> {
    let mut reply = DNSPacket::reply_to(query);
    reply.header.aa = true;
    reply.header.ra = true;
    if truncated {
        reply.header.tc = true;
    } else {
        let name = &query.questions[0].name;
        reply.answers.push(DNSResource::new(
            name,
            DNSResourceType::A,
            DNSResourceClass::IN,
            60,
            RData::A(UPSTREAM_ANSWER),
        ));
    }
    reply.serialize().unwrap()
}

struct FakeUpstream {
    addr: SocketAddr,
    tcp_queries: Arc<AtomicUsize>,
}

/// UDP and TCP upstream on one port. With `truncate_udp` every datagram
/// reply has TC set and only TCP carries the answer.
async fn start_upstream(truncate_udp: bool, stray_first: bool) -> FakeUpstream {
    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = udp.local_addr().unwrap();
    let tcp = TcpListener::bind(addr).await.unwrap();
    let tcp_queries = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            let Ok((len, src)) = udp.recv_from(&mut buf).await else {
                break;
            };
            let Ok(query) = DNSPacket::parse(&buf[..len]) else {
                continue;
            };
            if stray_first {
                let mut stray = query.clone();
                stray.header.id = query.header.id.wrapping_add(1);
                let _ = udp.send_to(&upstream_reply(&stray, false), src).await;
            }
            let _ = udp.send_to(&upstream_reply(&query, truncate_udp), src).await;
        }
    });

    let counter = tcp_queries.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = tcp.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let query = DNSPacket::parse(&read_frame(&mut stream).await).unwrap();
            write_frame(&mut stream, &upstream_reply(&query, false)).await;
        }
    });

    FakeUpstream { addr, tcp_queries }
}

#[tokio::test]
async fn test_forward_over_udp() {
    let upstream = start_upstream(false, false).await;
    let forwarder = Forwarder::new(Some(upstream.addr), Duration::from_secs(2));
    let query = create_test_query(0x5150, "elsewhere.org.", DNSResourceType::A);

    let raw = forwarder.forward(&query.serialize().unwrap()).await.unwrap();
    let reply = DNSPacket::parse(&raw).unwrap();
    assert_eq!(reply.header.id, 0x5150);
    assert_eq!(reply.answers[0].rdata, RData::A(UPSTREAM_ANSWER));
    assert_eq!(upstream.tcp_queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_truncated_reply_retried_over_tcp() {
    let upstream = start_upstream(true, false).await;
    let forwarder = Forwarder::new(Some(upstream.addr), Duration::from_secs(2));
    let query = create_test_query(0x7070, "elsewhere.org.", DNSResourceType::A);

    let raw = forwarder.forward(&query.serialize().unwrap()).await.unwrap();
    let reply = DNSPacket::parse(&raw).unwrap();
    assert!(!reply.header.tc);
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(upstream.tcp_queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mismatched_datagram_ignored() {
    let upstream = start_upstream(false, true).await;
    let forwarder = Forwarder::new(Some(upstream.addr), Duration::from_secs(2));
    let query = create_test_query(0x0101, "elsewhere.org.", DNSResourceType::A);

    let raw = forwarder.forward(&query.serialize().unwrap()).await.unwrap();
    assert_eq!(DNSPacket::parse(&raw).unwrap().header.id, 0x0101);
}

#[tokio::test]
async fn test_unreachable_upstream_fails() {
    // Reserve a port, then free it so nothing answers there
    let addr = UdpSocket::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let forwarder = Forwarder::new(Some(addr), Duration::from_millis(500));
    let query = create_test_query(9, "elsewhere.org.", DNSResourceType::A);

    let result = forwarder.forward(&query.serialize().unwrap()).await;
    assert!(matches!(result, Err(DnsError::Io(_)) | Err(DnsError::Timeout)));
}

#[tokio::test]
async fn test_server_relays_upstream_reply_without_authority() {
    let upstream = start_upstream(false, false).await;
    let server = start_dns_server(
        store_with(vec![("example.com.", example_zone())]),
        Forwarder::new(Some(upstream.addr), Duration::from_secs(2)),
    )
    .await;

    let reply = udp_exchange(
        server.addr,
        &create_test_query(0x2222, "elsewhere.org.", DNSResourceType::A),
    )
    .await;
    assert_eq!(reply.header.id, 0x2222);
    assert_eq!(reply.answers[0].rdata, RData::A(UPSTREAM_ANSWER));
    assert!(!reply.header.aa);
    assert!(!reply.header.ra);

    // Names inside our zones without data are relayed as well
    let reply = tcp_exchange(
        server.addr,
        &create_test_query(0x2223, "missing.example.com.", DNSResourceType::A),
    )
    .await;
    assert_eq!(reply.rcode(), Some(ResponseCode::NoError));
    assert_eq!(reply.answers[0].rdata, RData::A(UPSTREAM_ANSWER));

    // Local data is still authoritative
    let reply = udp_exchange(server.addr, &create_test_query(0x2224, "example.com.", DNSResourceType::A)).await;
    assert!(reply.header.aa);
    assert_eq!(reply.answers[0].rdata, RData::A(Ipv4Addr::new(1, 2, 3, 4)));
}

#[tokio::test]
async fn test_server_answers_servfail_when_upstream_silent() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server = start_dns_server(
        store_with(vec![("example.com.", example_zone())]),
        Forwarder::new(Some(silent.local_addr().unwrap()), Duration::from_millis(300)),
    )
    .await;

    let reply = udp_exchange(
        server.addr,
        &create_test_query(0x3333, "elsewhere.org.", DNSResourceType::A),
    )
    .await;
    assert_eq!(reply.rcode(), Some(ResponseCode::ServerFailure));
    assert!(reply.answers.is_empty());
}
