mod common;

use common::*;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use zoneagent::{
    dns::{
        DNSPacket,
        enums::{DNSResourceType, ResponseCode},
        rdata::RData,
    },
    forwarder::Forwarder,
};

fn no_recursion() -> Forwarder {
    Forwarder::new(None, Duration::from_secs(1))
}

#[tokio::test]
async fn test_udp_and_tcp_serve_the_same_answer() {
    let server = start_dns_server(store_with(vec![("example.com.", example_zone())]), no_recursion()).await;
    let query = create_test_query(0x1111, "example.com.", DNSResourceType::A);

    for reply in [
        udp_exchange(server.addr, &query).await,
        tcp_exchange(server.addr, &query).await,
    ] {
        assert_eq!(reply.header.id, 0x1111);
        assert!(reply.header.aa);
        assert_eq!(reply.answers[0].rdata, RData::A(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(reply.authorities[0].rdata, RData::NS("ns1.example.com.".to_string()));
        assert_eq!(reply.resources[0].rdata, RData::A(Ipv4Addr::new(5, 6, 7, 8)));
    }
}

#[tokio::test]
async fn test_nxdomain_and_refused_over_udp() {
    let server = start_dns_server(store_with(vec![("example.com.", example_zone())]), no_recursion()).await;

    let reply = udp_exchange(
        server.addr,
        &create_test_query(1, "missing.example.com.", DNSResourceType::A),
    )
    .await;
    assert_eq!(reply.rcode(), Some(ResponseCode::NameError));
    assert_eq!(reply.authorities[0].rtype, DNSResourceType::SOA);

    let reply = udp_exchange(server.addr, &create_test_query(2, "example.org.", DNSResourceType::A)).await;
    assert_eq!(reply.rcode(), Some(ResponseCode::Refused));
    assert!(reply.answers.is_empty());
}

#[tokio::test]
async fn test_tcp_connection_serves_several_queries() {
    let server = start_dns_server(store_with(vec![("example.com.", example_zone())]), no_recursion()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    for (id, name) in [(10, "example.com."), (11, "ns1.example.com."), (12, "missing.example.com.")] {
        let query = create_test_query(id, name, DNSResourceType::A);
        write_frame(&mut stream, &query.serialize().unwrap()).await;
        let reply = DNSPacket::parse(&read_frame(&mut stream).await).unwrap();
        assert_eq!(reply.header.id, id);
    }
}

#[tokio::test]
async fn test_large_reply_truncated_over_udp_only() {
    let mut records = example_zone();
    records.extend((0..40).map(|i| {
        record(
            "big.example.com.",
            "TXT",
            &format!("\"entry {} {}\"", i, "y".repeat(40)),
        )
    }));
    let server = start_dns_server(store_with(vec![("example.com.", records)]), no_recursion()).await;

    let plain = create_test_query(20, "big.example.com.", DNSResourceType::TXT);
    let reply = udp_exchange(server.addr, &plain).await;
    assert!(reply.header.tc);
    assert!(reply.answers.is_empty());

    // A large enough EDNS buffer avoids truncation
    let edns = create_edns_query(21, "big.example.com.", DNSResourceType::TXT, 4096);
    let reply = udp_exchange(server.addr, &edns).await;
    assert!(!reply.header.tc);
    assert_eq!(reply.answers.len(), 40);
    assert!(reply.edns.is_some());

    let reply = tcp_exchange(server.addr, &plain).await;
    assert!(!reply.header.tc);
    assert_eq!(reply.answers.len(), 40);
}

#[tokio::test]
async fn test_reply_larger_than_tcp_frame_is_truncated() {
    let mut records = example_zone();
    records.extend((0..300).map(|i| {
        record(
            "big.example.com.",
            "TXT",
            &format!("\"{:03} {}\"", i, "t".repeat(240)),
        )
    }));
    let server = start_dns_server(store_with(vec![("example.com.", records)]), no_recursion()).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let query = create_test_query(0x6464, "big.example.com.", DNSResourceType::TXT);
    write_frame(&mut stream, &query.serialize().unwrap()).await;
    let reply = DNSPacket::parse(&read_frame(&mut stream).await).unwrap();
    assert_eq!(reply.header.id, 0x6464);
    assert!(reply.header.tc);
    assert!(reply.answers.is_empty());

    // The connection stays open for further queries
    let query = create_test_query(0x6465, "example.com.", DNSResourceType::A);
    write_frame(&mut stream, &query.serialize().unwrap()).await;
    let reply = DNSPacket::parse(&read_frame(&mut stream).await).unwrap();
    assert_eq!(reply.header.id, 0x6465);
    assert_eq!(reply.answers.len(), 1);
}

#[tokio::test]
async fn test_garbage_datagram_is_ignored() {
    let server = start_dns_server(store_with(vec![("example.com.", example_zone())]), no_recursion()).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0xde, 0xad, 0xbe], server.addr).await.unwrap();

    let mut buf = [0u8; 512];
    let silent = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(silent.is_err(), "no reply expected for an undecodable datagram");

    // Still serving afterwards
    let reply = udp_exchange(server.addr, &create_test_query(30, "example.com.", DNSResourceType::A)).await;
    assert_eq!(reply.answers.len(), 1);
}

#[tokio::test]
async fn test_edns_rejection_toggle() {
    let server = start_dns_server_with(
        store_with(vec![("example.com.", example_zone())]),
        no_recursion(),
        false,
        true,
    )
    .await;

    let reply = udp_exchange(
        server.addr,
        &create_edns_query(40, "example.com.", DNSResourceType::A, 1232),
    )
    .await;
    assert_eq!(reply.rcode(), Some(ResponseCode::NotImplemented));
    assert!(reply.answers.is_empty());

    let reply = udp_exchange(server.addr, &create_test_query(41, "example.com.", DNSResourceType::A)).await;
    assert_eq!(reply.rcode(), Some(ResponseCode::NoError));
}

#[tokio::test]
async fn test_shutdown_stops_listeners() {
    let server = start_dns_server(store_with(vec![("example.com.", example_zone())]), no_recursion()).await;
    let addr = server.addr;
    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The TCP listener is gone once its accept loop exits
    assert!(TcpStream::connect(addr).await.is_err());
}
