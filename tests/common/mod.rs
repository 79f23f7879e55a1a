//! Shared helpers for the integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;
use zoneagent::{
    dns::{
        DNSPacket,
        edns::EdnsOpt,
        enums::{DNSResourceClass, DNSResourceType},
        header::DNSHeader,
        question::DNSQuestion,
    },
    forwarder::Forwarder,
    handler::DnsHandler,
    server::{Deadlines, Listeners, run_dns_server},
    zone::{LoadMode, Record, ZoneDocument, ZoneStore, load_document},
};

pub const EXAMPLE_SOA: &str = "ns1.example.com. hostmaster.example.com. 2024010101 7200 3600 1209600 300";

/// An IN record with a five minute TTL
pub fn record(name: &str, rtype: &str, data: &str) -> Record {
    Record::new(name, "IN", rtype, 300, data)
}

/// The example.com zone used across the tests: apex A, NS with glue, SOA.
pub fn example_zone() -> Vec<Record> {
    vec![
        record("example.com.", "SOA", EXAMPLE_SOA),
        record("example.com.", "A", "1.2.3.4"),
        record("example.com.", "NS", "ns1.example.com."),
        record("ns1.example.com.", "A", "5.6.7.8"),
    ]
}

pub fn document(zones: Vec<(&str, Vec<Record>)>) -> ZoneDocument {
    zones
        .into_iter()
        .map(|(apex, records)| (apex.to_string(), records))
        .collect()
}

pub fn store_with(zones: Vec<(&str, Vec<Record>)>) -> Arc<ZoneStore> {
    let store = Arc::new(ZoneStore::new());
    load_document(&store, &document(zones), LoadMode::FullReplace);
    store
}

pub fn create_test_query(id: u16, name: &str, qtype: DNSResourceType) -> DNSPacket {
    DNSPacket {
        header: DNSHeader {
            id,
            rd: true,
            ..DNSHeader::default()
        },
        questions: vec![DNSQuestion::new(name, qtype, DNSResourceClass::IN)],
        ..DNSPacket::default()
    }
}

pub fn create_edns_query(id: u16, name: &str, qtype: DNSResourceType, payload: u16) -> DNSPacket {
    let mut query = create_test_query(id, name, qtype);
    query.edns = Some(EdnsOpt::with_payload_size(payload));
    query
}

/// A running listener pair on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

pub async fn start_dns_server(store: Arc<ZoneStore>, forwarder: Forwarder) -> TestServer {
    start_dns_server_with(store, forwarder, false, false).await
}

pub async fn start_dns_server_with(
    store: Arc<ZoneStore>,
    forwarder: Forwarder,
    alias_fallback: bool,
    reject_edns: bool,
) -> TestServer {
    let listeners = Listeners::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listeners.local_addr().unwrap();
    let handler = Arc::new(DnsHandler::new(store, forwarder, alias_fallback, reject_edns));
    let (shutdown_tx, _) = broadcast::channel(1);
    let deadlines = Deadlines {
        read: Duration::from_secs(2),
        write: Duration::from_secs(2),
    };

    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = run_dns_server(listeners, handler, Arc::new(Semaphore::new(64)), deadlines, &tx).await;
    });
    // Let both accept loops subscribe and start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, shutdown_tx }
}

pub async fn udp_exchange(server: SocketAddr, query: &DNSPacket) -> DNSPacket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&query.serialize().unwrap(), server).await.unwrap();
    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf))
        .await
        .expect("UDP reply timed out")
        .unwrap();
    DNSPacket::parse(&buf[..len]).unwrap()
}

pub async fn tcp_exchange(server: SocketAddr, query: &DNSPacket) -> DNSPacket {
    let mut stream = TcpStream::connect(server).await.unwrap();
    write_frame(&mut stream, &query.serialize().unwrap()).await;
    DNSPacket::parse(&read_frame(&mut stream).await).unwrap()
}

pub async fn write_frame(stream: &mut TcpStream, message: &[u8]) {
    stream
        .write_all(&(message.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(message).await.unwrap();
}

pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len = [0u8; 2];
    timeout(Duration::from_secs(3), stream.read_exact(&mut len))
        .await
        .expect("TCP reply timed out")
        .unwrap();
    let mut message = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut message).await.unwrap();
    message
}

/// HTTP server publishing a zone document that tests can swap or break.
pub struct ZoneSource {
    pub url: String,
    pub document: Arc<Mutex<Option<ZoneDocument>>>,
}

impl ZoneSource {
    pub fn set(&self, document: ZoneDocument) {
        *self.document.lock() = Some(document);
    }

    /// Make the source answer 500 from now on
    pub fn fail(&self) {
        *self.document.lock() = None;
    }
}

async fn serve_document(
    State(document): State<Arc<Mutex<Option<ZoneDocument>>>>,
) -> axum::response::Response {
    let current = document.lock().clone();
    match current {
        Some(document) => Json(document).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn start_zone_source(document: ZoneDocument) -> ZoneSource {
    let shared = Arc::new(Mutex::new(Some(document)));
    let app = Router::new()
        .route("/zones.json", get(serve_document))
        .with_state(shared.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    ZoneSource {
        url: format!("http://{}/zones.json", addr),
        document: shared,
    }
}
