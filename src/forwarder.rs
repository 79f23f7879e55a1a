//! Single-hop relay of unanswerable queries to the configured upstream.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::dns::header::{flags, wire_flag, wire_id};
use crate::error::{DnsError, Result};

/// Largest datagram accepted from the upstream
const MAX_UDP_REPLY: usize = 65535;

#[derive(Debug, Clone)]
pub struct Forwarder {
    upstream: Option<SocketAddr>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(upstream: Option<SocketAddr>, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> Option<SocketAddr> {
        self.upstream
    }

    /// Send `query` upstream over UDP and return the raw reply. A truncated
    /// reply is replaced by one fetched over TCP. The whole exchange is
    /// bounded by the upstream timeout.
    pub async fn forward(&self, query: &[u8]) -> Result<Vec<u8>> {
        let upstream = self.upstream.ok_or(DnsError::NoUpstream)?;
        let id = wire_id(query)
            .ok_or_else(|| DnsError::Parse("query shorter than a message ID".to_string()))?;

        let exchange = async {
            let reply = send_udp_query(query, id, upstream).await?;
            if wire_flag(&reply, flags::TC) {
                debug!("UDP reply from {} truncated, retrying with TCP", upstream);
                send_tcp_query(query, id, upstream).await
            } else {
                Ok(reply)
            }
        };

        timeout(self.timeout, exchange).await?
    }
}

async fn send_udp_query(query: &[u8], id: u16, upstream: SocketAddr) -> Result<Vec<u8>> {
    let local: SocketAddr = match upstream.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(upstream).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_UDP_REPLY];
    loop {
        let len = socket.recv(&mut buf).await?;
        // Ignore stray datagrams that do not answer this query
        if wire_id(&buf[..len]) == Some(id) {
            trace!("UDP reply from {}: {} bytes", upstream, len);
            buf.truncate(len);
            return Ok(buf);
        }
        debug!("Discarding mismatched UDP reply from {}", upstream);
    }
}

async fn send_tcp_query(query: &[u8], id: u16, upstream: SocketAddr) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(upstream).await?;

    let query_length = u16::try_from(query.len())
        .map_err(|_| DnsError::Parse("query too large for TCP".to_string()))?;
    stream.write_all(&query_length.to_be_bytes()).await?;
    stream.write_all(query).await?;
    stream.flush().await?;

    let mut length_buf = [0u8; 2];
    stream.read_exact(&mut length_buf).await?;
    let response_length = u16::from_be_bytes(length_buf) as usize;

    let mut response = vec![0u8; response_length];
    stream.read_exact(&mut response).await?;
    trace!("TCP reply from {}: {} bytes", upstream, response_length);

    if wire_id(&response) != Some(id) {
        return Err(DnsError::UpstreamMismatch(format!(
            "TCP reply from {} carries a different ID",
            upstream
        )));
    }
    Ok(response)
}
