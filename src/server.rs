use crate::{config::DnsConfig, error::DnsError, handler::{DnsHandler, Transport}};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Receive buffer for one datagram; large enough for any DNS message
const UDP_BUFFER_SIZE: usize = 65535;

/// Both DNS listeners, bound to the same address.
pub struct Listeners {
    pub udp: UdpSocket,
    pub tcp: TcpListener,
}

impl Listeners {
    /// Bind UDP first, then TCP on the port UDP actually got, so that an
    /// ephemeral port (`:0`) yields one shared port for both transports.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let udp = UdpSocket::bind(addr).await?;
        let tcp = TcpListener::bind(udp.local_addr()?).await?;
        Ok(Self { udp, tcp })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }
}

/// Deadlines applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
}

impl From<&DnsConfig> for Deadlines {
    fn from(config: &DnsConfig) -> Self {
        Self {
            read: config.read_timeout,
            write: config.write_timeout,
        }
    }
}

/// Run both listeners until a shutdown signal arrives.
pub async fn run_dns_server(
    listeners: Listeners,
    handler: Arc<DnsHandler>,
    query_semaphore: Arc<Semaphore>,
    deadlines: Deadlines,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), DnsError> {
    let udp = run_udp_server(
        Arc::new(listeners.udp),
        handler.clone(),
        query_semaphore.clone(),
        deadlines,
        shutdown_tx.subscribe(),
    );
    let tcp = run_tcp_server(
        listeners.tcp,
        handler,
        query_semaphore,
        deadlines,
        shutdown_tx.subscribe(),
    );
    tokio::try_join!(udp, tcp)?;
    Ok(())
}

/// Run UDP server with graceful shutdown support
pub async fn run_udp_server(
    sock: Arc<UdpSocket>,
    handler: Arc<DnsHandler>,
    query_semaphore: Arc<Semaphore>,
    deadlines: Deadlines,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DnsError> {
    info!("UDP DNS server listening on {}", sock.local_addr()?);
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("UDP server received shutdown signal");
                break;
            }

            result = sock.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP errors from earlier sends surface here; keep serving
                        debug!("UDP receive error: {}", e);
                        continue;
                    }
                };

                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Max concurrent queries reached, dropping query from {}", src_addr);
                        continue;
                    }
                };

                let handler = handler.clone();
                let sock = sock.clone();
                let query_data = buf[..read_bytes].to_vec();

                tokio::spawn(async move {
                    let _permit = permit;
                    let Some(response) = handler.handle(&query_data, Transport::Udp).await else {
                        return;
                    };
                    match timeout(deadlines.write, sock.send_to(&response, src_addr)).await {
                        Ok(Ok(_)) => trace!("Sent {} bytes to {}", response.len(), src_addr),
                        Ok(Err(e)) => error!("Failed to send UDP response to {}: {}", src_addr, e),
                        Err(_) => warn!("UDP write to {} timed out", src_addr),
                    }
                });
            }
        }
    }

    info!("UDP server shutdown complete");
    Ok(())
}

/// Run TCP server with graceful shutdown support
pub async fn run_tcp_server(
    listener: TcpListener,
    handler: Arc<DnsHandler>,
    query_semaphore: Arc<Semaphore>,
    deadlines: Deadlines,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DnsError> {
    info!("TCP DNS server listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TCP server received shutdown signal");
                break;
            }

            result = listener.accept() => {
                let (stream, src_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept TCP connection: {}", e);
                        continue;
                    }
                };
                let handler = handler.clone();
                let query_semaphore = query_semaphore.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_tcp_connection(stream, src_addr, handler, query_semaphore, deadlines).await
                    {
                        debug!("TCP connection error from {}: {}", src_addr, e);
                    }
                });
            }
        }
    }

    info!("TCP server shutdown complete");
    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    handler: Arc<DnsHandler>,
    query_semaphore: Arc<Semaphore>,
    deadlines: Deadlines,
) -> Result<(), DnsError> {
    let mut length_buf = [0u8; 2];

    loop {
        // An idle connection is closed once the read deadline passes
        match timeout(deadlines.read, stream.read_exact(&mut length_buf)).await? {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("TCP connection closed by client {}", src_addr);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let message_length = u16::from_be_bytes(length_buf) as usize;
        let mut message = vec![0u8; message_length];
        timeout(deadlines.read, stream.read_exact(&mut message)).await??;

        let _permit = match query_semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Max concurrent queries reached, closing TCP connection from {}", src_addr);
                break;
            }
        };

        let Some(response) = handler.handle(&message, Transport::Tcp).await else {
            debug!("Closing TCP connection from {} after undecodable message", src_addr);
            break;
        };

        let response_length = u16::try_from(response.len())
            .map_err(|_| DnsError::Parse("response too large for TCP".to_string()))?;
        let mut frame = Vec::with_capacity(response.len() + 2);
        frame.extend_from_slice(&response_length.to_be_bytes());
        frame.extend_from_slice(&response);
        timeout(deadlines.write, async {
            stream.write_all(&frame).await?;
            stream.flush().await
        })
        .await??;
    }

    Ok(())
}
