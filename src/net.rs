//! Network services on top of the embassy-net stack: HTTP upload over TCP and
//! SNTP time queries over UDP

use crate::http::{self, UploadUrl};
use crate::sntp;
use crate::time::WallClock;
use crate::uplink::Transport;
use crate::{BoardError, config};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use embassy_time::{Duration, with_timeout};

const TCP_RX_BUFFER: usize = 1024;
const TCP_TX_BUFFER: usize = 4096;

/// Local UDP port for SNTP queries
const SNTP_LOCAL_PORT: u16 = 50123;

/// Resolve `host` as an IPv4 literal or through DNS
pub async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, BoardError> {
    if let Ok(ip) = host.parse::<Ipv4Address>() {
        return Ok(IpAddress::Ipv4(ip));
    }

    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|e| {
            log::warn!("[DNS] Lookup of {} failed: {:?}", host, e);
            BoardError::DnsError
        })?;
    addrs.first().copied().ok_or(BoardError::DnsError)
}

/// One TCP connection per upload, closed after the status line
pub struct TcpTransport<'a> {
    stack: Stack<'a>,
    rx_buffer: [u8; TCP_RX_BUFFER],
    tx_buffer: [u8; TCP_TX_BUFFER],
}

impl<'a> TcpTransport<'a> {
    pub fn new(stack: Stack<'a>) -> Self {
        Self {
            stack,
            rx_buffer: [0; TCP_RX_BUFFER],
            tx_buffer: [0; TCP_TX_BUFFER],
        }
    }
}

impl Transport for TcpTransport<'_> {
    async fn post_json(&mut self, url: &UploadUrl<'_>, body: &[u8]) -> Result<u16, BoardError> {
        let address = resolve(self.stack, url.host).await?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);
        socket.set_timeout(Some(Duration::from_millis(config::HTTP_TIMEOUT_MS)));

        socket
            .connect(IpEndpoint::new(address, url.port))
            .await
            .map_err(|e| {
                log::warn!("[HTTP] Connect to {}:{} failed: {:?}", address, url.port, e);
                BoardError::ConnectError
            })?;

        let result = http::post(&mut socket, url, body).await;

        socket.close();
        let _ = socket.flush().await;
        result
    }
}

/// Query the configured NTP server and set `clock`. Returns the unix time.
pub async fn sync_time(stack: Stack<'_>, clock: &mut WallClock) -> Result<u64, BoardError> {
    let server = resolve(stack, config::NTP_SERVER).await?;

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(SNTP_LOCAL_PORT).map_err(|e| {
        log::warn!("[NTP] Failed to bind UDP port {}: {:?}", SNTP_LOCAL_PORT, e);
        BoardError::TimeSyncError
    })?;

    socket
        .send_to(&sntp::build_request(), IpEndpoint::new(server, sntp::NTP_PORT))
        .await
        .map_err(|e| {
            log::warn!("[NTP] Send failed: {:?}", e);
            BoardError::TimeSyncError
        })?;

    let mut reply = [0u8; 64];
    let (len, _) = with_timeout(
        Duration::from_millis(config::NTP_TIMEOUT_MS),
        socket.recv_from(&mut reply),
    )
    .await
    .map_err(|_| BoardError::Timeout)?
    .map_err(|_| BoardError::TimeSyncError)?;

    let unix = sntp::parse_response(&reply[..len])?;
    if !clock.set_unix_time(unix) {
        return Err(BoardError::TimeSyncError);
    }
    log::info!("[NTP] ✅ Clock synchronized: {}", unix);
    Ok(unix)
}
