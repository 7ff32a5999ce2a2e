//! Minimal HTTP/1.1 client pieces for the frame upload
//!
//! Only what the collector needs: one `POST` with a JSON body over a fresh
//! connection, and the status code of the reply.

use crate::BoardError;
use core::fmt::Write as _;
use embedded_io_async::{Read, Write};
use heapless::String;

/// Longest status line we bother to read
const STATUS_LINE_MAX: usize = 128;

/// Request head buffer
const REQUEST_HEAD_MAX: usize = 512;

/// Parsed `http://host[:port]/path` collector address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> UploadUrl<'a> {
    /// Parse a plain-HTTP URL. `https` and other schemes are rejected.
    pub fn parse(url: &'a str) -> Result<Self, BoardError> {
        let rest = url.trim().strip_prefix("http://").ok_or_else(|| {
            log::error!("[HTTP] Unsupported upload URL (only http:// is supported): {}", url);
            BoardError::ConfigError
        })?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| BoardError::ConfigError)?;
                (host, port)
            }
            None => (authority, 80),
        };

        if host.is_empty() || port == 0 {
            return Err(BoardError::ConfigError);
        }

        Ok(Self { host, port, path })
    }
}

/// Write the request head and `body`
pub async fn write_post_request<W: Write>(
    out: &mut W,
    url: &UploadUrl<'_>,
    body: &[u8],
) -> Result<(), BoardError> {
    let mut head: String<REQUEST_HEAD_MAX> = String::new();
    write!(
        head,
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        url.path,
        url.host,
        body.len()
    )
    .map_err(|_| BoardError::ConfigError)?;

    out.write_all(head.as_bytes())
        .await
        .map_err(|_| BoardError::HttpError)?;
    out.write_all(body).await.map_err(|_| BoardError::HttpError)?;
    out.flush().await.map_err(|_| BoardError::HttpError)
}

/// Read the status line and return the status code
pub async fn read_status_code<R: Read>(input: &mut R) -> Result<u16, BoardError> {
    let mut line = [0u8; STATUS_LINE_MAX];
    let mut len = 0;

    let end = loop {
        if let Some(pos) = line[..len].windows(2).position(|w| w == b"\r\n") {
            break pos;
        }
        if len == line.len() {
            log::warn!("[HTTP] Status line too long");
            return Err(BoardError::HttpError);
        }
        let n = input
            .read(&mut line[len..])
            .await
            .map_err(|_| BoardError::HttpError)?;
        if n == 0 {
            log::warn!("[HTTP] Connection closed before status line");
            return Err(BoardError::HttpError);
        }
        len += n;
    };

    parse_status_line(&line[..end])
}

fn parse_status_line(line: &[u8]) -> Result<u16, BoardError> {
    let line = core::str::from_utf8(line).map_err(|_| BoardError::HttpError)?;
    let mut parts = line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(BoardError::HttpError);
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..600).contains(code))
        .ok_or(BoardError::HttpError)
}

/// Send one POST over `conn` and return the response status
pub async fn post<C: Read + Write>(
    conn: &mut C,
    url: &UploadUrl<'_>,
    body: &[u8],
) -> Result<u16, BoardError> {
    write_post_request(conn, url, body).await?;
    let status = read_status_code(conn).await?;
    log::info!("[HTTP] {} {} -> {}", url.host, url.path, status);
    Ok(status)
}
