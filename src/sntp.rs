//! Minimal SNTP (RFC 4330) client packet codec

use crate::BoardError;
use crate::time::MIN_VALID_UNIX;

/// NTP port
pub const NTP_PORT: u16 = 123;

/// Fixed SNTP packet size
pub const PACKET_LEN: usize = 48;

/// Seconds between the NTP era (1900) and the unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const VERSION: u8 = 4;

/// Transmit timestamp seconds field
const TRANSMIT_SECS: usize = 40;

/// Client request: LI = 0, VN = 4, Mode = 3, everything else zero
pub fn build_request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = (VERSION << 3) | MODE_CLIENT;
    packet
}

/// Extract the server transmit time as unix seconds
pub fn parse_response(packet: &[u8]) -> Result<u64, BoardError> {
    if packet.len() < PACKET_LEN {
        return Err(BoardError::TimeSyncError);
    }

    let leap = packet[0] >> 6;
    let mode = packet[0] & 0x07;
    let stratum = packet[1];
    // LI = 3 means the server clock is unsynchronized; stratum 0 is a kiss-o'-death
    if mode != MODE_SERVER || leap == 3 || stratum == 0 {
        return Err(BoardError::TimeSyncError);
    }

    let secs = u32::from_be_bytes([
        packet[TRANSMIT_SECS],
        packet[TRANSMIT_SECS + 1],
        packet[TRANSMIT_SECS + 2],
        packet[TRANSMIT_SECS + 3],
    ]) as u64;

    let unix = secs
        .checked_sub(NTP_UNIX_OFFSET)
        .ok_or(BoardError::TimeSyncError)?;
    if unix < MIN_VALID_UNIX {
        return Err(BoardError::TimeSyncError);
    }
    Ok(unix)
}
