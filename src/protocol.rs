//! Thermal sensor UART frame protocol
//!
//! Wire format:
//!
//! ```text
//! Byte 0-1: sync marker 0x5A 0x5A
//! Byte 2-3: payload length (u16, little-endian)
//! Byte 4..: payload
//! ```
//!
//! Two payload layouts are in the field, told apart only by their length. Both
//! carry 768 little-endian `i16` samples in hundredths of a degree Celsius and
//! end with a 2-byte trailer that is not verified.

use crate::buffer::AccumulationBuffer;

/// Frame start marker
pub const SYNC_MARKER: [u8; 2] = [0x5A, 0x5A];

/// Marker plus length field
pub const HEADER_LEN: usize = 4;

/// Sensor rows
pub const GRID_ROWS: usize = 24;

/// Sensor columns
pub const GRID_COLS: usize = 32;

/// Pixels per frame
pub const GRID_LEN: usize = GRID_ROWS * GRID_COLS;

/// Encoded pixel block size
pub const PIXEL_BYTES: usize = GRID_LEN * 2;

/// Layout A: pixels + trailer
pub const LAYOUT_A_LEN: usize = PIXEL_BYTES + TRAILER_LEN;

/// Layout B: sub-header + pixels + trailer
pub const LAYOUT_B_LEN: usize = SUB_HEADER_LEN + PIXEL_BYTES + TRAILER_LEN;

/// Layout B leading bytes, ignored
pub const SUB_HEADER_LEN: usize = 5;

/// Trailing checksum field, ignored
pub const TRAILER_LEN: usize = 2;

/// Lowest accepted sample in °C
pub const MIN_PLAUSIBLE_C: f32 = -40.0;

/// Highest accepted sample in °C
pub const MAX_PLAUSIBLE_C: f32 = 200.0;

/// Raw samples are hundredths of a degree
const CENTI: f32 = 100.0;

/// Decoded temperature grid, row-major
pub type Grid = [f32; GRID_LEN];

/// Result of one synchronization attempt over the accumulation buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome<'a> {
    /// Fewer than 4 bytes buffered
    NoData,
    /// No marker in the buffer; only the last byte was kept
    NoSync,
    /// Marker at the front but the frame has not fully arrived
    Incomplete { needed: usize, available: usize },
    /// Declared frame can never fit the buffer; the marker was dropped
    Oversized { declared: usize },
    /// Complete frame at the front of the buffer
    Ready { payload: &'a [u8], consumed: usize },
}

/// Known payload layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// 1536 pixel bytes + 2 trailer bytes
    Plain,
    /// 5 sub-header bytes + 1536 pixel bytes + 2 trailer bytes
    WithSubHeader,
}

impl PayloadLayout {
    /// Pick the layout from the payload length
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            LAYOUT_A_LEN => Some(Self::Plain),
            LAYOUT_B_LEN => Some(Self::WithSubHeader),
            _ => None,
        }
    }

    /// Offset of the first pixel byte inside the payload
    pub fn pixel_offset(self) -> usize {
        match self {
            Self::Plain => 0,
            Self::WithSubHeader => SUB_HEADER_LEN,
        }
    }
}

/// Payload could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub payload_len: usize,
}

/// Decoded grid holds physically impossible values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationError {
    pub min: f32,
    pub max: f32,
}

/// Outcome of one pass of synchronize → decode → validate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    NoData,
    NoSync,
    Incomplete { needed: usize, available: usize },
    /// Frame consumed but its payload layout is unknown
    DecodeFailure { payload_len: usize },
    /// Frame consumed but at least one sample is out of range
    ValidationFailure { min: f32, max: f32 },
    /// A valid grid was written to the caller's buffer
    Ready,
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == SYNC_MARKER)
}

/// Locate the next frame in `buffer`.
///
/// Bytes before the first marker are discarded. Nothing is consumed for
/// `Ready`; the caller consumes `consumed` bytes once it is done with the
/// payload.
pub fn synchronize<const N: usize>(buffer: &mut AccumulationBuffer<N>) -> SyncOutcome<'_> {
    if buffer.len() < HEADER_LEN {
        return SyncOutcome::NoData;
    }

    let Some(idx) = find_marker(buffer.as_slice()) else {
        // A lone trailing 0x5A may be the first half of a marker
        buffer.retain_last();
        return SyncOutcome::NoSync;
    };

    if idx > 0 {
        log::debug!("[SYNC] Marker at offset {}, discarding {} bytes", idx, idx);
        buffer.consume(idx);
        if buffer.len() < HEADER_LEN {
            return SyncOutcome::NoData;
        }
    }

    let data = buffer.as_slice();
    let declared = u16::from_le_bytes([data[2], data[3]]) as usize;
    let total = HEADER_LEN + declared;

    if total > N {
        log::warn!(
            "[SYNC] Declared frame of {} bytes exceeds buffer capacity {}, skipping marker",
            total,
            N
        );
        buffer.consume(SYNC_MARKER.len());
        return SyncOutcome::Oversized { declared };
    }

    if data.len() < total {
        return SyncOutcome::Incomplete {
            needed: total,
            available: data.len(),
        };
    }

    SyncOutcome::Ready {
        payload: &buffer.as_slice()[HEADER_LEN..total],
        consumed: total,
    }
}

/// Decode a payload into `grid` (°C)
pub fn decode_payload(payload: &[u8], grid: &mut Grid) -> Result<PayloadLayout, DecodeError> {
    let layout = PayloadLayout::from_len(payload.len()).ok_or(DecodeError {
        payload_len: payload.len(),
    })?;

    let start = layout.pixel_offset();
    let pixels = &payload[start..start + PIXEL_BYTES];
    for (cell, raw) in grid.iter_mut().zip(pixels.chunks_exact(2)) {
        *cell = f32::from(i16::from_le_bytes([raw[0], raw[1]])) / CENTI;
    }

    Ok(layout)
}

/// Accept the grid only if every sample lies in the sensor's physical range
pub fn validate(grid: &Grid) -> Result<(), ValidationError> {
    let (min, max) = grid
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });

    if min < MIN_PLAUSIBLE_C || max > MAX_PLAUSIBLE_C {
        return Err(ValidationError { min, max });
    }
    Ok(())
}

/// Run one synchronize → decode → validate pass.
///
/// Frame bytes are consumed whether or not the frame is valid, so a corrupt
/// frame is skipped rather than re-parsed.
pub fn next_frame<const N: usize>(
    buffer: &mut AccumulationBuffer<N>,
    grid: &mut Grid,
) -> FrameOutcome {
    let (consumed, decoded) = match synchronize(buffer) {
        SyncOutcome::NoData => return FrameOutcome::NoData,
        SyncOutcome::NoSync => return FrameOutcome::NoSync,
        SyncOutcome::Incomplete { needed, available } => {
            return FrameOutcome::Incomplete { needed, available };
        }
        SyncOutcome::Oversized { declared } => {
            return FrameOutcome::DecodeFailure {
                payload_len: declared,
            };
        }
        SyncOutcome::Ready { payload, consumed } => (consumed, decode_payload(payload, grid)),
    };
    buffer.consume(consumed);

    match decoded {
        Err(DecodeError { payload_len }) => FrameOutcome::DecodeFailure { payload_len },
        Ok(_) => match validate(grid) {
            Ok(()) => FrameOutcome::Ready,
            Err(ValidationError { min, max }) => FrameOutcome::ValidationFailure { min, max },
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Encode `values` (°C) as a complete UART frame
    pub(crate) fn encode_frame(values: &[f32], layout: PayloadLayout) -> Vec<u8> {
        let payload_len = match layout {
            PayloadLayout::Plain => LAYOUT_A_LEN,
            PayloadLayout::WithSubHeader => LAYOUT_B_LEN,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + payload_len);
        out.extend_from_slice(&SYNC_MARKER);
        out.extend_from_slice(&(payload_len as u16).to_le_bytes());
        if layout == PayloadLayout::WithSubHeader {
            out.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        }
        for &t in values {
            let raw = (t * CENTI).round() as i16;
            out.extend_from_slice(&raw.to_le_bytes());
        }
        out.extend_from_slice(&[0xC3, 0x3C]);
        out
    }

    pub(crate) fn uniform(t: f32) -> Vec<f32> {
        alloc::vec![t; GRID_LEN]
    }

    fn gradient() -> Vec<f32> {
        (0..GRID_LEN).map(|i| -39.5 + i as f32 * 0.25).collect()
    }

    fn buffer_with(bytes: &[u8]) -> AccumulationBuffer {
        let mut buffer = AccumulationBuffer::new();
        buffer.extend(bytes);
        buffer
    }

    #[test]
    fn layout_a_frame_of_twenty_degrees() {
        let bytes = encode_frame(&uniform(20.0), PayloadLayout::Plain);
        assert_eq!(&bytes[..4], &[0x5A, 0x5A, 0x02, 0x06]);

        let mut buffer = buffer_with(&bytes);
        let mut grid = [0.0; GRID_LEN];
        assert_eq!(next_frame(&mut buffer, &mut grid), FrameOutcome::Ready);
        assert!(grid.iter().all(|&t| t == 20.0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn layout_a_round_trip_within_quantization() {
        let values = gradient();
        let bytes = encode_frame(&values, PayloadLayout::Plain);
        let mut grid = [0.0; GRID_LEN];
        decode_payload(&bytes[HEADER_LEN..], &mut grid).unwrap();
        for (decoded, original) in grid.iter().zip(values.iter()) {
            assert!((decoded - original).abs() <= 0.01);
        }
    }

    #[test]
    fn layout_b_skips_sub_header() {
        let values = gradient();
        let plain = encode_frame(&values, PayloadLayout::Plain);
        let with_header = encode_frame(&values, PayloadLayout::WithSubHeader);

        let mut a = [0.0; GRID_LEN];
        let mut b = [0.0; GRID_LEN];
        assert_eq!(
            decode_payload(&plain[HEADER_LEN..], &mut a),
            Ok(PayloadLayout::Plain)
        );
        assert_eq!(
            decode_payload(&with_header[HEADER_LEN..], &mut b),
            Ok(PayloadLayout::WithSubHeader)
        );
        assert_eq!(a, b);
    }

    #[test]
    fn negative_samples_are_sign_extended() {
        let mut payload = alloc::vec![0u8; LAYOUT_A_LEN];
        payload[..2].copy_from_slice(&(-1234i16).to_le_bytes());
        let mut grid = [0.0; GRID_LEN];
        decode_payload(&payload, &mut grid).unwrap();
        assert!((grid[0] + 12.34).abs() < 1e-4);
        assert_eq!(grid[1], 0.0);
    }

    #[test]
    fn unknown_payload_length_is_decode_failure() {
        let mut grid = [0.0; GRID_LEN];
        assert_eq!(
            decode_payload(&[0u8; 1536], &mut grid),
            Err(DecodeError { payload_len: 1536 })
        );
    }

    #[test]
    fn short_buffer_is_no_data() {
        let mut buffer = buffer_with(&[0x5A, 0x5A, 0x02]);
        assert_eq!(synchronize(&mut buffer), SyncOutcome::NoData);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn no_marker_keeps_last_byte() {
        let mut buffer = buffer_with(&[0x01, 0x02, 0x03, 0x04, 0x5A]);
        assert_eq!(synchronize(&mut buffer), SyncOutcome::NoSync);
        assert_eq!(buffer.as_slice(), &[0x5A]);

        // The kept byte completes a marker split across reads
        buffer.extend(&[0x5A, 0x02, 0x00, 0xAA, 0xBB]);
        assert_eq!(
            synchronize(&mut buffer),
            SyncOutcome::Ready {
                payload: &[0xAA, 0xBB],
                consumed: 6
            }
        );
    }

    #[test]
    fn garbage_before_marker_is_discarded() {
        let mut buffer = buffer_with(&[0x00, 0x11, 0x5A, 0x5A, 0x01, 0x00, 0x7F]);
        assert_eq!(
            synchronize(&mut buffer),
            SyncOutcome::Ready {
                payload: &[0x7F],
                consumed: 5
            }
        );
        assert_eq!(buffer.as_slice()[0], 0x5A);
    }

    #[test]
    fn garbage_leaving_short_header_is_no_data() {
        let mut buffer = buffer_with(&[0x00, 0x11, 0x22, 0x5A, 0x5A]);
        assert_eq!(synchronize(&mut buffer), SyncOutcome::NoData);
        assert_eq!(buffer.as_slice(), &[0x5A, 0x5A]);
    }

    #[test]
    fn exact_length_is_ready_one_short_is_incomplete() {
        let bytes = encode_frame(&uniform(25.0), PayloadLayout::Plain);

        let mut short = buffer_with(&bytes[..bytes.len() - 1]);
        assert_eq!(
            synchronize(&mut short),
            SyncOutcome::Incomplete {
                needed: bytes.len(),
                available: bytes.len() - 1
            }
        );
        assert_eq!(short.len(), bytes.len() - 1);

        let mut exact = buffer_with(&bytes);
        assert!(matches!(
            synchronize(&mut exact),
            SyncOutcome::Ready { consumed, .. } if consumed == bytes.len()
        ));
    }

    #[test]
    fn oversized_declaration_drops_marker() {
        let mut buffer = AccumulationBuffer::<64>::new();
        buffer.extend(&[0x5A, 0x5A, 0xFF, 0x00, 0x01, 0x02]);
        assert_eq!(
            synchronize(&mut buffer),
            SyncOutcome::Oversized { declared: 255 }
        );
        assert_eq!(buffer.as_slice(), &[0xFF, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn validator_range_boundaries() {
        let mut grid = [20.0; GRID_LEN];
        grid[0] = -40.0;
        grid[1] = 200.0;
        assert!(validate(&grid).is_ok());

        grid[100] = -41.0;
        assert_eq!(
            validate(&grid),
            Err(ValidationError {
                min: -41.0,
                max: 200.0
            })
        );

        grid[100] = 201.0;
        assert!(validate(&grid).is_err());
    }

    #[test]
    fn out_of_range_frame_is_consumed_and_rejected() {
        let mut values = uniform(22.0);
        values[767] = 201.0;
        let mut buffer = buffer_with(&encode_frame(&values, PayloadLayout::Plain));
        let mut grid = [0.0; GRID_LEN];
        assert!(matches!(
            next_frame(&mut buffer, &mut grid),
            FrameOutcome::ValidationFailure { .. }
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_single_chunk() {
        let mut stream = alloc::vec![0x13, 0x37, 0x5A, 0x00];
        stream.extend(encode_frame(&gradient(), PayloadLayout::WithSubHeader));

        let mut chunked = buffer_with(&stream);
        let mut expected = [0.0; GRID_LEN];
        assert_eq!(next_frame(&mut chunked, &mut expected), FrameOutcome::Ready);

        let mut trickled = AccumulationBuffer::<{ crate::config::ACCUMULATION_CAPACITY }>::new();
        let mut grid = [0.0; GRID_LEN];
        let mut ready = 0;
        for &byte in &stream {
            trickled.extend(&[byte]);
            if next_frame(&mut trickled, &mut grid) == FrameOutcome::Ready {
                ready += 1;
            }
        }
        assert_eq!(ready, 1);
        assert_eq!(grid, expected);
    }

    #[test]
    fn leading_garbage_does_not_change_output() {
        let frame = encode_frame(&gradient(), PayloadLayout::Plain);
        let mut clean = buffer_with(&frame);
        let mut expected = [0.0; GRID_LEN];
        assert_eq!(next_frame(&mut clean, &mut expected), FrameOutcome::Ready);

        let mut noisy_stream = alloc::vec![0x00, 0xFF, 0x5A, 0x01, 0xA5, 0x5B];
        noisy_stream.extend_from_slice(&frame);
        let mut noisy = buffer_with(&noisy_stream);
        let mut grid = [0.0; GRID_LEN];
        assert_eq!(next_frame(&mut noisy, &mut grid), FrameOutcome::Ready);
        assert_eq!(grid, expected);
    }

    #[test]
    fn corrupt_first_frame_then_second_marker() {
        // First marker declares a 3-byte payload: unknown layout
        let mut stream = alloc::vec![0x5A, 0x5A, 0x03, 0x00, 0x01, 0x02, 0x03];
        stream.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        stream.extend(encode_frame(&uniform(30.0), PayloadLayout::Plain));
        let mut buffer = buffer_with(&stream);
        let mut grid = [0.0; GRID_LEN];

        assert_eq!(
            next_frame(&mut buffer, &mut grid),
            FrameOutcome::DecodeFailure { payload_len: 3 }
        );
        assert_eq!(next_frame(&mut buffer, &mut grid), FrameOutcome::Ready);
        assert!(grid.iter().all(|&t| t == 30.0));
    }
}
